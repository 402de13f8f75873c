use axum::{
    Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{delete, get, patch, post, put},
};
use tower_http::trace::TraceLayer;

use studymate_core::health::{DependencyCheck, healthz, readiness};
use studymate_core::middleware::{propagate_request_id_layer, request_id_layer};

use crate::domain::types::MAX_UPLOAD_BYTES;
use crate::handlers::{
    academic::{
        create_department, create_semester, create_subject, create_year, delete_department,
        delete_semester, delete_subject, delete_year, get_department, get_semester, get_subject,
        get_year, list_departments, list_semesters, list_subjects, list_years,
    },
    auth::{login, refresh_token, register},
    material::{
        create_material, delete_material, download_material, get_material, list_materials,
        replace_material_file, update_material,
    },
    sync::reconcile,
    user::{create_student, delete_student, get_me, list_students, update_me},
};
use crate::state::AppState;

/// Room for multipart boundaries and text fields on top of the file itself.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Auth
        .route("/api/auth/register", post(register))
        .route("/api/token", post(login))
        .route("/api/token/refresh", post(refresh_token))
        // Profile
        .route("/api/users/me", get(get_me))
        .route("/api/users/me", patch(update_me))
        // Student browsing
        .route("/api/student/departments", get(list_departments))
        .route("/api/student/departments/{id}", get(get_department))
        .route("/api/student/years", get(list_years))
        .route("/api/student/years/{id}", get(get_year))
        .route("/api/student/semesters", get(list_semesters))
        .route("/api/student/semesters/{id}", get(get_semester))
        .route("/api/student/subjects", get(list_subjects))
        .route("/api/student/subjects/{id}", get(get_subject))
        .route("/api/student/materials", get(list_materials))
        .route("/api/student/materials/{id}", get(get_material))
        .route("/api/student/materials/{id}/download", get(download_material))
        // Admin: students
        .route("/api/admin/students", get(list_students))
        .route("/api/admin/students", post(create_student))
        .route("/api/admin/students/{id}", delete(delete_student))
        // Admin: academic structure
        .route("/api/admin/departments", post(create_department))
        .route("/api/admin/departments/{id}", delete(delete_department))
        .route("/api/admin/years", post(create_year))
        .route("/api/admin/years/{id}", delete(delete_year))
        .route("/api/admin/semesters", post(create_semester))
        .route("/api/admin/semesters/{id}", delete(delete_semester))
        .route("/api/admin/subjects", post(create_subject))
        .route("/api/admin/subjects/{id}", delete(delete_subject))
        // Admin: materials
        .route("/api/admin/materials", post(create_material))
        .route("/api/admin/materials/{id}", patch(update_material))
        .route("/api/admin/materials/{id}", delete(delete_material))
        .route("/api/admin/materials/{id}/file", put(replace_material_file))
        // Admin: sync
        .route("/api/admin/sync/reconcile", post(reconcile))
        .layer(DefaultBodyLimit::max(
            MAX_UPLOAD_BYTES as usize + FORM_OVERHEAD_BYTES,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id_layer())
        .layer(request_id_layer())
        .with_state(state)
}

/// Ready when both stores answer.
async fn readyz(State(state): State<AppState>) -> StatusCode {
    let (db, mirror) = tokio::join!(state.db.ping(), state.mirror.ping());
    readiness(&[
        DependencyCheck::from_result("entity store", db),
        DependencyCheck::from_result("mirror store", mirror.map_err(|e| format!("{e:#}"))),
    ])
}
