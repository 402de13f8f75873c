use axum::{Json, extract::State};
use tracing::info;

use studymate_auth_types::identity::Identity;

use crate::domain::projection::ReconcileReport;
use crate::error::StudyMateError;
use crate::handlers::{require_admin, run_detached};
use crate::state::AppState;

// ── POST /api/admin/sync/reconcile ───────────────────────────────────────────

pub async fn reconcile(
    identity: Identity,
    State(state): State<AppState>,
) -> Result<Json<ReconcileReport>, StudyMateError> {
    require_admin(&identity)?;
    let sync = state.sync.clone();
    let report = run_detached(async move { sync.reconcile_all().await }).await?;
    info!(requested_by = %identity.user_id, ?report, "manual reconcile finished");
    Ok(Json(report))
}
