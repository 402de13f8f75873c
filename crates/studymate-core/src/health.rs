use axum::http::StatusCode;
use tracing::warn;

/// `GET /healthz`: the process is up. Never touches a dependency.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Result of pinging one backing store for `GET /readyz`.
#[derive(Debug)]
pub struct DependencyCheck {
    pub name: &'static str,
    pub failure: Option<String>,
}

impl DependencyCheck {
    pub fn from_result<E: std::fmt::Display>(name: &'static str, result: Result<(), E>) -> Self {
        Self {
            name,
            failure: result.err().map(|e| e.to_string()),
        }
    }
}

/// 200 when every check passed, 503 otherwise. Failed checks are logged.
pub fn readiness(checks: &[DependencyCheck]) -> StatusCode {
    let mut ready = true;
    for check in checks {
        if let Some(failure) = &check.failure {
            warn!(dependency = check.name, error = %failure, "not ready");
            ready = false;
        }
    }
    if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
