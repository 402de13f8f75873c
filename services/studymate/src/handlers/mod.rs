use std::future::Future;

use anyhow::Context as _;
use serde::de::DeserializeOwned;

use studymate_auth_types::identity::Identity;

use crate::error::StudyMateError;

pub mod academic;
pub mod auth;
pub mod material;
pub mod sync;
pub mod user;

/// Parse a raw query string with `serde_qs`; absent query yields `T::default()`.
pub(crate) fn parse_query<T>(raw_query: Option<String>) -> Result<T, StudyMateError>
where
    T: DeserializeOwned + Default,
{
    raw_query
        .as_deref()
        .map(serde_qs::from_str)
        .transpose()
        .map_err(|e| StudyMateError::validation(format!("invalid query: {e}")))
        .map(Option::unwrap_or_default)
}

pub(crate) fn require_admin(identity: &Identity) -> Result<(), StudyMateError> {
    if identity.is_admin() {
        Ok(())
    } else {
        Err(StudyMateError::Forbidden)
    }
}

/// Run a multi-step lifecycle on its own task so a client disconnect cannot cancel it
/// between steps.
pub(crate) async fn run_detached<F, T>(lifecycle: F) -> Result<T, StudyMateError>
where
    F: Future<Output = Result<T, StudyMateError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(lifecycle).await.context("lifecycle task")?
}
