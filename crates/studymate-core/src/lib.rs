//! Cross-cutting service plumbing: tracing, request ids, health checks, query helpers,
//! retry with backoff and per-key async locks.

pub mod health;
pub mod keyed_lock;
pub mod middleware;
pub mod retry;
pub mod sea_ext;
pub mod serde;
pub mod tracing;
