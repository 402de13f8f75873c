//! Test utilities for StudyMate services.
//!
//! Import from tests only; never from production code.

pub mod auth;
