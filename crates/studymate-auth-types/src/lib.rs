//! Auth types shared across StudyMate crates.
//!
//! Provides JWT issuance and validation plus the `Identity` bearer-token extractor.

pub mod identity;
pub mod token;
