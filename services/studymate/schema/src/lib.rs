//! sea-orm entities for the StudyMate relational store.

pub mod departments;
pub mod semesters;
pub mod study_materials;
pub mod subjects;
pub mod sync_outbox;
pub mod users;
pub mod years;
