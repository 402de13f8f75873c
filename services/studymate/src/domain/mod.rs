pub mod projection;
pub mod repository;
pub mod types;
