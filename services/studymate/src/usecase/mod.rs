pub mod academic;
pub mod material;
pub mod seed;
pub mod sync;
pub mod upload;
pub mod user;
