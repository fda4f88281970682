pub mod profile;
pub mod resume;
pub mod user;
pub mod vacancy;
