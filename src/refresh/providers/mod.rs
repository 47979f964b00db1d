pub mod drive;
pub mod github;
pub mod medium;
