pub mod admin;
pub mod config;
pub mod core;
pub mod marks_entry;
pub mod reports;
