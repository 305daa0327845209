// src/lib.rs

pub mod catalog;
pub mod config;
pub mod error;
pub mod migration;
pub mod models;
pub mod session;
pub mod utils;

// Re-export specific items for convenience if needed
pub use error::{MigrationError, MigrationResult};
pub use migration::{RunOptions, run};
