// src/migration/mod.rs

pub mod audit;
pub mod backup;
pub mod dedupe;
pub mod index;
pub mod orchestrator;

pub use orchestrator::{RunOptions, run, run_with};
