// src/models/mod.rs

pub mod report;
pub mod rule;
