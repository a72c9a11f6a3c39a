//! Application service layer - config, scanning, analysis orchestration

pub mod app;
pub mod classifier;
pub mod config;
pub mod scanner;
