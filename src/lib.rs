// ABOUTME: Library root for stagehand - dependency-aware rollout orchestration.
// ABOUTME: The main binary is in main.rs; everything it drives lives here.

pub mod config;
pub mod deploy;
pub mod error;
pub mod execution;
pub mod graph;
pub mod ops;
pub mod orchestrator;
pub mod output;
pub mod plan;
pub mod types;
