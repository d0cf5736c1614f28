// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes for plans, executions and health.

use serde::Serialize;
use std::fmt::Write as _;
use std::time::Instant;

use crate::execution::{Execution, ExecutionSummary};
use crate::orchestrator::ServiceHealth;
use crate::plan::PlanReport;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    #[default]
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON documents for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
#[derive(Debug, Clone)]
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Print a warning (suppressed in json mode).
    pub fn warning(&self, message: &str) {
        if self.mode != OutputMode::Json {
            eprintln!("Warning: {message}");
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => {
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 {
                    println!("{message} ({:.1}s)", elapsed);
                } else {
                    println!("{message}");
                }
            }
            OutputMode::Quiet => {
                // Print only the essential result
                println!("{message}");
            }
            OutputMode::Json => print_json(&JsonEvent {
                event: "success",
                message,
                duration_secs: self.duration(),
            }),
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                eprintln!("Error: {message}");
            }
            OutputMode::Json => {
                let event = JsonEvent {
                    event: "error",
                    message,
                    duration_secs: self.duration(),
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    eprintln!("{json}");
                }
            }
        }
    }

    pub fn plan(&self, plan: &PlanReport<'_>) {
        match self.mode {
            OutputMode::Normal => print!("{plan}"),
            OutputMode::Quiet => {
                for service in plan.plan().services() {
                    println!("{service}");
                }
            }
            OutputMode::Json => print_json(plan),
        }
    }

    pub fn execution(&self, execution: &Execution) {
        match self.mode {
            OutputMode::Normal => print!("{}", render_execution(execution)),
            OutputMode::Quiet => println!("{} {}", execution.id, execution.verdict),
            OutputMode::Json => print_json(execution),
        }
    }

    pub fn summaries(&self, summaries: &[ExecutionSummary]) {
        match self.mode {
            OutputMode::Normal => {
                if summaries.is_empty() {
                    println!("No executions recorded.");
                    return;
                }
                println!(
                    "{:<28} {:<10} {:<19} {:<12} {:<12} {:>8}",
                    "ID", "VERDICT", "STRATEGY", "ENVIRONMENT", "VERSION", "HEALTHY"
                );
                for s in summaries {
                    println!(
                        "{:<28} {:<10} {:<19} {:<12} {:<12} {:>8}",
                        s.id.as_str(),
                        s.verdict.as_str(),
                        s.strategy.as_str(),
                        s.environment,
                        s.version,
                        format!("{}/{}", s.healthy, s.services)
                    );
                }
            }
            OutputMode::Quiet => {
                for s in summaries {
                    println!("{} {}", s.id, s.verdict);
                }
            }
            OutputMode::Json => print_json(&summaries),
        }
    }

    pub fn health(&self, environment: &str, report: &[ServiceHealth]) {
        match self.mode {
            OutputMode::Normal => {
                println!("Health of {environment}:");
                for entry in report {
                    let mark = if entry.healthy { "✓" } else { "✗" };
                    match entry.detail {
                        Some(ref detail) => println!("  {mark} {} ({detail})", entry.service),
                        None => println!("  {mark} {}", entry.service),
                    }
                }
            }
            OutputMode::Quiet => {
                for entry in report.iter().filter(|e| !e.healthy) {
                    println!("{}", entry.service);
                }
            }
            OutputMode::Json => print_json(&report),
        }
    }
}

/// Execution header followed by the per-service state table.
pub fn render_execution(execution: &Execution) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Execution {} ({}) {} -> {}: {}",
        execution.id, execution.strategy, execution.version, execution.environment, execution.verdict
    );
    if !execution.pre_satisfied.is_empty() {
        let names: Vec<&str> = execution.pre_satisfied.iter().map(|s| s.as_str()).collect();
        let _ = writeln!(out, "  already healthy: {}", names.join(", "));
    }
    let _ = writeln!(
        out,
        "  {:<24} {:>4} {:<16} {:>8}  ERROR",
        "SERVICE", "WAVE", "STATE", "ATTEMPTS"
    );
    for row in execution.state_table() {
        let error = row
            .rollback_error
            .as_deref()
            .map(|e| format!("rollback: {e}"))
            .or(row.last_error.clone())
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "  {:<24} {:>4} {:<16} {:>8}  {}",
            row.service.as_str(),
            row.wave,
            row.state.as_str(),
            row.attempts,
            error
        );
    }
    if !execution.rollback_order.is_empty() {
        let names: Vec<&str> = execution.rollback_order.iter().map(|s| s.as_str()).collect();
        let _ = writeln!(out, "  rollback order: {}", names.join(" -> "));
    }
    out
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error: failed to encode output: {e}"),
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::ServiceState;
    use crate::execution::Verdict;
    use crate::graph::{DependencyGraph, ServiceNode};
    use crate::plan::{Strategy, build_plan};
    use crate::types::{ExecutionId, ServiceName};

    #[test]
    fn renders_state_table_with_errors() {
        let db = ServiceName::new("db").unwrap();
        let api = ServiceName::new("api").unwrap();
        let graph = DependencyGraph::build([
            ServiceNode::new(db.clone()),
            ServiceNode::new(api.clone()).depends_on([db.clone()]),
        ])
        .unwrap();
        let plan = build_plan(&graph, Strategy::ParallelOptimized, &[]).unwrap();
        let mut execution = Execution::new(ExecutionId::new("exec-7"), plan, "prod", "9", 2);
        execution.transition(&db, ServiceState::Deploying).unwrap();
        execution.transition(&db, ServiceState::Failed).unwrap();
        execution.record_mut("db").unwrap().last_error = Some("boom".to_string());
        execution.transition(&api, ServiceState::Skipped).unwrap();
        execution.finish(Verdict::Failed);

        let text = render_execution(&execution);
        assert!(text.starts_with("Execution exec-7 (parallel_optimized) 9 -> prod: failed"));
        assert!(text.contains("db"));
        assert!(text.contains("boom"));
        assert!(text.contains("skipped"));
    }
}
