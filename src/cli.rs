// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use stagehand::output::OutputMode;
use stagehand::plan::Strategy;
use stagehand::types::ServiceName;

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(about = "Dependency-aware rollout orchestration for microservices")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputMode::Normal)]
    pub output: OutputMode,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new stagehand.yml configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Validate the service dependency graph
    Validate,

    /// Show the deployment plan for a strategy without deploying
    Plan {
        #[arg(short, long, value_enum)]
        strategy: Strategy,

        /// Comma-separated services to plan (default: all)
        #[arg(long, value_delimiter = ',')]
        services: Vec<ServiceName>,
    },

    /// Deploy services and wait for the outcome (Ctrl-C stops and rolls back)
    Deploy {
        #[arg(short, long, value_enum)]
        strategy: Strategy,

        #[arg(short, long)]
        environment: String,

        #[arg(long)]
        version: String,

        /// Comma-separated services to deploy (default: all)
        #[arg(long, value_delimiter = ',')]
        services: Vec<ServiceName>,

        /// Maximum services deploying or health checking at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Also deploy the transitive dependencies of the selected services
        #[arg(long)]
        include_dependencies: bool,
    },

    /// Show a recorded execution
    Status {
        /// Execution ID
        id: String,
    },

    /// List recorded executions, most recent first
    List {
        #[arg(long)]
        limit: Option<usize>,

        /// Only executions for this environment
        #[arg(short, long)]
        environment: Option<String>,
    },

    /// Probe the health of every service in an environment
    Health {
        #[arg(short, long)]
        environment: String,
    },
}
