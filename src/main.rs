// ABOUTME: Entry point for the stagehand CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use commands::Workspace;
use stagehand::config;
use stagehand::error::Result;
use stagehand::execution::ListFilter;
use stagehand::orchestrator::DeploymentRequest;
use stagehand::output::Output;
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let output = Output::new(cli.output);
    if let Err(e) = run(cli.command, output.clone()).await {
        output.error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(command: Commands, output: Output) -> Result<()> {
    match command {
        Commands::Init { force } => {
            let cwd = env::current_dir()?;
            config::init_config(&cwd, force)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::Validate => commands::validate(&Workspace::discover()?, &output),
        Commands::Plan { strategy, services } => {
            commands::plan(&Workspace::discover()?, strategy, &services, &output)
        }
        Commands::Deploy {
            strategy,
            environment,
            version,
            services,
            concurrency,
            include_dependencies,
        } => {
            let mut request = DeploymentRequest::new(strategy, environment, version)
                .targets(services)
                .include_dependencies(include_dependencies);
            request.concurrency_limit = concurrency;
            commands::deploy(&Workspace::discover()?, request, output).await
        }
        Commands::Status { id } => commands::status(&Workspace::discover()?, &id, &output),
        Commands::List { limit, environment } => {
            let filter = ListFilter {
                environment,
                limit,
                ..ListFilter::default()
            };
            commands::list(&Workspace::discover()?, filter, &output)
        }
        Commands::Health { environment } => {
            commands::health(&Workspace::discover()?, &environment, &output).await
        }
    }
}
