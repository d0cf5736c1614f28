// ABOUTME: Read-only commands: validate, plan, status, list and environment health.
// ABOUTME: None of these change deployed services.

use stagehand::error::Result;
use stagehand::execution::ListFilter;
use stagehand::ops::HttpProber;
use stagehand::orchestrator::{OrchestratorError, environment_health};
use stagehand::output::Output;
use stagehand::plan::{Strategy, build_plan};
use stagehand::types::{ExecutionId, ServiceName};

use super::workspace::Workspace;

pub fn validate(workspace: &Workspace, output: &Output) -> Result<()> {
    let graph = workspace.graph()?;
    output.success(&format!(
        "Dependency graph is valid: {} service(s), longest chain {}",
        graph.len(),
        graph.longest_chain()
    ));
    Ok(())
}

pub fn plan(workspace: &Workspace, strategy: Strategy, services: &[ServiceName], output: &Output) -> Result<()> {
    let graph = workspace.graph()?;
    let plan = build_plan(&graph, strategy, services)?;
    let limit = workspace.config.execution_settings().limit_for(strategy);
    output.plan(&plan.report(&graph, limit));
    Ok(())
}

pub fn status(workspace: &Workspace, id: &str, output: &Output) -> Result<()> {
    let store = workspace.store()?;
    let id = ExecutionId::new(id);
    let execution = store
        .snapshot(&id)
        .ok_or_else(|| OrchestratorError::UnknownExecution(id.clone()))?;
    output.execution(&execution);
    Ok(())
}

pub fn list(workspace: &Workspace, filter: ListFilter, output: &Output) -> Result<()> {
    let store = workspace.store()?;
    output.summaries(&store.list(&filter));
    Ok(())
}

pub async fn health(workspace: &Workspace, environment: &str, output: &Output) -> Result<()> {
    let graph = workspace.graph()?;
    let report = environment_health(&graph, &HttpProber, environment).await;
    output.health(environment, &report);

    let unhealthy = report.iter().filter(|entry| !entry.healthy).count();
    if unhealthy > 0 {
        output.warning(&format!("{unhealthy} service(s) unhealthy in {environment}"));
    }
    Ok(())
}
