// ABOUTME: Deploy command implementation.
// ABOUTME: Submits an execution, streams progress, and turns Ctrl-C into a stop request.

use std::sync::Arc;

use async_trait::async_trait;
use stagehand::error::{Error, Result};
use stagehand::execution::Verdict;
use stagehand::ops::{ExecutionEvent, Notifier, NotifyError};
use stagehand::orchestrator::DeploymentRequest;
use stagehand::output::Output;

use super::workspace::Workspace;

/// Prints per-service progress lines as events arrive.
struct ProgressNotifier {
    output: Output,
}

#[async_trait]
impl Notifier for ProgressNotifier {
    async fn notify(&self, event: &ExecutionEvent) -> std::result::Result<(), NotifyError> {
        match event {
            ExecutionEvent::ServiceStateChanged {
                service,
                state,
                attempt,
                error,
                ..
            } => {
                let mut line = format!("  → {service}: {state}");
                if *attempt > 1 {
                    line.push_str(&format!(" (attempt {attempt})"));
                }
                if let Some(error) = error {
                    line.push_str(&format!(" - {error}"));
                }
                self.output.progress(&line);
            }
            ExecutionEvent::RollbackStarted { services, .. } => {
                self.output
                    .progress(&format!("  → Rolling back {} service(s)...", services.len()));
            }
            ExecutionEvent::ExecutionStarted { .. } | ExecutionEvent::ExecutionFinished { .. } => {}
        }
        Ok(())
    }
}

pub async fn deploy(workspace: &Workspace, request: DeploymentRequest, mut output: Output) -> Result<()> {
    output.start_timer();
    let progress = Arc::new(ProgressNotifier {
        output: output.clone(),
    });
    let orchestrator = workspace.orchestrator(progress)?;

    output.progress(&format!(
        "Deploying version {} to {} ({})",
        request.version, request.environment, request.strategy
    ));
    let id = orchestrator.submit(request).await?;
    output.progress(&format!("Execution {id} started"));

    let execution = tokio::select! {
        finished = orchestrator.wait(&id) => finished?,
        _ = tokio::signal::ctrl_c() => {
            output.progress("Stop requested; waiting for in-flight services and rollback...");
            orchestrator.stop(&id)?;
            orchestrator.wait(&id).await?
        }
    };
    orchestrator.flush_notifications().await;

    output.execution(&execution);
    if execution.verdict == Verdict::Succeeded {
        output.success("Deployment complete!");
        Ok(())
    } else {
        Err(Error::Unsuccessful {
            id: execution.id.clone(),
            verdict: execution.verdict,
        })
    }
}
