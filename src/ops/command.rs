// ABOUTME: Deployer that runs configured shell commands for deploy and rollback.
// ABOUTME: Release context is passed to the commands via STAGEHAND_* environment variables.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::{DeployError, DeployHandle, Deployer, Release, RollbackError, RollbackReceipt};
use crate::config::DeployerConfig;

/// Captured result of running one command.
#[derive(Debug)]
struct CommandOutput {
    success: bool,
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl CommandOutput {
    fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        match (self.exit_code, stderr.is_empty()) {
            (Some(code), true) => format!("exit code {code}"),
            (Some(code), false) => format!("exit code {code}: {stderr}"),
            (None, true) => "terminated by signal".to_string(),
            (None, false) => format!("terminated by signal: {stderr}"),
        }
    }
}

/// Runs `sh -c <command>` per service.
#[derive(Debug, Clone)]
pub struct CommandDeployer {
    deploy: String,
    rollback: Option<String>,
    workdir: PathBuf,
}

impl CommandDeployer {
    pub fn new(deploy: impl Into<String>) -> Self {
        Self {
            deploy: deploy.into(),
            rollback: None,
            workdir: PathBuf::from("."),
        }
    }

    pub fn from_config(config: &DeployerConfig, workdir: &Path) -> Self {
        let mut deployer = Self::new(config.deploy.clone()).workdir(workdir);
        deployer.rollback = config.rollback.clone();
        deployer
    }

    pub fn rollback_command(mut self, command: impl Into<String>) -> Self {
        self.rollback = Some(command.into());
        self
    }

    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = dir.into();
        self
    }

    async fn run(&self, command: &str, release: &Release) -> std::io::Result<CommandOutput> {
        tracing::debug!(service = %release.service, "running `{}`", command);

        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workdir)
            .envs(release.to_env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        Ok(CommandOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[async_trait]
impl Deployer for CommandDeployer {
    async fn deploy(&self, release: &Release) -> Result<DeployHandle, DeployError> {
        let output = self
            .run(&self.deploy, release)
            .await
            .map_err(|e| DeployError::CommandFailed(format!("failed to spawn: {e}")))?;

        if !output.success {
            return Err(DeployError::CommandFailed(output.failure_message()));
        }

        // The last line of stdout, if any, identifies the deployment.
        let reference = output
            .stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or_default()
            .trim()
            .to_string();
        Ok(DeployHandle { reference })
    }

    async fn rollback(&self, release: &Release) -> Result<RollbackReceipt, RollbackError> {
        let Some(ref command) = self.rollback else {
            return Err(RollbackError::NotSupported(release.service.clone()));
        };

        let output = self
            .run(command, release)
            .await
            .map_err(|e| RollbackError::CommandFailed(format!("failed to spawn: {e}")))?;

        if !output.success {
            return Err(RollbackError::CommandFailed(output.failure_message()));
        }

        Ok(RollbackReceipt {
            detail: output.stdout.trim().to_string(),
        })
    }
}
