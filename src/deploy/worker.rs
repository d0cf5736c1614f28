// ABOUTME: Per-service worker: deploy, then probe until healthy, with shared retry budget.
// ABOUTME: Reports progress to the coordinating loop; never touches execution state itself.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::ops::{Deployer, HealthProber, HealthStatus, Release};
use crate::types::ServiceName;

use super::{CancelSignal, RetryPolicy, ServiceFailure};

/// Messages from a worker to the engine loop, in the order they happen.
#[derive(Debug)]
pub(crate) enum WorkerReport {
    /// Deploy succeeded; health probing has begun.
    Probing { service: ServiceName },
    /// Attempt `attempt` failed; the next one starts after `delay`.
    Retrying {
        service: ServiceName,
        attempt: u32,
        error: String,
        delay: Duration,
    },
    /// Final outcome. `Ok` carries the number of attempts used.
    Finished {
        service: ServiceName,
        outcome: Result<u32, ServiceFailure>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Deploy,
    Probe,
}

pub(crate) struct Worker {
    pub release: Release,
    pub deployer: Arc<dyn Deployer>,
    pub prober: Arc<dyn HealthProber>,
    pub retry: RetryPolicy,
    pub cancel: CancelSignal,
}

impl Worker {
    /// Spawn the worker. A `Finished` report is always delivered, even if the task panics.
    pub(crate) fn spawn(self, reports: mpsc::UnboundedSender<WorkerReport>) {
        let service = self.release.service.clone();
        let watchdog = reports.clone();
        let task = tokio::spawn(self.run(reports));
        tokio::spawn(async move {
            if let Err(e) = task.await {
                let _ = watchdog.send(WorkerReport::Finished {
                    service,
                    outcome: Err(ServiceFailure::Aborted {
                        reason: e.to_string(),
                    }),
                });
            }
        });
    }

    async fn run(self, reports: mpsc::UnboundedSender<WorkerReport>) {
        let outcome = self.drive(&reports).await;
        let _ = reports.send(WorkerReport::Finished {
            service: self.release.service.clone(),
            outcome,
        });
    }

    async fn drive(&self, reports: &mpsc::UnboundedSender<WorkerReport>) -> Result<u32, ServiceFailure> {
        let service = &self.release.service;
        let mut phase = Phase::Deploy;
        let mut failures: u32 = 0;

        loop {
            let attempt = failures + 1;
            let error = match phase {
                Phase::Deploy => match self.deployer.deploy(&self.release).await {
                    Ok(handle) => {
                        tracing::debug!(service = %service, attempt, reference = %handle.reference, "deployed");
                        phase = Phase::Probe;
                        let _ = reports.send(WorkerReport::Probing {
                            service: service.clone(),
                        });
                        continue;
                    }
                    Err(e) => e.to_string(),
                },
                Phase::Probe => match self.probe().await {
                    Ok(()) => return Ok(attempt),
                    Err(e) => e,
                },
            };

            failures += 1;
            if failures > self.release.max_retries {
                return Err(ServiceFailure::Exhausted {
                    attempts: failures,
                    last_error: error,
                });
            }
            if self.cancel.is_cancelled() {
                return Err(ServiceFailure::Stopped {
                    attempts: failures,
                    last_error: error,
                });
            }

            let delay = self.retry.delay(failures - 1);
            tracing::warn!(service = %service, attempt = failures, ?delay, "attempt failed, retrying: {}", error);
            let _ = reports.send(WorkerReport::Retrying {
                service: service.clone(),
                attempt: failures,
                error: error.clone(),
                delay,
            });

            if !self.cancel.sleep(delay).await {
                return Err(ServiceFailure::Stopped {
                    attempts: failures,
                    last_error: error,
                });
            }
        }
    }

    /// One health probe bounded by the service timeout.
    async fn probe(&self) -> Result<(), String> {
        let timeout = self.release.timeout;
        match tokio::time::timeout(timeout, self.prober.probe(&self.release)).await {
            Ok(Ok(HealthStatus::Healthy)) => Ok(()),
            Ok(Ok(HealthStatus::Unhealthy { reason })) => Err(format!("unhealthy: {reason}")),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("health probe timed out after {timeout:?}")),
        }
    }
}
