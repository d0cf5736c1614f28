// ABOUTME: Terminal per-service failure reasons produced by deployment workers.
// ABOUTME: Recoverable deploy/probe errors never surface here; only their final outcome does.

/// Why a service ended in `Failed` during the forward pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceFailure {
    /// Every allowed attempt failed.
    #[error("gave up after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    /// A stop request was observed before the next retry.
    #[error("stopped by user after {attempts} attempt(s): {last_error}")]
    Stopped { attempts: u32, last_error: String },

    /// The worker task ended without reporting an outcome.
    #[error("deployment worker aborted: {reason}")]
    Aborted { reason: String },
}

impl ServiceFailure {
    pub fn attempts(&self) -> Option<u32> {
        match self {
            ServiceFailure::Exhausted { attempts, .. } | ServiceFailure::Stopped { attempts, .. } => {
                Some(*attempts)
            }
            ServiceFailure::Aborted { .. } => None,
        }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, ServiceFailure::Stopped { .. })
    }
}
