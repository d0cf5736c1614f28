// ABOUTME: Execution engine, per-service workers, retry backoff, cancellation and rollback.
// ABOUTME: Drives each targeted service from Pending to a settled state.

mod backoff;
mod cancel;
mod engine;
mod error;
mod reporter;
mod rollback;
mod state;
mod worker;

pub use backoff::RetryPolicy;
pub use cancel::CancelSignal;
pub use engine::{Engine, EngineSettings};
pub use error::ServiceFailure;
pub use reporter::Reporter;
pub use rollback::{RollbackReport, rollback};
pub use state::ServiceState;
