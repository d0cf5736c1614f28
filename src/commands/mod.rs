// ABOUTME: Command module aggregator for the stagehand CLI.
// ABOUTME: Re-exports deploy and the read-only inspection command handlers.

mod deploy;
mod inspect;
mod workspace;

pub use deploy::deploy;
pub use inspect::{health, list, plan, status, validate};
pub use workspace::Workspace;
