// ABOUTME: Validated identifiers and domain types shared across the orchestrator.
// ABOUTME: Uses phantom types so execution IDs cannot be confused with other IDs.

mod id;
mod image_ref;
mod service_name;

pub use id::{ExecutionId, Id};
pub use image_ref::{ImageRef, ParseImageRefError};
pub use service_name::{ServiceName, ServiceNameError};
