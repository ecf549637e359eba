//! Types shared between the cloudnest library and its binaries.

pub mod errors;

pub use errors::{ProvisionError, ProvisionResult, ResolutionFailure};
