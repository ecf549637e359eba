//! Error taxonomy for the provisioning pipeline.
//!
//! Every variant is fatal to a run. The only retrying that happens anywhere
//! is the bounded polling inside a readiness gate.

use thiserror::Error;

pub type ProvisionResult<T> = Result<T, ProvisionError>;

#[derive(Debug, Error)]
pub enum ProvisionError {
    /// An external command exited non-zero where failure was not tolerated.
    #[error("command `{command}` failed with exit code {exit_code}: {stderr}")]
    CommandFailure {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// An external command did not finish within its time bound and was killed.
    #[error("command `{command}` timed out after {timeout_ms}ms")]
    CommandTimeout { command: String, timeout_ms: u128 },

    /// A polled condition never became true.
    #[error("timeout exceeded after {elapsed_ms}ms waiting for condition (last result: {last_result})")]
    Timeout { elapsed_ms: u128, last_result: bool },

    /// A readiness gate never opened within its deadline.
    #[error("readiness gate `{gate}` timed out after {elapsed_ms}ms")]
    ReadinessTimeout { gate: String, elapsed_ms: u128 },

    #[error(transparent)]
    Resolution(#[from] ResolutionFailure),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Structured command output could not be decoded.
    #[error("failed to parse command output: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProvisionError {
    /// Exit code carried by a `CommandFailure`, if this is one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ProvisionError::CommandFailure { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

/// Network topology could not be resolved from inventory output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionFailure {
    #[error("vm `{0}` not found in network inventory")]
    VmNotFound(String),

    #[error("vm `{vm}` has no interface starting with `{prefix}`")]
    InterfaceNotFound { vm: String, prefix: String },

    #[error("interface `{interface}` has no address with netmask /{netmask}")]
    AddressNotFound { interface: String, netmask: String },
}
