//! cloudnest - nested OpenStack provisioning for CI hosts.
//!
//! Launches an LXD virtual machine, bootstraps a Sunbeam OpenStack cloud
//! inside it, exports the admin `clouds.yaml` and routes the cloud's
//! load-balancer subnet from the host through the VM.
//!
//! ```ignore
//! let config = ProvisioningConfig::resolve(ProvisioningInputs::default())?;
//! let report = Provisioner::new(
//!     config,
//!     ProvisionerOptions::default(),
//!     Arc::new(ProcessRunner::new()),
//!     Arc::new(FsCredentialSink),
//! )
//! .run()
//! .await?;
//! ```

pub mod config;
pub mod credentials;
pub mod lxd;
pub mod network;
pub mod pipeline;
pub mod provision;
pub mod sunbeam;
pub mod util;

pub use cloudnest_shared::errors::{ProvisionError, ProvisionResult, ResolutionFailure};
pub use config::{ByteSize, ProvisionerOptions, ProvisioningConfig, ProvisioningInputs};
pub use credentials::{CredentialSink, FsCredentialSink};
pub use network::{NetworkInventory, resolve_gateway_address};
pub use provision::{ProvisionReport, Provisioner};
pub use util::{CommandLine, CommandRunner, ProcessRunner, RunOptions, StepResult};

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE_NAME: &str = "cloudnest.log";

/// Initialize tracing for the process.
///
/// Filter comes from `RUST_LOG` and defaults to `info`. Output goes to stderr
/// and, when `log_dir` is given, to `cloudnest.log` inside it. Keep the
/// returned guard alive until exit so buffered file output is flushed.
pub fn init_logging(log_dir: Option<&Path>) -> ProvisionResult<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| ProvisionError::Internal(format!("failed to initialize logging: {}", e)))?;

    Ok(guard)
}
