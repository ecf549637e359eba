//! Type definitions for the provisioning pipeline.

use crate::config::{ProvisionerOptions, ProvisioningConfig};
use crate::credentials::CredentialSink;
use crate::lxd::Lxd;
use crate::sunbeam::Sunbeam;
use crate::util::CommandRunner;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Shared provisioning pipeline context.
///
/// Stores shared inputs and the outputs each task hands to the next one.
pub struct ProvisionContext {
    pub config: ProvisioningConfig,
    pub options: ProvisionerOptions,
    pub runner: Arc<dyn CommandRunner>,
    pub sink: Arc<dyn CredentialSink>,
    pub lxd: Lxd,
    pub sunbeam: Sunbeam,
    /// Admin clouds.yaml, set by `CredentialsExportTask`.
    pub credentials: Option<String>,
    /// VM address the host routes through, set by `NetworkDiscoveryTask`.
    pub gateway: Option<String>,
}

impl ProvisionContext {
    pub fn new(
        config: ProvisioningConfig,
        options: ProvisionerOptions,
        runner: Arc<dyn CommandRunner>,
        sink: Arc<dyn CredentialSink>,
    ) -> Self {
        let lxd = Lxd::new(options.vm_name.clone());
        let sunbeam = Sunbeam::new(lxd.clone(), options.vm_user.clone());
        Self {
            config,
            options,
            runner,
            sink,
            lxd,
            sunbeam,
            credentials: None,
            gateway: None,
        }
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub vm_name: String,
    pub config: ProvisioningConfig,
    pub gateway: String,
    pub route_subnet: String,
    pub credential_paths: Vec<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
