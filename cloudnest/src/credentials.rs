//! Credential file output.

use cloudnest_shared::errors::ProvisionResult;
use std::path::Path;

/// Persists the exported cloud credentials. The blob is written verbatim.
pub trait CredentialSink: Send + Sync {
    fn write(&self, path: &Path, contents: &str) -> ProvisionResult<()>;
}

/// Writes credentials to the local filesystem.
///
/// Parent directories are created as needed and existing files are replaced.
#[derive(Debug, Clone, Default)]
pub struct FsCredentialSink;

impl CredentialSink for FsCredentialSink {
    fn write(&self, path: &Path, contents: &str) -> ProvisionResult<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;

        tracing::info!(path = %path.display(), bytes = contents.len(), "Wrote credentials");
        Ok(())
    }
}
