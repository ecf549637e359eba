//! Tasks: export the admin credentials and write them out.

use super::{log_task_error, task_start};
use crate::pipeline::PipelineTask;
use crate::provision::ProvisionCtx;
use crate::util::RunOptions;
use async_trait::async_trait;
use cloudnest_shared::errors::{ProvisionError, ProvisionResult};
use std::sync::Arc;

/// Capture `sunbeam cloud-config -a`.
///
/// A non-zero exit is fatal on the first attempt; the export is not retried.
pub struct CredentialsExportTask;

#[async_trait]
impl PipelineTask<ProvisionCtx> for CredentialsExportTask {
    async fn run(self: Box<Self>, ctx: ProvisionCtx) -> ProvisionResult<()> {
        let task_name = self.name();
        let vm = task_start(&ctx, task_name).await;

        let (runner, command, timeout) = {
            let ctx = ctx.lock().await;
            (
                Arc::clone(&ctx.runner),
                ctx.sunbeam.cloud_config(),
                ctx.options.install_timeout,
            )
        };

        let result = runner
            .run_or_fail(&command, RunOptions::default().with_timeout(timeout))
            .await
            .inspect_err(|e| log_task_error(&vm, task_name, e))?;

        if result.stdout.trim().is_empty() {
            let err = ProvisionError::InvalidInput("cloud-config export produced no output".into());
            log_task_error(&vm, task_name, &err);
            return Err(err);
        }

        let mut ctx = ctx.lock().await;
        ctx.credentials = Some(result.stdout);
        Ok(())
    }

    fn name(&self) -> &str {
        "credentials_export"
    }
}

/// Write the exported credentials to the configured path and the working-directory copy.
pub struct CredentialsWriteTask;

#[async_trait]
impl PipelineTask<ProvisionCtx> for CredentialsWriteTask {
    async fn run(self: Box<Self>, ctx: ProvisionCtx) -> ProvisionResult<()> {
        let task_name = self.name();
        let vm = task_start(&ctx, task_name).await;

        let (sink, credentials, paths) = {
            let ctx = ctx.lock().await;
            let credentials = ctx.credentials.clone().ok_or_else(|| {
                ProvisionError::Internal("credentials_export task must run first".into())
            })?;
            (
                Arc::clone(&ctx.sink),
                credentials,
                [
                    ctx.options.clouds_yaml_path.clone(),
                    ctx.options.workdir_copy.clone(),
                ],
            )
        };

        for path in &paths {
            sink.write(path, &credentials)
                .inspect_err(|e| log_task_error(&vm, task_name, e))?;
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "credentials_write"
    }
}
