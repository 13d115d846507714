//! Job submission pipeline: validate, stage, locate entry point, submit.
//!
//! Every failure along the pipeline is terminal and carries the underlying
//! tool's diagnostic; nothing is retried automatically.

pub mod entrypoint;
pub mod staging;

pub use entrypoint::{find_entry_point, EntryPoint};
pub use staging::{SourceStager, Stager};

use std::sync::Arc;

use serde::Deserialize;

use crate::cache::JobCache;
use crate::error::{GatewayError, Result};
use crate::slurm::client::{SchedulerClient, SubmitOptions};

/// Raw submission request body. All fields optional at the wire level so a
/// missing field yields a validation error rather than a decode failure.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmitJobRequest {
    pub job_id: Option<String>,
    pub job_name: Option<String>,
    /// Version-control URL or archive location.
    pub source_ref: Option<String>,
    pub owner_name: Option<String>,
    pub cpu: Option<u32>,
    pub gpu: Option<u32>,
    pub memory: Option<u32>,
    pub owner_email: Option<String>,
}

/// A validated submission.
#[derive(Debug, Clone)]
pub struct SubmitSpec {
    pub job_id: String,
    pub job_name: String,
    pub source_ref: String,
    pub owner_name: String,
    pub cpu: u32,
    pub gpu: u32,
    pub memory_gb: u32,
    pub owner_email: String,
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(GatewayError::Validation(format!(
            "missing required field: {field}"
        ))),
    }
}

impl SubmitJobRequest {
    pub fn validate(self) -> Result<SubmitSpec> {
        let job_id = required(self.job_id, "jobId")?;
        let job_name = required(self.job_name, "jobName")?;
        let source_ref = required(self.source_ref, "sourceRef")?;
        let owner_name = required(self.owner_name, "ownerName")?;
        let owner_email = required(self.owner_email, "ownerEmail")?;

        let cpu = match self.cpu {
            Some(n) if n > 0 => n,
            _ => {
                return Err(GatewayError::Validation(
                    "missing required field: cpu".to_string(),
                ))
            }
        };
        let memory_gb = match self.memory {
            Some(n) if n > 0 => n,
            _ => {
                return Err(GatewayError::Validation(
                    "missing required field: memory".to_string(),
                ))
            }
        };

        Ok(SubmitSpec {
            job_id,
            job_name,
            source_ref,
            owner_name,
            cpu,
            gpu: self.gpu.unwrap_or(0),
            memory_gb,
            owner_email,
        })
    }
}

/// Orchestrates a submission end to end and invalidates the job cache on
/// acceptance so the new job appears in the next listing.
pub struct SubmitPipeline {
    scheduler: Arc<dyn SchedulerClient>,
    cache: Arc<dyn JobCache>,
    stager: Arc<dyn SourceStager>,
}

impl SubmitPipeline {
    pub fn new(
        scheduler: Arc<dyn SchedulerClient>,
        cache: Arc<dyn JobCache>,
        stager: Arc<dyn SourceStager>,
    ) -> Self {
        Self {
            scheduler,
            cache,
            stager,
        }
    }

    /// Run the pipeline. Returns the scheduler-issued job id.
    pub async fn submit(&self, request: SubmitJobRequest) -> Result<String> {
        let spec = request.validate()?;

        tracing::info!(
            job_id = %spec.job_id,
            job_name = %spec.job_name,
            source_ref = %spec.source_ref,
            "Staging job source"
        );
        let job_dir = self.stager.stage(&spec.job_id, &spec.source_ref).await?;

        let entry = find_entry_point(&job_dir)?;
        tracing::info!(script = %entry.script, dir = %entry.dir.display(), "Entry point located");

        let opts = SubmitOptions {
            job_name: spec.job_name.clone(),
            owner: spec.owner_name.clone(),
            cpus: spec.cpu,
            gpus: spec.gpu,
            memory_gb: spec.memory_gb,
            mail_user: spec.owner_email.clone(),
        };
        let scheduler_id = self
            .scheduler
            .submit(&entry.dir, &entry.script, &opts)
            .await?;

        // Invalidate so the accepted job shows up before the scheduler
        // reports it running.
        self.cache.invalidate().await;

        tracing::info!(
            job_id = %scheduler_id,
            job_name = %spec.job_name,
            owner = %spec.owner_name,
            "Job accepted by scheduler"
        );
        Ok(scheduler_id)
    }
}
