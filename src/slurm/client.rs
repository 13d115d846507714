use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{GatewayError, Result};

/// Accounting columns queried for the job listing, in parse order.
pub const SACCT_FORMAT: &str =
    "JobID,JobName,Start,End,Partition,AllocCPUS,AllocTRES,ReqMem,State,ExitCode,Comment,NodeList";

/// Resource flags for a job submission, mapped one-to-one onto sbatch.
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    pub job_name: String,
    /// Owner identity, attached as the comment annotation. This is the only
    /// channel through which a later query can recover who owns the job.
    pub owner: String,
    pub cpus: u32,
    pub gpus: u32,
    pub memory_gb: u32,
    pub mail_user: String,
}

/// Interface to the batch scheduler.
///
/// Backed by blocking CLI invocations in production; mockable in tests and
/// replaceable by a native scheduler API without touching callers.
#[async_trait]
pub trait SchedulerClient: Send + Sync {
    /// Full accounting listing, pipe-delimited.
    async fn list_jobs(&self) -> Result<String>;
    /// Accounting listing restricted to the JobID column.
    async fn list_job_ids(&self) -> Result<String>;
    /// State column for a single job, no header.
    async fn job_state(&self, job_id: &str) -> Result<String>;
    /// Owner annotation for a single job, if present.
    async fn job_comment(&self, job_id: &str) -> Result<Option<String>>;
    /// NodeList column for a single job, no header.
    async fn job_nodes(&self, job_id: &str) -> Result<String>;
    /// Node-description dump for all nodes.
    async fn show_nodes(&self) -> Result<String>;
    /// Submit the entry-point script from its directory. Returns the
    /// scheduler-issued job id.
    async fn submit(&self, work_dir: &Path, script: &str, opts: &SubmitOptions) -> Result<String>;
    /// Cancel a job.
    async fn cancel(&self, job_id: &str) -> Result<()>;
}

/// [`SchedulerClient`] backed by the Slurm command-line tools.
pub struct SlurmCli {
    accounting_start: String,
}

impl SlurmCli {
    pub fn new(accounting_start: impl Into<String>) -> Self {
        Self {
            accounting_start: accounting_start.into(),
        }
    }
}

async fn run_tool(tool: &str, args: &[String], cwd: Option<&Path>) -> Result<String> {
    let mut cmd = Command::new(tool);
    cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd.output().await.map_err(|e| GatewayError::UpstreamTool {
        tool: tool.to_string(),
        detail: e.to_string(),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let detail = if stderr.trim().is_empty() {
            String::from_utf8_lossy(&output.stdout).to_string()
        } else {
            stderr
        };
        return Err(GatewayError::UpstreamTool {
            tool: tool.to_string(),
            detail,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Build the sbatch argument list. Resource flags map one-to-one; the GPU
/// flag is emitted only for a non-zero count.
pub fn submit_args(opts: &SubmitOptions, script: &str) -> Vec<String> {
    let mut args = vec![
        "--job-name".to_string(),
        opts.job_name.clone(),
        format!("--comment={}", opts.owner),
        "--cpus-per-task".to_string(),
        opts.cpus.to_string(),
        "--mem".to_string(),
        format!("{}G", opts.memory_gb),
        "--mail-user".to_string(),
        opts.mail_user.clone(),
        "--mail-type".to_string(),
        "BEGIN,END,FAIL".to_string(),
    ];
    if opts.gpus > 0 {
        args.push("--gpus".to_string());
        args.push(opts.gpus.to_string());
    }
    args.push(script.to_string());
    args
}

/// Extract the scheduler-issued id from "Submitted batch job <id>".
pub fn parse_sbatch_job_id(stdout: &str) -> Option<String> {
    stdout
        .split_whitespace()
        .rev()
        .find(|tok| !tok.is_empty() && tok.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

/// Extract the owner annotation from `scontrol show job` output.
///
/// The comment is an inherently fragile identity channel; keep all knowledge
/// of its format here so it can be hardened independently.
pub fn parse_owner_annotation(scontrol_output: &str) -> Option<String> {
    let line = scontrol_output
        .lines()
        .find(|line| line.trim().starts_with("Comment="))?;
    let comment = line.trim().strip_prefix("Comment=")?.trim();
    if comment.is_empty() || comment == "(null)" {
        None
    } else {
        Some(comment.to_string())
    }
}

#[async_trait]
impl SchedulerClient for SlurmCli {
    async fn list_jobs(&self) -> Result<String> {
        let args = vec![
            format!("--starttime={}", self.accounting_start),
            format!("--format={SACCT_FORMAT}"),
            "-p".to_string(),
        ];
        run_tool("sacct", &args, None).await
    }

    async fn list_job_ids(&self) -> Result<String> {
        let args = vec![
            format!("--starttime={}", self.accounting_start),
            "--format=JobID".to_string(),
            "-p".to_string(),
        ];
        run_tool("sacct", &args, None).await
    }

    async fn job_state(&self, job_id: &str) -> Result<String> {
        let args = vec![
            "-j".to_string(),
            job_id.to_string(),
            "--format=State".to_string(),
            "--noheader".to_string(),
        ];
        run_tool("sacct", &args, None).await
    }

    async fn job_comment(&self, job_id: &str) -> Result<Option<String>> {
        let args = vec!["show".to_string(), "job".to_string(), job_id.to_string()];
        let output = run_tool("scontrol", &args, None).await?;
        Ok(parse_owner_annotation(&output))
    }

    async fn job_nodes(&self, job_id: &str) -> Result<String> {
        let args = vec![
            "-j".to_string(),
            job_id.to_string(),
            "--format=NodeList".to_string(),
            "--noheader".to_string(),
        ];
        run_tool("sacct", &args, None).await
    }

    async fn show_nodes(&self) -> Result<String> {
        let args = vec!["show".to_string(), "nodes".to_string()];
        run_tool("scontrol", &args, None).await
    }

    async fn submit(&self, work_dir: &Path, script: &str, opts: &SubmitOptions) -> Result<String> {
        let args = submit_args(opts, script);
        tracing::info!(
            job_name = %opts.job_name,
            owner = %opts.owner,
            script,
            "Submitting job via sbatch"
        );
        let stdout = run_tool("sbatch", &args, Some(work_dir)).await?;
        parse_sbatch_job_id(&stdout).ok_or_else(|| GatewayError::UpstreamTool {
            tool: "sbatch".to_string(),
            detail: format!("unexpected sbatch output: {}", stdout.trim()),
        })
    }

    async fn cancel(&self, job_id: &str) -> Result<()> {
        let args = vec![job_id.to_string()];
        run_tool("scancel", &args, None).await?;
        tracing::info!(job_id, "Job cancelled");
        Ok(())
    }
}
