//! Source staging: fetch a job's bundle into its per-job directory.
//!
//! Archive references are downloaded and extracted; repository references
//! are cloned. Every external tool runs under a hard wall-clock timeout so
//! a hung transfer cannot block a request indefinitely. On failure the
//! request fails terminally and partial files may remain for operator
//! cleanup.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};

/// Seam for fetching a job's source bundle. The production implementation
/// shells out to transfer tools; tests substitute a local double.
#[async_trait]
pub trait SourceStager: Send + Sync {
    /// Stage `source_ref` into the per-job directory and return it.
    async fn stage(&self, job_id: &str, source_ref: &str) -> Result<PathBuf>;
}

pub struct Stager {
    config: Arc<GatewayConfig>,
}

async fn run_stage_tool(
    tool: &str,
    args: &[String],
    timeout: Duration,
    stage: &str,
) -> Result<String> {
    let output_fut = Command::new(tool)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output();

    let output = match tokio::time::timeout(timeout, output_fut).await {
        Err(_) => {
            return Err(GatewayError::Transfer {
                stage: stage.to_string(),
                detail: format!("{tool} timed out after {}s", timeout.as_secs()),
            })
        }
        Ok(Err(e)) => {
            return Err(GatewayError::Transfer {
                stage: stage.to_string(),
                detail: e.to_string(),
            })
        }
        Ok(Ok(output)) => output,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let detail = if stderr.trim().is_empty() {
            String::from_utf8_lossy(&output.stdout).to_string()
        } else {
            stderr
        };
        return Err(GatewayError::Transfer {
            stage: stage.to_string(),
            detail,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn wget_args(
    url: &str,
    dest: &Path,
    ftp_user: Option<&str>,
    ftp_password: Option<&str>,
) -> Vec<String> {
    let mut args = vec!["--timeout=60".to_string()];
    if url.starts_with("ftp://") {
        if let Some(user) = ftp_user {
            args.push(format!("--ftp-user={user}"));
        }
        if let Some(password) = ftp_password {
            args.push(format!("--ftp-password={password}"));
        }
    }
    args.push(url.to_string());
    args.push("-O".to_string());
    args.push(dest.display().to_string());
    args
}

/// Strip carriage returns from CRLF pairs, leaving lone `\r` bytes alone.
fn strip_crlf(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\r' && bytes.get(i + 1) == Some(&b'\n') {
            i += 1;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

fn normalize_dir(dir: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            normalize_dir(&path)?;
        } else if path.extension().is_some_and(|ext| ext == "sh") {
            let bytes = std::fs::read(&path)?;
            if bytes.contains(&b'\r') {
                std::fs::write(&path, strip_crlf(&bytes))?;
            }
        }
    }
    Ok(())
}

/// Normalize line endings of every shell script under `root`. Tolerates
/// Windows-origin uploads; errors are logged and non-fatal.
pub fn normalize_shell_scripts(root: &Path) {
    if let Err(e) = normalize_dir(root) {
        tracing::warn!(root = %root.display(), error = %e, "Line ending normalization skipped");
    }
}

impl Stager {
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        Self { config }
    }

    async fn stage_archive(&self, url: &str, job_dir: &Path) -> Result<()> {
        let archive = self
            .config
            .jobs_dir
            .join(format!("{}.zip", Uuid::new_v4()));
        let args = wget_args(
            url,
            &archive,
            self.config.ftp_user.as_deref(),
            self.config.ftp_password.as_deref(),
        );

        tracing::info!(url, "Downloading archive");
        if let Err(e) = run_stage_tool("wget", &args, self.config.download_timeout, "download").await
        {
            let _ = tokio::fs::remove_file(&archive).await;
            return Err(e);
        }

        tokio::fs::create_dir_all(job_dir).await?;
        let unzip_args = vec![
            "-o".to_string(),
            "-q".to_string(),
            archive.display().to_string(),
            "-d".to_string(),
            job_dir.display().to_string(),
        ];
        let extracted =
            run_stage_tool("unzip", &unzip_args, self.config.extract_timeout, "extract").await;
        let _ = tokio::fs::remove_file(&archive).await;
        extracted?;
        Ok(())
    }

    async fn stage_repository(&self, url: &str, job_dir: &Path) -> Result<()> {
        tracing::info!(url, "Cloning repository");
        let args = vec![
            "clone".to_string(),
            url.to_string(),
            job_dir.display().to_string(),
        ];
        run_stage_tool("git", &args, self.config.clone_timeout, "clone").await?;
        Ok(())
    }
}

#[async_trait]
impl SourceStager for Stager {
    async fn stage(&self, job_id: &str, source_ref: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.config.jobs_dir).await?;
        let job_dir = self.config.jobs_dir.join(job_id);

        if source_ref.ends_with(".zip") {
            self.stage_archive(source_ref, &job_dir).await?;
        } else {
            self.stage_repository(source_ref, &job_dir).await?;
        }

        normalize_shell_scripts(&job_dir);
        Ok(job_dir)
    }
}
