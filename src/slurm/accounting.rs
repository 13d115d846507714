//! Accounting query parsing and the cached job catalog.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::cache::JobCache;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::resolve::{HostResolver, FALLBACK_IP};
use crate::slurm::client::SchedulerClient;
use crate::slurm::types::{BatchStep, Job, JobState};

/// Number of pipe-delimited columns a row must carry to be considered.
const ROW_FIELDS: usize = 12;

/// Parse a GPU count out of scheduler GRES shorthand such as
/// `gres/gpu:2` or `gpu:4`.
pub fn parse_gpu_count(gres: &str) -> u32 {
    let Some(idx) = gres.find("gpu:") else {
        return 0;
    };
    let digits: String = gres[idx + 4..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

/// Normalize unit-suffixed memory shorthand (`16G`, `4096M`) to plain GB.
pub fn parse_memory_gb(mem: &str) -> f64 {
    let mem = mem.trim();
    if mem.is_empty() || mem == "N/A" {
        return 0.0;
    }
    let numeric: String = mem
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let value: f64 = numeric.parse().unwrap_or(0.0);
    if mem.contains('M') {
        value / 1024.0
    } else {
        value
    }
}

/// A step row carries the parent id plus a dotted suffix (`24.batch`,
/// `24.extern`, `24.0`). Steps are merged into the preceding top-level row.
fn is_step_row(job_id: &str) -> bool {
    job_id.contains('.')
}

/// Parse the pipe-delimited accounting listing into top-level jobs.
///
/// Step rows become `batch_step` detail on the preceding job, never
/// standalone entries. Node IPs, download links, and recovered owners are
/// filled in by [`JobCatalog::list`].
pub fn parse_accounting(output: &str) -> Vec<Job> {
    let mut jobs: Vec<Job> = Vec::new();

    for line in output.lines().skip(1) {
        let fields: Vec<&str> = line.split('|').map(str::trim).collect();
        if fields.len() < ROW_FIELDS {
            continue;
        }

        if !is_step_row(fields[0]) {
            let node = if fields[11].is_empty() {
                None
            } else {
                Some(fields[11].to_string())
            };
            jobs.push(Job {
                job_id: fields[0].to_string(),
                job_name: fields[1].to_string(),
                start: fields[2].to_string(),
                end: fields[3].to_string(),
                partition: fields[4].to_string(),
                cpu_request: fields[5].parse().unwrap_or(0),
                gpu_request: parse_gpu_count(fields[6]),
                memory_request: parse_memory_gb(fields[7]),
                state: JobState::parse(fields[8]),
                exit_code: fields[9].to_string(),
                owner: if fields[10].is_empty() {
                    None
                } else {
                    Some(fields[10].to_string())
                },
                node,
                node_ip: String::new(),
                download_link: String::new(),
                batch_step: None,
            });
        } else if let Some(parent) = jobs.last_mut() {
            parent.batch_step = Some(BatchStep {
                job_id: fields[0].to_string(),
                job_name: fields[1].to_string(),
                start: fields[2].to_string(),
                end: fields[3].to_string(),
                state: JobState::parse(fields[8]),
                exit_code: fields[9].to_string(),
                node: if fields[11].is_empty() {
                    None
                } else {
                    Some(fields[11].to_string())
                },
            });
        }
    }

    jobs
}

/// A job's node with its resolved address.
#[derive(Debug, Clone, Serialize)]
pub struct JobNode {
    pub node: String,
    pub ip: String,
}

/// Read-through accessor for the accounting state.
///
/// Listing goes through the injected [`JobCache`]; the submission pipeline
/// invalidates it so a freshly accepted job appears before the scheduler
/// reports it running. Concurrent misses may each re-run the query; there
/// is no single-flight de-duplication.
pub struct JobCatalog {
    scheduler: Arc<dyn SchedulerClient>,
    cache: Arc<dyn JobCache>,
    resolver: Arc<dyn HostResolver>,
    ttl: Duration,
    public_url: Option<String>,
    download_port: u16,
}

impl JobCatalog {
    pub fn new(
        scheduler: Arc<dyn SchedulerClient>,
        cache: Arc<dyn JobCache>,
        resolver: Arc<dyn HostResolver>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            scheduler,
            cache,
            resolver,
            ttl: config.cache_ttl,
            public_url: config.public_url.clone(),
            download_port: config.download_port,
        }
    }

    fn download_link(&self, job_id: &str, node_ip: &str) -> String {
        match &self.public_url {
            Some(base) => format!("{base}/jobs/download/{node_ip}/{job_id}.zip"),
            None => format!("http://{node_ip}:{}/download/{job_id}.zip", self.download_port),
        }
    }

    /// Full job listing, cache-served.
    pub async fn list(&self) -> Result<Vec<Job>> {
        if let Some(jobs) = self.cache.get().await {
            return Ok(jobs);
        }

        let output = self.scheduler.list_jobs().await?;
        let mut jobs = parse_accounting(&output);

        for job in &mut jobs {
            job.node_ip = match &job.node {
                Some(node) => self.resolver.resolve(node).await,
                None => FALLBACK_IP.to_string(),
            };
            job.download_link = self.download_link(&job.job_id, &job.node_ip);

            // The comment annotation is only worth a per-job query while the
            // job is running; terminal jobs keep whatever the listing showed.
            if job.state == JobState::Running {
                match self.scheduler.job_comment(&job.job_id).await {
                    Ok(Some(owner)) => job.owner = Some(owner),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(job_id = %job.job_id, error = %e, "Failed to fetch owner annotation");
                    }
                }
            }
        }

        self.cache.put(jobs.clone(), self.ttl).await;
        Ok(jobs)
    }

    /// Drop the cached listing. Called by the submission pipeline after the
    /// scheduler accepts a job.
    pub async fn invalidate(&self) {
        self.cache.invalidate().await;
    }

    /// Next free numeric job id: max observed + 1, or 1 when none exist.
    pub async fn next_job_id(&self) -> Result<u64> {
        let output = self.scheduler.list_job_ids().await?;
        let max = output
            .lines()
            .skip(1)
            .filter_map(|line| line.split('|').next())
            .filter_map(|id| id.trim().parse::<u64>().ok())
            .max();
        Ok(max.map_or(1, |m| m + 1))
    }

    /// Current state of a single job.
    pub async fn job_state(&self, job_id: &str) -> Result<JobState> {
        let output = self.scheduler.job_state(job_id).await?;
        let first = output.lines().map(str::trim).find(|line| !line.is_empty());
        match first {
            Some(state) => Ok(JobState::parse(state)),
            None => Err(GatewayError::NotFound(format!("job {job_id} not found"))),
        }
    }

    /// Unique nodes a job ran on, with resolved addresses.
    pub async fn job_nodes(&self, job_id: &str) -> Result<Vec<JobNode>> {
        let output = self.scheduler.job_nodes(job_id).await?;
        let mut names: Vec<String> = Vec::new();
        for line in output.lines() {
            let name = line.trim();
            if !name.is_empty() && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }

        let mut nodes = Vec::with_capacity(names.len());
        for name in names {
            let ip = self.resolver.resolve(&name).await;
            nodes.push(JobNode { node: name, ip });
        }
        Ok(nodes)
    }
}
