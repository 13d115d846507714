#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use slurm_gateway::error::{GatewayError, Result};
use slurm_gateway::health::HealthReport;
use slurm_gateway::resolve::HostResolver;
use slurm_gateway::slurm::{SchedulerClient, SubmitOptions};
use slurm_gateway::submit::SourceStager;
use slurm_gateway::worker::{ResourceSnapshot, WorkerAgent};

pub const SAMPLE_SACCT: &str = "\
JobID|JobName|Start|End|Partition|AllocCPUS|AllocTRES|ReqMem|State|ExitCode|Comment|NodeList|
24|train|2024-05-01T10:00:00|Unknown|gpu|4|cpu=4,gres/gpu:2|16G|RUNNING|0:0||node01|
24.batch|batch|2024-05-01T10:00:00|Unknown|gpu|4||16G|RUNNING|0:0||node01|
25|etl|2024-05-01T08:00:00|2024-05-01T09:00:00|cpu|2||4096M|COMPLETED|0:0|bob|node02|
";

pub const SAMPLE_NODES: &str = "\
NodeName=node01 CPUAlloc=4 CPUTot=16 CPULoad=3.52
   Gres=gpu:tesla:2 RealMemory=64000 AllocMem=16000 FreeMem=42000
   State=MIXED Partitions=gpu,batch

NodeName=node02 CPUAlloc=0 CPUTot=notanumber CPULoad=0.01
   RealMemory=32000 AllocMem=0 FreeMem=31000
   State=IDLE Partitions=batch
";

/// Canned scheduler responses with call counters.
pub struct MockScheduler {
    pub sacct: Mutex<String>,
    pub job_ids: Mutex<String>,
    pub comments: HashMap<String, String>,
    pub nodes_dump: String,
    pub job_nodes_output: String,
    pub state_output: String,
    pub submit_result_id: String,
    pub list_calls: AtomicUsize,
    pub comment_calls: AtomicUsize,
    pub cancelled: Mutex<Vec<String>>,
    pub submitted: Mutex<Vec<String>>,
}

impl Default for MockScheduler {
    fn default() -> Self {
        Self {
            sacct: Mutex::new(SAMPLE_SACCT.to_string()),
            job_ids: Mutex::new("JobID|\n24|\n24.batch|\n25|\n".to_string()),
            comments: HashMap::new(),
            nodes_dump: SAMPLE_NODES.to_string(),
            job_nodes_output: "node01\nnode01\nnode02\n".to_string(),
            state_output: "RUNNING\n".to_string(),
            submit_result_id: "26".to_string(),
            list_calls: AtomicUsize::new(0),
            comment_calls: AtomicUsize::new(0),
            cancelled: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
        }
    }
}

impl MockScheduler {
    pub fn with_comment(mut self, job_id: &str, owner: &str) -> Self {
        self.comments.insert(job_id.to_string(), owner.to_string());
        self
    }

    pub fn set_sacct(&self, output: &str) {
        *self.sacct.lock().unwrap() = output.to_string();
    }

    pub fn set_job_ids(&self, output: &str) {
        *self.job_ids.lock().unwrap() = output.to_string();
    }
}

#[async_trait]
impl SchedulerClient for MockScheduler {
    async fn list_jobs(&self) -> Result<String> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.sacct.lock().unwrap().clone())
    }

    async fn list_job_ids(&self) -> Result<String> {
        Ok(self.job_ids.lock().unwrap().clone())
    }

    async fn job_state(&self, _job_id: &str) -> Result<String> {
        Ok(self.state_output.clone())
    }

    async fn job_comment(&self, job_id: &str) -> Result<Option<String>> {
        self.comment_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.comments.get(job_id).cloned())
    }

    async fn job_nodes(&self, _job_id: &str) -> Result<String> {
        Ok(self.job_nodes_output.clone())
    }

    async fn show_nodes(&self) -> Result<String> {
        Ok(self.nodes_dump.clone())
    }

    async fn submit(&self, _work_dir: &Path, _script: &str, opts: &SubmitOptions) -> Result<String> {
        self.submitted.lock().unwrap().push(opts.job_name.clone());
        Ok(self.submit_result_id.clone())
    }

    async fn cancel(&self, job_id: &str) -> Result<()> {
        self.cancelled.lock().unwrap().push(job_id.to_string());
        Ok(())
    }
}

/// Resolver with a fixed host table and loopback fallback.
#[derive(Default)]
pub struct StaticResolver {
    pub hosts: HashMap<String, String>,
}

impl StaticResolver {
    pub fn with_host(mut self, host: &str, ip: &str) -> Self {
        self.hosts.insert(host.to_string(), ip.to_string());
        self
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, host: &str) -> String {
        self.hosts
            .get(host)
            .cloned()
            .unwrap_or_else(|| "127.0.0.1".to_string())
    }
}

/// Worker agent double with failure switches.
pub struct MockAgent {
    pub fail_start: AtomicBool,
    pub fail_stop: AtomicBool,
    pub fail_health: AtomicBool,
    pub start_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub pid: u32,
}

impl Default for MockAgent {
    fn default() -> Self {
        Self {
            fail_start: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            fail_health: AtomicBool::new(false),
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            pid: 4242,
        }
    }
}

#[async_trait]
impl WorkerAgent for MockAgent {
    async fn start_notebook(
        &self,
        _worker_ip: &str,
        _port: u16,
        _token: &str,
        _user: &str,
    ) -> Result<u32> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(GatewayError::Worker("launch failed".to_string()));
        }
        Ok(self.pid)
    }

    async fn stop_notebook(&self, _worker_ip: &str, _port: u16, _pid: Option<u32>) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(GatewayError::Worker("worker unreachable".to_string()));
        }
        Ok(())
    }

    async fn resources(&self, _worker_ip: &str) -> Result<ResourceSnapshot> {
        Ok(ResourceSnapshot {
            cpu: 12.5,
            memory: 40.0,
            gpu: 5.0,
        })
    }

    async fn health(&self, worker_ip: &str) -> Result<HealthReport> {
        if self.fail_health.load(Ordering::SeqCst) {
            return Err(GatewayError::Worker(format!(
                "could not connect to worker {worker_ip}"
            )));
        }
        Ok(HealthReport {
            status: "active".to_string(),
            ip_address: worker_ip.to_string(),
            cpu_count: 16,
            gpu_count: 2,
            total_memory_gb: 62.5,
        })
    }
}

/// Stager double that materializes a staged directory locally.
pub struct MockStager {
    pub root: tempfile::TempDir,
    /// Script file to create in the staged directory; `None` stages an
    /// empty directory.
    pub script: Option<&'static str>,
    pub stage_calls: AtomicUsize,
}

impl Default for MockStager {
    fn default() -> Self {
        Self {
            root: tempfile::tempdir().expect("temp dir"),
            script: Some("run.sh"),
            stage_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SourceStager for MockStager {
    async fn stage(&self, job_id: &str, _source_ref: &str) -> Result<std::path::PathBuf> {
        self.stage_calls.fetch_add(1, Ordering::SeqCst);
        let dir = self.root.path().join(job_id);
        std::fs::create_dir_all(&dir)?;
        if let Some(name) = self.script {
            std::fs::write(dir.join(name), "#!/bin/sh\necho ok\n")?;
        }
        Ok(dir)
    }
}
