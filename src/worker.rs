//! Client for the worker-side agent.
//!
//! The agent is a small HTTP service on every worker that launches and
//! terminates notebook processes and reports utilization. Calls are plain
//! JSON with tight per-call timeouts; failures surface as
//! [`GatewayError::Worker`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{GatewayError, Result};
use crate::health::HealthReport;

/// Point-in-time utilization of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub cpu: f64,
    pub memory: f64,
    pub gpu: f64,
}

#[async_trait]
pub trait WorkerAgent: Send + Sync {
    /// Launch a notebook process bound to `port` with the given bearer
    /// token. Returns the worker-reported process id.
    async fn start_notebook(&self, worker_ip: &str, port: u16, token: &str, user: &str)
        -> Result<u32>;
    /// Terminate the process; callers treat failure as best-effort.
    async fn stop_notebook(&self, worker_ip: &str, port: u16, pid: Option<u32>) -> Result<()>;
    /// Current cpu/memory/gpu utilization.
    async fn resources(&self, worker_ip: &str) -> Result<ResourceSnapshot>;
    /// Connectivity check; an unreachable or inactive worker is an error.
    async fn health(&self, worker_ip: &str) -> Result<HealthReport>;
}

#[derive(Deserialize)]
struct StartNotebookResponse {
    pid: u32,
}

pub struct HttpWorkerAgent {
    client: reqwest::Client,
    agent_port: u16,
}

const START_TIMEOUT: Duration = Duration::from_secs(30);
const STOP_TIMEOUT: Duration = Duration::from_secs(10);
const RESOURCES_TIMEOUT: Duration = Duration::from_secs(5);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

impl HttpWorkerAgent {
    pub fn new(agent_port: u16) -> Self {
        Self {
            client: reqwest::Client::new(),
            agent_port,
        }
    }

    fn url(&self, worker_ip: &str, path: &str) -> String {
        format!("http://{worker_ip}:{}/{path}", self.agent_port)
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::Worker(format!(
        "worker responded {status}: {body}"
    )))
}

#[async_trait]
impl WorkerAgent for HttpWorkerAgent {
    async fn start_notebook(
        &self,
        worker_ip: &str,
        port: u16,
        token: &str,
        user: &str,
    ) -> Result<u32> {
        let response = self
            .client
            .post(self.url(worker_ip, "notebook/start"))
            .timeout(START_TIMEOUT)
            .json(&json!({ "port": port, "token": token, "username": user }))
            .send()
            .await
            .map_err(|e| GatewayError::Worker(e.to_string()))?;
        let body: StartNotebookResponse = check(response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Worker(e.to_string()))?;
        Ok(body.pid)
    }

    async fn stop_notebook(&self, worker_ip: &str, port: u16, pid: Option<u32>) -> Result<()> {
        let response = self
            .client
            .post(self.url(worker_ip, "notebook/stop"))
            .timeout(STOP_TIMEOUT)
            .json(&json!({ "port": port, "pid": pid }))
            .send()
            .await
            .map_err(|e| GatewayError::Worker(e.to_string()))?;
        check(response).await?;
        Ok(())
    }

    async fn resources(&self, worker_ip: &str) -> Result<ResourceSnapshot> {
        let response = self
            .client
            .get(self.url(worker_ip, "notebook/resources"))
            .timeout(RESOURCES_TIMEOUT)
            .send()
            .await
            .map_err(|e| GatewayError::Worker(e.to_string()))?;
        check(response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Worker(e.to_string()))
    }

    async fn health(&self, worker_ip: &str) -> Result<HealthReport> {
        let response = self
            .client
            .get(self.url(worker_ip, "connect"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| GatewayError::Worker(e.to_string()))?;
        let report: HealthReport = check(response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Worker(e.to_string()))?;
        if !report.is_active() {
            return Err(GatewayError::Worker(format!(
                "worker {worker_ip} reported status {}",
                report.status
            )));
        }
        Ok(report)
    }
}
