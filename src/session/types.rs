use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Session lifecycle. ERROR is reachable only from STARTING (worker launch
/// failure); a user-initiated stop always reaches STOPPED locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Starting,
    Running,
    Stopped,
    Error,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Starting => write!(f, "starting"),
            SessionState::Running => write!(f, "running"),
            SessionState::Stopped => write!(f, "stopped"),
            SessionState::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub owner: String,
    pub worker_ip: String,
    /// Drawn from the fixed per-worker reserved range.
    pub port: u16,
    /// Opaque bearer token handed to the worker process.
    pub token: String,
    pub state: SessionState,
    /// Worker-reported process id, present once running.
    pub pid: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    /// Gateway-relative proxy URL for reaching the session.
    pub url: String,
}

impl Session {
    pub fn new(owner: &str, worker_ip: &str, port: u16, token: String) -> Self {
        let url = format!("/notebook/proxy/{worker_ip}/{port}/?token={token}");
        Self {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            worker_ip: worker_ip.to_string(),
            port,
            token,
            state: SessionState::Starting,
            pid: None,
            created_at: Utc::now(),
            stopped_at: None,
            url,
        }
    }

    /// Live sessions hold their port; stopped and errored ones release it.
    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Starting | SessionState::Running)
    }
}

/// Resolution of a principal's interactive-session access.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGrant {
    pub allowed: bool,
    pub workers: Vec<String>,
}

impl PermissionGrant {
    pub fn denied() -> Self {
        Self {
            allowed: false,
            workers: Vec::new(),
        }
    }
}
