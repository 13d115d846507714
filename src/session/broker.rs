//! Session lifecycle broker.

use std::ops::Range;
use std::sync::Arc;

use chrono::Utc;
use rand::RngCore;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{GatewayError, Result};
use crate::health::HealthReport;
use crate::session::store::{PermissionStore, SessionStore};
use crate::session::types::{PermissionGrant, Session, SessionState};
use crate::worker::{ResourceSnapshot, WorkerAgent};

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub struct SessionBroker {
    sessions: Arc<dyn SessionStore>,
    permissions: Arc<dyn PermissionStore>,
    agent: Arc<dyn WorkerAgent>,
    port_range: Range<u16>,
    /// Serializes the check-then-allocate sequence so two concurrent starts
    /// cannot claim the same port.
    alloc_lock: Mutex<()>,
}

impl SessionBroker {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        permissions: Arc<dyn PermissionStore>,
        agent: Arc<dyn WorkerAgent>,
        port_range: Range<u16>,
    ) -> Self {
        Self {
            sessions,
            permissions,
            agent,
            port_range,
            alloc_lock: Mutex::new(()),
        }
    }

    /// Resolve a principal's access: admins implicitly get every active
    /// worker; otherwise the explicit user grant wins, then the first
    /// allowing group grant across the principal's groups. No grant means
    /// no access.
    pub async fn check_permission(&self, principal: &str) -> PermissionGrant {
        if self.permissions.is_admin(principal).await {
            return PermissionGrant {
                allowed: true,
                workers: self.permissions.active_workers().await,
            };
        }

        if let Some(grant) = self.permissions.user_grant(principal).await {
            if grant.allowed {
                return grant;
            }
        }

        for group in self.permissions.groups_of(principal).await {
            if let Some(grant) = self.permissions.group_grant(&group).await {
                if grant.allowed {
                    return grant;
                }
            }
        }

        PermissionGrant::denied()
    }

    /// Start (or return the already-live) session for (principal, worker).
    pub async fn start(&self, principal: &str, worker_ip: &str) -> Result<Session> {
        let grant = self.check_permission(principal).await;
        if !grant.allowed {
            return Err(GatewayError::Permission(
                "interactive sessions are not permitted for this user".to_string(),
            ));
        }
        if !grant.workers.iter().any(|w| w == worker_ip) {
            return Err(GatewayError::Permission(
                "access to this worker is not permitted".to_string(),
            ));
        }

        // Allocation is atomic with respect to other starts: existing-session
        // check, port selection, and the STARTING insert happen under one
        // lock. The worker launch itself runs outside it.
        let mut session = {
            let _guard = self.alloc_lock.lock().await;

            if let Some(existing) = self.sessions.active_for(principal, worker_ip).await {
                tracing::info!(
                    session_id = %existing.id,
                    principal,
                    worker_ip,
                    "Session already live, returning it"
                );
                return Ok(existing);
            }

            let used: Vec<u16> = self
                .sessions
                .active_on_worker(worker_ip)
                .await
                .iter()
                .map(|s| s.port)
                .collect();
            let port = self
                .port_range
                .clone()
                .find(|p| !used.contains(p))
                .ok_or_else(|| {
                    GatewayError::Capacity(format!("no free notebook port on worker {worker_ip}"))
                })?;

            let session = Session::new(principal, worker_ip, port, generate_token());
            self.sessions.put(session.clone()).await;
            session
        };

        match self
            .agent
            .start_notebook(worker_ip, session.port, &session.token, principal)
            .await
        {
            Ok(pid) => {
                session.state = SessionState::Running;
                session.pid = Some(pid);
                self.sessions.put(session.clone()).await;
                tracing::info!(
                    session_id = %session.id,
                    principal,
                    worker_ip,
                    port = session.port,
                    pid,
                    "Session running"
                );
                Ok(session)
            }
            Err(e) => {
                session.state = SessionState::Error;
                self.sessions.put(session.clone()).await;
                tracing::error!(
                    session_id = %session.id,
                    principal,
                    worker_ip,
                    error = %e,
                    "Worker failed to launch session"
                );
                Err(e)
            }
        }
    }

    /// Stop a session the principal owns. The worker-side stop is
    /// best-effort; the local transition to STOPPED is unconditional.
    pub async fn stop(&self, principal: &str, session_id: Uuid) -> Result<Session> {
        let mut session = self
            .sessions
            .get(session_id)
            .await
            .filter(|s| s.owner == principal)
            .ok_or_else(|| GatewayError::NotFound(format!("session {session_id} not found")))?;

        if let Err(e) = self
            .agent
            .stop_notebook(&session.worker_ip, session.port, session.pid)
            .await
        {
            tracing::warn!(
                session_id = %session.id,
                worker_ip = %session.worker_ip,
                error = %e,
                "Worker-side stop failed, recording session as stopped anyway"
            );
        }

        session.state = SessionState::Stopped;
        session.stopped_at = Some(Utc::now());
        self.sessions.put(session.clone()).await;
        tracing::info!(session_id = %session.id, principal, "Session stopped");
        Ok(session)
    }

    /// Point-in-time utilization snapshot of a worker, uncached.
    pub async fn resources(&self, worker_ip: &str) -> Result<ResourceSnapshot> {
        self.agent.resources(worker_ip).await
    }

    /// Connectivity check against a worker's agent.
    pub async fn worker_health(&self, worker_ip: &str) -> Result<HealthReport> {
        self.agent.health(worker_ip).await
    }

    pub async fn sessions_for(&self, principal: &str) -> Vec<Session> {
        self.sessions.running_for_owner(principal).await
    }

    pub async fn all_sessions(&self) -> Vec<Session> {
        self.sessions.all_running().await
    }
}
