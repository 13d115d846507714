//! Session and permission storage seams.
//!
//! Both stores are external collaborators in production (the relational
//! store owns the records); the in-memory implementations back tests and
//! single-node deployments. Session records are mutated only through the
//! broker.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::session::types::{PermissionGrant, Session};

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace a session by id.
    async fn put(&self, session: Session);
    async fn get(&self, id: Uuid) -> Option<Session>;
    /// The live (starting or running) session for an (owner, worker) pair.
    async fn active_for(&self, owner: &str, worker_ip: &str) -> Option<Session>;
    /// All live sessions on a worker; their ports are considered taken.
    async fn active_on_worker(&self, worker_ip: &str) -> Vec<Session>;
    async fn running_for_owner(&self, owner: &str) -> Vec<Session>;
    async fn all_running(&self) -> Vec<Session>;
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, session: Session) {
        self.sessions.write().await.insert(session.id, session);
    }

    async fn get(&self, id: Uuid) -> Option<Session> {
        self.sessions.read().await.get(&id).cloned()
    }

    async fn active_for(&self, owner: &str, worker_ip: &str) -> Option<Session> {
        self.sessions
            .read()
            .await
            .values()
            .find(|s| s.is_active() && s.owner == owner && s.worker_ip == worker_ip)
            .cloned()
    }

    async fn active_on_worker(&self, worker_ip: &str) -> Vec<Session> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_active() && s.worker_ip == worker_ip)
            .cloned()
            .collect()
    }

    async fn running_for_owner(&self, owner: &str) -> Vec<Session> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.state == crate::session::SessionState::Running && s.owner == owner)
            .cloned()
            .collect()
    }

    async fn all_running(&self) -> Vec<Session> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.state == crate::session::SessionState::Running)
            .cloned()
            .collect()
    }
}

/// Read-only permission lookups by principal and group.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn is_admin(&self, principal: &str) -> bool;
    /// Explicit per-user grant, if one exists.
    async fn user_grant(&self, principal: &str) -> Option<PermissionGrant>;
    /// Groups the principal belongs to, in membership order.
    async fn groups_of(&self, principal: &str) -> Vec<String>;
    /// Per-group grant, if one exists.
    async fn group_grant(&self, group: &str) -> Option<PermissionGrant>;
    /// Workers currently active in the cluster; admins get all of them.
    async fn active_workers(&self) -> Vec<String>;
}

#[derive(Default)]
struct PermissionData {
    admins: Vec<String>,
    user_grants: HashMap<String, PermissionGrant>,
    group_grants: HashMap<String, PermissionGrant>,
    memberships: HashMap<String, Vec<String>>,
    workers: Vec<String>,
}

#[derive(Default)]
pub struct MemoryPermissionStore {
    data: RwLock<PermissionData>,
}

impl MemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_admin(&self, principal: &str) {
        self.data.write().await.admins.push(principal.to_string());
    }

    pub async fn grant_user(&self, principal: &str, allowed: bool, workers: Vec<String>) {
        self.data
            .write()
            .await
            .user_grants
            .insert(principal.to_string(), PermissionGrant { allowed, workers });
    }

    pub async fn grant_group(&self, group: &str, allowed: bool, workers: Vec<String>) {
        self.data
            .write()
            .await
            .group_grants
            .insert(group.to_string(), PermissionGrant { allowed, workers });
    }

    pub async fn add_group_member(&self, principal: &str, group: &str) {
        self.data
            .write()
            .await
            .memberships
            .entry(principal.to_string())
            .or_default()
            .push(group.to_string());
    }

    pub async fn register_worker(&self, worker_ip: &str) {
        self.data.write().await.workers.push(worker_ip.to_string());
    }
}

#[async_trait]
impl PermissionStore for MemoryPermissionStore {
    async fn is_admin(&self, principal: &str) -> bool {
        self.data
            .read()
            .await
            .admins
            .iter()
            .any(|a| a == principal)
    }

    async fn user_grant(&self, principal: &str) -> Option<PermissionGrant> {
        self.data.read().await.user_grants.get(principal).cloned()
    }

    async fn groups_of(&self, principal: &str) -> Vec<String> {
        self.data
            .read()
            .await
            .memberships
            .get(principal)
            .cloned()
            .unwrap_or_default()
    }

    async fn group_grant(&self, group: &str) -> Option<PermissionGrant> {
        self.data.read().await.group_grants.get(group).cloned()
    }

    async fn active_workers(&self) -> Vec<String> {
        self.data.read().await.workers.clone()
    }
}
