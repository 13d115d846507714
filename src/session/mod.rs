//! Interactive notebook sessions: permissions, port allocation, lifecycle.
//!
//! A session is a short-lived process bound to a specific worker and port,
//! launched through the worker-side agent and proxied by the gateway. The
//! broker enforces one running session per (owner, worker) and unique ports
//! among live sessions on the same worker.

pub mod broker;
pub mod store;
pub mod types;

pub use broker::SessionBroker;
pub use store::{MemoryPermissionStore, MemorySessionStore, PermissionStore, SessionStore};
pub use types::{PermissionGrant, Session, SessionState};
