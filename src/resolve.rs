//! Hostname resolution with a safe fallback.
//!
//! Node names coming out of the scheduler are cluster hostnames. One node
//! with broken DNS must never fail a whole listing, so resolution always
//! yields an address, falling back to loopback on failure.

use async_trait::async_trait;

pub const FALLBACK_IP: &str = "127.0.0.1";

#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> String;
}

pub struct DnsResolver;

#[async_trait]
impl HostResolver for DnsResolver {
    async fn resolve(&self, host: &str) -> String {
        match tokio::net::lookup_host((host, 0)).await {
            Ok(mut addrs) => addrs
                .next()
                .map(|addr| addr.ip().to_string())
                .unwrap_or_else(|| FALLBACK_IP.to_string()),
            Err(e) => {
                tracing::warn!(host, error = %e, "hostname resolution failed, using fallback");
                FALLBACK_IP.to_string()
            }
        }
    }
}
