use std::net::SocketAddr;
use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;

/// Gateway configuration.
///
/// Covers everything the request handlers need that is not per-request:
/// where staged job sources live, how long the accounting cache is valid,
/// which port range notebook sessions may claim on a worker, and the hard
/// timeouts applied to staging subprocesses.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address the public HTTP API binds to.
    pub listen_addr: SocketAddr,
    /// Public base URL used when deriving result download links.
    /// When unset, links point directly at the worker node.
    pub public_url: Option<String>,
    /// Root directory job sources are staged under (one subdirectory per job).
    pub jobs_dir: PathBuf,
    /// Lower bound passed to the accounting query (`sacct --starttime`).
    pub accounting_start: String,
    /// TTL for the cached job listing.
    pub cache_ttl: Duration,
    /// Port the worker-side agent listens on.
    pub agent_port: u16,
    /// Port workers serve completed-job archives on.
    pub download_port: u16,
    /// Reserved port range for notebook sessions, per worker.
    pub notebook_ports: Range<u16>,
    /// Wall-clock limit for downloading an archive reference.
    pub download_timeout: Duration,
    /// Wall-clock limit for extracting a downloaded archive.
    pub extract_timeout: Duration,
    /// Wall-clock limit for cloning a repository reference.
    pub clone_timeout: Duration,
    /// Credentials for fetching uploaded bundles over FTP.
    pub ftp_user: Option<String>,
    pub ftp_password: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:5050"
                .parse()
                .expect("default listen address is valid"),
            public_url: None,
            jobs_dir: PathBuf::from("jobs"),
            accounting_start: "2024-01-01".to_string(),
            cache_ttl: Duration::from_secs(3),
            agent_port: 5053,
            download_port: 5050,
            notebook_ports: 8888..8900,
            download_timeout: Duration::from_secs(120),
            extract_timeout: Duration::from_secs(60),
            clone_timeout: Duration::from_secs(120),
            ftp_user: None,
            ftp_password: None,
        }
    }
}

impl GatewayConfig {
    pub fn with_jobs_dir(mut self, dir: PathBuf) -> Self {
        self.jobs_dir = dir;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_notebook_ports(mut self, ports: Range<u16>) -> Self {
        self.notebook_ports = ports;
        self
    }
}
