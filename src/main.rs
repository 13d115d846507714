use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use slurm_gateway::api::{self, AppState};
use slurm_gateway::cache::{JobCache, MemoryJobCache};
use slurm_gateway::config::GatewayConfig;
use slurm_gateway::resolve::{DnsResolver, HostResolver};
use slurm_gateway::session::{
    MemoryPermissionStore, MemorySessionStore, PermissionStore, SessionBroker, SessionStore,
};
use slurm_gateway::shutdown::install_shutdown_handler;
use slurm_gateway::slurm::{JobCatalog, NodeRegistry, SchedulerClient, SlurmCli};
use slurm_gateway::submit::{Stager, SubmitPipeline};
use slurm_gateway::worker::{HttpWorkerAgent, WorkerAgent};

#[derive(Parser, Debug)]
#[command(name = "slurm-gateway")]
#[command(version)]
#[command(about = "HTTP gateway bridging a web front end to a Slurm cluster")]
struct Args {
    /// Address the HTTP API binds to
    #[arg(long, default_value = "0.0.0.0:5050")]
    listen: SocketAddr,

    /// Directory job sources are staged under
    #[arg(long, default_value = "jobs")]
    jobs_dir: PathBuf,

    /// Public base URL for derived download links
    #[arg(long)]
    public_url: Option<String>,

    /// TTL for the cached job listing, in seconds
    #[arg(long, default_value_t = 3)]
    cache_ttl_secs: u64,

    /// Port the worker-side agent listens on
    #[arg(long, default_value_t = 5053)]
    agent_port: u16,

    /// Port workers serve completed-job archives on
    #[arg(long, default_value_t = 5050)]
    download_port: u16,

    /// Lower bound for the accounting query window
    #[arg(long, default_value = "2024-01-01")]
    accounting_start: String,

    /// FTP credentials for fetching uploaded bundles
    #[arg(long, env = "FTP_USER")]
    ftp_user: Option<String>,
    #[arg(long, env = "FTP_PASSWORD")]
    ftp_password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = Arc::new(GatewayConfig {
        listen_addr: args.listen,
        public_url: args.public_url,
        jobs_dir: args.jobs_dir,
        accounting_start: args.accounting_start.clone(),
        cache_ttl: Duration::from_secs(args.cache_ttl_secs),
        agent_port: args.agent_port,
        download_port: args.download_port,
        ftp_user: args.ftp_user,
        ftp_password: args.ftp_password,
        ..GatewayConfig::default()
    });

    let scheduler: Arc<dyn SchedulerClient> = Arc::new(SlurmCli::new(&config.accounting_start));
    let resolver: Arc<dyn HostResolver> = Arc::new(DnsResolver);
    let cache: Arc<dyn JobCache> = Arc::new(MemoryJobCache::new());

    let catalog = Arc::new(JobCatalog::new(
        scheduler.clone(),
        cache.clone(),
        resolver.clone(),
        &config,
    ));
    let registry = Arc::new(NodeRegistry::new(scheduler.clone(), resolver.clone()));
    let pipeline = Arc::new(SubmitPipeline::new(
        scheduler.clone(),
        cache.clone(),
        Arc::new(Stager::new(config.clone())),
    ));

    let agent: Arc<dyn WorkerAgent> = Arc::new(HttpWorkerAgent::new(config.agent_port));
    let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    let permissions: Arc<dyn PermissionStore> = Arc::new(MemoryPermissionStore::new());
    let broker = Arc::new(SessionBroker::new(
        sessions,
        permissions,
        agent,
        config.notebook_ports.clone(),
    ));

    let state = AppState {
        config: config.clone(),
        catalog,
        registry,
        pipeline,
        broker,
        scheduler,
        http: reqwest::Client::new(),
    };

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "Slurm gateway listening");

    let token = install_shutdown_handler();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

    Ok(())
}
