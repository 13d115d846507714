//! Node registry reader: parses the scheduler's node-description dump.
//!
//! Uncached; call volume is low and the dump is cheap relative to the
//! accounting query.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;
use crate::resolve::HostResolver;
use crate::slurm::client::SchedulerClient;

/// Point-in-time resource state of one worker node.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub name: String,
    pub state: String,
    pub cpu_total: u32,
    pub cpu_alloc: u32,
    pub cpu_load: f64,
    pub real_memory: u64,
    pub alloc_memory: u64,
    pub free_memory: u64,
    /// Raw GPU resource descriptor, e.g. `gpu:tesla:2`.
    pub gres: String,
    pub partitions: String,
    pub ip: String,
}

fn numeric<T: std::str::FromStr + Default>(kv: &HashMap<&str, &str>, key: &str) -> T {
    kv.get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or_default()
}

fn parse_block(block: &str) -> Option<NodeRecord> {
    let mut kv: HashMap<&str, &str> = HashMap::new();
    for line in block.lines() {
        for token in line.split_whitespace() {
            if let Some((key, value)) = token.split_once('=') {
                kv.insert(key, value);
            }
        }
    }

    // A block without a name is unusable; anything else degrades gracefully.
    let name = kv.get("NodeName")?.to_string();

    Some(NodeRecord {
        name,
        state: kv.get("State").copied().unwrap_or_default().to_string(),
        cpu_total: numeric(&kv, "CPUTot"),
        cpu_alloc: numeric(&kv, "CPUAlloc"),
        cpu_load: numeric(&kv, "CPULoad"),
        real_memory: numeric(&kv, "RealMemory"),
        alloc_memory: numeric(&kv, "AllocMem"),
        free_memory: numeric(&kv, "FreeMem"),
        gres: kv.get("Gres").copied().unwrap_or_default().to_string(),
        partitions: kv
            .get("Partitions")
            .copied()
            .unwrap_or_default()
            .to_string(),
        ip: String::new(),
    })
}

/// Parse a node dump: blank-line-delimited blocks of whitespace-separated
/// `key=value` tokens. Unknown keys are ignored; malformed numeric fields
/// default to zero so one bad field never drops a node.
pub fn parse_node_dump(output: &str) -> Vec<NodeRecord> {
    output
        .split("\n\n")
        .filter(|block| !block.trim().is_empty())
        .filter_map(parse_block)
        .collect()
}

/// Live node listing with resolved addresses. Rebuilt fully on each query.
pub struct NodeRegistry {
    scheduler: Arc<dyn SchedulerClient>,
    resolver: Arc<dyn HostResolver>,
}

impl NodeRegistry {
    pub fn new(scheduler: Arc<dyn SchedulerClient>, resolver: Arc<dyn HostResolver>) -> Self {
        Self {
            scheduler,
            resolver,
        }
    }

    pub async fn list(&self) -> Result<Vec<NodeRecord>> {
        let output = self.scheduler.show_nodes().await?;
        let mut nodes = parse_node_dump(&output);
        for node in &mut nodes {
            node.ip = self.resolver.resolve(&node.name).await;
        }
        Ok(nodes)
    }
}
