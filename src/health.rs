//! System self-check backing the connectivity endpoints.
//!
//! Reports the address and hardware shape of the host the gateway runs on.
//! Each probe degrades independently (unknown address, zero counts) so a
//! missing tool never fails the check itself.

use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// Wire format shared with the worker-side `/connect` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub ip_address: String,
    pub cpu_count: u32,
    pub gpu_count: u32,
    pub total_memory_gb: f64,
}

impl HealthReport {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

async fn run_probe(tool: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(tool).args(args).output().await.ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).to_string())
}

/// First address from `hostname -I` output.
pub fn parse_host_address(output: &str) -> Option<String> {
    output
        .split_whitespace()
        .next()
        .map(str::to_string)
        .filter(|ip| !ip.is_empty())
}

/// Count devices in `nvidia-smi --list-gpus` output, one per line.
pub fn count_gpu_lines(output: &str) -> u32 {
    output.lines().filter(|l| !l.trim().is_empty()).count() as u32
}

/// `MemTotal` from /proc/meminfo (kB), converted to GB.
pub fn parse_mem_total_gb(meminfo: &str) -> f64 {
    let kb = meminfo
        .lines()
        .find(|line| line.starts_with("MemTotal:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(0.0);
    (kb / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

/// Probe the local host. Always reports `active`; individual fields fall
/// back to unknown/zero when a probe fails.
pub async fn self_report() -> HealthReport {
    let ip_address = run_probe("hostname", &["-I"])
        .await
        .and_then(|out| parse_host_address(&out))
        .unwrap_or_else(|| "Unknown".to_string());

    let cpu_count = std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(0);

    let gpu_count = run_probe("nvidia-smi", &["--list-gpus"])
        .await
        .map(|out| count_gpu_lines(&out))
        .unwrap_or(0);

    let total_memory_gb = tokio::fs::read_to_string("/proc/meminfo")
        .await
        .map(|info| parse_mem_total_gb(&info))
        .unwrap_or(0.0);

    HealthReport {
        status: "active".to_string(),
        ip_address,
        cpu_count,
        gpu_count,
        total_memory_gb,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_address_selected() {
        assert_eq!(
            parse_host_address("10.0.0.5 172.17.0.1 \n"),
            Some("10.0.0.5".to_string())
        );
        assert_eq!(parse_host_address("  \n"), None);
    }

    #[test]
    fn gpu_lines_counted() {
        let out = "GPU 0: Tesla V100 (UUID: GPU-aaa)\nGPU 1: Tesla V100 (UUID: GPU-bbb)\n";
        assert_eq!(count_gpu_lines(out), 2);
        assert_eq!(count_gpu_lines(""), 0);
    }

    #[test]
    fn mem_total_converted_to_gb() {
        let info = "MemTotal:       16384000 kB\nMemFree:        1024 kB\n";
        assert_eq!(parse_mem_total_gb(info), 15.63);
        assert_eq!(parse_mem_total_gb("MemFree: 1 kB\n"), 0.0);
    }

    #[tokio::test]
    async fn self_report_is_active() {
        let report = self_report().await;
        assert!(report.is_active());
        assert!(report.cpu_count >= 1);
    }
}
