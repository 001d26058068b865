//! Assembles one `Snapshot` from the system probe, the process table and the CPU sampler.

use chrono::Utc;
use tracing::debug;

use crate::lister::ProcessLister;
use crate::metrics::SystemProbe;
use crate::sampler::CpuSampler;
use crate::types::{
    bytes_to_mb, clip, round2, ProcessInfo, Snapshot, SystemInfo, HOSTNAME_MAX, NAME_MAX, OS_MAX,
    PROCESSOR_MAX, USERNAME_MAX,
};

const UNNAMED: &str = "unknown";

pub struct SnapshotBuilder<L, P> {
    lister: L,
    probe: P,
    sampler: CpuSampler,
}

impl<L: ProcessLister, P: SystemProbe> SnapshotBuilder<L, P> {
    pub fn new(lister: L, probe: P, sampler: CpuSampler) -> Self {
        Self {
            lister,
            probe,
            sampler,
        }
    }

    pub async fn build(&mut self) -> Snapshot {
        let timestamp = Utc::now();
        let system = fit_system(self.probe.probe());
        let pids = self.lister.pids();
        let cpu = self.sampler.sample(&mut self.lister, &pids).await;

        let mut processes = Vec::with_capacity(cpu.len());
        let mut dropped = 0usize;
        for pid in pids {
            // Not readable at the cpu baseline: treat as gone.
            let Some(&pct) = cpu.get(&pid) else {
                dropped += 1;
                continue;
            };
            match self.lister.facts(pid) {
                Ok(f) => processes.push(ProcessInfo {
                    pid: f.pid,
                    ppid: f.ppid,
                    name: label(f.name, NAME_MAX),
                    cpu: round2(pct),
                    memory: bytes_to_mb(f.mem_bytes),
                    cmdline: f.cmdline,
                    username: clip(f.username, USERNAME_MAX),
                }),
                Err(e) => {
                    debug!("dropping process: {e}");
                    dropped += 1;
                }
            }
        }
        debug!(kept = processes.len(), dropped, "process list assembled");

        Snapshot {
            hostname: label(self.probe.hostname(), HOSTNAME_MAX),
            timestamp,
            system,
            processes,
        }
    }
}

/// Labels the collector requires to be non-blank: clipped, never empty.
/// A process may rename itself to "" at any time.
fn label(s: String, max: usize) -> String {
    if s.trim().is_empty() {
        return UNNAMED.to_string();
    }
    clip(s, max)
}

fn fit_system(mut s: SystemInfo) -> SystemInfo {
    s.os = clip(s.os, OS_MAX);
    s.processor = clip(s.processor, PROCESSOR_MAX);
    s
}

/// Processes at or above the reference thresholds, as (high cpu, high memory).
/// Informational only.
pub fn over_thresholds(snap: &Snapshot, high_cpu: f64, high_mem_mb: f64) -> (usize, usize) {
    let cpu = snap.processes.iter().filter(|p| p.cpu >= high_cpu).count();
    let mem = snap
        .processes
        .iter()
        .filter(|p| p.memory >= high_mem_mb)
        .count();
    (cpu, mem)
}
