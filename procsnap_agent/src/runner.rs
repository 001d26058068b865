//! The agent loop: build, transmit, sleep, repeat. Stop requests are honoured
//! between cycles only.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::AgentConfig;
use crate::lister::ProcessLister;
use crate::metrics::SystemProbe;
use crate::snapshot::{over_thresholds, SnapshotBuilder};
use crate::transmit::{Delivery, Transmitter};

pub struct Agent<L, P> {
    builder: SnapshotBuilder<L, P>,
    tx: Transmitter,
    interval: Duration,
    high_cpu: f64,
    high_mem_mb: f64,
}

impl<L: ProcessLister, P: SystemProbe> Agent<L, P> {
    pub fn new(builder: SnapshotBuilder<L, P>, tx: Transmitter, cfg: &AgentConfig) -> Self {
        Self {
            builder,
            tx,
            interval: cfg.interval,
            high_cpu: cfg.high_cpu_percent,
            high_mem_mb: cfg.high_mem_mb,
        }
    }

    /// Runs until `stop` is notified, the interval is zero, or a cycle panics.
    /// Returns the number of cycles started.
    pub async fn run(mut self, stop: Arc<Notify>) -> usize {
        let mut cycles = 0;
        loop {
            cycles += 1;
            if let Err(panic) = AssertUnwindSafe(self.cycle()).catch_unwind().await {
                let msg = panic_message(&panic);
                error!("unexpected failure in cycle {cycles}: {msg}");
                break;
            }
            if self.interval.is_zero() {
                info!("interval is 0, single run complete");
                break;
            }
            tokio::select! {
                _ = sleep(self.interval) => {}
                _ = stop.notified() => {
                    info!("agent stopped by user");
                    break;
                }
            }
        }
        cycles
    }

    async fn cycle(&mut self) {
        let snapshot = self.builder.build().await;
        let (hot_cpu, hot_mem) = over_thresholds(&snapshot, self.high_cpu, self.high_mem_mb);
        let processes = snapshot.processes.len();

        match self.tx.send(&snapshot).await {
            Ok(Delivery::Accepted { status }) => {
                info!(processes, hot_cpu, hot_mem, %status, "sent payload");
            }
            Ok(Delivery::Rejected { status, body }) => {
                warn!(processes, %status, "collector rejected payload: {body}");
            }
            Err(e) => {
                warn!(processes, url = self.tx.url(), "error sending data: {e}");
            }
        }
    }
}

fn panic_message(p: &Box<dyn Any + Send>) -> &str {
    p.downcast_ref::<&str>()
        .copied()
        .or_else(|| p.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lister::fake::FakeLister;
    use crate::lister::{ProbeError, ProcessFacts};
    use crate::sampler::CpuSampler;
    use crate::types::SystemInfo;

    struct NullProbe;

    impl SystemProbe for NullProbe {
        fn probe(&mut self) -> SystemInfo {
            SystemInfo::default()
        }
        fn hostname(&self) -> String {
            "test".into()
        }
    }

    struct ExplodingLister;

    impl ProcessLister for ExplodingLister {
        fn pids(&mut self) -> Vec<u32> {
            panic!("process table unreadable")
        }
        fn cpu_time(&mut self, pid: u32) -> Result<Duration, ProbeError> {
            Err(ProbeError::Vanished(pid))
        }
        fn facts(&mut self, pid: u32) -> Result<ProcessFacts, ProbeError> {
            Err(ProbeError::Vanished(pid))
        }
    }

    fn dead_endpoint() -> Transmitter {
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        Transmitter::new(format!("http://127.0.0.1:{port}/"), "k").unwrap()
    }

    fn agent<L: ProcessLister>(lister: L, interval: Duration) -> Agent<L, NullProbe> {
        let cfg = AgentConfig {
            interval,
            ..AgentConfig::default()
        };
        let sampler = CpuSampler::new(Duration::from_millis(10));
        let builder = SnapshotBuilder::new(lister, NullProbe, sampler);
        Agent::new(builder, dead_endpoint(), &cfg)
    }

    #[tokio::test]
    async fn zero_interval_runs_exactly_once() {
        let lister = FakeLister::default().with_process(1, "init", 0);
        let cycles = agent(lister, Duration::ZERO)
            .run(Arc::new(Notify::new()))
            .await;
        assert_eq!(cycles, 1);
    }

    #[tokio::test]
    async fn stop_requested_mid_cycle_ends_loop_after_that_cycle() {
        let stop = Arc::new(Notify::new());
        // Stored permit: observed at the first inter-cycle wait.
        stop.notify_one();
        let lister = FakeLister::default().with_process(1, "init", 0);
        let cycles = agent(lister, Duration::from_secs(3600)).run(stop).await;
        assert_eq!(cycles, 1);
    }

    #[tokio::test]
    async fn panicking_cycle_terminates_gracefully() {
        let cycles = agent(ExplodingLister, Duration::from_secs(3600))
            .run(Arc::new(Notify::new()))
            .await;
        assert_eq!(cycles, 1);
    }
}
