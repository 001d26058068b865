//! procsnap_agent: samples the local process table and ships snapshots to a collector.

mod config;
mod lister;
mod metrics;
mod runner;
mod sampler;
mod snapshot;
mod transmit;
mod types;

use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::AgentConfig;
use lister::SysinfoLister;
use metrics::SysinfoProbe;
use runner::Agent;
use sampler::CpuSampler;
use snapshot::SnapshotBuilder;
use transmit::Transmitter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = AgentConfig::from_env();
    info!("process monitoring agent started");
    info!(
        backend = %cfg.backend_url,
        interval_secs = cfg.interval.as_secs(),
        cpu_sample_delay_ms = cfg.cpu_sample_delay.as_millis() as u64,
        high_cpu = cfg.high_cpu_percent,
        high_mem_mb = cfg.high_mem_mb,
        "configuration"
    );
    if cfg.uses_default_key() {
        warn!("PROCSNAP_API_KEY not set; using the built-in development key");
    }

    let tx = Transmitter::new(cfg.backend_url.clone(), &cfg.api_key)?;
    let builder = SnapshotBuilder::new(
        SysinfoLister::new(),
        SysinfoProbe::new(),
        CpuSampler::new(cfg.cpu_sample_delay),
    );

    let stop = Arc::new(Notify::new());
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received; stopping after the current cycle");
                stop.notify_one();
            }
        });
    }

    let cycles = Agent::new(builder, tx, &cfg).run(stop).await;
    info!(cycles, "agent exiting");
    Ok(())
}
