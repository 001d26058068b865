//! Two-phase CPU sampler: one baseline read per process, a single shared delay,
//! then one delta read per process. Sampling K processes costs one delay, not K.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::lister::ProcessLister;

#[derive(Debug, Clone, Copy)]
pub struct CpuSampler {
    delay: Duration,
}

impl CpuSampler {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Percent CPU per pid over the sampling window.
    ///
    /// Pids unreadable at the baseline are absent from the result; pids that vanish
    /// between the two reads report 0.0.
    pub async fn sample<L: ProcessLister>(
        &self,
        lister: &mut L,
        pids: &[u32],
    ) -> HashMap<u32, f64> {
        let mut baseline: Vec<(u32, Duration, Instant)> = Vec::with_capacity(pids.len());
        for &pid in pids {
            if let Ok(t) = lister.cpu_time(pid) {
                baseline.push((pid, t, Instant::now()));
            }
        }
        let skipped = pids.len() - baseline.len();

        sleep(self.delay).await;

        let mut out = HashMap::with_capacity(baseline.len());
        let mut vanished = 0usize;
        for (pid, before, at) in baseline {
            let pct = match lister.cpu_time(pid) {
                Ok(after) => percent(before, after, at.elapsed()),
                Err(_) => {
                    vanished += 1;
                    0.0
                }
            };
            out.insert(pid, pct);
        }
        debug!(sampled = out.len(), skipped, vanished, "cpu sampled");
        out
    }
}

fn percent(before: Duration, after: Duration, wall: Duration) -> f64 {
    if wall.is_zero() {
        return 0.0;
    }
    let used = after.saturating_sub(before);
    (used.as_secs_f64() / wall.as_secs_f64() * 100.0).max(0.0)
}
