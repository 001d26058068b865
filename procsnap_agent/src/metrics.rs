//! Host-level metrics using sysinfo: OS, CPU topology, RAM and root-volume storage.

use std::path::Path;
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, RefreshKind, System};

use crate::types::{bytes_to_gb, SystemInfo};

pub trait SystemProbe {
    /// Never fails: anything unreadable is reported as 0 or an empty label.
    fn probe(&mut self) -> SystemInfo;

    fn hostname(&self) -> String;
}

pub struct SysinfoProbe {
    sys: System,
    disks: Disks,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::nothing())
            .with_memory(MemoryRefreshKind::nothing().with_ram());
        Self {
            sys: System::new_with_specifics(refresh_kind),
            disks: Disks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe for SysinfoProbe {
    fn probe(&mut self) -> SystemInfo {
        self.sys.refresh_memory_specifics(MemoryRefreshKind::nothing().with_ram());
        self.disks.refresh(true);

        let mem_total = self.sys.total_memory();
        let mem_free = self.sys.available_memory();
        let (disk_total, disk_free) = root_volume(&self.disks);

        SystemInfo {
            // Kernel, not distribution: "Linux 6.8.0-45-generic", "Darwin 24.1.0".
            os: System::kernel_long_version(),
            processor: processor_label(&self.sys),
            cores: System::physical_core_count().unwrap_or(0) as u32,
            threads: self.sys.cpus().len() as u32,
            ram_gb: bytes_to_gb(mem_total),
            used_ram_gb: bytes_to_gb(mem_total.saturating_sub(mem_free)),
            free_ram_gb: bytes_to_gb(mem_free),
            storage_free_gb: bytes_to_gb(disk_free),
            storage_total_gb: bytes_to_gb(disk_total),
            storage_used_gb: bytes_to_gb(disk_total.saturating_sub(disk_free)),
        }
    }

    fn hostname(&self) -> String {
        System::host_name().unwrap_or_else(|| "unknown".into())
    }
}


fn processor_label(sys: &System) -> String {
    sys.cpus()
        .first()
        .map(|c| c.brand().trim().to_string())
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| std::env::consts::ARCH.to_string())
}

/// (total, available) bytes of the volume holding the filesystem root.
fn root_volume(disks: &Disks) -> (u64, u64) {
    let root = root_path();
    disks
        .list()
        .iter()
        .filter(|d| root.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .map(|d| (d.total_space(), d.available_space()))
        .unwrap_or((0, 0))
}

fn root_path() -> &'static Path {
    if cfg!(windows) {
        Path::new("C:\\")
    } else {
        Path::new("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_probe_reports_consistent_totals() {
        let mut probe = SysinfoProbe::new();
        let info = probe.probe();
        assert!(info.ram_gb > 0.0);
        assert!(info.threads >= 1);
        assert!(info.used_ram_gb <= info.ram_gb + 0.01);
        assert!(info.storage_used_gb <= info.storage_total_gb + 0.01);
        assert!(!probe.hostname().is_empty());
        if cfg!(target_os = "linux") {
            assert!(info.os.starts_with("Linux "), "{}", info.os);
        }
    }
}
