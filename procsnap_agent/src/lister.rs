//! Process enumeration using sysinfo, behind a trait so sampling and snapshot
//! assembly can run against a scripted process table in tests.

use std::ffi::{OsStr, OsString};
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind, Users};
use thiserror::Error;

/// Why a single process could not be read. Never fatal for a batch.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProbeError {
    #[error("process {0} vanished")]
    Vanished(u32),
    #[error("access to process {0} denied")]
    AccessDenied(u32),
}

/// Static facts about one process plus its current resident memory.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessFacts {
    pub pid: u32,
    pub ppid: Option<u32>,
    pub name: String,
    pub cmdline: String,
    pub username: String,
    pub mem_bytes: u64,
}

pub trait ProcessLister {
    /// Refresh the process table and return the pids currently alive.
    fn pids(&mut self) -> Vec<u32>;

    /// Cumulative CPU time consumed by `pid` since it started.
    fn cpu_time(&mut self, pid: u32) -> Result<Duration, ProbeError>;

    fn facts(&mut self, pid: u32) -> Result<ProcessFacts, ProbeError>;
}

/// Live process table backed by a persistent `sysinfo::System`.
pub struct SysinfoLister {
    sys: System,
    users: Users,
}

impl SysinfoLister {
    pub fn new() -> Self {
        Self {
            sys: System::new(),
            users: Users::new_with_refreshed_list(),
        }
    }

    fn refresh_one(&mut self, pid: u32, kind: ProcessRefreshKind) -> Result<(), ProbeError> {
        let updated = self.sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[Pid::from_u32(pid)]),
            true,
            kind,
        );
        if updated == 0 {
            return Err(ProbeError::Vanished(pid));
        }
        Ok(())
    }
}

impl Default for SysinfoLister {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLister for SysinfoLister {
    fn pids(&mut self) -> Vec<u32> {
        // Names, parents, owners and command lines do not change for a live pid;
        // fetch them once and let the per-pid refreshes update cpu/memory.
        let kind = ProcessRefreshKind::nothing()
            .with_memory()
            .with_cmd(UpdateKind::OnlyIfNotSet)
            .with_user(UpdateKind::OnlyIfNotSet);
        self.sys
            .refresh_processes_specifics(ProcessesToUpdate::All, true, kind);
        self.users.refresh();

        let mut pids: Vec<u32> = self.sys.processes().keys().map(|p| p.as_u32()).collect();
        pids.sort_unstable();
        pids
    }

    fn cpu_time(&mut self, pid: u32) -> Result<Duration, ProbeError> {
        self.refresh_one(pid, ProcessRefreshKind::nothing().with_cpu())?;
        self.sys
            .process(Pid::from_u32(pid))
            .map(|p| Duration::from_millis(p.accumulated_cpu_time()))
            .ok_or(ProbeError::Vanished(pid))
    }

    fn facts(&mut self, pid: u32) -> Result<ProcessFacts, ProbeError> {
        self.refresh_one(pid, ProcessRefreshKind::nothing().with_memory())?;
        let p = self
            .sys
            .process(Pid::from_u32(pid))
            .ok_or(ProbeError::Vanished(pid))?;
        if nothing_readable(p.name(), p.cmd(), p.memory()) {
            return Err(ProbeError::AccessDenied(pid));
        }

        let cmdline = p
            .cmd()
            .iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        let username = p
            .user_id()
            .and_then(|uid| self.users.get_user_by_id(uid))
            .map(|u| u.name().to_string())
            .unwrap_or_default();

        Ok(ProcessFacts {
            pid,
            ppid: p.parent().map(|pp| pp.as_u32()),
            name: p.name().to_string_lossy().into_owned(),
            cmdline,
            username,
            mem_bytes: p.memory(),
        })
    }
}

/// sysinfo lists processes it is not allowed to inspect, with every field empty.
fn nothing_readable(name: &OsStr, cmd: &[OsString], mem_bytes: u64) -> bool {
    name.is_empty() && cmd.is_empty() && mem_bytes == 0
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted process table for sampler/builder tests.

    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct FakeLister {
        pub table: HashMap<u32, ProcessFacts>,
        /// Successive `cpu_time` answers per pid; an exhausted script reads as vanished.
        pub cpu_script: HashMap<u32, Vec<Result<Duration, ProbeError>>>,
        pub facts_errors: HashMap<u32, ProbeError>,
        pub cpu_reads: usize,
    }

    impl FakeLister {
        pub fn with_process(mut self, pid: u32, name: &str, mem_bytes: u64) -> Self {
            self.table.insert(
                pid,
                ProcessFacts {
                    pid,
                    ppid: Some(1).filter(|_| pid != 1),
                    name: name.to_string(),
                    cmdline: format!("/usr/bin/{name} --flag"),
                    username: "alice".to_string(),
                    mem_bytes,
                },
            );
            self
        }

        pub fn with_cpu(mut self, pid: u32, readings: &[Result<u64, ProbeError>]) -> Self {
            let script = readings
                .iter()
                .rev()
                .map(|r| r.map(Duration::from_millis))
                .collect();
            self.cpu_script.insert(pid, script);
            self
        }
    }

    impl ProcessLister for FakeLister {
        fn pids(&mut self) -> Vec<u32> {
            let mut v: Vec<u32> = self.table.keys().copied().collect();
            v.sort_unstable();
            v
        }

        fn cpu_time(&mut self, pid: u32) -> Result<Duration, ProbeError> {
            self.cpu_reads += 1;
            self.cpu_script
                .get_mut(&pid)
                .and_then(|s| s.pop())
                .unwrap_or(Err(ProbeError::Vanished(pid)))
        }

        fn facts(&mut self, pid: u32) -> Result<ProcessFacts, ProbeError> {
            if let Some(e) = self.facts_errors.get(&pid) {
                return Err(*e);
            }
            self.table
                .get(&pid)
                .cloned()
                .ok_or(ProbeError::Vanished(pid))
        }
    }
}
