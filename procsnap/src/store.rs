//! SQLite persistence. One connection behind a mutex; every snapshot insert is a
//! single transaction, so readers see either the whole snapshot or none of it.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::types::{ProcessRow, SnapshotId, SnapshotRow};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS snapshots (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    hostname          TEXT    NOT NULL,
    timestamp_us      INTEGER NOT NULL,
    received_at_us    INTEGER NOT NULL,
    os                TEXT    NOT NULL DEFAULT '',
    processor         TEXT    NOT NULL DEFAULT '',
    cores             INTEGER NOT NULL DEFAULT 0,
    threads           INTEGER NOT NULL DEFAULT 0,
    ram_gb            REAL    NOT NULL DEFAULT 0,
    used_ram_gb       REAL    NOT NULL DEFAULT 0,
    free_ram_gb       REAL    NOT NULL DEFAULT 0,
    storage_free_gb   REAL    NOT NULL DEFAULT 0,
    storage_total_gb  REAL    NOT NULL DEFAULT 0,
    storage_used_gb   REAL    NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS snapshots_timestamp ON snapshots (timestamp_us);

CREATE TABLE IF NOT EXISTS processes (
    id           INTEGER PRIMARY KEY,
    snapshot_id  INTEGER NOT NULL REFERENCES snapshots (id) ON DELETE CASCADE,
    pid          INTEGER NOT NULL,
    ppid         INTEGER,
    name         TEXT    NOT NULL,
    cpu          REAL    NOT NULL,
    memory       REAL    NOT NULL,
    cmdline      TEXT    NOT NULL DEFAULT '',
    username     TEXT    NOT NULL DEFAULT '',
    UNIQUE (snapshot_id, pid)
);
CREATE INDEX IF NOT EXISTS processes_pid ON processes (pid);
CREATE INDEX IF NOT EXISTS processes_ppid ON processes (ppid);
";

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        info!(path = %path.display(), "opened snapshot store");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves no open transaction behind (rolled back on drop).
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a snapshot and all its processes atomically.
    pub fn insert_snapshot(
        &self,
        snap: &SnapshotRow,
        procs: &[ProcessRow],
        received_at: DateTime<Utc>,
    ) -> Result<SnapshotId, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO snapshots \
             (hostname, timestamp_us, received_at_us, os, processor, cores, threads, \
              ram_gb, used_ram_gb, free_ram_gb, \
              storage_free_gb, storage_total_gb, storage_used_gb) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                snap.hostname,
                snap.timestamp.timestamp_micros(),
                received_at.timestamp_micros(),
                snap.os,
                snap.processor,
                snap.cores,
                snap.threads,
                snap.ram_gb,
                snap.used_ram_gb,
                snap.free_ram_gb,
                snap.storage_free_gb,
                snap.storage_total_gb,
                snap.storage_used_gb,
            ],
        )?;
        let id = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO processes \
                 (snapshot_id, pid, ppid, name, cpu, memory, cmdline, username) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for p in procs {
                stmt.execute(params![
                    id, p.pid, p.ppid, p.name, p.cpu, p.memory, p.cmdline, p.username
                ])?;
            }
        }
        tx.commit()?;
        debug!(id, processes = procs.len(), "snapshot committed");
        Ok(id)
    }

    /// Most recent snapshot by timestamp; ties go to the later insert.
    pub fn latest(&self) -> Result<Option<(SnapshotId, SnapshotRow, Vec<ProcessRow>)>, StoreError> {
        let conn = self.conn();
        let found = conn
            .query_row(
                "SELECT id, hostname, timestamp_us, os, processor, cores, threads, \
                        ram_gb, used_ram_gb, free_ram_gb, \
                        storage_free_gb, storage_total_gb, storage_used_gb \
                 FROM snapshots ORDER BY timestamp_us DESC, id DESC LIMIT 1",
                [],
                |row| Ok((row.get::<_, i64>(0)?, snapshot_row(row)?)),
            )
            .optional()?;
        let Some((id, snap)) = found else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT pid, ppid, name, cpu, memory, cmdline, username \
             FROM processes WHERE snapshot_id = ?1 \
             ORDER BY memory DESC, cpu DESC, pid ASC",
        )?;
        let procs = stmt
            .query_map(params![id], |row| {
                Ok(ProcessRow {
                    pid: row.get(0)?,
                    ppid: row.get(1)?,
                    name: row.get(2)?,
                    cpu: row.get(3)?,
                    memory: row.get(4)?,
                    cmdline: row.get(5)?,
                    username: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some((id, snap, procs)))
    }

    /// Delete a snapshot; its processes go with it. Returns whether it existed.
    pub fn delete_snapshot(&self, id: SnapshotId) -> Result<bool, StoreError> {
        let n = self
            .conn()
            .execute("DELETE FROM snapshots WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    pub fn snapshot_count(&self) -> Result<u64, StoreError> {
        self.count("SELECT COUNT(*) FROM snapshots")
    }

    pub fn process_count(&self) -> Result<u64, StoreError> {
        self.count("SELECT COUNT(*) FROM processes")
    }

    fn count(&self, sql: &str) -> Result<u64, StoreError> {
        let n: i64 = self.conn().query_row(sql, [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

fn snapshot_row(row: &Row<'_>) -> rusqlite::Result<SnapshotRow> {
    let ts_us: i64 = row.get(2)?;
    let timestamp = DateTime::from_timestamp_micros(ts_us)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(2, ts_us))?;
    Ok(SnapshotRow {
        hostname: row.get(1)?,
        timestamp,
        os: row.get(3)?,
        processor: row.get(4)?,
        cores: row.get(5)?,
        threads: row.get(6)?,
        ram_gb: row.get(7)?,
        used_ram_gb: row.get(8)?,
        free_ram_gb: row.get(9)?,
        storage_free_gb: row.get(10)?,
        storage_total_gb: row.get(11)?,
        storage_used_gb: row.get(12)?,
    })
}
