//! Single-slot, TTL-bound snapshot of the aggregated run lists.
//!
//! The slot lives in memory and is mirrored to one JSON file so a restarted
//! process can serve the last snapshot while it is still fresh. The file is
//! best-effort: an unreadable or corrupt file is a cache miss.

use crate::error::Result;
use crate::io::atomic_write;
use crate::types::RunRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub timestamp: DateTime<Utc>,
    pub builds: Vec<RunRecord>,
    pub releases: Vec<RunRecord>,
}

impl CacheSnapshot {
    pub fn new(builds: Vec<RunRecord>, releases: Vec<RunRecord>) -> Self {
        Self {
            timestamp: Utc::now(),
            builds,
            releases,
        }
    }
}

/// On-disk layout: `{timestamp, data: {builds, releases}}`.
#[derive(Serialize, Deserialize)]
struct CacheFile {
    timestamp: DateTime<Utc>,
    data: CacheData,
}

#[derive(Serialize, Deserialize)]
struct CacheData {
    builds: Vec<RunRecord>,
    releases: Vec<RunRecord>,
}

#[derive(Default)]
struct Slot {
    snapshot: Option<CacheSnapshot>,
    file_checked: bool,
}

pub struct RunCache {
    path: Option<PathBuf>,
    ttl: chrono::Duration,
    slot: Mutex<Slot>,
}

impl RunCache {
    /// Memory-only cache.
    pub fn in_memory(ttl: Duration) -> Self {
        Self::build(None, ttl)
    }

    /// Cache mirrored to `path`. The file is read lazily on the first `get`.
    pub fn with_file(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self::build(Some(path.into()), ttl)
    }

    fn build(path: Option<PathBuf>, ttl: Duration) -> Self {
        Self {
            path,
            ttl: chrono::Duration::from_std(ttl)
                .unwrap_or_else(|_| chrono::Duration::days(36_500)),
            slot: Mutex::new(Slot::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The stored snapshot if it is younger than the TTL.
    pub fn get(&self) -> Option<CacheSnapshot> {
        self.get_at(Utc::now())
    }

    pub fn get_at(&self, now: DateTime<Utc>) -> Option<CacheSnapshot> {
        let mut slot = self.lock();
        if slot.snapshot.is_none() && !slot.file_checked {
            slot.file_checked = true;
            slot.snapshot = self.path.as_deref().and_then(read_file);
        }
        slot.snapshot
            .as_ref()
            .filter(|s| now.signed_duration_since(s.timestamp) < self.ttl)
            .cloned()
    }

    /// Overwrite the slot, stamping the current time. The memory slot is
    /// always updated; the returned error only reports a failed file write.
    pub fn put(&self, mut snapshot: CacheSnapshot) -> Result<CacheSnapshot> {
        snapshot.timestamp = Utc::now();
        {
            let mut slot = self.lock();
            slot.snapshot = Some(snapshot.clone());
            slot.file_checked = true;
        }
        if let Some(path) = &self.path {
            write_file(path, &snapshot)?;
        }
        Ok(snapshot)
    }

    /// Drop the in-memory snapshot and the file so the next `get` misses.
    pub fn invalidate(&self) {
        let mut slot = self.lock();
        slot.snapshot = None;
        slot.file_checked = true;
        if let Some(path) = &self.path {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "cache file removal failed");
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slot> {
        // A poisoned slot still holds a whole snapshot; keep serving it.
        self.slot.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn read_file(path: &Path) -> Option<CacheSnapshot> {
    let data = match std::fs::read(path) {
        Ok(d) => d,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "cache file unreadable");
            }
            return None;
        }
    };
    match serde_json::from_slice::<CacheFile>(&data) {
        Ok(file) => Some(CacheSnapshot {
            timestamp: file.timestamp,
            builds: file.data.builds,
            releases: file.data.releases,
        }),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cache file corrupt, ignoring");
            None
        }
    }
}

fn write_file(path: &Path, snapshot: &CacheSnapshot) -> Result<()> {
    let file = CacheFile {
        timestamp: snapshot.timestamp,
        data: CacheData {
            builds: snapshot.builds.clone(),
            releases: snapshot.releases.clone(),
        },
    };
    let json = serde_json::to_vec(&file)?;
    atomic_write(path, &json)
}
