//! Single-instance guard backed by a PID file.
//!
//! Two pollers on the same bot token make Telegram reject one of them with
//! `409 Conflict`, so the runtime refuses to start when another live process
//! holds the lock.

use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{errors::Error, Result};

#[derive(Debug, Serialize, Deserialize)]
struct LockRecord {
    pid: u32,
    started_at: String,
}

/// Held for the lifetime of the process; the file is removed on drop.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    pid: u32,
}

impl InstanceLock {
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        Self::acquire_with(path.into(), std::process::id(), process_alive)
    }

    fn acquire_with(path: PathBuf, pid: u32, alive: impl Fn(u32) -> bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        if let Some(existing) = read_record(&path) {
            if existing.pid != pid && alive(existing.pid) {
                return Err(Error::AlreadyRunning { pid: existing.pid });
            }
            warn!(
                "replacing stale lock {} (pid {}, started {})",
                path.display(),
                existing.pid,
                existing.started_at
            );
            fs::remove_file(&path)?;
        } else if path.exists() {
            // Unreadable leftovers are treated as stale.
            fs::remove_file(&path)?;
        }

        let record = LockRecord {
            pid,
            started_at: chrono::Utc::now().to_rfc3339(),
        };
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                // Lost a race with another starter.
                let pid = read_record(&path).map(|r| r.pid).unwrap_or(0);
                return Err(Error::AlreadyRunning { pid });
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(serde_json::to_string(&record)?.as_bytes())?;

        info!("instance lock acquired: {} (pid {pid})", path.display());
        Ok(Self { path, pid })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        // Only remove the file if it is still ours.
        if read_record(&self.path).map(|r| r.pid) == Some(self.pid) {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn read_record(path: &Path) -> Option<LockRecord> {
    let txt = fs::read_to_string(path).ok()?;
    serde_json::from_str(&txt).ok()
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    // Without /proc we cannot tell; err on the side of refusing to start.
    true
}
