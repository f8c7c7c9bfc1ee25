//! storage.rs
//! Persistent-storage collaborator: mount once, then best-effort batch appends.

use std::{
    fs::{OpenOptions, create_dir_all},
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use crossbeam::channel::{Receiver, Sender, bounded, unbounded};
use log::info;
use parking_lot::Mutex;

use crate::error::{DaqError, Result};

pub trait Storage: Send + 'static {
    /// Prepare the medium; called once before the session starts.
    fn mount(&mut self) -> Result<()>;
    /// Append one batch of records in a single write.
    fn append(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Appends to a file, opening it per batch like the SD-card writer did.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
    mounted: bool,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mounted: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn mount(&mut self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            create_dir_all(dir).map_err(|e| {
                DaqError::Storage(format!("failed to create {}: {e}", dir.display()))
            })?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| DaqError::Storage(format!("failed to open {}: {e}", self.path.display())))?;
        self.mounted = true;
        info!("[Storage] mounted {}", self.path.display());
        Ok(())
    }

    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.mounted {
            return Err(DaqError::Storage("append before mount".into()));
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| DaqError::Storage(format!("failed to open {}: {e}", self.path.display())))?;
        file.write_all(bytes)
            .map_err(|e| DaqError::Storage(format!("write to {} failed: {e}", self.path.display())))
    }
}

/// In-memory storage; clones share the same batch list.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    batches: Arc<Mutex<Vec<Vec<u8>>>>,
    gate: Option<GateSide>,
    fail_mount: bool,
}

#[derive(Clone)]
struct GateSide {
    entered: Sender<()>,
    release: Receiver<()>,
}

/// Test handle for a gated `MemoryStorage`: every append announces itself
/// and then waits for one release.
pub struct StorageGate {
    entered: Receiver<()>,
    release: Sender<()>,
}

impl StorageGate {
    /// Wait until an append is in progress.
    pub fn wait_entered(&self, timeout: Duration) -> bool {
        self.entered.recv_timeout(timeout).is_ok()
    }

    /// Let one pending (or future) append complete.
    pub fn release(&self) {
        let _ = self.release.send(());
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> (Self, StorageGate) {
        let (entered_tx, entered_rx) = unbounded();
        let (release_tx, release_rx) = bounded(64);
        let storage = Self {
            gate: Some(GateSide {
                entered: entered_tx,
                release: release_rx,
            }),
            ..Self::default()
        };
        (
            storage,
            StorageGate {
                entered: entered_rx,
                release: release_tx,
            },
        )
    }

    /// Storage whose mount always fails.
    pub fn unmountable() -> Self {
        Self {
            fail_mount: true,
            ..Self::default()
        }
    }

    pub fn batches(&self) -> Vec<String> {
        self.batches
            .lock()
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect()
    }

    pub fn lines(&self) -> Vec<String> {
        self.batches()
            .iter()
            .flat_map(|b| b.lines().map(str::to_owned).collect::<Vec<_>>())
            .collect()
    }
}

impl Storage for MemoryStorage {
    fn mount(&mut self) -> Result<()> {
        if self.fail_mount {
            return Err(DaqError::Storage("medium not present".into()));
        }
        Ok(())
    }

    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if let Some(gate) = &self.gate {
            let _ = gate.entered.send(());
            let _ = gate.release.recv();
        }
        self.batches.lock().push(bytes.to_vec());
        Ok(())
    }
}
