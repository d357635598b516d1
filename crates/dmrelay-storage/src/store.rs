// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Atomic table store.
//!
//! `save` serializes the value, writes it into a temporary file created in the
//! data directory, flushes and fsyncs it, then renames it over the table file.
//! A crash at any point before the rename leaves the previous file untouched.
//! Saves to the same table are serialized by a per-table lock; saves to
//! different tables run independently.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dmrelay_core::DmRelayError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::table::Table;

/// Handle to the on-disk tables. Cheap to clone.
#[derive(Clone)]
pub struct DurableStore {
    inner: Arc<Inner>,
}

struct Inner {
    root: PathBuf,
    locks: [Mutex<()>; 3],
}

impl DurableStore {
    /// Open (creating if needed) the data directory at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, DmRelayError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(storage_err)?;
        debug!(path = %root.display(), "durable store opened");
        Ok(Self {
            inner: Arc::new(Inner {
                root,
                locks: Default::default(),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Final location of `table`'s document.
    pub fn path(&self, table: Table) -> PathBuf {
        self.inner.root.join(table.file_name())
    }

    /// Serialize and atomically replace `table` on the current thread.
    pub fn save_blocking<T: Serialize>(&self, table: Table, value: &T) -> Result<(), DmRelayError> {
        let bytes = encode(value)?;
        self.write_bytes(table, &bytes)
    }

    /// Serialize on the caller, then write on the blocking pool.
    pub async fn save<T: Serialize>(&self, table: Table, value: &T) -> Result<(), DmRelayError> {
        let bytes = encode(value)?;
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.write_bytes(table, &bytes))
            .await
            .map_err(|e| DmRelayError::Internal(format!("save task for {table} panicked: {e}")))?
    }

    /// Read `table`. `Ok(None)` when the file does not exist yet.
    pub fn load<T: DeserializeOwned>(&self, table: Table) -> Result<Option<T>, DmRelayError> {
        let bytes = match fs::read(self.path(table)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_err(e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| DmRelayError::CorruptData {
                table: table.to_string(),
                source: Box::new(e),
            })
    }

    /// Read `table`, falling back to `T::default()` when it is missing or unreadable.
    ///
    /// A malformed file is moved aside to `<file>.corrupt` so the next save does
    /// not overwrite the evidence.
    pub fn load_or_default<T: DeserializeOwned + Default>(&self, table: Table) -> T {
        match self.load(table) {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!(%table, "table not found, starting empty");
                T::default()
            }
            Err(e @ DmRelayError::CorruptData { .. }) => {
                warn!(%table, error = %e, "table unreadable, falling back to empty default");
                self.quarantine(table);
                T::default()
            }
            Err(e) => {
                warn!(%table, error = %e, "table could not be read, falling back to empty default");
                T::default()
            }
        }
    }

    fn quarantine(&self, table: Table) {
        let _guard = self.lock(table);
        let path = self.path(table);
        let aside = path.with_extension("json.corrupt");
        if let Err(e) = fs::rename(&path, &aside) {
            warn!(%table, error = %e, "failed to move corrupt table aside");
        } else {
            warn!(%table, path = %aside.display(), "corrupt table moved aside");
        }
    }

    fn write_bytes(&self, table: Table, bytes: &[u8]) -> Result<(), DmRelayError> {
        let _guard = self.lock(table);
        let staged = self.stage(table, bytes)?;
        staged
            .persist(self.path(table))
            .map_err(|e| storage_err(e.error))?;
        self.sync_dir();
        debug!(%table, bytes = bytes.len(), "table saved");
        Ok(())
    }

    /// Write `bytes` to a durable temporary file beside `table`'s final path.
    ///
    /// Dropping the returned file without persisting it deletes it.
    pub(crate) fn stage(&self, table: Table, bytes: &[u8]) -> Result<NamedTempFile, DmRelayError> {
        let mut file = tempfile::Builder::new()
            .prefix(&format!(".{}.", table.file_name()))
            .suffix(".tmp")
            .tempfile_in(&self.inner.root)
            .map_err(storage_err)?;
        file.write_all(bytes).map_err(storage_err)?;
        file.flush().map_err(storage_err)?;
        file.as_file().sync_all().map_err(storage_err)?;
        Ok(file)
    }

    #[cfg(unix)]
    fn sync_dir(&self) {
        // Makes the rename itself durable; failure only widens the crash window.
        if let Err(e) = fs::File::open(&self.inner.root).and_then(|dir| dir.sync_all()) {
            debug!(error = %e, "data directory fsync failed");
        }
    }

    #[cfg(not(unix))]
    fn sync_dir(&self) {}

    fn lock(&self, table: Table) -> MutexGuard<'_, ()> {
        self.inner.locks[table.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, DmRelayError> {
    serde_json::to_vec_pretty(value).map_err(|e| DmRelayError::Storage {
        source: Box::new(e),
    })
}

fn storage_err(e: std::io::Error) -> DmRelayError {
    DmRelayError::Storage {
        source: Box::new(e),
    }
}
