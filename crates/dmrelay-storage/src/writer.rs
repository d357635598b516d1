// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Debounced single writer.
//!
//! In-memory stores never touch the disk themselves. They mark a table dirty
//! through a [`SaveHandle`]; one background task collects the marks, waits
//! for the coalescing window to pass, and then asks the [`TableExporter`] to
//! snapshot and save each dirty table once. A burst of mutations therefore
//! costs one physical write per table. Anything written after the last flush
//! is lost on a hard crash; [`DebouncedWriter::shutdown`] flushes what is left.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dmrelay_core::DmRelayError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::store::DurableStore;
use crate::table::Table;

/// Produces the current contents of a table and saves them.
#[async_trait]
pub trait TableExporter: Send + Sync + 'static {
    /// Snapshot `table` from memory and persist it through `store`.
    ///
    /// Implementations must not hold in-memory locks across the save.
    async fn export(&self, table: Table, store: &DurableStore) -> Result<(), DmRelayError>;
}

/// Cloneable sender used by mutators to request a save.
#[derive(Debug, Clone)]
pub struct SaveHandle {
    tx: mpsc::UnboundedSender<Table>,
}

impl SaveHandle {
    /// Mark `table` dirty. Never blocks; a no-op once the writer has stopped.
    pub fn schedule(&self, table: Table) {
        if self.tx.send(table).is_err() {
            debug!(%table, "save requested after writer stopped");
        }
    }

    /// A handle whose requests go nowhere, for stores used without persistence.
    pub fn detached() -> Self {
        save_channel().0
    }
}

/// Receiving half of [`save_channel`], consumed by [`DebouncedWriter::spawn`].
#[derive(Debug)]
pub struct SaveQueue {
    rx: mpsc::UnboundedReceiver<Table>,
}

/// Create the handle/queue pair. The handle is usually given to the stores
/// before the writer exists.
pub fn save_channel() -> (SaveHandle, SaveQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SaveHandle { tx }, SaveQueue { rx })
}

/// Background task that owns every debounced physical write.
pub struct DebouncedWriter {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DebouncedWriter {
    /// Start the writer on the current tokio runtime.
    pub fn spawn(
        store: DurableStore,
        exporter: Arc<dyn TableExporter>,
        queue: SaveQueue,
        debounce: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(store, exporter, queue.rx, debounce, cancel.clone()));
        Self { cancel, task }
    }

    /// Stop accepting new windows, flush every dirty table, and wait for it.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "debounced writer task failed");
        }
    }
}

async fn run(
    store: DurableStore,
    exporter: Arc<dyn TableExporter>,
    mut rx: mpsc::UnboundedReceiver<Table>,
    debounce: Duration,
    cancel: CancellationToken,
) {
    let mut dirty = BTreeSet::new();

    'outer: loop {
        let first = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            table = rx.recv() => table,
        };
        let Some(table) = first else { break };
        dirty.insert(table);

        let deadline = Instant::now() + debounce;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'outer,
                _ = tokio::time::sleep_until(deadline) => break,
                more = rx.recv() => match more {
                    Some(table) => {
                        dirty.insert(table);
                    }
                    None => break,
                },
            }
        }

        flush(&store, exporter.as_ref(), &mut dirty).await;
    }

    while let Ok(table) = rx.try_recv() {
        dirty.insert(table);
    }
    if !dirty.is_empty() {
        info!(tables = dirty.len(), "flushing pending saves before shutdown");
    }
    flush(&store, exporter.as_ref(), &mut dirty).await;
}

async fn flush(store: &DurableStore, exporter: &dyn TableExporter, dirty: &mut BTreeSet<Table>) {
    for table in std::mem::take(dirty) {
        match exporter.export(table, store).await {
            Ok(()) => debug!(%table, "debounced save flushed"),
            Err(e) => error!(%table, error = %e, "debounced save failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingExporter {
        exports: Mutex<HashMap<Table, usize>>,
    }

    impl CountingExporter {
        fn count(&self, table: Table) -> usize {
            self.exports.lock().unwrap().get(&table).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl TableExporter for CountingExporter {
        async fn export(&self, table: Table, _store: &DurableStore) -> Result<(), DmRelayError> {
            *self.exports.lock().unwrap().entry(table).or_default() += 1;
            Ok(())
        }
    }

    fn temp_store() -> (DurableStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (DurableStore::open(dir.path()).unwrap(), dir)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_marks_collapses_into_one_write_per_table() {
        let (store, _dir) = temp_store();
        let exporter = Arc::new(CountingExporter::default());
        let (handle, queue) = save_channel();
        let writer =
            DebouncedWriter::spawn(store, exporter.clone(), queue, Duration::from_millis(100));

        for _ in 0..50 {
            handle.schedule(Table::Conversations);
        }
        handle.schedule(Table::Correspondents);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(exporter.count(Table::Conversations), 1);
        assert_eq!(exporter.count(Table::Correspondents), 1);
        assert_eq!(exporter.count(Table::Config), 0);

        writer.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn marks_after_a_flush_start_a_new_window() {
        let (store, _dir) = temp_store();
        let exporter = Arc::new(CountingExporter::default());
        let (handle, queue) = save_channel();
        let writer =
            DebouncedWriter::spawn(store, exporter.clone(), queue, Duration::from_millis(100));

        handle.schedule(Table::Conversations);
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.schedule(Table::Conversations);
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(exporter.count(Table::Conversations), 2);
        writer.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_inside_the_window() {
        let (store, _dir) = temp_store();
        let exporter = Arc::new(CountingExporter::default());
        let (handle, queue) = save_channel();
        let writer =
            DebouncedWriter::spawn(store, exporter.clone(), queue, Duration::from_secs(60));

        handle.schedule(Table::Config);
        tokio::task::yield_now().await;
        writer.shutdown().await;

        assert_eq!(exporter.count(Table::Config), 1);
    }

    #[test]
    fn detached_handle_accepts_marks() {
        let handle = SaveHandle::detached();
        handle.schedule(Table::Conversations);
    }
}
