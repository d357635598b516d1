// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! History reconciliation scheduler.
//!
//! A run snapshots the correspondent set and spawns one task per
//! correspondent. A semaphore admits at most `concurrency` of them into the
//! fetch at a time. Each admitted task opens the correspondent's pending
//! buffer, fetches the remote history, detaches the buffer and commits the
//! merge. A fetch failure still flushes the buffer into the conversation.
//!
//! The whole run shares one deadline. When it passes, the run token is
//! cancelled: in-flight fetches are abandoned and tasks still waiting for a
//! slot give up without touching anything. Merge and commit never await, so
//! a task past its fetch always finishes its write.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dmrelay_config::model::HistoryConfig;
use dmrelay_core::{CorrespondentId, DmRelayError, HistorySource, JobPhase, TriggerOutcome};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::conversation::ConversationStore;
use crate::correspondents::CorrespondentSet;
use crate::merge::merge;
use crate::pending::PendingQueue;
use crate::status::StatusRegister;

/// Tunables for one reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSettings {
    /// Maximum messages requested per correspondent.
    pub fetch_limit: usize,
    /// Admission gate size.
    pub concurrency: usize,
    /// Deadline for the whole run.
    pub timeout: Duration,
}

impl From<&HistoryConfig> for ReconcileSettings {
    fn from(config: &HistoryConfig) -> Self {
        Self {
            fetch_limit: config.fetch_limit,
            concurrency: config.concurrency,
            timeout: config.fetch_timeout(),
        }
    }
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self::from(&HistoryConfig::default())
    }
}

/// How one correspondent's task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskOutcome {
    Reconciled,
    Failed,
    /// The fetch was cut off by the run deadline.
    TimedOut,
    /// The deadline passed before the task got a slot.
    NotStarted,
}

/// Totals of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub reconciled: usize,
    /// Every correspondent that did not reconcile, timeouts included.
    pub failed: usize,
    /// Failures caused by the run deadline, whether mid-fetch or before starting.
    pub timed_out: usize,
    pub phase: JobPhase,
}

impl RunSummary {
    fn new(total: usize) -> Self {
        Self {
            total,
            reconciled: 0,
            failed: 0,
            timed_out: 0,
            phase: JobPhase::Running,
        }
    }

    fn record(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Reconciled => self.reconciled += 1,
            TaskOutcome::Failed => self.failed += 1,
            TaskOutcome::TimedOut | TaskOutcome::NotStarted => {
                self.failed += 1;
                self.timed_out += 1;
            }
        }
    }
}

/// Runs reconciliation over the shared stores. Cheap to clone.
#[derive(Clone)]
pub struct Reconciler {
    source: Arc<dyn HistorySource>,
    conversations: Arc<ConversationStore>,
    pending: Arc<PendingQueue>,
    correspondents: Arc<CorrespondentSet>,
    status: Arc<StatusRegister>,
    settings: ReconcileSettings,
    shutdown: CancellationToken,
    background: Arc<Mutex<Option<JoinHandle<RunSummary>>>>,
}

impl Reconciler {
    pub fn new(
        source: Arc<dyn HistorySource>,
        conversations: Arc<ConversationStore>,
        pending: Arc<PendingQueue>,
        correspondents: Arc<CorrespondentSet>,
        status: Arc<StatusRegister>,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            source,
            conversations,
            pending,
            correspondents,
            status,
            settings,
            shutdown: CancellationToken::new(),
            background: Arc::new(Mutex::new(None)),
        }
    }

    pub fn settings(&self) -> ReconcileSettings {
        self.settings
    }

    /// Run to completion on the current task.
    pub async fn run(&self) -> Result<RunSummary, DmRelayError> {
        let targets = self.correspondents.snapshot();
        if !self.status.try_start(targets.len()) {
            return Err(DmRelayError::JobAlreadyRunning);
        }
        Ok(self.execute(targets).await)
    }

    /// Start a run in the background. Rejected, not queued, while one is running.
    pub fn trigger(&self) -> TriggerOutcome {
        let targets = self.correspondents.snapshot();
        if !self.status.try_start(targets.len()) {
            debug!("reconciliation trigger rejected, run in progress");
            return TriggerOutcome::RejectedAlreadyRunning;
        }
        let this = self.clone();
        let handle = tokio::spawn(async move { this.execute(targets).await });
        *self
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        TriggerOutcome::Accepted
    }

    /// Cancel any run in progress and wait for its tasks to settle.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let handle = self
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "background reconciliation run failed");
            }
        }
    }

    async fn execute(&self, targets: Vec<CorrespondentId>) -> RunSummary {
        let mut summary = RunSummary::new(targets.len());
        let deadline = Instant::now() + self.settings.timeout;
        let gate = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let cancel = self.shutdown.child_token();

        info!(
            total = targets.len(),
            concurrency = self.settings.concurrency,
            timeout_secs = self.settings.timeout.as_secs(),
            "reconciliation run started"
        );

        let mut tasks = JoinSet::new();
        let mut owners = HashMap::with_capacity(targets.len());
        for correspondent in targets {
            let this = self.clone();
            let gate = Arc::clone(&gate);
            let cancel = cancel.clone();
            let handle = tasks.spawn(async move {
                this.reconcile_one(correspondent, gate, cancel, deadline)
                    .await
            });
            owners.insert(handle.id(), correspondent);
        }

        let mut expired = false;
        loop {
            tokio::select! {
                joined = tasks.join_next() => {
                    let Some(joined) = joined else { break };
                    match joined {
                        Ok(outcome) => summary.record(outcome),
                        Err(e) => {
                            let correspondent = owners.get(&e.id()).copied();
                            error!(?correspondent, error = %e, "reconciliation task aborted");
                            if let Some(correspondent) = correspondent {
                                self.flush_pending(correspondent);
                            }
                            self.status.increment_failed();
                            summary.record(TaskOutcome::Failed);
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline), if !expired => {
                    expired = true;
                    warn!(
                        outstanding = tasks.len(),
                        "reconciliation deadline reached, cancelling outstanding fetches"
                    );
                    cancel.cancel();
                }
                _ = cancel.cancelled(), if !expired => {
                    expired = true;
                    info!(outstanding = tasks.len(), "reconciliation run cancelled");
                }
            }
        }

        summary.phase = self.status.finish().phase;
        info!(
            reconciled = summary.reconciled,
            failed = summary.failed,
            timed_out = summary.timed_out,
            phase = %summary.phase,
            "reconciliation run finished"
        );
        summary
    }

    async fn reconcile_one(
        self,
        correspondent: CorrespondentId,
        gate: Arc<Semaphore>,
        cancel: CancellationToken,
        deadline: Instant,
    ) -> TaskOutcome {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = Arc::clone(&gate).acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            debug!(%correspondent, "reconciliation never started");
            self.status.increment_failed();
            return TaskOutcome::NotStarted;
        };

        if !self.pending.begin(correspondent) {
            debug!(%correspondent, "pending buffer already open");
        }

        let fetch = self.source.fetch_history(
            correspondent,
            self.settings.fetch_limit,
            cancel.child_token(),
        );
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(self.timeout_error()),
            result = tokio::time::timeout_at(deadline, fetch) => {
                result.unwrap_or_else(|_| Err(self.timeout_error()))
            }
        };

        let buffered = self.pending.drain_and_close(correspondent);
        drop(permit);

        match fetched {
            Ok(remote) => {
                let existing = self
                    .conversations
                    .snapshot(correspondent)
                    .map(|c| c.messages)
                    .unwrap_or_default();
                let merged = merge(&existing, &remote, &buffered);
                let commit = self.conversations.replace_reconciled(correspondent, merged);
                self.status.increment_completed();
                debug!(
                    %correspondent,
                    remote = remote.len(),
                    buffered = buffered.len(),
                    before = commit.before,
                    after = commit.after,
                    "conversation reconciled"
                );
                TaskOutcome::Reconciled
            }
            Err(e) => {
                if e.is_fetch_failure() {
                    warn!(
                        %correspondent,
                        error = %e,
                        buffered = buffered.len(),
                        "history fetch failed, keeping local conversation"
                    );
                } else {
                    error!(
                        %correspondent,
                        error = %e,
                        buffered = buffered.len(),
                        "history source returned an unexpected error"
                    );
                }
                for message in buffered {
                    self.conversations.append_local(correspondent, message);
                }
                self.status.increment_failed();
                if matches!(e, DmRelayError::Timeout { .. }) {
                    TaskOutcome::TimedOut
                } else {
                    TaskOutcome::Failed
                }
            }
        }
    }

    fn flush_pending(&self, correspondent: CorrespondentId) {
        for message in self.pending.drain_and_close(correspondent) {
            self.conversations.append_local(correspondent, message);
        }
    }

    fn timeout_error(&self) -> DmRelayError {
        DmRelayError::Timeout {
            duration: self.settings.timeout,
        }
    }
}
