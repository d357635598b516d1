// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock history source for deterministic testing.
//!
//! Each correspondent gets a [`FetchScript`]. Unscripted correspondents have
//! an empty history. A per-call delay makes fetches overlap so tests can
//! observe the admission gate through [`MockHistory::max_in_flight`], and a
//! hook runs inside the fetch window to simulate live traffic racing it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use dmrelay_core::{CorrespondentId, DmRelayError, HistorySource, Message};
use tokio_util::sync::CancellationToken;

/// Scripted answer for one correspondent.
#[derive(Debug, Clone)]
pub enum FetchScript {
    /// Return these messages (oldest first), trimmed to the newest `limit`.
    History(Vec<Message>),
    /// Fail with a retryable error.
    Transient,
    /// Fail with an authorization error.
    Auth,
}

type Hook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Scripts {
    answers: HashMap<CorrespondentId, FetchScript>,
    delays: HashMap<CorrespondentId, Duration>,
    hooks: HashMap<CorrespondentId, Hook>,
    calls: HashMap<CorrespondentId, usize>,
}

/// A mock remote history for testing.
#[derive(Default)]
pub struct MockHistory {
    scripts: Mutex<Scripts>,
    default_delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch sleeps for `delay` before answering, unless cancelled.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn set_history(&self, correspondent: CorrespondentId, messages: Vec<Message>) {
        self.set_script(correspondent, FetchScript::History(messages));
    }

    pub fn set_script(&self, correspondent: CorrespondentId, script: FetchScript) {
        self.lock().answers.insert(correspondent, script);
    }

    pub fn set_delay(&self, correspondent: CorrespondentId, delay: Duration) {
        self.lock().delays.insert(correspondent, delay);
    }

    /// Run `hook` once the fetch for `correspondent` has started, before it answers.
    pub fn on_fetch(&self, correspondent: CorrespondentId, hook: impl Fn() + Send + Sync + 'static) {
        self.lock().hooks.insert(correspondent, Arc::new(hook));
    }

    /// Number of fetches issued for `correspondent`.
    pub fn calls(&self, correspondent: CorrespondentId) -> usize {
        self.lock().calls.get(&correspondent).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    /// Highest number of fetches ever observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Scripts> {
        self.scripts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(gauge: &'a AtomicUsize, high_water: &AtomicUsize) -> Self {
        let now = gauge.fetch_add(1, Ordering::SeqCst) + 1;
        high_water.fetch_max(now, Ordering::SeqCst);
        Self(gauge)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl HistorySource for MockHistory {
    async fn fetch_history(
        &self,
        correspondent: CorrespondentId,
        limit: usize,
        cancel: CancellationToken,
    ) -> Result<Vec<Message>, DmRelayError> {
        let (script, delay, hook) = {
            let mut scripts = self.lock();
            *scripts.calls.entry(correspondent).or_default() += 1;
            (
                scripts.answers.get(&correspondent).cloned(),
                scripts
                    .delays
                    .get(&correspondent)
                    .copied()
                    .unwrap_or(self.default_delay),
                scripts.hooks.get(&correspondent).cloned(),
            )
        };
        let _gauge = InFlight::enter(&self.in_flight, &self.max_in_flight);

        if let Some(hook) = hook {
            hook();
        }
        if !delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(DmRelayError::Transient {
                        message: "fetch cancelled".into(),
                        source: None,
                    });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        match script {
            None => Ok(Vec::new()),
            Some(FetchScript::History(messages)) => {
                let skip = messages.len().saturating_sub(limit);
                Ok(messages.into_iter().skip(skip).collect())
            }
            Some(FetchScript::Transient) => Err(DmRelayError::Transient {
                message: format!("scripted failure for {correspondent}"),
                source: None,
            }),
            Some(FetchScript::Auth) => Err(DmRelayError::Auth {
                message: format!("scripted 403 for {correspondent}"),
            }),
        }
    }
}
