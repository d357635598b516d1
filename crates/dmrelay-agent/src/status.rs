// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job progress register polled by the UI.
//!
//! Guarded by its own lock, never taken while another store lock is held.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use dmrelay_core::{JobPhase, JobState};

#[derive(Default)]
pub struct StatusRegister {
    state: Mutex<JobState>,
}

impl StatusRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to `Running` for a run over `total` correspondents.
    ///
    /// Returns `false` without touching anything when a run is already in
    /// progress. Any other phase, terminal ones included, may start a run.
    pub fn try_start(&self, total: usize) -> bool {
        let mut state = self.lock();
        if state.phase == JobPhase::Running {
            return false;
        }
        *state = JobState {
            phase: JobPhase::Running,
            started_at: Some(Utc::now()),
            finished_at: None,
            completed: 0,
            failed: 0,
            total,
        };
        true
    }

    pub fn set_phase(&self, phase: JobPhase) {
        let mut state = self.lock();
        state.phase = phase;
        if phase.is_terminal() {
            state.finished_at = Some(Utc::now());
        }
    }

    pub fn increment_completed(&self) {
        self.lock().completed += 1;
    }

    pub fn increment_failed(&self) {
        self.lock().failed += 1;
    }

    /// Close the current run, choosing the terminal phase from the failure count.
    pub fn finish(&self) -> JobState {
        let mut state = self.lock();
        state.phase = if state.failed == 0 {
            JobPhase::Completed
        } else {
            JobPhase::CompletedWithFailures
        };
        state.finished_at = Some(Utc::now());
        state.clone()
    }

    pub fn read(&self) -> JobState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let status = StatusRegister::new();
        assert_eq!(status.read().phase, JobPhase::Idle);
    }

    #[test]
    fn second_start_is_rejected_while_running() {
        let status = StatusRegister::new();
        assert!(status.try_start(3));
        assert!(!status.try_start(5));
        assert_eq!(status.read().total, 3);
    }

    #[test]
    fn finish_picks_phase_from_failures() {
        let status = StatusRegister::new();
        status.try_start(2);
        status.increment_completed();
        status.increment_completed();
        assert_eq!(status.finish().phase, JobPhase::Completed);

        assert!(status.try_start(2));
        assert_eq!(status.read().completed, 0);
        status.increment_completed();
        status.increment_failed();
        let done = status.finish();
        assert_eq!(done.phase, JobPhase::CompletedWithFailures);
        assert!(done.finished_at.is_some());
        assert_eq!(done.outstanding(), 0);
    }

    #[test]
    fn terminal_set_phase_stamps_finish_time() {
        let status = StatusRegister::new();
        status.set_phase(JobPhase::Running);
        assert!(status.read().finished_at.is_none());
        status.set_phase(JobPhase::Completed);
        assert!(status.read().finished_at.is_some());
    }
}
