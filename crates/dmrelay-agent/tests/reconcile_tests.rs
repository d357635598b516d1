// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end reconciliation tests against scripted history sources.

use std::sync::Arc;
use std::time::Duration;

use dmrelay_agent::{ReconcileSettings, Relay, RelayOptions};
use dmrelay_core::{CorrespondentId, DmRelayError, JobPhase, Message, TriggerOutcome};
use dmrelay_storage::{DurableStore, Table};
use dmrelay_test_utils::{FetchScript, MockHistory, MockSender, ts};

const ALICE: CorrespondentId = CorrespondentId(100);
const BOB: CorrespondentId = CorrespondentId(200);
const CAROL: CorrespondentId = CorrespondentId(300);

fn options(concurrency: usize, timeout: Duration) -> RelayOptions {
    RelayOptions {
        dedup_window: 16,
        debounce: Duration::from_millis(10),
        reconcile: ReconcileSettings {
            fetch_limit: 100,
            concurrency,
            timeout,
        },
    }
}

fn relay_with(history: &Arc<MockHistory>, options: RelayOptions) -> Arc<Relay> {
    Arc::new(Relay::in_memory(
        options,
        history.clone(),
        Arc::new(MockSender::new()),
    ))
}

fn ids(relay: &Relay, correspondent: CorrespondentId) -> Vec<u64> {
    relay
        .conversation_snapshot(correspondent)
        .map(|c| c.messages.iter().map(|m| m.id.0).collect())
        .unwrap_or_default()
}

/// Seed a read conversation holding `m1@t1`.
fn seed(relay: &Relay, correspondent: CorrespondentId) {
    relay.ingest_live(correspondent, Message::inbound(1, ts(1), "m1"));
    relay.mark_read(correspondent);
}

#[tokio::test]
async fn live_message_during_fetch_is_merged_once_with_one_unread() {
    let history = Arc::new(MockHistory::new());
    let relay = relay_with(&history, options(4, Duration::from_secs(30)));
    seed(&relay, ALICE);

    history.set_history(
        ALICE,
        vec![
            Message::inbound(1, ts(1), "m1"),
            Message::inbound(2, ts(2), "m2"),
        ],
    );
    let live = Arc::clone(&relay);
    history.on_fetch(ALICE, move || {
        live.ingest_live(ALICE, Message::inbound(3, ts(3), "m3"));
    });

    let summary = relay.run_reconciliation().await.unwrap();
    assert_eq!(summary.phase, JobPhase::Completed);
    assert_eq!(summary.reconciled, 1);

    let convo = relay.conversation_snapshot(ALICE).unwrap();
    let got: Vec<u64> = convo.messages.iter().map(|m| m.id.0).collect();
    assert_eq!(got, vec![1, 2, 3]);
    assert_eq!(convo.unread_count, 1);
    assert!(convo.last_reconciled_at.is_some());
}

#[tokio::test]
async fn live_message_survives_a_failed_fetch() {
    let history = Arc::new(MockHistory::new());
    let relay = relay_with(&history, options(4, Duration::from_secs(30)));
    seed(&relay, ALICE);

    history.set_script(ALICE, FetchScript::Transient);
    let live = Arc::clone(&relay);
    history.on_fetch(ALICE, move || {
        live.ingest_live(ALICE, Message::inbound(3, ts(3), "m3"));
    });

    let summary = relay.run_reconciliation().await.unwrap();
    assert_eq!(summary.phase, JobPhase::CompletedWithFailures);
    assert_eq!(summary.failed, 1);

    let convo = relay.conversation_snapshot(ALICE).unwrap();
    let got: Vec<u64> = convo.messages.iter().map(|m| m.id.0).collect();
    assert_eq!(got, vec![1, 3]);
    assert_eq!(convo.unread_count, 1);
    assert!(convo.last_reconciled_at.is_none());
}

#[tokio::test]
async fn redelivery_during_fetch_does_not_count_as_unread_again() {
    let history = Arc::new(MockHistory::new());
    let relay = relay_with(&history, options(4, Duration::from_secs(30)));
    assert!(relay.ingest_live(ALICE, Message::inbound(3, ts(3), "m3")));

    history.set_history(ALICE, vec![Message::inbound(3, ts(3), "m3")]);
    let live = Arc::clone(&relay);
    history.on_fetch(ALICE, move || {
        assert!(!live.ingest_live(ALICE, Message::inbound(3, ts(3), "m3")));
    });

    let summary = relay.run_reconciliation().await.unwrap();
    assert_eq!(summary.reconciled, 1);

    let convo = relay.conversation_snapshot(ALICE).unwrap();
    assert_eq!(convo.messages.len(), 1);
    assert_eq!(convo.unread_count, 1);
}

#[tokio::test]
async fn redelivery_outside_a_run_does_not_count_as_unread_again() {
    let history = Arc::new(MockHistory::new());
    let relay = relay_with(&history, options(4, Duration::from_secs(30)));
    assert!(relay.ingest_live(ALICE, Message::inbound(3, ts(3), "m3")));
    assert!(!relay.ingest_live(ALICE, Message::inbound(3, ts(3), "m3")));
    assert_eq!(relay.total_unread(), 1);
}

#[tokio::test]
async fn live_message_also_captured_remotely_appears_once() {
    let history = Arc::new(MockHistory::new());
    let relay = relay_with(&history, options(4, Duration::from_secs(30)));
    seed(&relay, ALICE);

    history.set_history(
        ALICE,
        vec![
            Message::inbound(1, ts(1), "m1"),
            Message::inbound(3, ts(3), "m3"),
        ],
    );
    let live = Arc::clone(&relay);
    history.on_fetch(ALICE, move || {
        live.ingest_live(ALICE, Message::inbound(3, ts(3), "m3"));
    });

    relay.run_reconciliation().await.unwrap();
    assert_eq!(ids(&relay, ALICE), vec![1, 3]);
}

#[tokio::test]
async fn rerun_with_stable_history_is_idempotent() {
    let history = Arc::new(MockHistory::new());
    let relay = relay_with(&history, options(2, Duration::from_secs(30)));
    for correspondent in [ALICE, BOB] {
        seed(&relay, correspondent);
        history.set_history(
            correspondent,
            vec![
                Message::inbound(1, ts(1), "m1"),
                Message::outbound(2, ts(2), "reply"),
                Message::inbound(4, ts(4), "m4"),
            ],
        );
    }

    relay.run_reconciliation().await.unwrap();
    let first: Vec<_> = [ALICE, BOB]
        .iter()
        .map(|c| relay.conversation_snapshot(*c).unwrap().messages)
        .collect();

    relay.run_reconciliation().await.unwrap();
    let second: Vec<_> = [ALICE, BOB]
        .iter()
        .map(|c| relay.conversation_snapshot(*c).unwrap().messages)
        .collect();

    assert_eq!(first, second);
    assert_eq!(ids(&relay, ALICE), vec![1, 2, 4]);
    assert_eq!(history.calls(ALICE), 2);
}

#[tokio::test(start_paused = true)]
async fn admission_gate_bounds_concurrent_fetches() {
    let history = Arc::new(MockHistory::new().with_delay(Duration::from_millis(50)));
    let relay = relay_with(&history, options(2, Duration::from_secs(30)));
    for i in 1..=10 {
        seed(&relay, CorrespondentId(i));
    }

    let summary = relay.run_reconciliation().await.unwrap();
    assert_eq!(summary.total, 10);
    assert_eq!(summary.reconciled, 10);
    assert_eq!(history.total_calls(), 10);
    assert!(history.max_in_flight() <= 2, "saw {}", history.max_in_flight());
    assert_eq!(history.max_in_flight(), 2);
}

#[tokio::test(start_paused = true)]
async fn deadline_leaves_partial_but_consistent_state() {
    let history = Arc::new(MockHistory::new().with_delay(Duration::from_secs(2)));
    let relay = relay_with(&history, options(1, Duration::from_secs(5)));
    let everyone: Vec<_> = (1..=5).map(CorrespondentId).collect();
    for &correspondent in &everyone {
        seed(&relay, correspondent);
        history.set_history(
            correspondent,
            vec![
                Message::inbound(1, ts(1), "m1"),
                Message::inbound(2, ts(2), "m2"),
            ],
        );
        let live = Arc::clone(&relay);
        history.on_fetch(correspondent, move || {
            live.ingest_live(correspondent, Message::inbound(99, ts(99), "live"));
        });
    }

    let summary = relay.run_reconciliation().await.unwrap();
    assert_eq!(summary.phase, JobPhase::CompletedWithFailures);
    assert_eq!(summary.reconciled, 2);
    assert_eq!(summary.failed, 3);
    assert_eq!(summary.timed_out, 3);

    let state = relay.status_snapshot();
    assert_eq!(state.completed, 2);
    assert_eq!(state.failed, 3);
    assert_eq!(state.outstanding(), 0);
    assert!(state.finished_at.is_some());

    let mut reconciled = 0;
    for correspondent in everyone {
        let convo = relay.conversation_snapshot(correspondent).unwrap();
        let got: Vec<u64> = convo.messages.iter().map(|m| m.id.0).collect();
        if convo.last_reconciled_at.is_some() {
            reconciled += 1;
            assert_eq!(got, vec![1, 2, 99]);
        } else if history.calls(correspondent) > 0 {
            // Cut off mid-fetch: prior state plus the flushed live message.
            assert_eq!(got, vec![1, 99]);
        } else {
            assert_eq!(got, vec![1]);
        }
    }
    assert_eq!(reconciled, 2);
}

#[tokio::test(start_paused = true)]
async fn second_request_is_rejected_while_running() {
    let history = Arc::new(MockHistory::new().with_delay(Duration::from_secs(1)));
    let relay = relay_with(&history, options(2, Duration::from_secs(30)));
    seed(&relay, ALICE);

    assert_eq!(relay.trigger_reconciliation(), TriggerOutcome::Accepted);
    assert_eq!(
        relay.trigger_reconciliation(),
        TriggerOutcome::RejectedAlreadyRunning
    );
    assert!(matches!(
        relay.run_reconciliation().await,
        Err(DmRelayError::JobAlreadyRunning)
    ));

    while !relay.status_snapshot().phase.is_terminal() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(relay.status_snapshot().phase, JobPhase::Completed);
    assert_eq!(relay.trigger_reconciliation(), TriggerOutcome::Accepted);
    relay.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn slow_correspondent_times_out_alone() {
    let history = Arc::new(MockHistory::new());
    let relay = relay_with(&history, options(3, Duration::from_secs(5)));
    for correspondent in [ALICE, BOB, CAROL] {
        seed(&relay, correspondent);
        history.set_history(
            correspondent,
            vec![
                Message::inbound(1, ts(1), "m1"),
                Message::inbound(2, ts(2), "m2"),
            ],
        );
    }
    history.set_delay(ALICE, Duration::from_secs(60));

    let summary = relay.run_reconciliation().await.unwrap();
    assert_eq!(summary.phase, JobPhase::CompletedWithFailures);
    assert_eq!(summary.reconciled, 2);
    assert_eq!(summary.timed_out, 1);
    assert_eq!(ids(&relay, ALICE), vec![1]);
    assert_eq!(ids(&relay, BOB), vec![1, 2]);
    assert_eq!(ids(&relay, CAROL), vec![1, 2]);
}

#[tokio::test]
async fn auth_failure_does_not_abort_siblings() {
    let history = Arc::new(MockHistory::new());
    let relay = relay_with(&history, options(3, Duration::from_secs(30)));
    for correspondent in [ALICE, BOB, CAROL] {
        seed(&relay, correspondent);
        history.set_history(
            correspondent,
            vec![
                Message::inbound(1, ts(1), "m1"),
                Message::inbound(2, ts(2), "m2"),
            ],
        );
    }
    history.set_script(BOB, FetchScript::Auth);

    let summary = relay.run_reconciliation().await.unwrap();
    assert_eq!(summary.reconciled, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.timed_out, 0);
    assert_eq!(ids(&relay, ALICE), vec![1, 2]);
    assert_eq!(ids(&relay, BOB), vec![1]);
    assert_eq!(ids(&relay, CAROL), vec![1, 2]);
}

#[tokio::test]
async fn correspondents_found_mid_run_wait_for_the_next_run() {
    let history = Arc::new(MockHistory::new());
    let relay = relay_with(&history, options(1, Duration::from_secs(30)));
    seed(&relay, ALICE);

    let live = Arc::clone(&relay);
    history.on_fetch(ALICE, move || {
        live.ingest_live(BOB, Message::inbound(7, ts(7), "new here"));
    });

    let summary = relay.run_reconciliation().await.unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(history.calls(BOB), 0);
    assert_eq!(ids(&relay, BOB), vec![7]);
    assert_eq!(relay.correspondents(), vec![ALICE, BOB]);
}

#[tokio::test]
async fn state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let history = Arc::new(MockHistory::new());
    history.set_history(
        ALICE,
        vec![
            Message::inbound(1, ts(1), "m1"),
            Message::inbound(2, ts(2), "m2"),
        ],
    );

    {
        let store = DurableStore::open(dir.path()).unwrap();
        let relay = Relay::restore(
            store,
            options(2, Duration::from_secs(30)),
            history.clone(),
            Arc::new(MockSender::new()),
        );
        relay.ingest_live(ALICE, Message::inbound(1, ts(1), "m1"));
        relay.ingest_live(BOB, Message::inbound(5, ts(5), "hello"));
        relay.set_stored_token("secret");
        relay.run_reconciliation().await.unwrap();
        relay.shutdown().await;
    }

    let store = DurableStore::open(dir.path()).unwrap();
    let relay = Relay::restore(
        store,
        options(2, Duration::from_secs(30)),
        history,
        Arc::new(MockSender::new()),
    );
    assert_eq!(relay.correspondents(), vec![ALICE, BOB]);
    assert_eq!(ids(&relay, ALICE), vec![1, 2]);
    assert_eq!(ids(&relay, BOB), vec![5]);
    assert_eq!(relay.total_unread(), 2);
    assert_eq!(relay.stored_token().as_deref(), Some("secret"));
    relay.shutdown().await;
}

#[tokio::test]
async fn corrupt_conversations_table_keeps_correspondents() {
    let dir = tempfile::tempdir().unwrap();
    let store = DurableStore::open(dir.path()).unwrap();
    store
        .save_blocking(Table::Correspondents, &vec![ALICE, BOB])
        .unwrap();
    std::fs::write(store.path(Table::Conversations), b"{\"100\": [").unwrap();

    let relay = Relay::restore(
        store,
        options(2, Duration::from_secs(30)),
        Arc::new(MockHistory::new()),
        Arc::new(MockSender::new()),
    );
    assert_eq!(relay.correspondents(), vec![ALICE, BOB]);
    assert!(relay.conversation_summaries().is_empty());
    relay.shutdown().await;
}
