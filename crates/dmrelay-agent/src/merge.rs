// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Union merge of the three message sources seen during reconciliation.

use std::collections::HashSet;

use dmrelay_core::Message;

/// Merge `existing`, `remote` and `pending` into one chronological sequence.
///
/// Every id appears once; the first copy in `existing`, then `remote`, then
/// `pending` order is kept. The result is ordered by timestamp, and messages
/// with equal timestamps keep that same source precedence and their relative
/// order within the source. The output always contains every id of
/// `existing`.
pub fn merge(existing: &[Message], remote: &[Message], pending: &[Message]) -> Vec<Message> {
    let mut seen = HashSet::with_capacity(existing.len() + remote.len() + pending.len());
    let mut merged: Vec<Message> = existing
        .iter()
        .chain(remote)
        .chain(pending)
        .filter(|m| seen.insert(m.id))
        .cloned()
        .collect();
    // Stable: ties stay in source-precedence order.
    merged.sort_by_key(|m| m.timestamp);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use dmrelay_core::MessageId;
    use proptest::prelude::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn ids(messages: &[Message]) -> Vec<u64> {
        messages.iter().map(|m| m.id.0).collect()
    }

    #[test]
    fn remote_extends_existing_and_pending_lands_last() {
        let existing = vec![Message::inbound(1, at(1), "m1")];
        let remote = vec![
            Message::inbound(1, at(1), "m1"),
            Message::outbound(2, at(2), "m2"),
        ];
        let pending = vec![Message::inbound(3, at(3), "m3")];

        assert_eq!(ids(&merge(&existing, &remote, &pending)), vec![1, 2, 3]);
    }

    #[test]
    fn local_messages_missing_from_lagging_remote_survive() {
        let existing = vec![
            Message::inbound(1, at(1), "a"),
            Message::inbound(5, at(5), "only local"),
        ];
        let remote = vec![Message::inbound(1, at(1), "a"), Message::inbound(2, at(2), "b")];

        assert_eq!(ids(&merge(&existing, &remote, &[])), vec![1, 2, 5]);
    }

    #[test]
    fn equal_timestamps_prefer_existing_then_remote_then_pending() {
        let existing = vec![Message::inbound(30, at(7), "e")];
        let remote = vec![Message::inbound(20, at(7), "r1"), Message::inbound(21, at(7), "r2")];
        let pending = vec![Message::inbound(10, at(7), "p")];

        assert_eq!(ids(&merge(&existing, &remote, &pending)), vec![30, 20, 21, 10]);
    }

    #[test]
    fn milliseconds_order_messages_within_one_second() {
        let ms = |millis: i64| at(0) + chrono::Duration::milliseconds(millis);
        let existing = vec![Message::inbound(1, ms(900), "a")];
        let remote = vec![Message::inbound(2, ms(100), "x"), Message::inbound(1, ms(900), "a")];

        assert_eq!(ids(&merge(&existing, &remote, &[])), vec![2, 1]);
    }

    #[test]
    fn first_copy_of_a_duplicate_wins() {
        let existing = vec![Message::inbound(1, at(1), "stored body")];
        let remote = vec![Message::inbound(1, at(1), "remote body")];

        let merged = merge(&existing, &remote, &[]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].body, "stored body");
    }

    fn arb_source() -> impl Strategy<Value = Vec<Message>> {
        prop::collection::vec((0u64..20, 0i64..10), 0..15).prop_map(|raw| {
            raw.into_iter()
                .map(|(id, ts)| Message::inbound(id, at(ts), format!("m{id}")))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn merged_ids_are_unique_sorted_and_cover_existing(
            existing in arb_source(),
            remote in arb_source(),
            pending in arb_source(),
        ) {
            let merged = merge(&existing, &remote, &pending);

            prop_assert!(merged.len() <= existing.len() + remote.len() + pending.len());

            let unique: HashSet<MessageId> = merged.iter().map(|m| m.id).collect();
            prop_assert_eq!(unique.len(), merged.len());

            prop_assert!(merged.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

            for m in existing.iter().chain(&remote).chain(&pending) {
                prop_assert!(unique.contains(&m.id));
            }
        }

        #[test]
        fn merging_a_result_again_changes_nothing(
            existing in arb_source(),
            remote in arb_source(),
        ) {
            let once = merge(&existing, &remote, &[]);
            let twice = merge(&once, &remote, &[]);
            prop_assert_eq!(once, twice);
        }
    }
}
