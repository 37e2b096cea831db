//! Temporal conflict resolution for out-of-order event delivery.
//!
//! Webhook delivery is at-least-once and unordered. Instead of a distributed
//! sequence number, every record carries the `occurred_at` of the event that
//! last updated it, and an incoming update is only applied if it is not
//! strictly older than that.

use time::OffsetDateTime;

/// Returns `false` only when both timestamps are present and the incoming one
/// is strictly earlier than the stored one. A record created by bulk pull
/// (no prior timestamp) accepts anything; an update without a timestamp is
/// always accepted; equal timestamps are accepted so redelivery stays
/// idempotent.
///
/// Pure predicate: the caller is responsible for leaving state untouched on
/// rejection.
pub fn accepts(existing: Option<OffsetDateTime>, incoming: Option<OffsetDateTime>) -> bool {
    match (existing, incoming) {
        (Some(existing), Some(incoming)) => incoming >= existing,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const T1: OffsetDateTime = datetime!(2024-03-01 10:00 UTC);
    const T2: OffsetDateTime = datetime!(2024-03-01 11:00 UTC);

    #[test]
    fn rejects_strictly_older_incoming() {
        assert!(!accepts(Some(T2), Some(T1)));
    }

    #[test]
    fn accepts_newer_incoming() {
        assert!(accepts(Some(T1), Some(T2)));
    }

    #[test]
    fn accepts_equal_timestamps() {
        assert!(accepts(Some(T1), Some(T1)));
    }

    #[test]
    fn accepts_when_no_prior_timestamp() {
        assert!(accepts(None, Some(T1)));
    }

    #[test]
    fn accepts_untimestamped_incoming() {
        assert!(accepts(Some(T2), None));
        assert!(accepts(None, None));
    }
}
