//! Change-notification feed for new presence admissions.
//!
//! The ledger publishes one `PresenceAdmitted` per freshly persisted event;
//! observers (the live roster) subscribe and filter by session. Replays of
//! already-admitted claims are never published.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::presence_event::Method;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceAdmitted {
    pub session_id: i64,
    pub student_id: i64,
    pub method: Method,
    pub admitted_at: DateTime<Utc>,
}

/// In-process stand-in for the persistence layer's insert feed. Lagged
/// subscribers lose oldest notifications first (bounded buffer); the roster
/// reconciles against the snapshot query, so a lag is not fatal.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<PresenceAdmitted>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PresenceAdmitted> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: PresenceAdmitted) {
        // Err means no live subscribers; nothing to deliver.
        if self.tx.send(event).is_err() {
            log::debug!("presence admission published with no subscribers");
        }
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_admissions() {
        let feed = ChangeFeed::default();
        let mut rx = feed.subscribe();

        feed.publish(PresenceAdmitted {
            session_id: 7,
            student_id: 11,
            method: Method::TokenScan,
            admitted_at: Utc::now(),
        });

        let got = rx.recv().await.expect("notification");
        assert_eq!(got.session_id, 7);
        assert_eq!(got.student_id, 11);
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let feed = ChangeFeed::default();
        feed.publish(PresenceAdmitted {
            session_id: 1,
            student_id: 2,
            method: Method::Manual,
            admitted_at: Utc::now(),
        });
    }
}
