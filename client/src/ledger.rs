//! Capability interface over the authoritative ledger, as seen from the
//! device. `InProcessLedger` talks to the embedded services directly; tests
//! substitute fakes behind [`LedgerClient`].

use async_trait::async_trait;
use chrono::Utc;
use db::events::ChangeFeed;
use sea_orm::DatabaseConnection;
use services::error::LedgerError;
use services::presence_ledger::{AdmitRequest, Admission, PresenceLedger};
use thiserror::Error;

use crate::claim::PresenceClaim;

/// Transient, retryable transport/storage failure. A queued claim that hits
/// this stays queued; rejections come back inside `Admission` instead.
#[derive(Debug, Clone, Error)]
#[error("attendance ledger unreachable: {0}")]
pub struct LedgerUnavailable(pub String);

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn admit(&self, claim: &PresenceClaim) -> Result<Admission, LedgerUnavailable>;
}

pub struct InProcessLedger {
    db: DatabaseConnection,
    feed: ChangeFeed,
}

impl InProcessLedger {
    pub fn new(db: DatabaseConnection, feed: ChangeFeed) -> Self {
        Self { db, feed }
    }
}

#[async_trait]
impl LedgerClient for InProcessLedger {
    async fn admit(&self, claim: &PresenceClaim) -> Result<Admission, LedgerUnavailable> {
        let req = AdmitRequest {
            session_id: claim.session_id,
            student_id: claim.student_id,
            method: claim.method,
            claimed_coords: claim.coords,
            presented_token: claim.token.clone(),
            marked_at: claim.marked_at,
        };

        PresenceLedger::admit(&self.db, &self.feed, &req, Utc::now())
            .await
            .map_err(|e: LedgerError| LedgerUnavailable(e.to_string()))
    }
}
