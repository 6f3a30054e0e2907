use chrono::{DateTime, Utc};
use db::models::presence_event::Method;
use serde::{Deserialize, Serialize};

/// A presence claim as captured on the device: everything the ledger needs
/// to decide admission. The token value is the one read at scan time — it
/// may well be expired by the time an offline claim reaches the ledger,
/// which surfaces as a reported rejection, never a silent drop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceClaim {
    pub session_id: i64,
    pub student_id: i64,
    pub method: Method,
    pub coords: Option<(f64, f64)>,
    pub token: Option<String>,
    pub marked_at: DateTime<Utc>,
}
