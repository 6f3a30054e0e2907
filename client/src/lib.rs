//! Device-resident side of the attendance protocol: a durable outbox for
//! presence claims captured while disconnected, and the coordinator that
//! drains it against the ledger once connectivity returns.

pub mod claim;
pub mod connectivity;
pub mod ledger;
pub mod outbox;
pub mod sync;
