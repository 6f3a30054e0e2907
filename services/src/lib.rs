pub mod error;
pub mod geofence;
pub mod live_roster;
pub mod presence_ledger;
pub mod token_authority;
