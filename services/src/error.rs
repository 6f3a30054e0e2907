use sea_orm::DbErr;
use thiserror::Error;

/// Infrastructure failures from the ledger. Transient and retryable — never
/// conflated with an admission rejection, which is an expected outcome.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("persistence unavailable: {0}")]
    Db(#[from] DbErr),
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("persistence unavailable: {0}")]
    Db(#[from] DbErr),
    #[error("attendance session {0} not found")]
    SessionNotFound(i64),
    #[error("attendance session {0} has ended")]
    SessionClosed(i64),
}
