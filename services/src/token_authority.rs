//! Rotating proof-of-presence tokens. One live value per session; a new
//! issue atomically supersedes the previous value (single-row update, last
//! writer wins). Validation never consumes nor rotates — the same displayed
//! code is scanned by many students until it expires.

use chrono::{DateTime, Duration, Utc};
use db::models::attendance_session::Model as Session;
use rand::RngCore;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, IntoActiveModel, Set};

use crate::error::TokenError;

#[derive(Debug, Clone, PartialEq)]
pub struct IssuedToken {
    pub session_id: i64,
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCheck {
    Valid,
    Invalid(TokenFault),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFault {
    Expired,
    Mismatch,
    NoActiveSession,
}

fn generate_value() -> String {
    let mut buf = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

pub struct TokenAuthority;

impl TokenAuthority {
    /// Issues a fresh token for the session, superseding any prior value.
    pub async fn issue(
        db: &DatabaseConnection,
        session_id: i64,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let session = Session::find_by_id(db, session_id)
            .await?
            .ok_or(TokenError::SessionNotFound(session_id))?;

        if !session.is_active() {
            return Err(TokenError::SessionClosed(session_id));
        }

        Self::rotate(db, session, now).await
    }

    /// The live token if one exists, re-issuing lazily when absent or
    /// expired.
    pub async fn current_or_issue(
        db: &DatabaseConnection,
        session_id: i64,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let session = Session::find_by_id(db, session_id)
            .await?
            .ok_or(TokenError::SessionNotFound(session_id))?;

        if !session.is_active() {
            return Err(TokenError::SessionClosed(session_id));
        }

        if let (Some(value), Some(expires_at)) = (&session.current_token, session.token_expires_at)
        {
            if now < expires_at {
                return Ok(IssuedToken {
                    session_id,
                    value: value.clone(),
                    expires_at,
                });
            }
        }

        Self::rotate(db, session, now).await
    }

    async fn rotate(
        db: &DatabaseConnection,
        session: Session,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let session_id = session.id;
        let ttl = i64::from(session.token_ttl_seconds.max(1));
        let value = generate_value();
        let expires_at = now + Duration::seconds(ttl);

        let mut active = session.into_active_model();
        active.current_token = Set(Some(value.clone()));
        active.token_expires_at = Set(Some(expires_at));
        active.updated_at = Set(now);
        active.update(db).await?;

        log::info!("rotated token for session {session_id}, valid for {ttl}s");

        Ok(IssuedToken {
            session_id,
            value,
            expires_at,
        })
    }

    pub async fn validate(
        db: &DatabaseConnection,
        session_id: i64,
        presented: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenCheck, DbErr> {
        let Some(session) = Session::find_by_id(db, session_id).await? else {
            return Ok(TokenCheck::Invalid(TokenFault::NoActiveSession));
        };
        Ok(Self::validate_against(&session, presented, now))
    }

    /// Pure comparison against a loaded session row. Validity is
    /// `presented == current && now < expires_at` — strictly before, so a
    /// token checked at its expiry instant is already expired.
    pub fn validate_against(session: &Session, presented: &str, now: DateTime<Utc>) -> TokenCheck {
        if !session.is_active() {
            return TokenCheck::Invalid(TokenFault::NoActiveSession);
        }

        match (&session.current_token, session.token_expires_at) {
            (Some(value), Some(expires_at)) => {
                if value != presented.trim() {
                    TokenCheck::Invalid(TokenFault::Mismatch)
                } else if now < expires_at {
                    TokenCheck::Valid
                } else {
                    TokenCheck::Invalid(TokenFault::Expired)
                }
            }
            _ => TokenCheck::Invalid(TokenFault::NoActiveSession),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use db::models::attendance_session::{Model as SessionModel, SessionMode};
    use db::models::{class, user};
    use db::test_utils::setup_test_db;

    async fn seed_session(db: &DatabaseConnection, ttl: i32) -> SessionModel {
        let instructor = user::Model::create(db, "prof1", "Prof One", "P-0001")
            .await
            .expect("create instructor");
        let class = class::Model::create(db, "Databases", "DB101", instructor.id, None, 50.0)
            .await
            .expect("create class");

        let now = Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap();
        SessionModel::create(
            db,
            class.id,
            instructor.id,
            SessionMode::InstructorPresents,
            false,
            Some(ttl),
            now,
        )
        .await
        .expect("create session")
    }

    #[tokio::test]
    async fn issue_supersedes_previous_token() {
        let db = setup_test_db().await;
        let sess = seed_session(&db, 60).await;
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap();

        let first = TokenAuthority::issue(&db, sess.id, now).await.unwrap();
        let second = TokenAuthority::issue(&db, sess.id, now).await.unwrap();
        assert_ne!(first.value, second.value);

        // the superseded value no longer validates
        let check = TokenAuthority::validate(&db, sess.id, &first.value, now)
            .await
            .unwrap();
        assert_eq!(check, TokenCheck::Invalid(TokenFault::Mismatch));

        let check = TokenAuthority::validate(&db, sess.id, &second.value, now)
            .await
            .unwrap();
        assert_eq!(check, TokenCheck::Valid);
    }

    #[tokio::test]
    async fn expiry_boundary_is_strict() {
        let db = setup_test_db().await;
        let sess = seed_session(&db, 60).await;
        let issued_at = Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap();

        let token = TokenAuthority::issue(&db, sess.id, issued_at).await.unwrap();

        let just_before = token.expires_at - Duration::milliseconds(1);
        let check = TokenAuthority::validate(&db, sess.id, &token.value, just_before)
            .await
            .unwrap();
        assert_eq!(check, TokenCheck::Valid);

        // exactly at the expiry instant the token is already expired
        let check = TokenAuthority::validate(&db, sess.id, &token.value, token.expires_at)
            .await
            .unwrap();
        assert_eq!(check, TokenCheck::Invalid(TokenFault::Expired));
    }

    #[tokio::test]
    async fn current_or_issue_reuses_live_token() {
        let db = setup_test_db().await;
        let sess = seed_session(&db, 60).await;
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap();

        let issued = TokenAuthority::issue(&db, sess.id, now).await.unwrap();
        let same = TokenAuthority::current_or_issue(&db, sess.id, now + Duration::seconds(30))
            .await
            .unwrap();
        assert_eq!(issued.value, same.value);

        // past expiry a new value is rotated in
        let rotated = TokenAuthority::current_or_issue(&db, sess.id, now + Duration::seconds(61))
            .await
            .unwrap();
        assert_ne!(issued.value, rotated.value);
    }

    #[tokio::test]
    async fn closed_session_refuses_issue_and_validation() {
        let db = setup_test_db().await;
        let sess = seed_session(&db, 60).await;
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap();

        let token = TokenAuthority::issue(&db, sess.id, now).await.unwrap();
        SessionModel::close(&db, sess.id, now).await.unwrap();

        let err = TokenAuthority::issue(&db, sess.id, now).await.unwrap_err();
        assert!(matches!(err, TokenError::SessionClosed(_)));

        let check = TokenAuthority::validate(&db, sess.id, &token.value, now)
            .await
            .unwrap();
        assert_eq!(check, TokenCheck::Invalid(TokenFault::NoActiveSession));
    }

    #[tokio::test]
    async fn unknown_session_reports_no_active_session() {
        let db = setup_test_db().await;
        let now = Utc::now();
        let check = TokenAuthority::validate(&db, 9999, "whatever", now)
            .await
            .unwrap();
        assert_eq!(check, TokenCheck::Invalid(TokenFault::NoActiveSession));
    }
}
