//! The single authority for turning a presence claim into a durable,
//! counted attendance record. Admission is idempotent and deduplicating per
//! (session, student); the composite primary key on `presence_events` is the
//! safety mechanism, the application pre-check only an optimization.

use chrono::{DateTime, Utc};
use db::events::{ChangeFeed, PresenceAdmitted};
use db::models::attendance_session::Model as Session;
use db::models::class::Model as Class;
use db::models::presence_event::{Method, Model as PresenceEvent};
use sea_orm::{DatabaseConnection, DbErr};
use serde::Serialize;

use crate::error::LedgerError;
use crate::geofence;
use crate::token_authority::{TokenAuthority, TokenCheck, TokenFault};

/// Terminal, user-facing rejection reasons. Composed here and nowhere else;
/// collaborators return structured faults, never messaging.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum RejectReason {
    InvalidToken,
    ExpiredToken,
    OutOfRange { distance_m: Option<f64> },
    SessionClosed,
}

impl RejectReason {
    pub fn user_message(&self) -> String {
        match self {
            RejectReason::InvalidToken => {
                "Code not recognized. Ask for the current code and try again.".into()
            }
            RejectReason::ExpiredToken => {
                "Code expired. Ask for a fresh code and try again.".into()
            }
            RejectReason::OutOfRange {
                distance_m: Some(d),
            } => format!("You are too far from the classroom ({}m away).", d.round()),
            RejectReason::OutOfRange { distance_m: None } => {
                "Your location could not be determined.".into()
            }
            RejectReason::SessionClosed => "This attendance session has ended.".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Admission {
    /// `already_present` distinguishes idempotent replays in logging only;
    /// callers treat both as the same success.
    Admitted { already_present: bool },
    Rejected(RejectReason),
}

#[derive(Debug, Clone)]
pub struct AdmitRequest {
    pub session_id: i64,
    pub student_id: i64,
    pub method: Method,
    pub claimed_coords: Option<(f64, f64)>,
    pub presented_token: Option<String>,
    /// Client-observed instant the claim was produced; may predate `now`
    /// arbitrarily for claims replayed from an offline outbox.
    pub marked_at: DateTime<Utc>,
}

pub struct PresenceLedger;

impl PresenceLedger {
    /// Admits a presence claim. Checks run in order, short-circuiting on the
    /// first failure: duplicate, session closed, token, geofence, insert.
    pub async fn admit(
        db: &DatabaseConnection,
        feed: &ChangeFeed,
        req: &AdmitRequest,
        now: DateTime<Utc>,
    ) -> Result<Admission, LedgerError> {
        // 1. Idempotent replay of an already-admitted claim is a success.
        //    A failed pre-check is non-fatal; the primary key below is the
        //    actual guarantee.
        match PresenceEvent::exists(db, req.session_id, req.student_id).await {
            Ok(true) => {
                log::info!(
                    "student {} already admitted to session {}",
                    req.student_id,
                    req.session_id
                );
                return Ok(Admission::Admitted {
                    already_present: true,
                });
            }
            Ok(false) => {}
            Err(e) => {
                log::warn!("duplicate pre-check failed, deferring to constraint: {e}");
            }
        }

        // 2. A missing session is treated like a closed one: the claim can
        //    never succeed, and the device needs to tell the student so.
        let Some(session) = Session::find_by_id(db, req.session_id).await? else {
            return Ok(Admission::Rejected(RejectReason::SessionClosed));
        };
        if !session.is_active() {
            return Ok(Admission::Rejected(RejectReason::SessionClosed));
        }

        // 3. Token check comes before geofence, so an expired code is
        //    reported as such even when the location would have passed.
        if req.method == Method::TokenScan {
            let presented = req.presented_token.as_deref().unwrap_or("");
            match TokenAuthority::validate_against(&session, presented, now) {
                TokenCheck::Valid => {}
                TokenCheck::Invalid(TokenFault::Expired) => {
                    log::warn!(
                        "rejected session {} student {}: expired token",
                        req.session_id,
                        req.student_id
                    );
                    return Ok(Admission::Rejected(RejectReason::ExpiredToken));
                }
                TokenCheck::Invalid(_) => {
                    log::warn!(
                        "rejected session {} student {}: invalid token",
                        req.session_id,
                        req.student_id
                    );
                    return Ok(Admission::Rejected(RejectReason::InvalidToken));
                }
            }
        }

        // 4. Geofence, failing closed on missing subject coordinates.
        if session.require_geolocation {
            if let Some(check) = Self::geofence_check(db, &session, req).await? {
                if !check.within_radius {
                    log::warn!(
                        "rejected session {} student {}: out of range ({:.0}m)",
                        req.session_id,
                        req.student_id,
                        check.distance_m
                    );
                    return Ok(Admission::Rejected(RejectReason::OutOfRange {
                        distance_m: Some(check.distance_m),
                    }));
                }
            } else {
                return Ok(Admission::Rejected(RejectReason::OutOfRange {
                    distance_m: None,
                }));
            }
        }

        // 5. Conflict-safe insert; losing the race to a concurrent admission
        //    is the same success as step 1.
        let inserted = PresenceEvent::insert_ignore_duplicate(
            db,
            req.session_id,
            req.student_id,
            req.method,
            req.claimed_coords,
            req.marked_at,
            now,
        )
        .await?;

        if inserted {
            log::info!(
                "admitted student {} to session {} via {}",
                req.student_id,
                req.session_id,
                req.method
            );
            feed.publish(PresenceAdmitted {
                session_id: req.session_id,
                student_id: req.student_id,
                method: req.method,
                admitted_at: now,
            });
        } else {
            log::info!(
                "concurrent duplicate admission for student {} in session {}",
                req.student_id,
                req.session_id
            );
        }

        Ok(Admission::Admitted {
            already_present: !inserted,
        })
    }

    /// Resolves the class anchor and measures the claim against it. `None`
    /// when the subject supplied no coordinates (callers fail closed). A
    /// class without a configured anchor skips the check entirely.
    async fn geofence_check(
        db: &DatabaseConnection,
        session: &Session,
        req: &AdmitRequest,
    ) -> Result<Option<geofence::GeofenceCheck>, DbErr> {
        let class = Class::find_by_id(db, session.class_id)
            .await?
            .ok_or_else(|| {
                DbErr::RecordNotFound(format!("Class {} not found", session.class_id))
            })?;

        let Some(anchor) = class.anchor() else {
            log::warn!(
                "session {} requires geolocation but class {} has no anchor; skipping check",
                session.id,
                class.id
            );
            return Ok(Some(geofence::GeofenceCheck {
                within_radius: true,
                distance_m: 0.0,
            }));
        };

        let Some(subject) = req.claimed_coords else {
            log::warn!(
                "rejected session {} student {}: no claimed coordinates",
                req.session_id,
                req.student_id
            );
            return Ok(None);
        };

        Ok(Some(geofence::check(subject, anchor, class.geofence_radius_m)))
    }

    /// Admitted events for a session, oldest first.
    pub async fn get_for_session(
        db: &DatabaseConnection,
        session_id: i64,
    ) -> Result<Vec<PresenceEvent>, LedgerError> {
        Ok(PresenceEvent::for_session(db, session_id).await?)
    }

    /// A student's attendance history, newest first, optionally scoped to a
    /// class.
    pub async fn get_for_student(
        db: &DatabaseConnection,
        student_id: i64,
        class_id: Option<i64>,
    ) -> Result<Vec<PresenceEvent>, LedgerError> {
        Ok(PresenceEvent::for_student(db, student_id, class_id).await?)
    }
}
