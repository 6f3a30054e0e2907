//! Continuously updated observer view of a session's admissions. The
//! snapshot query and the live feed may race; entries are reconciled by
//! de-duplicating on (session, student) identity, never by assuming disjoint
//! delivery.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use db::events::ChangeFeed;
use db::models::presence_event::{Method, Model as PresenceEvent};
use db::models::user::Model as User;
use sea_orm::{DatabaseConnection, DbErr};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// A roster line: the admitted event enriched with display data. The
/// identity lookup serves presentation only and never feeds admission logic.
#[derive(Debug, Clone, Serialize)]
pub struct RosterEntry {
    pub session_id: i64,
    pub student_id: i64,
    pub method: Method,
    pub admitted_at: DateTime<Utc>,
    pub display_name: String,
    pub registration_number: String,
}

/// Handle owning the background delivery task. Callers own cleanup:
/// `unsubscribe` (or dropping the handle) stops delivery.
pub struct RosterSubscription {
    task: JoinHandle<()>,
}

impl RosterSubscription {
    pub fn unsubscribe(self) {
        self.task.abort();
    }
}

impl Drop for RosterSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct LiveRoster;

impl LiveRoster {
    /// Registers interest in a session. The callback fires once per admitted
    /// student, in admission order: first for the initial snapshot, then for
    /// live admissions as they land.
    pub async fn subscribe<F>(
        db: DatabaseConnection,
        feed: &ChangeFeed,
        session_id: i64,
        mut on_admit: F,
    ) -> Result<RosterSubscription, DbErr>
    where
        F: FnMut(RosterEntry) + Send + 'static,
    {
        // Subscribe before fetching the snapshot so nothing admitted in
        // between is lost; duplicates are filtered below.
        let mut rx = feed.subscribe();
        let snapshot = PresenceEvent::for_session(&db, session_id).await?;

        let task = tokio::spawn(async move {
            let mut seen: HashSet<i64> = HashSet::new();

            for ev in snapshot {
                if seen.insert(ev.student_id) {
                    if let Some(entry) =
                        enrich(&db, session_id, ev.student_id, ev.method, ev.admitted_at).await
                    {
                        on_admit(entry);
                    }
                }
            }

            loop {
                match rx.recv().await {
                    Ok(notice) if notice.session_id == session_id => {
                        if seen.insert(notice.student_id) {
                            if let Some(entry) = enrich(
                                &db,
                                session_id,
                                notice.student_id,
                                notice.method,
                                notice.admitted_at,
                            )
                            .await
                            {
                                on_admit(entry);
                            }
                        }
                    }
                    Ok(_) => {} // another session's admission
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!(
                            "roster feed for session {session_id} lagged, {skipped} notices skipped"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(RosterSubscription { task })
    }
}

async fn enrich(
    db: &DatabaseConnection,
    session_id: i64,
    student_id: i64,
    method: Method,
    admitted_at: DateTime<Utc>,
) -> Option<RosterEntry> {
    match User::find_by_id(db, student_id).await {
        Ok(Some(student)) => Some(RosterEntry {
            session_id,
            student_id,
            method,
            admitted_at,
            display_name: student.display_name,
            registration_number: student.registration_number,
        }),
        Ok(None) => {
            log::warn!("admitted student {student_id} has no user row; dropping roster entry");
            None
        }
        Err(e) => {
            log::warn!("identity lookup for student {student_id} failed: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence_ledger::{AdmitRequest, PresenceLedger};
    use chrono::TimeZone;
    use db::models::attendance_session::{Model as SessionModel, SessionMode};
    use db::models::{class, user};
    use db::test_utils::setup_test_db;
    use std::time::Duration;
    use tokio::sync::mpsc;

    async fn recv_entry(rx: &mut mpsc::UnboundedReceiver<RosterEntry>) -> RosterEntry {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("roster entry in time")
            .expect("channel open")
    }

    #[tokio::test]
    async fn snapshot_and_live_admissions_arrive_without_duplicates() {
        let db = setup_test_db().await;
        let feed = ChangeFeed::default();

        let instructor = user::Model::create(&db, "prof1", "Prof One", "P-0001")
            .await
            .unwrap();
        let s1 = user::Model::create(&db, "stud1", "Student One", "S-0001")
            .await
            .unwrap();
        let s2 = user::Model::create(&db, "stud2", "Student Two", "S-0002")
            .await
            .unwrap();
        let class = class::Model::create(&db, "Compilers", "COM401", instructor.id, None, 50.0)
            .await
            .unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 11, 0, 0).unwrap();
        let session = SessionModel::create(
            &db,
            class.id,
            instructor.id,
            SessionMode::InstructorPresents,
            false,
            Some(60),
            now,
        )
        .await
        .unwrap();

        // one admission before subscribing: must arrive via the snapshot
        let req1 = AdmitRequest {
            session_id: session.id,
            student_id: s1.id,
            method: Method::Manual,
            claimed_coords: None,
            presented_token: None,
            marked_at: now,
        };
        PresenceLedger::admit(&db, &feed, &req1, now).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = LiveRoster::subscribe(db.clone(), &feed, session.id, move |entry| {
            let _ = tx.send(entry);
        })
        .await
        .unwrap();

        let first = recv_entry(&mut rx).await;
        assert_eq!(first.student_id, s1.id);
        assert_eq!(first.display_name, "Student One");
        assert_eq!(first.registration_number, "S-0001");

        // a replay of the same student must not produce a second entry
        PresenceLedger::admit(&db, &feed, &req1, now).await.unwrap();

        // a live admission lands as the next entry
        let req2 = AdmitRequest {
            student_id: s2.id,
            ..req1.clone()
        };
        PresenceLedger::admit(&db, &feed, &req2, now).await.unwrap();

        let second = recv_entry(&mut rx).await;
        assert_eq!(second.student_id, s2.id);
        assert_eq!(second.display_name, "Student Two");

        sub.unsubscribe();
    }

    #[tokio::test]
    async fn other_sessions_admissions_are_filtered_out() {
        let db = setup_test_db().await;
        let feed = ChangeFeed::default();

        let instructor = user::Model::create(&db, "prof1", "Prof One", "P-0001")
            .await
            .unwrap();
        let student = user::Model::create(&db, "stud1", "Student One", "S-0001")
            .await
            .unwrap();
        let class = class::Model::create(&db, "Graphics", "GFX301", instructor.id, None, 50.0)
            .await
            .unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 11, 0, 0).unwrap();
        let watched = SessionModel::create(
            &db,
            class.id,
            instructor.id,
            SessionMode::InstructorPresents,
            false,
            Some(60),
            now,
        )
        .await
        .unwrap();
        let other = SessionModel::create(
            &db,
            class.id,
            instructor.id,
            SessionMode::InstructorPresents,
            false,
            Some(60),
            now,
        )
        .await
        .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = LiveRoster::subscribe(db.clone(), &feed, watched.id, move |entry| {
            let _ = tx.send(entry);
        })
        .await
        .unwrap();

        // admission in the *other* session first
        let req_other = AdmitRequest {
            session_id: other.id,
            student_id: student.id,
            method: Method::Manual,
            claimed_coords: None,
            presented_token: None,
            marked_at: now,
        };
        PresenceLedger::admit(&db, &feed, &req_other, now).await.unwrap();

        // then one in the watched session
        let req_watched = AdmitRequest {
            session_id: watched.id,
            ..req_other.clone()
        };
        PresenceLedger::admit(&db, &feed, &req_watched, now)
            .await
            .unwrap();

        // only the watched session's admission comes through
        let entry = recv_entry(&mut rx).await;
        assert_eq!(entry.session_id, watched.id);
        assert!(rx.try_recv().is_err());
    }
}
