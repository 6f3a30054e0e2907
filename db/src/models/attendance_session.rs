use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelTrait, DatabaseConnection, IntoActiveModel, Set};
use serde::{Deserialize, Serialize};

/// How presence is proven in a session: the instructor displays a rotating
/// code, or students present their own identifier for manual marking.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[strum(serialize_all = "snake_case")]
pub enum SessionMode {
    #[sea_orm(string_value = "instructor_presents")]
    InstructorPresents,
    #[sea_orm(string_value = "student_presents")]
    StudentPresents,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "attendance_sessions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub class_id: i64,
    pub created_by: i64,
    pub mode: SessionMode,
    pub require_geolocation: bool,
    /// Validity window for rotating tokens, in seconds.
    pub token_ttl_seconds: i32,
    /// The single live proof-of-presence value; null before first issue.
    pub current_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    /// Null while the session is open for admissions.
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::class::Entity",
        from = "Column::ClassId",
        to = "super::class::Column::Id"
    )]
    Class,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::CreatedBy",
        to = "super::user::Column::Id"
    )]
    Creator,
    #[sea_orm(has_many = "super::presence_event::Entity")]
    Events,
}

impl Related<super::class::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Class.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl Related<super::presence_event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Events.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// `token_ttl_seconds: None` takes the configured default window.
    pub async fn create(
        db: &DatabaseConnection,
        class_id: i64,
        created_by: i64,
        mode: SessionMode,
        require_geolocation: bool,
        token_ttl_seconds: Option<i32>,
        now: DateTime<Utc>,
    ) -> Result<Self, DbErr> {
        let ttl =
            token_ttl_seconds.unwrap_or_else(|| common::config::token_ttl_seconds() as i32);
        ActiveModel {
            class_id: Set(class_id),
            created_by: Set(created_by),
            mode: Set(mode),
            require_geolocation: Set(require_geolocation),
            token_ttl_seconds: Set(ttl.max(1)),
            started_at: Set(now),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await
    }

    pub async fn find_by_id(db: &DatabaseConnection, id: i64) -> Result<Option<Self>, DbErr> {
        Entity::find_by_id(id).one(db).await
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Ends the session. Already-admitted events are untouched; subsequent
    /// admissions fail fast with a session-closed rejection.
    pub async fn close(
        db: &DatabaseConnection,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<Self, DbErr> {
        let session = Self::find_by_id(db, id)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("Attendance session {id} not found")))?;

        if !session.is_active() {
            return Ok(session);
        }

        let mut active = session.into_active_model();
        active.ended_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(db).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{class, user};
    use crate::test_utils::setup_test_db;
    use chrono::TimeZone;

    #[tokio::test]
    async fn close_is_terminal_and_repeat_safe() {
        let db = setup_test_db().await;

        let instructor = user::Model::create(&db, "prof1", "Prof One", "P-0001")
            .await
            .expect("create instructor");
        let class = class::Model::create(&db, "Algorithms", "ALG202", instructor.id, None, 50.0)
            .await
            .expect("create class");

        let started = Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap();
        let session = Model::create(
            &db,
            class.id,
            instructor.id,
            SessionMode::StudentPresents,
            false,
            Some(60),
            started,
        )
        .await
        .expect("create session");
        assert!(session.is_active());

        let ended = started + chrono::Duration::minutes(50);
        let closed = Model::close(&db, session.id, ended).await.unwrap();
        assert!(!closed.is_active());
        assert_eq!(closed.ended_at, Some(ended));

        // closing again keeps the original end time
        let again = Model::close(&db, session.id, ended + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(again.ended_at, Some(ended));
    }

    #[tokio::test]
    async fn create_without_ttl_takes_the_configured_default() {
        let db = setup_test_db().await;

        let instructor = user::Model::create(&db, "prof2", "Prof Two", "P-0002")
            .await
            .expect("create instructor");
        let class = class::Model::create(&db, "Security", "SEC404", instructor.id, None, 50.0)
            .await
            .expect("create class");

        let started = Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap();
        let session = Model::create(
            &db,
            class.id,
            instructor.id,
            SessionMode::InstructorPresents,
            false,
            None,
            started,
        )
        .await
        .expect("create session");

        assert_eq!(
            i64::from(session.token_ttl_seconds),
            common::config::token_ttl_seconds()
        );
    }
}
