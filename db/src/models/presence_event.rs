use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    QueryTrait, Set,
};
use serde::{Deserialize, Serialize};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[strum(serialize_all = "snake_case")]
pub enum Method {
    #[sea_orm(string_value = "token_scan")]
    TokenScan,
    #[sea_orm(string_value = "manual")]
    Manual,
}

/// An admitted presence claim. The composite primary key makes admission
/// exactly-once per (session, student); rejected claims are never persisted.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "presence_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub session_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub student_id: i64,

    pub method: Method,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Client-observed instant the claim was produced.
    pub marked_at: DateTime<Utc>,
    /// Server-assigned instant; orders the roster.
    pub admitted_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::attendance_session::Entity",
        from = "Column::SessionId",
        to = "super::attendance_session::Column::Id"
    )]
    Session,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::StudentId",
        to = "super::user::Column::Id"
    )]
    Student,
}

impl Related<super::attendance_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Session.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Student.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Point lookup by the composite key.
    pub async fn find(
        db: &DatabaseConnection,
        session_id: i64,
        student_id: i64,
    ) -> Result<Option<Self>, DbErr> {
        Entity::find_by_id((session_id, student_id)).one(db).await
    }

    pub async fn exists(
        db: &DatabaseConnection,
        session_id: i64,
        student_id: i64,
    ) -> Result<bool, DbErr> {
        Ok(Self::find(db, session_id, student_id).await?.is_some())
    }

    /// Inserts the event, ignoring a conflicting admitted duplicate. Returns
    /// whether a fresh row was written; `false` means a concurrent writer won
    /// the race, which callers treat as idempotent success.
    pub async fn insert_ignore_duplicate(
        db: &DatabaseConnection,
        session_id: i64,
        student_id: i64,
        method: Method,
        coords: Option<(f64, f64)>,
        marked_at: DateTime<Utc>,
        admitted_at: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        let rows = Entity::insert(ActiveModel {
            session_id: Set(session_id),
            student_id: Set(student_id),
            method: Set(method),
            latitude: Set(coords.map(|(lat, _)| lat)),
            longitude: Set(coords.map(|(_, lon)| lon)),
            marked_at: Set(marked_at),
            admitted_at: Set(admitted_at),
        })
        .on_conflict(
            OnConflict::columns([Column::SessionId, Column::StudentId])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

        Ok(rows == 1)
    }

    /// Admitted events for a session, oldest first.
    pub async fn for_session(
        db: &DatabaseConnection,
        session_id: i64,
    ) -> Result<Vec<Self>, DbErr> {
        Entity::find()
            .filter(Column::SessionId.eq(session_id))
            .order_by_asc(Column::AdmittedAt)
            .order_by_asc(Column::StudentId)
            .all(db)
            .await
    }

    /// A student's history, newest first, optionally limited to one class.
    pub async fn for_student(
        db: &DatabaseConnection,
        student_id: i64,
        class_id: Option<i64>,
    ) -> Result<Vec<Self>, DbErr> {
        use super::attendance_session::{Column as SessionCol, Entity as SessionEntity};

        let mut query = Entity::find().filter(Column::StudentId.eq(student_id));

        if let Some(class_id) = class_id {
            let session_ids = SessionEntity::find()
                .select_only()
                .column(SessionCol::Id)
                .filter(SessionCol::ClassId.eq(class_id))
                .into_query();
            query = query.filter(Column::SessionId.in_subquery(session_ids));
        }

        query.order_by_desc(Column::AdmittedAt).all(db).await
    }
}
