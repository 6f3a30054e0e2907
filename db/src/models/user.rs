use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde::Serialize;

/// Represents a user in the `users` table. Display fields are consumed only
/// by roster presentation, never by admission logic.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Unique login / student handle.
    pub username: String,
    pub display_name: String,
    /// Unique institutional registration number.
    pub registration_number: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::presence_event::Entity")]
    PresenceEvents,
}

impl Related<super::presence_event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PresenceEvents.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn create(
        db: &DatabaseConnection,
        username: &str,
        display_name: &str,
        registration_number: &str,
    ) -> Result<Self, DbErr> {
        let now = Utc::now();
        ActiveModel {
            username: Set(username.to_owned()),
            display_name: Set(display_name.to_owned()),
            registration_number: Set(registration_number.to_owned()),
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
}
