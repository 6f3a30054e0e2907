use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde::Serialize;

/// A class (course offering) presence is taken for. The optional
/// latitude/longitude pair is the geofence anchor; radius defaults to 50 m.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "classes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub code: String,
    pub instructor_id: i64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub geofence_radius_m: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::InstructorId",
        to = "super::user::Column::Id"
    )]
    Instructor,
    #[sea_orm(has_many = "super::attendance_session::Entity")]
    Sessions,
}

impl Related<super::attendance_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sessions.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn create(
        db: &DatabaseConnection,
        name: &str,
        code: &str,
        instructor_id: i64,
        anchor: Option<(f64, f64)>,
        geofence_radius_m: f64,
    ) -> Result<Self, DbErr> {
        ActiveModel {
            name: Set(name.to_owned()),
            code: Set(code.to_owned()),
            instructor_id: Set(instructor_id),
            latitude: Set(anchor.map(|(lat, _)| lat)),
            longitude: Set(anchor.map(|(_, lon)| lon)),
            geofence_radius_m: Set(geofence_radius_m),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
    }

    pub async fn find_by_id(db: &DatabaseConnection, id: i64) -> Result<Option<Self>, DbErr> {
        Entity::find_by_id(id).one(db).await
    }

    /// Geofence anchor, when the class has one configured.
    pub fn anchor(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user;
    use crate::test_utils::setup_test_db;

    #[tokio::test]
    async fn find_by_id_returns_anchor_and_radius() {
        let db = setup_test_db().await;

        let instructor = user::Model::create(&db, "prof1", "Prof One", "P-0001")
            .await
            .expect("create instructor");
        let class = Model::create(
            &db,
            "Networks",
            "NET301",
            instructor.id,
            Some((-25.7545, 28.2314)),
            40.0,
        )
        .await
        .expect("create class");

        let found = Model::find_by_id(&db, class.id)
            .await
            .unwrap()
            .expect("class row");
        assert_eq!(found.code, "NET301");
        assert_eq!(found.anchor(), Some((-25.7545, 28.2314)));
        assert_eq!(found.geofence_radius_m, 40.0);

        assert!(Model::find_by_id(&db, class.id + 1).await.unwrap().is_none());
    }
}
