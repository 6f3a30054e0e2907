//! Durable, FIFO queue of not-yet-admitted presence claims. The backing
//! store is a device-local SQLite file owned exclusively by this process;
//! entries survive restarts and leave the queue only on a terminal outcome.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use db::models::presence_event::Method;
use sea_orm::{
    ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, QueryOrder, Schema,
};
use thiserror::Error;

use crate::claim::PresenceClaim;

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("outbox storage failed: {0}")]
    Db(#[from] DbErr),
}

/// A queued claim plus the locally generated identifier that de-duplicates
/// it across retries.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    pub local_id: String,
    pub claim: PresenceClaim,
    pub queued_at: DateTime<Utc>,
}

/// Ordered durable claim store: append, FIFO listing, and removal by local
/// id.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn append(&self, claim: PresenceClaim) -> Result<String, OutboxError>;
    /// All queued entries, oldest first.
    async fn all(&self) -> Result<Vec<OutboxEntry>, OutboxError>;
    async fn remove(&self, local_id: &str) -> Result<(), OutboxError>;
    async fn len(&self) -> Result<usize, OutboxError> {
        Ok(self.all().await?.len())
    }
}

mod entry {
    use super::*;
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "outbox_entries")]
    pub struct Model {
        /// Monotonic enqueue order; the drain is FIFO over this.
        #[sea_orm(primary_key)]
        pub seq: i64,
        #[sea_orm(unique)]
        pub local_id: String,
        pub session_id: i64,
        pub student_id: i64,
        pub method: Method,
        pub latitude: Option<f64>,
        pub longitude: Option<f64>,
        pub token: Option<String>,
        pub marked_at: DateTime<Utc>,
        pub queued_at: DateTime<Utc>,
    }

    #[derive(Copy, Clone, Debug, EnumIter)]
    pub enum Relation {}

    impl RelationTrait for Relation {
        fn def(&self) -> RelationDef {
            panic!("No RelationDef implemented")
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

impl From<entry::Model> for OutboxEntry {
    fn from(m: entry::Model) -> Self {
        let coords = match (m.latitude, m.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        };
        OutboxEntry {
            local_id: m.local_id,
            claim: PresenceClaim {
                session_id: m.session_id,
                student_id: m.student_id,
                method: m.method,
                coords,
                token: m.token,
                marked_at: m.marked_at,
            },
            queued_at: m.queued_at,
        }
    }
}

/// SQLite-backed outbox. `open` creates the schema on first use; reopening
/// the same path sees everything a previous process left behind.
pub struct SqliteOutbox {
    db: DatabaseConnection,
}

impl SqliteOutbox {
    pub async fn open(path: &str) -> Result<Self, OutboxError> {
        let url = if path.starts_with("sqlite:") {
            path.to_owned()
        } else {
            format!("sqlite://{path}?mode=rwc")
        };
        let db = Database::connect(&url).await?;
        Self::init_schema(&db).await?;
        Ok(Self { db })
    }

    /// In-memory store for tests and ephemeral use. Pinned to a single
    /// connection so the whole pool shares one memory database.
    pub async fn open_in_memory() -> Result<Self, OutboxError> {
        let mut opts = sea_orm::ConnectOptions::new("sqlite::memory:");
        opts.max_connections(1);
        let db = Database::connect(opts).await?;
        Self::init_schema(&db).await?;
        Ok(Self { db })
    }

    async fn init_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
        let backend = db.get_database_backend();
        let schema = Schema::new(backend);
        let mut stmt = schema.create_table_from_entity(entry::Entity);
        stmt.if_not_exists();
        db.execute(backend.build(&stmt)).await?;
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for SqliteOutbox {
    async fn append(&self, claim: PresenceClaim) -> Result<String, OutboxError> {
        use sea_orm::{ActiveModelTrait, Set};

        let local_id = uuid::Uuid::new_v4().to_string();
        entry::ActiveModel {
            local_id: Set(local_id.clone()),
            session_id: Set(claim.session_id),
            student_id: Set(claim.student_id),
            method: Set(claim.method),
            latitude: Set(claim.coords.map(|(lat, _)| lat)),
            longitude: Set(claim.coords.map(|(_, lon)| lon)),
            token: Set(claim.token),
            marked_at: Set(claim.marked_at),
            queued_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        log::debug!("queued presence claim {local_id}");
        Ok(local_id)
    }

    async fn all(&self) -> Result<Vec<OutboxEntry>, OutboxError> {
        let rows = entry::Entity::find()
            .order_by_asc(entry::Column::Seq)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(OutboxEntry::from).collect())
    }

    async fn remove(&self, local_id: &str) -> Result<(), OutboxError> {
        use sea_orm::{ColumnTrait, QueryFilter};

        entry::Entity::delete_many()
            .filter(entry::Column::LocalId.eq(local_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn claim(session_id: i64, student_id: i64) -> PresenceClaim {
        PresenceClaim {
            session_id,
            student_id,
            method: Method::TokenScan,
            coords: Some((-25.75, 28.23)),
            token: Some("abc123".into()),
            marked_at: Utc.with_ymd_and_hms(2026, 1, 5, 9, 30, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn append_is_fifo_and_remove_is_by_local_id() {
        let outbox = SqliteOutbox::open_in_memory().await.unwrap();

        let first = outbox.append(claim(1, 10)).await.unwrap();
        let second = outbox.append(claim(1, 11)).await.unwrap();
        let third = outbox.append(claim(2, 10)).await.unwrap();

        let entries = outbox.all().await.unwrap();
        assert_eq!(
            entries.iter().map(|e| e.local_id.as_str()).collect::<Vec<_>>(),
            vec![first.as_str(), second.as_str(), third.as_str()]
        );

        outbox.remove(&second).await.unwrap();
        let entries = outbox.all().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.local_id != second));

        // removing an unknown id is a no-op
        outbox.remove("not-there").await.unwrap();
        assert_eq!(outbox.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.db");
        let path = path.to_str().unwrap();

        let outbox = SqliteOutbox::open(path).await.unwrap();
        let id = outbox.append(claim(3, 30)).await.unwrap();
        drop(outbox);

        // simulated process restart
        let outbox = SqliteOutbox::open(path).await.unwrap();
        let entries = outbox.all().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].local_id, id);
        assert_eq!(entries[0].claim, claim(3, 30));
    }
}
