use migration::Migrator;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

pub async fn setup_test_db() -> DatabaseConnection {
    // single connection so every task sees the same in-memory database
    let mut opts = ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1);

    let db = Database::connect(opts)
        .await
        .expect("Failed to connect to in-memory db");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    db
}

/// Connects to an arbitrary DSN and migrates it. File-backed variants are
/// used by tests that exercise concurrent writers or process restarts.
pub async fn setup_test_db_at(url: &str) -> DatabaseConnection {
    let db = Database::connect(url)
        .await
        .expect("Failed to connect to test db");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    db
}
