pub mod events;
pub mod models;
pub mod test_utils;

use sea_orm::{Database, DatabaseConnection};
use std::path::Path;

/// Connects to the configured database. A bare path is treated as a SQLite
/// file; a DSN is used as-is.
pub async fn connect() -> DatabaseConnection {
    let path_or_url = common::config::database_path();
    let url = if path_or_url.starts_with("sqlite:") || path_or_url.starts_with("postgres://") {
        path_or_url
    } else {
        // SQLite won't create intermediate dirs.
        if let Some(parent) = Path::new(&path_or_url).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        format!("sqlite://{path_or_url}?mode=rwc")
    };

    Database::connect(&url)
        .await
        .expect("Failed to connect to database")
}
