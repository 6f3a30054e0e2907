use colored::*;
use sea_orm_migration::prelude::*;
use std::io::{self, Write};
use std::time::Instant;

const STATUS_COLUMN: usize = 72;

pub async fn run_all_migrations(url: &str) {
    let db = sea_orm::Database::connect(url)
        .await
        .expect("DB connection failed");

    let schema_manager = SchemaManager::new(&db);
    let migrations = <migration::Migrator as MigratorTrait>::migrations();

    println!("Running {} migrations...", migrations.len());
    for mig in migrations {
        run_migration(&schema_manager, mig).await;
    }
}

async fn run_migration(schema_manager: &SchemaManager<'_>, migration: Box<dyn MigrationTrait>) {
    let label = format!("Applying {}", migration.name().bold());
    let dots = ".".repeat(STATUS_COLUMN.saturating_sub(label.len()));
    print!("{}{} ", label, dots);
    io::stdout().flush().ok();

    let start = Instant::now();
    match migration.up(schema_manager).await {
        Ok(()) => {
            let elapsed = format!("({:.2?})", start.elapsed()).dimmed();
            println!("{} {}", "done".green(), elapsed);
        }
        Err(e) => {
            println!("{}: {}", "failed".red(), e);
            std::process::exit(1);
        }
    }
}
