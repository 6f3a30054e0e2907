use std::{env, fs, path::Path};

mod runner;

#[tokio::main]
async fn main() {
    let config = common::config::Config::init(".env");
    common::logger::init_logger(&config.log_level, &config.log_file);

    let db_path = config.database_path.clone();
    let url = format!("sqlite://{}?mode=rwc", db_path);
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("clean") => {
            remove_db_file(&db_path);
        }
        Some("fresh") => {
            remove_db_file(&db_path);
            create_db_dir(&db_path);
            runner::run_all_migrations(&url).await;
            log::info!("migration run finished for {db_path}");
        }
        _ => {
            create_db_dir(&db_path);
            runner::run_all_migrations(&url).await;
            log::info!("migration run finished for {db_path}");
        }
    }
}

fn remove_db_file(path: &str) {
    let db_path = Path::new(path);
    if db_path.exists() {
        fs::remove_file(db_path).expect("Failed to delete DB file");
        println!("Deleted DB: {}", db_path.display());
    } else {
        println!("DB file does not exist: {}", db_path.display());
    }
}

fn create_db_dir(path: &str) {
    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent).expect("Failed to create DB directory");
    }
}
