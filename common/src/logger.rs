use chrono::Local;
use colored::Colorize;
use fern::Dispatch;
use log::LevelFilter;
use std::fs::{OpenOptions, create_dir_all};
use std::path::Path;

fn parse_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

fn colorize(level: log::Level) -> colored::ColoredString {
    match level {
        log::Level::Error => "ERROR".red(),
        log::Level::Warn => "WARN".yellow(),
        log::Level::Info => "INFO".green(),
        log::Level::Debug => "DEBUG".cyan(),
        log::Level::Trace => "TRACE".normal(),
    }
}

/// Installs the global logger: colored stdout plus an append-only log file.
pub fn init_logger(log_level: &str, log_file_path: &str) {
    if let Some(parent) = Path::new(log_file_path).parent() {
        if !parent.exists() {
            create_dir_all(parent).expect("Failed to create log directory");
        }
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .expect("Cannot open log file");

    Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                colorize(record.level()),
                record.target(),
                message
            ))
        })
        .level(parse_level(log_level))
        .chain(std::io::stdout())
        .chain(log_file)
        .apply()
        .expect("Failed to initialize logger");
}
