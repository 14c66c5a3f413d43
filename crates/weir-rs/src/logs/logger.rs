//! Logger configuration and structured output formatting.
//!
//! Structured single-line output with aligned level and source-location
//! columns, colored when the terminal supports it.

use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;
use std::env;
use std::io::Write;

// Visible widths of the level and file:line columns.
const LEVEL_FIELD_WIDTH: usize = 7;
const FILE_LINE_FIELD_WIDTH: usize = 24;

fn level_color(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "\x1b[31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug => "\x1b[34m",
        log::Level::Trace => "\x1b[35m",
    }
}

fn pad(width: usize, used: usize) -> String {
    " ".repeat(width.saturating_sub(used).max(1))
}

/// Configure and initialize the application's logging system.
///
/// Format: `timestamp | [LEVEL] | file:line | message`. Level filtering
/// comes from `RUST_LOG` (default `info`); `NO_COLOR` disables ANSI
/// coloring for log shippers.
///
/// Call once during startup; a second call would panic inside
/// `env_logger`.
pub fn configure_logger() {
    let no_color = env::var("NO_COLOR").is_ok();

    let mut builder = Builder::new();
    builder
        .format(move |buf, record| {
            let level = record.level();
            let level_text = format!("[{}]", level);

            let colored_level = if no_color {
                level_text.clone()
            } else {
                format!("{}{}\x1b[0m", level_color(level), level_text)
            };

            let file_line = format!(
                "{}:{}",
                record
                    .file()
                    .map(|f| f.rsplit('/').next().unwrap_or(f))
                    .unwrap_or("unknown"),
                record.line().unwrap_or(0)
            );

            writeln!(
                buf,
                "{} | {}{}| {}{}| {}",
                Local::now().format("%b %d %H:%M:%S%.3f"),
                colored_level,
                pad(LEVEL_FIELD_WIDTH, level_text.len()),
                file_line,
                pad(FILE_LINE_FIELD_WIDTH, file_line.len()),
                record.args(),
            )
        })
        .filter_level(LevelFilter::Info);

    if let Ok(filters) = env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    builder.init();
}
