use chrono::{DateTime, Utc};
use colored::*;
use log::{Level, Metadata, Record};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ImageGenError, Result};

static LOGGER: Lazy<ImageGenLogger> = Lazy::new(ImageGenLogger::new);

pub fn init() -> Result<()> {
    init_with_config(LoggerConfig::default())
}

/// Installs the logger, or just swaps its config if it is already installed.
pub fn init_with_config(config: LoggerConfig) -> Result<()> {
    let max_level = config.min_level.to_log_level_filter();
    LOGGER.update_config(config)?;

    if log::set_logger(&*LOGGER).is_err() {
        log::debug!("Logger already installed, configuration updated");
    }
    log::set_max_level(max_level);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl LogLevel {
    pub fn color(&self) -> Color {
        match self {
            LogLevel::Trace => Color::Cyan,
            LogLevel::Debug => Color::Blue,
            LogLevel::Info => Color::Green,
            LogLevel::Warn => Color::Yellow,
            LogLevel::Error => Color::Red,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            LogLevel::Trace => "🔍",
            LogLevel::Debug => "🐛",
            LogLevel::Info => "💡",
            LogLevel::Warn => "⚠️",
            LogLevel::Error => "❌",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    pub fn to_log_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::Trace,
            LogLevel::Debug => Level::Debug,
            LogLevel::Info => Level::Info,
            LogLevel::Warn => Level::Warn,
            LogLevel::Error => Level::Error,
        }
    }

    pub fn to_log_level_filter(&self) -> log::LevelFilter {
        self.to_log_level().to_level_filter()
    }

    pub fn from_log_level(level: Level) -> Self {
        match level {
            Level::Trace => LogLevel::Trace,
            Level::Debug => LogLevel::Debug,
            Level::Info => LogLevel::Info,
            Level::Warn => LogLevel::Warn,
            Level::Error => LogLevel::Error,
        }
    }

    /// Accepts `info`, `INFO`, `warning`, ...; unknown names fall back to Info.
    pub fn parse_lenient(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub module: String,
    pub file: String,
    pub line: u32,
    pub thread_id: String,
    pub context: HashMap<String, serde_json::Value>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: String, module: String, file: String, line: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            level,
            message,
            module,
            file,
            line,
            thread_id: format!("{:?}", std::thread::current().id()),
            context: HashMap::new(),
        }
    }

    pub fn with_context(mut self, key: &str, value: serde_json::Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub min_level: LogLevel,
    pub show_colors: bool,
    pub show_emojis: bool,
    pub show_thread_id: bool,
    pub show_file_location: bool,
    pub show_module: bool,
    pub include_timestamp: bool,
    pub timestamp_format: String,
    pub output_json: bool,
    pub log_to_console: bool,
    pub log_to_file: bool,
    pub log_dir: PathBuf,
    pub log_file_name: String,
    pub max_file_size_bytes: u64,
    pub backup_count: usize,
    pub custom_prefix: Option<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            show_colors: true,
            show_emojis: true,
            show_thread_id: false,
            show_file_location: false,
            show_module: true,
            include_timestamp: true,
            timestamp_format: "%Y-%m-%d %H:%M:%S%.3f".to_string(),
            output_json: false,
            log_to_console: true,
            log_to_file: false,
            log_dir: PathBuf::from("logs"),
            log_file_name: "imagegen.log".to_string(),
            max_file_size_bytes: 10 * 1024 * 1024,
            backup_count: 5,
            custom_prefix: None,
        }
    }
}

impl LoggerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    pub fn with_colors(mut self, enabled: bool) -> Self {
        self.show_colors = enabled;
        self
    }

    pub fn with_file_output(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_to_file = true;
        self.log_dir = dir.into();
        self
    }

    pub fn with_rotation(mut self, max_file_size_bytes: u64, backup_count: usize) -> Self {
        self.max_file_size_bytes = max_file_size_bytes;
        self.backup_count = backup_count;
        self
    }

    pub fn with_json_output(mut self, enabled: bool) -> Self {
        self.output_json = enabled;
        self
    }

    pub fn with_console(mut self, enabled: bool) -> Self {
        self.log_to_console = enabled;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.custom_prefix = Some(prefix.into());
        self
    }

    pub fn log_file_path(&self) -> PathBuf {
        self.log_dir.join(&self.log_file_name)
    }

    pub fn production() -> Self {
        Self {
            min_level: LogLevel::Info,
            show_colors: false,
            show_emojis: false,
            output_json: true,
            log_to_file: true,
            ..Default::default()
        }
    }

    pub fn development() -> Self {
        Self {
            min_level: LogLevel::Debug,
            show_colors: true,
            show_emojis: true,
            output_json: false,
            show_file_location: true,
            ..Default::default()
        }
    }
}

struct LogFile {
    path: PathBuf,
    file: File,
    written: u64,
}

pub struct ImageGenLogger {
    config: Mutex<LoggerConfig>,
    log_file: Mutex<Option<LogFile>>,
    start_time: Instant,
}

impl ImageGenLogger {
    pub fn new() -> Self {
        Self {
            config: Mutex::new(LoggerConfig::default()),
            log_file: Mutex::new(None),
            start_time: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn update_config(&self, new_config: LoggerConfig) -> Result<()> {
        let file = if new_config.log_to_file {
            fs::create_dir_all(&new_config.log_dir)
                .map_err(|e| ImageGenError::io(&new_config.log_dir, e))?;
            Some(open_log_file(&new_config.log_file_path())?)
        } else {
            None
        };

        if let Ok(mut guard) = self.log_file.lock() {
            *guard = file;
        }
        if let Ok(mut config) = self.config.lock() {
            *config = new_config;
        }
        Ok(())
    }

    fn format_console_output(&self, entry: &LogEntry, config: &LoggerConfig) -> String {
        let mut output = String::new();

        if let Some(prefix) = &config.custom_prefix {
            if config.show_colors {
                output.push_str(&format!("[{}] ", prefix.bright_white().bold()));
            } else {
                output.push_str(&format!("[{}] ", prefix));
            }
        }

        if config.include_timestamp {
            let timestamp = entry.timestamp.format(&config.timestamp_format).to_string();
            if config.show_colors {
                output.push_str(&format!("{} ", timestamp.bright_black()));
            } else {
                output.push_str(&format!("{} ", timestamp));
            }
        }

        let level_str = if config.show_emojis {
            format!("{} {}", entry.level.emoji(), entry.level.as_str())
        } else {
            entry.level.as_str().to_string()
        };
        if config.show_colors {
            output.push_str(&format!("[{}] ", level_str.color(entry.level.color()).bold()));
        } else {
            output.push_str(&format!("[{}] ", level_str));
        }

        if config.show_module && !entry.module.is_empty() {
            if config.show_colors {
                output.push_str(&format!("{}: ", entry.module.bright_blue()));
            } else {
                output.push_str(&format!("{}: ", entry.module));
            }
        }

        output.push_str(&entry.message);

        if !entry.context.is_empty() {
            let context = serde_json::to_string(&entry.context).unwrap_or_default();
            output.push(' ');
            if config.show_colors {
                output.push_str(&context.bright_cyan().to_string());
            } else {
                output.push_str(&context);
            }
        }

        if config.show_thread_id {
            output.push_str(&format!(" [thread:{}]", entry.thread_id));
        }

        if config.show_file_location {
            let location = format!("{}:{}", entry.file, entry.line);
            if config.show_colors {
                output.push_str(&format!(" ({})", location.bright_black()));
            } else {
                output.push_str(&format!(" ({})", location));
            }
        }

        output
    }

    fn write_to_file(&self, entry: &LogEntry, config: &LoggerConfig) {
        let line = if config.output_json {
            serde_json::to_string(entry).unwrap_or_default() + "\n"
        } else {
            // never put ANSI escapes in the file
            let plain = LoggerConfig {
                show_colors: false,
                ..config.clone()
            };
            self.format_console_output(entry, &plain) + "\n"
        };

        let Ok(mut guard) = self.log_file.lock() else {
            return;
        };
        let Some(log_file) = guard.as_mut() else {
            return;
        };

        if log_file.written + line.len() as u64 > config.max_file_size_bytes && log_file.written > 0 {
            match rotate(&log_file.path, config.backup_count).and_then(|_| open_log_file(&log_file.path)) {
                Ok(fresh) => *log_file = fresh,
                Err(e) => eprintln!("log rotation failed: {}", e),
            }
        }

        if log_file.file.write_all(line.as_bytes()).is_ok() {
            log_file.written += line.len() as u64;
        }
        let _ = log_file.file.flush();
    }

    fn create_log_entry(&self, record: &Record) -> LogEntry {
        LogEntry::new(
            LogLevel::from_log_level(record.level()),
            record.args().to_string(),
            record.module_path().unwrap_or("unknown").to_string(),
            record.file().unwrap_or("unknown").to_string(),
            record.line().unwrap_or(0),
        )
    }
}

impl Default for ImageGenLogger {
    fn default() -> Self {
        Self::new()
    }
}

fn open_log_file(path: &Path) -> Result<LogFile> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ImageGenError::io(path, e))?;
    let written = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok(LogFile {
        path: path.to_path_buf(),
        file,
        written,
    })
}

fn backup_path(path: &Path, n: usize) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{}", n));
    PathBuf::from(name)
}

/// `app.log` -> `app.log.1` -> ... -> `app.log.N`; the oldest falls off.
fn rotate(path: &Path, backup_count: usize) -> Result<()> {
    if backup_count == 0 {
        return fs::remove_file(path).map_err(|e| ImageGenError::io(path, e));
    }
    let oldest = backup_path(path, backup_count);
    if oldest.exists() {
        fs::remove_file(&oldest).map_err(|e| ImageGenError::io(&oldest, e))?;
    }
    for n in (1..backup_count).rev() {
        let from = backup_path(path, n);
        if from.exists() {
            let to = backup_path(path, n + 1);
            fs::rename(&from, &to).map_err(|e| ImageGenError::io(&from, e))?;
        }
    }
    fs::rename(path, backup_path(path, 1)).map_err(|e| ImageGenError::io(path, e))
}

impl log::Log for ImageGenLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        match self.config.lock() {
            Ok(config) => metadata.level() <= config.min_level.to_log_level(),
            Err(_) => true,
        }
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let entry = self.create_log_entry(record);

        let config = match self.config.lock() {
            Ok(config) => config.clone(),
            Err(_) => return,
        };

        if config.log_to_console {
            if config.output_json {
                eprintln!("{}", serde_json::to_string(&entry).unwrap_or_default());
            } else {
                eprintln!("{}", self.format_console_output(&entry, &config));
            }
        }

        if config.log_to_file {
            self.write_to_file(&entry, &config);
        }
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
        if let Ok(mut guard) = self.log_file.lock() {
            if let Some(log_file) = guard.as_mut() {
                let _ = log_file.file.flush();
            }
        }
    }
}

/// Measures an operation and logs its duration once, on `stop` or drop.
pub struct Timer {
    start: Instant,
    name: String,
    stopped: bool,
}

impl Timer {
    pub fn new(name: &str) -> Self {
        log::debug!("⏱️  Starting timer: {}", name);
        Self {
            start: Instant::now(),
            name: name.to_string(),
            stopped: false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn stop(mut self) -> Duration {
        self.finish()
    }

    fn finish(&mut self) -> Duration {
        let duration = self.elapsed();
        if !self.stopped {
            self.stopped = true;
            log::info!("⏱️  {} completed in {}ms", self.name, duration.as_millis());
        }
        duration
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.finish();
    }
}

pub fn timer(name: &str) -> Timer {
    Timer::new(name)
}

pub fn log_startup_info(app_name: &str, version: &str) {
    log::info!("🚀 Starting {} v{}", app_name, version);
    log::info!("📝 Logger initialized successfully");
}

/// Never prints the raw API key.
pub fn log_config_info(config: &AppConfig) {
    log::info!("⚙️  Configuration loaded:");
    log::info!("   Config file: {}", config.config_file.display());
    log::info!("   API URL: {}", config.api_url());
    log::info!(
        "   API key: {} {}",
        config.masked_api_key(),
        if config.is_api_key_valid() { "✅" } else { "❌" }
    );
    log::info!("   Timeout: {}s", config.timeout.as_secs());
    log::info!("   Max parallel calls: {}", config.max_parallel);
    log::info!("   Output dir: {}", config.output_dir.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(message: &str) -> LogEntry {
        LogEntry::new(
            LogLevel::Info,
            message.to_string(),
            "imagegen::batch".to_string(),
            "src/batch/mod.rs".to_string(),
            42,
        )
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(LogLevel::Info.as_str(), "INFO");
        assert_eq!(LogLevel::Error.emoji(), "❌");
        assert_eq!(LogLevel::Debug.color(), Color::Blue);
        assert_eq!(LogLevel::parse_lenient("Warning"), LogLevel::Warn);
        assert_eq!(LogLevel::parse_lenient("bogus"), LogLevel::Info);
        assert_eq!(LogLevel::Warn.to_log_level_filter(), log::LevelFilter::Warn);
    }

    #[test]
    fn test_logger_config() {
        let config = LoggerConfig::development();
        assert_eq!(config.min_level, LogLevel::Debug);
        assert!(config.show_colors);

        let prod_config = LoggerConfig::production();
        assert!(!prod_config.show_colors);
        assert!(prod_config.output_json);
        assert_eq!(prod_config.log_file_path(), PathBuf::from("logs").join("imagegen.log"));
    }

    #[test]
    fn plain_formatting_includes_module_and_context() {
        let logger = ImageGenLogger::new();
        let config = LoggerConfig::new()
            .with_colors(false)
            .with_prefix("gen");
        let line = logger.format_console_output(
            &entry("image ready").with_context("index", serde_json::json!(2)),
            &LoggerConfig {
                show_emojis: false,
                include_timestamp: false,
                ..config
            },
        );
        assert_eq!(line, "[gen] [INFO] imagegen::batch: image ready {\"index\":2}");
    }

    #[test]
    fn file_output_rotates_by_size() {
        let dir = tempfile::tempdir().unwrap();
        let logger = ImageGenLogger::new();
        let config = LoggerConfig::new()
            .with_file_output(dir.path())
            .with_console(false)
            .with_colors(false)
            .with_rotation(64, 2);
        logger.update_config(config.clone()).unwrap();

        for i in 0..20 {
            logger.write_to_file(&entry(&format!("line number {}", i)), &config);
        }

        let path = config.log_file_path();
        assert!(path.exists());
        assert!(backup_path(&path, 1).exists());
        assert!(backup_path(&path, 2).exists());
        assert!(!backup_path(&path, 3).exists());

        let current = fs::read_to_string(&path).unwrap();
        assert!(current.contains("line number 19"));
        assert!(!current.contains('\u{1b}'));
    }

    #[test]
    fn test_logger_initialization() {
        assert!(init_with_config(LoggerConfig::development().with_console(false)).is_ok());
        // a second install only swaps the config
        assert!(init_with_config(LoggerConfig::new().with_console(false)).is_ok());
    }

    #[test]
    fn timer_reports_once() {
        let timer = timer("unit");
        std::thread::sleep(Duration::from_millis(2));
        let elapsed = timer.stop();
        assert!(elapsed >= Duration::from_millis(2));
    }
}
