use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Debug,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// File-backed diagnostic log under `~/.consulta/logs/`. Write failures
/// are swallowed; logging must never take the app down.
#[derive(Clone)]
pub struct Logger {
    file_handle: Arc<Mutex<Option<std::fs::File>>>,
}

impl Logger {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let home = dirs::home_dir().ok_or("could not find home directory")?;
        let logs_dir = home.join(".consulta").join("logs");
        fs::create_dir_all(&logs_dir)?;
        Self::at_path(logs_dir.join("latest.log"))
    }

    pub fn at_path(path: PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            file_handle: Arc::new(Mutex::new(Some(file))),
        })
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        let timestamp: DateTime<Utc> = Utc::now();
        let line = format!(
            "[{}] [{}] {}\n",
            timestamp.format("%Y-%m-%d %H:%M:%S%.3f UTC"),
            level,
            message
        );

        if let Ok(mut guard) = self.file_handle.lock() {
            if let Some(ref mut file) = *guard {
                let _ = file.write_all(line.as_bytes());
                let _ = file.flush();
            }
        }
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

static GLOBAL_LOGGER: OnceLock<Logger> = OnceLock::new();

pub fn init_global_logger() -> Result<(), Box<dyn std::error::Error>> {
    let logger = Logger::new()?;
    GLOBAL_LOGGER.set(logger).map_err(|_| "logger already initialized")?;
    Ok(())
}

pub fn log(level: LogLevel, message: &str) {
    if let Some(logger) = GLOBAL_LOGGER.get() {
        logger.log(level, message);
    }
}

pub fn info(message: &str) {
    log(LogLevel::Info, message);
}

pub fn debug(message: &str) {
    log(LogLevel::Debug, message);
}

pub fn warn(message: &str) {
    log(LogLevel::Warn, message);
}

pub fn error(message: &str) {
    log(LogLevel::Error, message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_level_tagged_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        let logger = Logger::at_path(path.clone()).unwrap();

        logger.info("cargando sesiones");
        logger.error("fallo de red");

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("[INFO] cargando sesiones"));
        assert!(content.contains("[ERROR] fallo de red"));
    }
}
