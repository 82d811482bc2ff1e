use serde::{Deserialize, Serialize};

/// Per-component log switches. A disabled component still reports warnings and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub ring: bool,
    pub ble: bool,
    pub devices: bool,
    pub mappings: bool,
    pub storage: bool,
    pub app: bool,
    /// Most verbose level printed for enabled components.
    pub level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl LogSettings {
    pub fn development() -> Self {
        Self {
            ring: true,
            ble: true,
            devices: true,
            mappings: true,
            storage: true,
            app: true,
            level: LogLevel::Debug,
        }
    }

    pub fn production() -> Self {
        Self {
            ring: true,
            ble: false,
            devices: false,
            mappings: false,
            storage: false,
            app: true,
            level: LogLevel::Info,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::development()
        } else {
            Self::production()
        }
    }
}
