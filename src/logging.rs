use std::sync::OnceLock;

use chrono::Local;
use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};

use crate::config::LogSettings;

static LOGGER: OnceLock<RingLogger> = OnceLock::new();

/// Area of the bridge a log record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Ring,
    Ble,
    Devices,
    Mappings,
    Storage,
    App,
}

impl Component {
    /// Resolves the component from a record target, which is the emitting module path.
    pub fn from_target(target: &str) -> Self {
        let path = target.split_once("::").map_or("", |(_, rest)| rest);
        if path.starts_with("core::bluetooth") {
            Component::Ble
        } else if path.starts_with("ring::devices") {
            Component::Devices
        } else if path.starts_with("ring::modes") {
            Component::Mappings
        } else if path.starts_with("ring") || path.starts_with("core") {
            Component::Ring
        } else if path.starts_with("storage") {
            Component::Storage
        } else {
            Component::App
        }
    }

    fn label(self) -> &'static str {
        match self {
            Component::Ring => "RING",
            Component::Ble => "BLE",
            Component::Devices => "CONNECTED DEV",
            Component::Mappings => "MAPPINGS",
            Component::Storage => "STORAGE",
            Component::App => "APP",
        }
    }
}

pub struct RingLogger {
    settings: LogSettings,
    level: LevelFilter,
}

impl RingLogger {
    pub fn new(settings: LogSettings) -> Self {
        Self {
            settings,
            level: settings.level.into(),
        }
    }

    /// Installs the logger process-wide. Fails if another logger is already set.
    pub fn init(settings: LogSettings) -> Result<(), SetLoggerError> {
        let logger = LOGGER.get_or_init(|| RingLogger::new(settings));
        log::set_logger(logger).map(|()| log::set_max_level(logger.level))
    }

    fn component_enabled(&self, component: Component) -> bool {
        match component {
            Component::Ring => self.settings.ring,
            Component::Ble => self.settings.ble,
            Component::Devices => self.settings.devices,
            Component::Mappings => self.settings.mappings,
            Component::Storage => self.settings.storage,
            Component::App => self.settings.app,
        }
    }

    fn format(record: &Record, component: Component) -> String {
        format!(
            "[{} {} {}] {}",
            Local::now().format("%H:%M:%S%.3f"),
            record.level(),
            component.label(),
            record.args()
        )
    }
}

impl log::Log for RingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        if metadata.level() > self.level {
            return false;
        }
        metadata.level() <= Level::Warn
            || self.component_enabled(Component::from_target(metadata.target()))
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{}", Self::format(record, Component::from_target(record.target())));
        }
    }

    fn flush(&self) {}
}
