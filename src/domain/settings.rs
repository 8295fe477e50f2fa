use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the settings file location
pub const CONFIG_ENV: &str = "HID_RELAY_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "hid_relay".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Named pipe the sample producer writes to
    #[serde(default = "default_fifo_path")]
    pub fifo_path: PathBuf,
    /// Relay period; 16 ms is roughly 60 reports per second
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    // Profile Settings
    #[serde(default = "default_profile_name")]
    pub profile_name: String,
    /// Replaces the bundled SDP record when set
    #[serde(default)]
    pub sdp_record_path: Option<PathBuf>,
    #[serde(default = "default_false")]
    pub require_authentication: bool,
    #[serde(default = "default_false")]
    pub require_authorization: bool,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fifo_path: default_fifo_path(),
            tick_interval_ms: default_tick_interval_ms(),
            profile_name: default_profile_name(),
            sdp_record_path: None,
            require_authentication: false,
            require_authorization: false,
            log_settings: LogSettings::default(),
        }
    }
}

fn default_fifo_path() -> PathBuf {
    PathBuf::from("/tmp/hid-relay.fifo")
}
fn default_tick_interval_ms() -> u64 {
    16
}
fn default_profile_name() -> String {
    "HID Relay Gamepad".to_string()
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
    warnings: Vec<String>,
}

impl SettingsService {
    /// Load settings from `$HID_RELAY_CONFIG` or the user config directory.
    /// A missing file is written out with defaults.
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = match std::env::var_os(CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => Self::get_settings_path()?,
        };
        Self::open(settings_path)
    }

    /// Problems hit while loading are kept in [`Self::warnings`], since this
    /// runs before logging is set up.
    pub fn open(settings_path: PathBuf) -> anyhow::Result<Self> {
        let mut service = Self {
            settings: Settings::default(),
            settings_path,
            warnings: Vec::new(),
        };

        if service.settings_path.exists() {
            match Self::load_from_file(&service.settings_path) {
                Ok(settings) => service.settings = settings,
                Err(e) => service.warnings.push(format!(
                    "Could not parse {}: {}. Using defaults.",
                    service.settings_path.display(),
                    e
                )),
            }
        } else if let Err(e) = service.save() {
            service
                .warnings
                .push(format!("Could not write default settings: {}", e));
        }

        Ok(service)
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("hid-relay");
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let service = SettingsService::open(path.clone()).unwrap();
        assert_eq!(service.get(), &Settings::default());
        assert!(path.exists());
        assert!(service.warnings().is_empty());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "tick_interval_ms": 8, "fifo_path": "/run/pad" }"#).unwrap();

        let settings = SettingsService::open(path).unwrap().get().clone();
        assert_eq!(settings.tick_interval_ms, 8);
        assert_eq!(settings.fifo_path, PathBuf::from("/run/pad"));
        assert_eq!(settings.profile_name, "HID Relay Gamepad");
        assert!(!settings.require_authentication);
        assert_eq!(settings.log_settings, LogSettings::default());
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();

        let service = SettingsService::open(path.clone()).unwrap();
        assert_eq!(service.get(), &Settings::default());

        let [warning] = service.warnings() else {
            panic!("expected one warning, got {:?}", service.warnings());
        };
        assert!(warning.starts_with(&format!("Could not parse {}", path.display())));
        // the broken file is left for the user to fix
        assert_eq!(fs::read_to_string(&path).unwrap(), "not json");
    }

    #[test]
    fn test_unwritable_default_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();

        let service = SettingsService::open(blocker.join("settings.json")).unwrap();
        assert_eq!(service.get(), &Settings::default());
        assert_eq!(service.warnings().len(), 1);
        assert!(service.warnings()[0].starts_with("Could not write default settings"));
    }
}
