use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{alarm::KillWarning, error::Error};

const APP_NAME: &str = "ring_coordinator";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// alarms closer than this are triggered in-process instead of through
    /// the OS timer
    pub immediate_threshold_secs: u64,
    pub wake_lock_timeout_secs: u64,
    /// alternating wait/vibrate durations, repeated while ringing
    pub vibration_pattern_ms: Vec<u64>,
    pub refresh_interval_secs: u64,
    /// how long a teardown may take before we stop waiting for it
    pub teardown_budget_ms: u64,
    /// defaults to `history.toml` in the data directory
    pub history_path: Option<PathBuf>,
    pub kill_warning: KillWarning,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            immediate_threshold_secs: 5,
            wake_lock_timeout_secs: 5 * 60,
            vibration_pattern_ms: vec![0, 500, 500],
            refresh_interval_secs: 15 * 60,
            teardown_budget_ms: 2000,
            history_path: None,
            kill_warning: KillWarning::default(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// if the file can't be read or isn't a valid config
    pub fn load(path: &Path) -> Result<Self, Error> {
        let config = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&config)?)
    }

    /// the config at `path`, or the defaults when there is none yet
    ///
    /// # Errors
    /// if an existing file can't be read or parsed
    pub fn load_or_default(path: &Path) -> Result<Self, Error> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// # Errors
    /// if the config can't be serialized or written
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let config = toml::to_string(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, config)?;
        Ok(())
    }

    fn project_dirs() -> Result<directories::ProjectDirs, Error> {
        directories::ProjectDirs::from("", "", APP_NAME).ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "couldn't find a home directory",
            ))
        })
    }

    /// # Errors
    /// if there is no home directory to put it in
    pub fn config_path() -> Result<PathBuf, Error> {
        let mut path = Self::project_dirs()?.config_dir().to_path_buf();
        path.push("config.toml");
        Ok(path)
    }

    /// # Errors
    /// if there is no home directory to put it in
    pub fn data_path() -> Result<PathBuf, Error> {
        Ok(Self::project_dirs()?.data_dir().to_path_buf())
    }

    #[must_use]
    pub fn is_config_present() -> bool {
        Self::config_path().is_ok_and(|path| path.exists())
    }

    /// # Errors
    /// if no path is configured and there is no data directory
    pub fn history_path(&self) -> Result<PathBuf, Error> {
        match &self.history_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::data_path()?.join("history.toml")),
        }
    }

    #[must_use]
    pub const fn immediate_threshold(&self) -> Duration {
        Duration::from_secs(self.immediate_threshold_secs)
    }

    #[must_use]
    pub const fn wake_lock_timeout(&self) -> Duration {
        Duration::from_secs(self.wake_lock_timeout_secs)
    }

    #[must_use]
    pub fn vibration_pattern(&self) -> Vec<Duration> {
        self.vibration_pattern_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }

    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    #[must_use]
    pub const fn teardown_budget(&self) -> Duration {
        Duration::from_millis(self.teardown_budget_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_platform_conventions() {
        let config = Config::default();
        assert_eq!(config.immediate_threshold(), Duration::from_secs(5));
        assert_eq!(config.wake_lock_timeout(), Duration::from_secs(300));
        assert_eq!(
            config.vibration_pattern(),
            vec![
                Duration::ZERO,
                Duration::from_millis(500),
                Duration::from_millis(500)
            ]
        );
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::new();
        config.teardown_budget_ms = 750;
        config.kill_warning.title = "Alarms paused".into();

        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "immediate_threshold_secs = 2\n").unwrap();

        let config = Config::load(&path).unwrap();

        assert_eq!(config.immediate_threshold_secs, 2);
        assert_eq!(config.refresh_interval_secs, 900);
    }

    #[test]
    fn absent_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "teardown_budget_ms = \"soon\"").unwrap();

        assert_eq!(Config::load(&path).unwrap_err().as_label(), "config_parse");
    }
}
