use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use bubble_storage::{StorageError, write_json_atomic};
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::dispatch::{
    DEFAULT_ERROR_CLEAR_DELAY, DEFAULT_SUGGESTED_PROMPT_DELAY, DispatchDelay, DispatchTimings,
};
use crate::remote::UserProfile;

pub const SETTINGS_DIRECTORY_NAME: &str = "bubble";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const SETTINGS_ENV_PREFIX: &str = "BUBBLE_";
pub const DEFAULT_LOG_FILTER: &str = "info";
pub const DEFAULT_DEMO_REPLY_LATENCY_MS: u64 = 600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSettings {
    #[serde(default)]
    pub user: UserProfile,
    #[serde(default = "default_error_clear_ms")]
    pub error_clear_ms: u64,
    #[serde(default = "default_suggested_prompt_delay_ms")]
    pub suggested_prompt_delay_ms: u64,
    #[serde(default = "default_demo_reply_latency_ms")]
    pub demo_reply_latency_ms: u64,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            user: UserProfile::default(),
            error_clear_ms: default_error_clear_ms(),
            suggested_prompt_delay_ms: default_suggested_prompt_delay_ms(),
            demo_reply_latency_ms: default_demo_reply_latency_ms(),
            log_filter: default_log_filter(),
        }
    }
}

impl ChatSettings {
    pub fn to_timings(&self) -> DispatchTimings {
        DispatchTimings {
            error_clear: Duration::from_millis(self.error_clear_ms),
            suggested_prompt: DispatchDelay::After(Duration::from_millis(
                self.suggested_prompt_delay_ms,
            )),
            ..DispatchTimings::default()
        }
    }

    pub fn demo_reply_latency(&self) -> Duration {
        Duration::from_millis(self.demo_reply_latency_ms)
    }

    pub fn normalized(mut self) -> Self {
        self.user.full_name = self.user.full_name.trim().to_string();
        self.user.email = self.user.email.trim().to_string();
        self.log_filter = if self.log_filter.trim().is_empty() {
            default_log_filter()
        } else {
            self.log_filter.trim().to_string()
        };
        self
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<ChatSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".bubble"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<ChatSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: ChatSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    fn load_from_disk(path: &Path) -> ChatSettings {
        let mut figment = Figment::from(Serialized::defaults(ChatSettings::default()));
        if path.exists() {
            figment = figment.merge(Json::file(path));
        } else {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }
        figment = figment.merge(Env::prefixed(SETTINGS_ENV_PREFIX).split("__"));

        match figment.extract::<ChatSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                ChatSettings::default()
            }
        }
    }

    fn persist(&self, settings: &ChatSettings) -> Result<(), SettingsError> {
        write_json_atomic(&self.config_path, settings).context(PersistSnafu {
            stage: "persist-settings",
            path: self.config_path.clone(),
        })?;
        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to save settings to {path:?} on `{stage}`: {source}"))]
    Persist {
        stage: &'static str,
        path: PathBuf,
        source: StorageError,
    },
}

fn default_error_clear_ms() -> u64 {
    DEFAULT_ERROR_CLEAR_DELAY.as_millis() as u64
}

fn default_suggested_prompt_delay_ms() -> u64 {
    DEFAULT_SUGGESTED_PROMPT_DELAY.as_millis() as u64
}

fn default_demo_reply_latency_ms() -> u64 {
    DEFAULT_DEMO_REPLY_LATENCY_MS
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join(SETTINGS_FILE_NAME));

        let settings = store.settings();
        assert_eq!(settings.error_clear_ms, 3_000);
        assert_eq!(settings.suggested_prompt_delay_ms, 500);
        assert_eq!(settings.to_timings(), DispatchTimings::default());
    }

    #[test]
    fn partial_file_is_layered_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(
            &path,
            r#"{"error_clear_ms": 1200, "user": {"id": "u42", "fullName": " Ada "}}"#,
        )
        .unwrap();

        let settings = SettingsStore::new(path).settings();

        assert_eq!(settings.error_clear_ms, 1_200);
        assert_eq!(settings.suggested_prompt_delay_ms, 500);
        assert_eq!(settings.user.id.as_str(), "u42");
        assert_eq!(settings.user.full_name, "Ada");
    }

    #[test]
    fn unparsable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, r#"{"error_clear_ms": "soon"}"#).unwrap();

        assert_eq!(
            SettingsStore::new(path).settings().error_clear_ms,
            default_error_clear_ms()
        );
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE_NAME);
        let store = SettingsStore::new(path.clone());

        let mut settings = (*store.settings()).clone();
        settings.demo_reply_latency_ms = 50;
        settings.log_filter = "  ".to_string();
        store.update(settings).unwrap();

        assert_eq!(store.settings().log_filter, DEFAULT_LOG_FILTER);
        assert!(!path.with_extension("json.tmp").exists());
        let reloaded = SettingsStore::new(path).settings();
        assert_eq!(reloaded.demo_reply_latency_ms, 50);
    }
}
