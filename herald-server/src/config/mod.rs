//! Configuration module for herald-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables.

pub mod file;

use crate::config::file::{EngineSection, FileConfig};
use herald_core::channels::{ChannelAdapter, ChannelRegistry, WebhookChannel, WebhookChannelConfig};
use herald_core::config::{EngineConfig, QueueIntervals};
use herald_sdk::objects::ChannelId;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub listen: SocketAddr,
    pub engine: EngineConfig,
    pub legacy_channel: ChannelId,
    pub fallback_cache: Option<PathBuf>,
    pub push_secret: Option<Box<[u8]>>,
    pub notifier_url: Option<url::Url>,
    pub notifier_secret: Option<String>,
    pub image_upload_url: Option<url::Url>,
    pub channels: Vec<WebhookChannelConfig>,
}

impl LoadedConfig {
    /// Build adapters for the configured channels.
    pub fn channel_registry(&self, http_client: &reqwest::Client) -> ChannelRegistry {
        let adapters = self
            .channels
            .iter()
            .cloned()
            .map(|config| {
                Arc::new(WebhookChannel::new(config, http_client.clone())) as Arc<dyn ChannelAdapter>
            })
            .collect();
        ChannelRegistry::new(adapters)
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read the TOML file, apply CLI overrides and validate.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        build_loaded_config(file_config)
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for channel in &config.channels {
        if channel.id.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "channel {} has an empty id",
                channel.name
            )));
        }
        if !seen.insert(channel.id.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "channel id {} is configured more than once",
                channel.id
            )));
        }
    }
    if config.legacy_channel.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "legacy_channel must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn build_loaded_config(file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
    validate(&file_config)?;
    let engine = engine_config(&file_config.engine)?;

    Ok(LoadedConfig {
        listen: file_config.server.listen,
        engine,
        legacy_channel: ChannelId::from(file_config.legacy_channel),
        fallback_cache: file_config.fallback_cache,
        push_secret: file_config
            .push
            .secret
            .map(|secret| secret.into_bytes().into_boxed_slice()),
        notifier_url: file_config.reminders.notifier_url,
        notifier_secret: file_config.reminders.secret,
        image_upload_url: file_config.images.upload_url,
        channels: file_config
            .channels
            .into_iter()
            .map(|channel| WebhookChannelConfig {
                id: ChannelId::from(channel.id),
                name: channel.name,
                endpoint: channel.endpoint,
                secret: channel.secret,
            })
            .collect(),
    })
}

/// Apply the `[engine]` overrides on top of the defaults.
pub fn engine_config(section: &EngineSection) -> Result<EngineConfig, ConfigError> {
    let defaults = EngineConfig::default();
    let secs = |value: Option<u64>, default: Duration| {
        value.map(Duration::from_secs).unwrap_or(default)
    };

    let queue = QueueIntervals {
        slow: secs(section.queue_slow_interval_secs, defaults.queue.slow),
        fast: secs(section.queue_fast_interval_secs, defaults.queue.fast),
        fast_window: secs(section.queue_fast_window_secs, defaults.queue.fast_window),
    };
    if queue.fast.is_zero() || queue.fast > queue.slow {
        return Err(ConfigError::ValidationError(
            "queue_fast_interval_secs must be positive and not exceed queue_slow_interval_secs"
                .to_string(),
        ));
    }

    let config = EngineConfig {
        channel_call_timeout: secs(
            section.channel_call_timeout_secs,
            defaults.channel_call_timeout,
        ),
        image_upload_timeout: secs(
            section.image_upload_timeout_secs,
            defaults.image_upload_timeout,
        ),
        record_create_timeout: secs(
            section.record_create_timeout_secs,
            defaults.record_create_timeout,
        ),
        reminder_delivery_timeout: secs(
            section.reminder_delivery_timeout_secs,
            defaults.reminder_delivery_timeout,
        ),
        queue,
        attendance_refresh_interval: secs(
            section.attendance_refresh_interval_secs,
            defaults.attendance_refresh_interval,
        ),
        reminder_check_interval: secs(
            section.reminder_check_interval_secs,
            defaults.reminder_check_interval,
        ),
        max_additional_images: section
            .max_additional_images
            .unwrap_or(defaults.max_additional_images),
    };
    if config.attendance_refresh_interval.is_zero() || config.reminder_check_interval.is_zero() {
        return Err(ConfigError::ValidationError(
            "loop intervals must be positive".to_string(),
        ));
    }
    Ok(config)
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_overrides_apply_on_top_of_defaults() {
        let section = EngineSection {
            channel_call_timeout_secs: Some(5),
            queue_fast_interval_secs: Some(10),
            ..Default::default()
        };
        let config = engine_config(&section).unwrap();
        assert_eq!(config.channel_call_timeout, Duration::from_secs(5));
        assert_eq!(config.queue.fast, Duration::from_secs(10));
        assert_eq!(config.queue.slow, EngineConfig::default().queue.slow);
        assert_eq!(config.max_additional_images, 10);
    }

    #[test]
    fn fast_interval_may_not_exceed_slow_interval() {
        let section = EngineSection {
            queue_fast_interval_secs: Some(120),
            queue_slow_interval_secs: Some(60),
            ..Default::default()
        };
        assert!(matches!(
            engine_config(&section),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn duplicate_channel_ids_are_rejected() {
        let config: FileConfig = toml::from_str(
            r#"
[[channels]]
id = "forum"
name = "Forum"
endpoint = "https://forum.example/api"

[[channels]]
id = "forum"
name = "Forum again"
endpoint = "https://forum2.example/api"
"#,
        )
        .unwrap();
        assert!(matches!(
            build_loaded_config(config),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
