//! TOML file configuration structures.
//!
//! These structs directly map to the `herald-config.toml` file format.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    /// Channel id that legacy single-string publications are attributed to.
    #[serde(default = "default_legacy_channel")]
    pub legacy_channel: String,
    /// JSON file with `(event_id, channel_id) -> message_id` fallback entries.
    #[serde(default)]
    pub fallback_cache: Option<PathBuf>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub reminders: RemindersConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

fn default_legacy_channel() -> String {
    "primary".to_string()
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080)
}

/// Timing overrides. Unset values keep the engine defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineSection {
    pub channel_call_timeout_secs: Option<u64>,
    pub image_upload_timeout_secs: Option<u64>,
    pub record_create_timeout_secs: Option<u64>,
    pub reminder_delivery_timeout_secs: Option<u64>,
    pub queue_slow_interval_secs: Option<u64>,
    pub queue_fast_interval_secs: Option<u64>,
    pub queue_fast_window_secs: Option<u64>,
    pub attendance_refresh_interval_secs: Option<u64>,
    pub reminder_check_interval_secs: Option<u64>,
    pub max_additional_images: Option<usize>,
}

/// Incoming RSVP push configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushConfig {
    /// Secret the push senders sign with. Pushes are refused while unset.
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemindersConfig {
    /// Where reminder notices are posted. Reminders are only logged while
    /// unset.
    pub notifier_url: Option<url::Url>,
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImagesConfig {
    pub upload_url: Option<url::Url>,
}

/// One publication channel reached over the webhook protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: String,
    pub name: String,
    pub endpoint: url::Url,
    #[serde(default)]
    pub secret: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
legacy_channel = "forum"
fallback_cache = "/var/lib/herald/message-ids.json"

[server]
listen = "127.0.0.1:3000"

[engine]
channel_call_timeout_secs = 10
queue_fast_window_secs = 120

[push]
secret = "push-secret"

[reminders]
notifier_url = "https://notify.example/reminders"

[images]
upload_url = "https://images.example/upload"

[[channels]]
id = "forum"
name = "Forum"
endpoint = "https://forum.example/api"
secret = "forum-secret"

[[channels]]
id = "chat"
name = "Chat"
endpoint = "https://chat.example/hooks/herald"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.legacy_channel, "forum");
        assert_eq!(config.engine.channel_call_timeout_secs, Some(10));
        assert_eq!(config.engine.image_upload_timeout_secs, None);
        assert_eq!(config.push.secret.as_deref(), Some("push-secret"));
        assert_eq!(config.channels.len(), 2);
        assert_eq!(config.channels[1].secret, None);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.listen.port(), 8080);
        assert_eq!(config.legacy_channel, "primary");
        assert!(config.channels.is_empty());
        assert!(config.push.secret.is_none());
        assert!(config.reminders.notifier_url.is_none());
    }
}
