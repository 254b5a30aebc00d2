//! The persisted per-virtual-host configuration. Loading and hot-reloading
//! these records from disk (or the admin API) happens outside the core; the
//! proxy only consumes the deserialized values.

use std::path::PathBuf;
use std::time::Duration;

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::callback::EventType;
use crate::error::ProxyError;
use crate::process::ProcessConfig;

/// One virtual host: a domain name, where to listen, where to proxy to, and
/// everything needed to stand in for the backend while it is offline.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProxyConfig {
    pub domain_name: String,
    pub listen_to: String,
    pub proxy_to: String,
    pub timeout: Duration,
    pub real_ip: bool,
    pub number_of_instances: usize,
    pub compression_threshold: i32,
    pub server: ServerStatusConfig,
    pub process: ProcessConfig,
    pub callback_log: CallbackConfig,
}

impl ProxyConfig {
    /// The slice of this record a worker pool needs.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            domain_name: self.domain_name.clone(),
            proxy_to: self.proxy_to.clone(),
            timeout: self.timeout,
            real_ip: self.real_ip,
            number_of_instances: self.number_of_instances,
            compression_threshold: self.compression_threshold,
            online_status: self.server.online_status.clone(),
            offline_status: self.server.offline_status.clone(),
            disconnect_message: self.server.disconnect_message.clone(),
            process: self.process.clone(),
            callback_log: self.callback_log.clone(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerStatusConfig {
    pub online_status: StatusConfig,
    pub offline_status: StatusConfig,
    pub disconnect_message: String,
}

impl Default for ServerStatusConfig {
    fn default() -> Self {
        Self {
            online_status: StatusConfig::default(),
            offline_status: StatusConfig::default(),
            disconnect_message: default_disconnect_message(),
        }
    }
}

/// Per-virtual-host record in the shape the supervisor hands to workers.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub domain_name: String,
    pub proxy_to: String,
    /// Idle time after the last player leaves before the backend process is
    /// stopped again.
    pub timeout: Duration,
    pub real_ip: bool,
    /// Size of the worker pool reading this host's connection channel.
    pub number_of_instances: usize,
    /// The threshold the proxy announces to its clients during the login
    /// renegotiation. The backend's own threshold is independent.
    pub compression_threshold: i32,
    pub online_status: StatusConfig,
    pub offline_status: StatusConfig,
    /// Shown to players who try to log in while the backend is offline.
    /// `$username` is substituted.
    pub disconnect_message: String,
    pub process: ProcessConfig,
    pub callback_log: CallbackConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            domain_name: String::new(),
            proxy_to: String::new(),
            timeout: Duration::from_secs(5 * 60),
            real_ip: false,
            number_of_instances: 1,
            compression_threshold: 256,
            online_status: StatusConfig::default(),
            offline_status: StatusConfig::default(),
            disconnect_message: default_disconnect_message(),
            process: ProcessConfig::default(),
            callback_log: CallbackConfig::default(),
        }
    }
}

fn default_disconnect_message() -> String {
    "Hey §e$username§r! The server was sleeping but it is starting now.".to_owned()
}

/// The fields of a server list entry. Rendered once into the SLP response
/// JSON when the offline responder is built.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StatusConfig {
    pub version_name: String,
    pub protocol_number: i32,
    pub max_players: i32,
    pub players_online: i32,
    pub player_samples: Vec<PlayerSample>,
    pub icon_path: Option<PathBuf>,
    pub motd: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            version_name: "Infrared 1.16.4".to_owned(),
            protocol_number: 754,
            max_players: 20,
            players_online: 0,
            player_samples: Vec::new(),
            icon_path: None,
            motd: "Powered by Infrared".to_owned(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSample {
    pub name: String,
    pub id: String,
}

impl StatusConfig {
    /// Renders the SLP response JSON, embedding the icon file as a base64
    /// data URI when one is configured.
    pub fn render_json(&self) -> Result<String, ProxyError> {
        let mut status = json!({
            "version": {
                "name": self.version_name,
                "protocol": self.protocol_number,
            },
            "players": {
                "max": self.max_players,
                "online": self.players_online,
                "sample": self.player_samples,
            },
            "description": {
                "text": self.motd,
            },
        });

        if let Some(path) = &self.icon_path {
            let icon = std::fs::read(path).map_err(|e| {
                ProxyError::Config(format!("could not read icon {}: {e}", path.display()))
            })?;

            let mut data_uri = "data:image/png;base64,".to_owned();
            BASE64_STANDARD.encode_string(icon, &mut data_uri);
            status["favicon"] = Value::String(data_uri);
        }

        Ok(status.to_string())
    }
}

/// Where to POST structured proxy events, and which ones.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CallbackConfig {
    /// Empty disables the callback log.
    pub url: String,
    /// Empty means every event type.
    pub events: Vec<EventType>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn status_json_shape() {
        let cfg = StatusConfig {
            version_name: "Infrared-1".to_owned(),
            protocol_number: 754,
            max_players: 20,
            players_online: 3,
            player_samples: vec![PlayerSample {
                name: "Alice".to_owned(),
                id: "c0ffee00-0000-0000-0000-000000000000".to_owned(),
            }],
            icon_path: None,
            motd: "hub".to_owned(),
        };

        let rendered: Value = serde_json::from_str(&cfg.render_json().unwrap()).unwrap();

        assert_eq!(rendered["version"]["name"], "Infrared-1");
        assert_eq!(rendered["version"]["protocol"], 754);
        assert_eq!(rendered["players"]["online"], 3);
        assert_eq!(rendered["players"]["sample"][0]["name"], "Alice");
        assert_eq!(rendered["description"]["text"], "hub");
        assert!(rendered.get("favicon").is_none());
    }

    #[test]
    fn persisted_record_round_trips_and_projects() {
        let json = r#"{
            "domainName": "hub.example",
            "listenTo": ":25565",
            "proxyTo": "127.0.0.1:25566",
            "timeout": { "secs": 120, "nanos": 0 },
            "realIp": true,
            "numberOfInstances": 3,
            "compressionThreshold": 256,
            "server": { "disconnectMessage": "later, $username" }
        }"#;

        let cfg: ProxyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.listen_to, ":25565");

        let server = cfg.server_config();
        assert_eq!(server.domain_name, "hub.example");
        assert_eq!(server.proxy_to, "127.0.0.1:25566");
        assert_eq!(server.timeout, Duration::from_secs(120));
        assert!(server.real_ip);
        assert_eq!(server.number_of_instances, 3);
        assert_eq!(server.disconnect_message, "later, $username");
    }

    #[test]
    fn missing_icon_is_a_config_error() {
        let cfg = StatusConfig {
            icon_path: Some(PathBuf::from("/definitely/not/here.png")),
            ..StatusConfig::default()
        };

        assert!(matches!(
            cfg.render_json(),
            Err(ProxyError::Config(_))
        ));
    }
}
