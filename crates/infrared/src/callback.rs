//! Fire-and-forget event posts to a caller-supplied URL. Delivery is best
//! effort; a failed post is logged at debug and never touches the data
//! path.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CallbackConfig;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    PlayerJoin,
    PlayerLeave,
    ContainerStart,
    ContainerStop,
    ContainerTimeout,
    Error,
}

/// One structured proxy event.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event: EventType,
    pub domain_name: String,
    pub proxy_to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Posts events for one virtual host. Cheap to clone; disabled entirely
/// when no URL is configured.
#[derive(Clone, Default)]
pub struct CallbackLog {
    inner: Option<Arc<CallbackInner>>,
}

struct CallbackInner {
    url: String,
    events: Vec<EventType>,
    http: reqwest::Client,
}

impl CallbackLog {
    pub fn new(cfg: &CallbackConfig) -> Self {
        if cfg.url.is_empty() {
            return Self { inner: None };
        }

        Self {
            inner: Some(Arc::new(CallbackInner {
                url: cfg.url.clone(),
                events: cfg.events.clone(),
                http: reqwest::Client::new(),
            })),
        }
    }

    /// Disabled log; used where no callback is configured.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn post(&self, event: Event) {
        let Some(inner) = &self.inner else {
            return;
        };

        // An empty filter forwards everything.
        if !inner.events.is_empty() && !inner.events.contains(&event.event) {
            return;
        }

        let inner = inner.clone();
        tokio::spawn(async move {
            if let Err(e) = inner.http.post(&inner.url).json(&event).send().await {
                debug!("callback post failed: {e}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn event_serializes_with_camel_case_tags() {
        let event = Event {
            event: EventType::ContainerStart,
            domain_name: "hub.example".to_owned(),
            proxy_to: ":25566".to_owned(),
            username: None,
            message: None,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "containerStart");
        assert_eq!(json["domainName"], "hub.example");
        assert!(json.get("username").is_none());
    }

    #[test]
    fn disabled_log_swallows_events() {
        // Must not panic without a runtime: a disabled log never spawns.
        CallbackLog::disabled().post(Event {
            event: EventType::Error,
            domain_name: String::new(),
            proxy_to: String::new(),
            username: None,
            message: Some("boom".to_owned()),
        });
    }
}
