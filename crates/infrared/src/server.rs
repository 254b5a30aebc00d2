//! The virtual-host registry: maps the hostname of a parsed handshake to
//! the channel of the worker pool serving that host.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;

use crate::config::StatusConfig;
use crate::conn::HandshakeConn;

/// Everything the gateway and supervisor know about one virtual host. The
/// gateway only ever touches `conn_ch`; the rest parameterizes the worker
/// pool behind that channel.
#[derive(Clone)]
pub struct ServerData {
    pub conn_ch: flume::Sender<HandshakeConn>,
    pub proxy_to: String,
    pub real_ip: bool,
    pub online_status: StatusConfig,
    pub offline_status: StatusConfig,
    pub disconnect_message: String,
    pub number_of_instances: usize,
    pub timeout: Duration,
}

impl ServerData {
    /// A minimal record around a channel, for hosts that keep the defaults.
    pub fn with_conn_ch(conn_ch: flume::Sender<HandshakeConn>) -> Self {
        Self {
            conn_ch,
            proxy_to: String::new(),
            real_ip: false,
            online_status: StatusConfig::default(),
            offline_status: StatusConfig::default(),
            disconnect_message: String::new(),
            number_of_instances: 1,
            timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Resolves a hostname to its server record.
pub trait ServerStore: Send + Sync {
    fn lookup(&self, hostname: &str) -> Option<ServerData>;
}

/// Fronts a single backend: every hostname resolves to the one record, so
/// the login path never needs to know what the client asked for.
pub struct SingleServerStore {
    pub server: ServerData,
}

impl ServerStore for SingleServerStore {
    fn lookup(&self, _hostname: &str) -> Option<ServerData> {
        Some(self.server.clone())
    }
}

/// Case-folded exact-match mapping from domain name to server record.
/// Updates are atomic with respect to concurrent gateway lookups.
#[derive(Default)]
pub struct DefaultServerStore {
    servers: RwLock<HashMap<String, ServerData>>,
}

impl DefaultServerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_server(&self, domain: &str, server: ServerData) {
        self.servers
            .write()
            .insert(domain.to_lowercase(), server);
    }

    pub fn remove_server(&self, domain: &str) {
        self.servers.write().remove(&domain.to_lowercase());
    }

    pub fn len(&self) -> usize {
        self.servers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.read().is_empty()
    }
}

impl ServerStore for DefaultServerStore {
    fn lookup(&self, hostname: &str) -> Option<ServerData> {
        self.servers.read().get(&hostname.to_lowercase()).cloned()
    }
}
