//! The supervisor: fans N accept loops into M gateways over one ingress
//! channel, and runs a fixed-size worker pool per virtual host. Owns the
//! channels and the close signal.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::conn::{HandshakeConn, ListenerFactory, ServerConnFactory, ServerConnFactoryBuilder};
use crate::error::ProxyError;
use crate::gateway::Gateway;
use crate::middleware::{ChatCommand, Middleware, PlayerInfoRewrite, SpawnPlayerRewrite};
use crate::process;
use crate::server::{DefaultServerStore, ServerData};
use crate::session::Encryptor;
use crate::worker::{VirtualHost, Worker};

/// Pending connections between the accept loops and the gateways.
const INGRESS_CAPACITY: usize = 64;
/// Pending connections per virtual host, in front of its worker pool.
const CONN_CH_CAPACITY: usize = 16;

/// Counts live proxied connections. A metrics exporter reads it; the core
/// only increments and decrements.
#[derive(Clone, Default)]
pub struct ConnectionGauge(Arc<AtomicUsize>);

impl ConnectionGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    /// Increments until the returned guard drops.
    pub fn track(&self) -> ConnectionGuard {
        self.0.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard(self.0.clone())
    }
}

pub struct ConnectionGuard(Arc<AtomicUsize>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

pub struct ProxyLaneConfig {
    pub number_of_listeners: usize,
    pub number_of_gateways: usize,
    /// Backend dial timeout, handed to the dialer builder once at startup.
    pub timeout: Duration,
    pub listen_to: String,
    pub servers: Vec<ServerConfig>,
    pub server_conn_factory: ServerConnFactoryBuilder,
    pub listener_factory: Arc<dyn ListenerFactory>,
    pub gauge: ConnectionGauge,
}

/// One running proxy lane: a public port and everything behind it. Dropping
/// the lane does not stop it; use [`close`](Self::close).
pub struct ProxyLane {
    close_tx: watch::Sender<bool>,
    store: Arc<DefaultServerStore>,
}

impl ProxyLane {
    pub async fn start(cfg: ProxyLaneConfig) -> Result<Self, ProxyError> {
        let listener = cfg
            .listener_factory
            .bind(&cfg.listen_to)
            .await
            .map_err(|e| ProxyError::Config(format!("could not bind {}: {e}", cfg.listen_to)))?;
        let listener = Arc::new(listener);

        let (ingress_tx, ingress_rx) = flume::bounded::<HandshakeConn>(INGRESS_CAPACITY);
        let (close_tx, close_rx) = watch::channel(false);

        let store = Arc::new(DefaultServerStore::new());

        // The dial timeout is fixed here, once, for every worker pool.
        let dialer = (cfg.server_conn_factory)(cfg.timeout);

        for server_cfg in &cfg.servers {
            Self::start_server(server_cfg, &cfg, &dialer, &store)?;
        }

        for _ in 0..cfg.number_of_gateways.max(1) {
            let gateway = Gateway::new(store.clone(), ingress_rx.clone(), close_rx.clone());
            tokio::spawn(gateway.run());
        }

        for _ in 0..cfg.number_of_listeners.max(1) {
            let listener = listener.clone();
            let ingress_tx = ingress_tx.clone();
            let mut close_rx = close_rx.clone();

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        changed = close_rx.changed() => {
                            if changed.is_err() || *close_rx.borrow() {
                                return;
                            }
                        }
                        accepted = listener.accept() => {
                            match accepted {
                                Ok((stream, remote_addr)) => {
                                    if let Err(e) = stream.set_nodelay(true) {
                                        error!("failed to set TCP_NODELAY: {e}");
                                    }

                                    let conn = HandshakeConn::new(stream, remote_addr);
                                    if ingress_tx.send_async(conn).await.is_err() {
                                        return;
                                    }
                                }
                                Err(e) => error!("failed to accept incoming connection: {e}"),
                            }
                        }
                    }
                }
            });
        }

        info!(listen_to = %cfg.listen_to, servers = cfg.servers.len(), "proxy lane up");

        Ok(Self { close_tx, store })
    }

    /// Builds one virtual host: its state, its registry entry and its worker
    /// pool.
    fn start_server(
        server_cfg: &ServerConfig,
        cfg: &ProxyLaneConfig,
        dialer: &Arc<dyn ServerConnFactory>,
        store: &Arc<DefaultServerStore>,
    ) -> Result<(), ProxyError> {
        let (conn_tx, conn_rx) = flume::bounded::<HandshakeConn>(CONN_CH_CAPACITY);

        let proc = process::new(&server_cfg.process)?;
        let host = VirtualHost::new(server_cfg.clone(), proc, Encryptor::new()?)?;

        let middleware: Arc<Vec<Arc<dyn Middleware>>> = Arc::new(vec![
            Arc::new(ChatCommand),
            Arc::new(SpawnPlayerRewrite {
                players: host.players.clone(),
            }),
            Arc::new(PlayerInfoRewrite {
                players: host.players.clone(),
            }),
        ]);

        store.add_server(
            &server_cfg.domain_name,
            ServerData {
                conn_ch: conn_tx,
                proxy_to: server_cfg.proxy_to.clone(),
                real_ip: server_cfg.real_ip,
                online_status: server_cfg.online_status.clone(),
                offline_status: server_cfg.offline_status.clone(),
                disconnect_message: server_cfg.disconnect_message.clone(),
                number_of_instances: server_cfg.number_of_instances,
                timeout: server_cfg.timeout,
            },
        );

        for _ in 0..server_cfg.number_of_instances.max(1) {
            let worker = Worker::new(
                host.clone(),
                conn_rx.clone(),
                dialer.clone(),
                middleware.clone(),
                cfg.gauge.clone(),
            );
            tokio::spawn(worker.run());
        }

        info!(
            domain = %server_cfg.domain_name,
            proxy_to = %server_cfg.proxy_to,
            instances = server_cfg.number_of_instances.max(1),
            "virtual host registered"
        );

        Ok(())
    }

    pub fn store(&self) -> &Arc<DefaultServerStore> {
        &self.store
    }

    /// Stops the accept loops and gateways. In-flight connections drain on
    /// their own; they die when either peer closes the socket.
    pub fn close(&self) {
        let _ = self.close_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use async_trait::async_trait;
    use infrared_protocol::packets::handshaking::{HandshakeC2s, NextState};
    use infrared_protocol::packets::login::{DisconnectS2c, LoginStartC2s};
    use infrared_protocol::VarInt;
    use pretty_assertions::assert_eq;
    use tokio::net::TcpStream;

    use super::*;
    use crate::conn::{McConn, TcpBinder};

    struct FailingDialer;

    #[async_trait]
    impl ServerConnFactory for FailingDialer {
        async fn dial(&self, _addr: &str) -> io::Result<McConn> {
            Err(io::Error::from(io::ErrorKind::ConnectionRefused))
        }
    }

    #[tokio::test]
    async fn lane_routes_login_to_offline_disconnect() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let gauge = ConnectionGauge::new();
        let lane = ProxyLane::start(ProxyLaneConfig {
            number_of_listeners: 2,
            number_of_gateways: 2,
            timeout: Duration::from_millis(250),
            listen_to: addr.to_string(),
            servers: vec![ServerConfig {
                domain_name: "localhost".to_owned(),
                proxy_to: "127.0.0.1:1".to_owned(),
                disconnect_message: "Starting for $username".to_owned(),
                ..ServerConfig::default()
            }],
            server_conn_factory: Arc::new(|_timeout| -> Arc<dyn ServerConnFactory> {
                Arc::new(FailingDialer)
            }),
            listener_factory: Arc::new(TcpBinder),
            gauge: gauge.clone(),
        })
        .await
        .unwrap();

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut conn = McConn::new(stream, addr);

        conn.send_packet(&HandshakeC2s {
            protocol_version: VarInt(754),
            server_address: "localhost".to_owned(),
            server_port: addr.port(),
            next_state: NextState::Login,
        })
        .await
        .unwrap();

        conn.send_packet(&LoginStartC2s {
            username: "Alice".to_owned(),
        })
        .await
        .unwrap();

        let disconnect: DisconnectS2c = conn.recv_packet().await.unwrap();
        assert_eq!(disconnect.reason, r#"{"text":"Starting for Alice"}"#);

        lane.close();
    }
}
