//! Routes freshly accepted connections to their virtual host's worker pool
//! based on the hostname in the handshake.

use std::sync::Arc;

use infrared_protocol::packets::handshaking::HandshakeC2s;
use tokio::sync::watch;
use tracing::debug;

use crate::conn::HandshakeConn;
use crate::server::ServerStore;

/// Reads exactly one packet per connection (the handshake), consults the
/// store, and hands the connection off on the matching server channel. A
/// lookup miss closes the connection. Several gateways may run concurrently
/// against one ingress channel.
pub struct Gateway {
    store: Arc<dyn ServerStore>,
    ingress: flume::Receiver<HandshakeConn>,
    close: watch::Receiver<bool>,
}

impl Gateway {
    pub fn new(
        store: Arc<dyn ServerStore>,
        ingress: flume::Receiver<HandshakeConn>,
        close: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            ingress,
            close,
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                changed = self.close.changed() => {
                    // A dropped sender counts as a close.
                    if changed.is_err() || *self.close.borrow() {
                        return;
                    }
                }
                conn = self.ingress.recv_async() => {
                    match conn {
                        Ok(conn) => self.handle(conn).await,
                        // All senders gone; nothing left to route.
                        Err(_) => return,
                    }
                }
            }
        }
    }

    async fn handle(&self, mut hs_conn: HandshakeConn) {
        let remote_addr = hs_conn.conn.remote_addr();

        let handshake = match hs_conn.conn.recv_packet::<HandshakeC2s>().await {
            Ok(handshake) => handshake,
            Err(e) => {
                debug!(%remote_addr, "connection did not open with a valid handshake: {e}");
                return;
            }
        };

        let hostname = handshake.parse_server_address().to_owned();

        let Some(server) = self.store.lookup(&hostname) else {
            debug!(%remote_addr, %hostname, "no server for requested hostname");
            return;
        };

        hs_conn.handshake = Some(handshake);

        // Send transfers ownership; a closed pool just drops the connection.
        if server.conn_ch.send_async(hs_conn).await.is_err() {
            debug!(%remote_addr, %hostname, "server channel closed, dropping connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use infrared_protocol::packets::handshaking::NextState;
    use infrared_protocol::{PacketEncoder, VarInt};
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    use super::*;
    use crate::server::{DefaultServerStore, ServerData, SingleServerStore};

    const CHAN_TIMEOUT: Duration = Duration::from_millis(100);

    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    async fn write_handshake(stream: &mut TcpStream, addr: &str) {
        let handshake = HandshakeC2s {
            protocol_version: VarInt(754),
            server_address: addr.to_owned(),
            server_port: 25565,
            next_state: NextState::Login,
        };

        let mut enc = PacketEncoder::new();
        enc.append_packet(&handshake).unwrap();
        stream.write_all(&enc.take()).await.unwrap();
    }

    fn spawn_gateway(
        store: Arc<dyn ServerStore>,
    ) -> (flume::Sender<HandshakeConn>, watch::Sender<bool>) {
        let (ingress_tx, ingress_rx) = flume::bounded(4);
        let (close_tx, close_rx) = watch::channel(false);
        tokio::spawn(Gateway::new(store, ingress_rx, close_rx).run());
        (ingress_tx, close_tx)
    }

    #[tokio::test]
    async fn routes_to_matching_server_channel() {
        let store = Arc::new(DefaultServerStore::new());
        let (conn_tx, conn_rx) = flume::bounded(1);
        store.add_server("addr-1", ServerData::with_conn_ch(conn_tx));
        for i in 2..10 {
            let (other_tx, _other_rx) = flume::bounded(1);
            store.add_server(&format!("addr-{i}"), ServerData::with_conn_ch(other_tx));
        }

        let (ingress_tx, _close) = spawn_gateway(store);

        let (mut client, accepted) = socket_pair().await;
        write_handshake(&mut client, "addr-1").await;

        let remote = accepted.peer_addr().unwrap();
        ingress_tx
            .send_async(HandshakeConn::new(accepted, remote))
            .await
            .unwrap();

        let routed = tokio::time::timeout(CHAN_TIMEOUT, conn_rx.recv_async())
            .await
            .expect("gateway should route within the timeout")
            .unwrap();

        let handshake = routed.handshake.expect("handshake travels with the conn");
        assert_eq!(handshake.parse_server_address(), "addr-1");
    }

    #[tokio::test]
    async fn unknown_hostname_is_dropped() {
        let store = Arc::new(DefaultServerStore::new());
        let (conn_tx, conn_rx) = flume::bounded(1);
        store.add_server("addr-1", ServerData::with_conn_ch(conn_tx));

        let (ingress_tx, _close) = spawn_gateway(store);

        let (mut client, accepted) = socket_pair().await;
        write_handshake(&mut client, "unknown").await;

        let remote = accepted.peer_addr().unwrap();
        ingress_tx
            .send_async(HandshakeConn::new(accepted, remote))
            .await
            .unwrap();

        assert!(
            tokio::time::timeout(CHAN_TIMEOUT, conn_rx.recv_async())
                .await
                .is_err(),
            "nothing may arrive on the server channel"
        );
    }

    #[tokio::test]
    async fn forge_suffix_routes_to_plain_entry() {
        let store = Arc::new(DefaultServerStore::new());
        let (conn_tx, conn_rx) = flume::bounded(1);
        store.add_server("srv.example", ServerData::with_conn_ch(conn_tx));

        let (ingress_tx, _close) = spawn_gateway(store);

        let (mut client, accepted) = socket_pair().await;
        write_handshake(&mut client, "srv.example\0FML2\0").await;

        let remote = accepted.peer_addr().unwrap();
        ingress_tx
            .send_async(HandshakeConn::new(accepted, remote))
            .await
            .unwrap();

        assert!(tokio::time::timeout(CHAN_TIMEOUT, conn_rx.recv_async())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn single_store_routes_regardless_of_hostname() {
        let (conn_tx, conn_rx) = flume::bounded(1);
        let store = Arc::new(SingleServerStore {
            server: ServerData::with_conn_ch(conn_tx),
        });

        let (ingress_tx, _close) = spawn_gateway(store);

        let (mut client, accepted) = socket_pair().await;
        write_handshake(&mut client, "whatever.example").await;

        let remote = accepted.peer_addr().unwrap();
        ingress_tx
            .send_async(HandshakeConn::new(accepted, remote))
            .await
            .unwrap();

        assert!(tokio::time::timeout(CHAN_TIMEOUT, conn_rx.recv_async())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn close_signal_stops_the_gateway() {
        let (conn_tx, _conn_rx) = flume::bounded(1);
        let store = Arc::new(SingleServerStore {
            server: ServerData::with_conn_ch(conn_tx),
        });

        let (ingress_tx, close_tx) = spawn_gateway(store);
        close_tx.send(true).unwrap();

        // Give the gateway a moment to observe the signal, then verify it no
        // longer drains the ingress channel.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (_client, accepted) = socket_pair().await;
        let remote = accepted.peer_addr().unwrap();
        ingress_tx
            .send_async(HandshakeConn::new(accepted, remote))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ingress_tx.len(), 1, "a closed gateway must not consume");
    }
}
