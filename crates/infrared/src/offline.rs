//! A simulated server that stands in for an offline backend: it answers the
//! server list ping with a configured status and kicks login attempts with
//! a configurable message.

use infrared_protocol::packets::login::{DisconnectS2c, LoginStartC2s};
use infrared_protocol::packets::status::{
    QueryPingC2s, QueryPongS2c, QueryRequestC2s, QueryResponseS2c,
};
use infrared_protocol::PacketFrame;
use serde_json::json;

use crate::config::StatusConfig;
use crate::conn::McConn;
use crate::error::ProxyError;

/// The placeholder in the disconnect message that is replaced with the
/// joining player's name.
const USERNAME_PLACEHOLDER: &str = "$username";

pub struct OfflineServer {
    /// The response packet is serialized once at construction; status floods
    /// against sleeping backends never touch the JSON again.
    response_frame: PacketFrame,
    disconnect_message: String,
}

impl OfflineServer {
    pub fn new(status: &StatusConfig, disconnect_message: &str) -> Result<Self, ProxyError> {
        let response_frame = PacketFrame::from_packet(&QueryResponseS2c {
            json: status.render_json()?,
        })?;

        Ok(Self {
            response_frame,
            disconnect_message: disconnect_message.to_owned(),
        })
    }

    /// Serves one server list ping: request, stored response, ping, echoed
    /// pong. Any deviation from that sequence fails and the caller closes
    /// the connection.
    pub async fn handle_status(&self, conn: &mut McConn) -> Result<(), ProxyError> {
        let QueryRequestC2s = conn.recv_packet().await?;

        conn.send_frame(&self.response_frame).await?;

        let QueryPingC2s { payload } = conn.recv_packet().await?;

        conn.send_packet(&QueryPongS2c { payload }).await?;

        Ok(())
    }

    /// Reads the login start and answers with the disconnect message, with
    /// `$username` substituted.
    pub async fn handle_login(&self, conn: &mut McConn) -> Result<(), ProxyError> {
        let LoginStartC2s { username } = conn.recv_packet().await?;

        let message = self
            .disconnect_message
            .replace(USERNAME_PLACEHOLDER, &username);

        conn.send_packet(&DisconnectS2c {
            reason: json!({ "text": message }).to_string(),
        })
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use infrared_protocol::PacketEncoder;
    use pretty_assertions::assert_eq;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    async fn conn_pair() -> (TcpStream, McConn) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        (client, McConn::new(server, peer))
    }

    fn offline_server() -> OfflineServer {
        let status = StatusConfig {
            version_name: "Infrared-1".to_owned(),
            motd: "asleep".to_owned(),
            ..StatusConfig::default()
        };
        OfflineServer::new(&status, "Server is starting $username").unwrap()
    }

    async fn write_packet<P>(stream: &mut TcpStream, pkt: &P)
    where
        P: infrared_protocol::Packet + infrared_protocol::Encode,
    {
        let mut enc = PacketEncoder::new();
        enc.append_packet(pkt).unwrap();
        stream.write_all(&enc.take()).await.unwrap();
    }

    #[tokio::test]
    async fn status_sequence_returns_stored_json_and_echoes_ping() {
        let (mut client, mut conn) = conn_pair().await;
        let offline = offline_server();

        let serve = tokio::spawn(async move {
            offline.handle_status(&mut conn).await.unwrap();
        });

        write_packet(&mut client, &QueryRequestC2s).await;

        let mut client_conn = McConn::new(client, "127.0.0.1:0".parse().unwrap());
        let response: QueryResponseS2c = client_conn.recv_packet().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&response.json).unwrap();
        assert_eq!(parsed["version"]["name"], "Infrared-1");
        assert_eq!(parsed["description"]["text"], "asleep");

        let payload = 0xAABBCCDDEEFF0011u64 as i64;
        client_conn
            .send_packet(&QueryPingC2s { payload })
            .await
            .unwrap();

        let pong: QueryPongS2c = client_conn.recv_packet().await.unwrap();
        assert_eq!(pong.payload, payload);

        serve.await.unwrap();
    }

    #[tokio::test]
    async fn login_gets_substituted_disconnect() {
        let (mut client, mut conn) = conn_pair().await;
        let offline = offline_server();

        let serve = tokio::spawn(async move {
            offline.handle_login(&mut conn).await.unwrap();
        });

        write_packet(
            &mut client,
            &LoginStartC2s {
                username: "Alice".to_owned(),
            },
        )
        .await;

        let mut client_conn = McConn::new(client, "127.0.0.1:0".parse().unwrap());
        let disconnect: DisconnectS2c = client_conn.recv_packet().await.unwrap();
        assert_eq!(disconnect.reason, r#"{"text":"Server is starting Alice"}"#);

        serve.await.unwrap();
    }

    #[tokio::test]
    async fn wrong_first_packet_fails_the_status_exchange() {
        let (mut client, mut conn) = conn_pair().await;
        let offline = offline_server();

        // A ping where the request belongs.
        write_packet(&mut client, &QueryPingC2s { payload: 1 }).await;

        assert!(offline.handle_status(&mut conn).await.is_err());
    }
}
