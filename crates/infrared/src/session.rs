//! The proxy side of the login encryption handshake: it plays the part of
//! an online-mode server towards the client, authenticates the session with
//! Mojang, and wraps the client connection in the negotiated stream cipher.
//!
//! The backend side of the bridge stays unencrypted; backends are expected
//! to run in offline mode behind the proxy.

use infrared_protocol::packets::login::{EncryptionRequestS2c, EncryptionResponseC2s};
use infrared_protocol::profile::Property;
use num_bigint::BigInt;
use rand::Rng;
use reqwest::StatusCode;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use uuid::Uuid;

use crate::conn::McConn;
use crate::error::{AuthError, ProxyError};
use crate::player::Player;

/// Mojang's protocol caps RSA keys at 1024 bits.
const KEY_BIT_SIZE: usize = 1024;
const VERIFY_TOKEN_LEN: usize = 4;

const DEFAULT_SESSION_SERVER: &str = "https://sessionserver.mojang.com";

pub struct Encryptor {
    rsa_key: RsaPrivateKey,
    /// DER encoding of the public half; sent in every encryption request.
    public_key_der: Box<[u8]>,
    http_client: reqwest::Client,
    session_server: String,
}

#[derive(Debug, Deserialize)]
struct GameProfile {
    id: Uuid,
    properties: Vec<Property>,
}

impl Encryptor {
    pub fn new() -> Result<Self, ProxyError> {
        Self::with_session_server(DEFAULT_SESSION_SERVER)
    }

    /// The session-server base URL is injectable so tests never talk to
    /// Mojang.
    pub fn with_session_server(session_server: &str) -> Result<Self, ProxyError> {
        let mut rng = rand::rngs::OsRng;
        let rsa_key = RsaPrivateKey::new(&mut rng, KEY_BIT_SIZE)
            .map_err(|e| ProxyError::Config(format!("RSA key generation failed: {e}")))?;

        let public_key_der =
            rsa_der::public_key_to_der(&rsa_key.n().to_bytes_be(), &rsa_key.e().to_bytes_be())
                .into_boxed_slice();

        Ok(Self {
            rsa_key,
            public_key_der,
            http_client: reqwest::Client::new(),
            session_server: session_server.trim_end_matches('/').to_owned(),
        })
    }

    /// Runs the encryption exchange against the client, authenticates the
    /// session with the session server, stores the online identity on
    /// `player`, and installs the cipher pair on the connection.
    pub async fn set_encryption(
        &self,
        conn: &mut McConn,
        player: &mut Player,
    ) -> Result<(), ProxyError> {
        let verify_token: [u8; VERIFY_TOKEN_LEN] = rand::thread_rng().gen();

        conn.send_packet(&EncryptionRequestS2c {
            server_id: String::new(), // Always empty.
            public_key: self.public_key_der.to_vec(),
            verify_token: verify_token.to_vec(),
        })
        .await?;

        let EncryptionResponseC2s {
            shared_secret,
            verify_token: encrypted_verify_token,
        } = conn.recv_packet().await?;

        let shared_secret = self
            .rsa_key
            .decrypt(Pkcs1v15Encrypt, &shared_secret)
            .map_err(AuthError::Rsa)?;

        let client_verify_token = self
            .rsa_key
            .decrypt(Pkcs1v15Encrypt, &encrypted_verify_token)
            .map_err(AuthError::Rsa)?;

        if client_verify_token != verify_token {
            return Err(AuthError::VerifyTokenMismatch.into());
        }

        let crypt_key: [u8; 16] = shared_secret
            .as_slice()
            .try_into()
            .map_err(|_| AuthError::BadSharedSecret)?;

        self.authenticate_session(&shared_secret, player).await?;

        // Nothing may be read or written between the encryption response and
        // this point; the cipher covers every byte that follows it.
        conn.enable_encryption(&crypt_key);

        Ok(())
    }

    async fn authenticate_session(
        &self,
        shared_secret: &[u8],
        player: &mut Player,
    ) -> Result<(), AuthError> {
        let hash = Sha1::new()
            .chain_update(shared_secret)
            .chain_update(&self.public_key_der)
            .finalize();

        let url = format!(
            "{}/session/minecraft/hasJoined?username={}&serverId={}",
            self.session_server,
            player.username,
            auth_digest(&hash),
        );

        let resp = self.http_client.get(url).send().await?;

        if resp.status() != StatusCode::OK {
            return Err(AuthError::Unverified(resp.status()));
        }

        let profile: GameProfile = resp.json().await?;

        let textures = profile
            .properties
            .into_iter()
            .find(Property::is_textures)
            .ok_or(AuthError::MissingTextures)?;

        player.uuid = Some(profile.id);
        player.skin = Some(textures.value);
        player.skin_signature = textures.signature;

        Ok(())
    }
}

/// The "Notchian" server hash: the SHA-1 digest interpreted as a signed
/// big-endian integer, rendered in hex.
fn auth_digest(bytes: &[u8]) -> String {
    BigInt::from_signed_bytes_be(bytes).to_str_radix(16)
}

#[cfg(test)]
mod tests {
    use infrared_protocol::PacketEncoder;
    use rsa::RsaPublicKey;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    #[test]
    fn auth_digest_usernames() {
        assert_eq!(
            auth_digest(&Sha1::digest("Notch")),
            "4ed1f46bbe04bc756bcb17c0c7ce3e4632f06a48"
        );
        assert_eq!(
            auth_digest(&Sha1::digest("jeb_")),
            "-7c9d5b0044c130109a5d7b5fb5c317c02b4e28c1"
        );
        assert_eq!(
            auth_digest(&Sha1::digest("simon")),
            "88e16a1019277b15d58faf0541e11910eb756f6"
        );
    }

    async fn conn_pair() -> (TcpStream, McConn) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        (client, McConn::new(server, peer))
    }

    #[tokio::test]
    async fn tampered_verify_token_fails_the_handshake() {
        let (client, mut conn) = conn_pair().await;
        let encryptor = Encryptor::new().unwrap();

        let handshake = tokio::spawn(async move {
            let mut player = Player::new("Alice");
            encryptor.set_encryption(&mut conn, &mut player).await
        });

        // Play the client: read the request, answer with a correctly
        // encrypted secret but a corrupted verify token.
        let mut client_conn = McConn::new(client, "127.0.0.1:0".parse().unwrap());
        let request: EncryptionRequestS2c = client_conn.recv_packet().await.unwrap();

        let public_key = rsa_der::public_key_from_der(&request.public_key)
            .map(|(n, e)| {
                RsaPublicKey::new(
                    rsa::BigUint::from_bytes_be(&n),
                    rsa::BigUint::from_bytes_be(&e),
                )
                .unwrap()
            })
            .unwrap();

        let mut rng = rand::thread_rng();
        let secret = [7u8; 16];
        let mut bad_token = request.verify_token.clone();
        bad_token[0] ^= 0xff;

        let response = EncryptionResponseC2s {
            shared_secret: public_key
                .encrypt(&mut rng, Pkcs1v15Encrypt, &secret)
                .unwrap(),
            verify_token: public_key
                .encrypt(&mut rng, Pkcs1v15Encrypt, &bad_token)
                .unwrap(),
        };

        let mut enc = PacketEncoder::new();
        enc.append_packet(&response).unwrap();
        let (mut stream, _leftover) = client_conn.into_parts();
        stream.write_all(&enc.take()).await.unwrap();

        let result = handshake.await.unwrap();
        assert!(matches!(
            result,
            Err(ProxyError::Auth(AuthError::VerifyTokenMismatch))
        ));
    }
}
