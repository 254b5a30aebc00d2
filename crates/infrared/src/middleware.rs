//! In-flight transformers for play-state traffic. A middleware may mutate
//! the packet, cancel its forwarding, or reply to the side it came from.
//! The chain runs in registration order; a failing middleware is logged and
//! skipped, and the packet passes through unmodified.

use std::sync::Arc;

use async_trait::async_trait;
use infrared_protocol::packets::play::{
    ChatMessageC2s, ChatMessageS2c, PlayerInfoAction, PlayerInfoS2c, SpawnPlayerS2c,
};
use infrared_protocol::profile::Property;
use infrared_protocol::{Packet, PacketFrame};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::conn::ConnWriter;
use crate::error::ProxyError;
use crate::player::Players;

/// Writers are shared between the two pipe directions so that a middleware
/// can reply towards either peer.
pub type SharedWriter = Arc<Mutex<ConnWriter>>;

/// Which protocol state the connection is in. The pipe only runs after a
/// completed login, so middleware sees `Play` in practice.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ProtocolState {
    Handshaking,
    Status,
    Login,
    Play,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Author {
    Client,
    Server,
}

impl Author {
    pub fn is_client(self) -> bool {
        self == Author::Client
    }

    pub fn is_server(self) -> bool {
        self == Author::Server
    }
}

/// One packet travelling through the pipe, together with where it came from
/// and where it is going.
pub struct Message {
    pub state: ProtocolState,
    pub author: Author,
    pub packet: PacketFrame,
    /// Set by a middleware to drop the packet instead of forwarding it.
    pub cancel: bool,
    /// The connection the packet arrived on.
    pub src: SharedWriter,
    /// The connection the packet is headed to.
    pub dst: SharedWriter,
}

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn intercept(&self, msg: &mut Message) -> Result<(), ProxyError>;
}

/// Answers `@infrared status` from a player without the backend ever seeing
/// the line.
pub struct ChatCommand;

const STATUS_COMMAND: &str = "@infrared status";
const STATUS_REPLY: &str = r#"{"text":"Infrared is up and running!","color":"dark_green"}"#;

/// Position 2 is the system-message slot above the hotbar line.
const CHAT_POSITION_SYSTEM: i8 = 2;

#[async_trait]
impl Middleware for ChatCommand {
    async fn intercept(&self, msg: &mut Message) -> Result<(), ProxyError> {
        if !msg.author.is_client() || msg.packet.id != ChatMessageC2s::ID {
            return Ok(());
        }

        let chat: ChatMessageC2s = msg.packet.decode()?;
        if chat.message != STATUS_COMMAND {
            return Ok(());
        }

        msg.cancel = true;

        msg.src
            .lock()
            .await
            .send_packet(&ChatMessageS2c {
                json_data: STATUS_REPLY.to_owned(),
                position: CHAT_POSITION_SYSTEM,
                sender: Uuid::nil(),
            })
            .await
    }
}

/// Replaces the backend's offline UUID with the Mojang one on outgoing
/// `SpawnPlayer` packets, so the client recognizes the entity as the player
/// it knows.
pub struct SpawnPlayerRewrite {
    pub players: Arc<Players>,
}

#[async_trait]
impl Middleware for SpawnPlayerRewrite {
    async fn intercept(&self, msg: &mut Message) -> Result<(), ProxyError> {
        if !msg.author.is_server() || msg.packet.id != SpawnPlayerS2c::ID {
            return Ok(());
        }

        let mut spawn: SpawnPlayerS2c = msg.packet.decode()?;

        let Some(player) = self.players.by_offline_uuid(spawn.player_uuid) else {
            return Ok(());
        };

        if let Some(uuid) = player.uuid {
            spawn.player_uuid = uuid;
            msg.packet = PacketFrame::from_packet(&spawn)?;
        }

        Ok(())
    }
}

/// Rewrites `PlayerInfo` add-player entries: offline UUID to online UUID,
/// and a textures property carrying the authenticated skin.
pub struct PlayerInfoRewrite {
    pub players: Arc<Players>,
}

#[async_trait]
impl Middleware for PlayerInfoRewrite {
    async fn intercept(&self, msg: &mut Message) -> Result<(), ProxyError> {
        if !msg.author.is_server() || msg.packet.id != PlayerInfoS2c::ID {
            return Ok(());
        }

        let mut info: PlayerInfoS2c = msg.packet.decode()?;

        let PlayerInfoAction::AddPlayer(entries) = &mut info.action else {
            return Ok(());
        };

        let mut rewritten = false;

        for entry in entries {
            let Some(player) = self.players.by_offline_uuid(entry.uuid) else {
                continue;
            };

            let (Some(uuid), Some(skin)) = (player.uuid, player.skin) else {
                continue;
            };

            entry.uuid = uuid;
            entry.properties.retain(|p| !p.is_textures());
            entry
                .properties
                .push(Property::textures(skin, player.skin_signature));

            rewritten = true;
        }

        if rewritten {
            msg.packet = PacketFrame::from_packet(&info)?;
        }

        Ok(())
    }
}
