use std::io::Write;

use uuid::Uuid;

use crate::byte_angle::ByteAngle;
use crate::profile::Property;
use crate::var_int::VarInt;
use crate::{Decode, Encode, Error, Packet, Result};

/// A chat message on its way to the client. `json_data` is a JSON chat
/// component; `position` 2 is the system/game-info slot.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ChatMessageS2c {
    pub json_data: String,
    pub position: i8,
    pub sender: Uuid,
}

impl Packet for ChatMessageS2c {
    const ID: i32 = 0x0E;
    const NAME: &'static str = "ChatMessageS2c";
}

impl Encode for ChatMessageS2c {
    fn encode(&self, mut w: impl Write) -> Result<()> {
        self.json_data.encode(&mut w)?;
        self.position.encode(&mut w)?;
        self.sender.encode(w)
    }
}

impl Decode<'_> for ChatMessageS2c {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            json_data: String::decode(r)?,
            position: i8::decode(r)?,
            sender: Uuid::decode(r)?,
        })
    }
}

/// A raw chat line typed by the client.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ChatMessageC2s {
    pub message: String,
}

impl Packet for ChatMessageC2s {
    const ID: i32 = 0x03;
    const NAME: &'static str = "ChatMessageC2s";
}

impl Encode for ChatMessageC2s {
    fn encode(&self, w: impl Write) -> Result<()> {
        self.message.encode(w)
    }
}

impl Decode<'_> for ChatMessageC2s {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            message: String::decode(r)?,
        })
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct SpawnPlayerS2c {
    pub entity_id: VarInt,
    pub player_uuid: Uuid,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: ByteAngle,
    pub pitch: ByteAngle,
}

impl Packet for SpawnPlayerS2c {
    const ID: i32 = 0x04;
    const NAME: &'static str = "SpawnPlayerS2c";
}

impl Encode for SpawnPlayerS2c {
    fn encode(&self, mut w: impl Write) -> Result<()> {
        self.entity_id.encode(&mut w)?;
        self.player_uuid.encode(&mut w)?;
        self.x.encode(&mut w)?;
        self.y.encode(&mut w)?;
        self.z.encode(&mut w)?;
        self.yaw.encode(&mut w)?;
        self.pitch.encode(w)
    }
}

impl Decode<'_> for SpawnPlayerS2c {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            entity_id: VarInt::decode(r)?,
            player_uuid: Uuid::decode(r)?,
            x: f64::decode(r)?,
            y: f64::decode(r)?,
            z: f64::decode(r)?,
            yaw: ByteAngle::decode(r)?,
            pitch: ByteAngle::decode(r)?,
        })
    }
}

/// The tab-list update. A discriminated union over the leading action tag;
/// every entry in one packet uses the same action.
#[derive(Clone, PartialEq, Debug)]
pub struct PlayerInfoS2c {
    pub action: PlayerInfoAction,
}

#[derive(Clone, PartialEq, Debug)]
pub enum PlayerInfoAction {
    AddPlayer(Vec<PlayerInfoAdd>),
    UpdateGameMode(Vec<PlayerInfoGameMode>),
    UpdateLatency(Vec<PlayerInfoLatency>),
    UpdateDisplayName(Vec<PlayerInfoDisplayName>),
    RemovePlayer(Vec<Uuid>),
}

#[derive(Clone, PartialEq, Debug)]
pub struct PlayerInfoAdd {
    pub uuid: Uuid,
    pub name: String,
    pub properties: Vec<Property>,
    pub game_mode: VarInt,
    pub ping: VarInt,
    pub display_name: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PlayerInfoGameMode {
    pub uuid: Uuid,
    pub game_mode: VarInt,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PlayerInfoLatency {
    pub uuid: Uuid,
    pub ping: VarInt,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PlayerInfoDisplayName {
    pub uuid: Uuid,
    pub display_name: Option<String>,
}

impl Packet for PlayerInfoS2c {
    const ID: i32 = 0x33;
    const NAME: &'static str = "PlayerInfoS2c";
}

impl Encode for PlayerInfoS2c {
    fn encode(&self, mut w: impl Write) -> Result<()> {
        match &self.action {
            PlayerInfoAction::AddPlayer(entries) => {
                VarInt(0).encode(&mut w)?;
                VarInt(entries.len() as i32).encode(&mut w)?;
                for entry in entries {
                    entry.uuid.encode(&mut w)?;
                    entry.name.encode(&mut w)?;
                    entry.properties.encode(&mut w)?;
                    entry.game_mode.encode(&mut w)?;
                    entry.ping.encode(&mut w)?;
                    entry.display_name.encode(&mut w)?;
                }
            }
            PlayerInfoAction::UpdateGameMode(entries) => {
                VarInt(1).encode(&mut w)?;
                VarInt(entries.len() as i32).encode(&mut w)?;
                for entry in entries {
                    entry.uuid.encode(&mut w)?;
                    entry.game_mode.encode(&mut w)?;
                }
            }
            PlayerInfoAction::UpdateLatency(entries) => {
                VarInt(2).encode(&mut w)?;
                VarInt(entries.len() as i32).encode(&mut w)?;
                for entry in entries {
                    entry.uuid.encode(&mut w)?;
                    entry.ping.encode(&mut w)?;
                }
            }
            PlayerInfoAction::UpdateDisplayName(entries) => {
                VarInt(3).encode(&mut w)?;
                VarInt(entries.len() as i32).encode(&mut w)?;
                for entry in entries {
                    entry.uuid.encode(&mut w)?;
                    entry.display_name.encode(&mut w)?;
                }
            }
            PlayerInfoAction::RemovePlayer(uuids) => {
                VarInt(4).encode(&mut w)?;
                uuids.encode(&mut w)?;
            }
        }

        Ok(())
    }
}

impl Decode<'_> for PlayerInfoS2c {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        let tag = VarInt::decode(r)?.0;

        let action = match tag {
            0 => {
                let count = VarInt::decode(r)?.0;
                let mut entries = Vec::new();
                for _ in 0..count {
                    entries.push(PlayerInfoAdd {
                        uuid: Uuid::decode(r)?,
                        name: String::decode(r)?,
                        properties: Vec::<Property>::decode(r)?,
                        game_mode: VarInt::decode(r)?,
                        ping: VarInt::decode(r)?,
                        display_name: Option::<String>::decode(r)?,
                    });
                }
                PlayerInfoAction::AddPlayer(entries)
            }
            1 => {
                let count = VarInt::decode(r)?.0;
                let mut entries = Vec::new();
                for _ in 0..count {
                    entries.push(PlayerInfoGameMode {
                        uuid: Uuid::decode(r)?,
                        game_mode: VarInt::decode(r)?,
                    });
                }
                PlayerInfoAction::UpdateGameMode(entries)
            }
            2 => {
                let count = VarInt::decode(r)?.0;
                let mut entries = Vec::new();
                for _ in 0..count {
                    entries.push(PlayerInfoLatency {
                        uuid: Uuid::decode(r)?,
                        ping: VarInt::decode(r)?,
                    });
                }
                PlayerInfoAction::UpdateLatency(entries)
            }
            3 => {
                let count = VarInt::decode(r)?.0;
                let mut entries = Vec::new();
                for _ in 0..count {
                    entries.push(PlayerInfoDisplayName {
                        uuid: Uuid::decode(r)?,
                        display_name: Option::<String>::decode(r)?,
                    });
                }
                PlayerInfoAction::UpdateDisplayName(entries)
            }
            4 => PlayerInfoAction::RemovePlayer(Vec::<Uuid>::decode(r)?),
            tag => {
                return Err(Error::InvalidEnumTag {
                    name: "PlayerInfoAction",
                    tag,
                })
            }
        };

        Ok(Self { action })
    }
}
