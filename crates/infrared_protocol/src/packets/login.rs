use std::io::Write;

use uuid::Uuid;

use crate::var_int::VarInt;
use crate::{Decode, Encode, Packet, Result};

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LoginStartC2s {
    pub username: String,
}

impl Packet for LoginStartC2s {
    const ID: i32 = 0x00;
    const NAME: &'static str = "LoginStartC2s";
}

impl Encode for LoginStartC2s {
    fn encode(&self, w: impl Write) -> Result<()> {
        self.username.encode(w)
    }
}

impl Decode<'_> for LoginStartC2s {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            username: String::decode(r)?,
        })
    }
}

/// Kicks off the encryption handshake. The server id is always empty on
/// modern servers; the public key is the DER encoding of the proxy's RSA
/// public key.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct EncryptionRequestS2c {
    pub server_id: String,
    pub public_key: Vec<u8>,
    pub verify_token: Vec<u8>,
}

impl Packet for EncryptionRequestS2c {
    const ID: i32 = 0x01;
    const NAME: &'static str = "EncryptionRequestS2c";
}

impl Encode for EncryptionRequestS2c {
    fn encode(&self, mut w: impl Write) -> Result<()> {
        self.server_id.encode(&mut w)?;
        self.public_key.encode(&mut w)?;
        self.verify_token.encode(w)
    }
}

impl Decode<'_> for EncryptionRequestS2c {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            server_id: String::decode(r)?,
            public_key: Vec::<u8>::decode(r)?,
            verify_token: Vec::<u8>::decode(r)?,
        })
    }
}

/// Both fields are encrypted with the server's RSA public key.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct EncryptionResponseC2s {
    pub shared_secret: Vec<u8>,
    pub verify_token: Vec<u8>,
}

impl Packet for EncryptionResponseC2s {
    const ID: i32 = 0x01;
    const NAME: &'static str = "EncryptionResponseC2s";
}

impl Encode for EncryptionResponseC2s {
    fn encode(&self, mut w: impl Write) -> Result<()> {
        self.shared_secret.encode(&mut w)?;
        self.verify_token.encode(w)
    }
}

impl Decode<'_> for EncryptionResponseC2s {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            shared_secret: Vec::<u8>::decode(r)?,
            verify_token: Vec::<u8>::decode(r)?,
        })
    }
}

/// Announces the compression threshold for every packet that follows.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SetCompressionS2c {
    pub threshold: VarInt,
}

impl Packet for SetCompressionS2c {
    const ID: i32 = 0x03;
    const NAME: &'static str = "SetCompressionS2c";
}

impl Encode for SetCompressionS2c {
    fn encode(&self, w: impl Write) -> Result<()> {
        self.threshold.encode(w)
    }
}

impl Decode<'_> for SetCompressionS2c {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            threshold: VarInt::decode(r)?,
        })
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LoginSuccessS2c {
    pub uuid: Uuid,
    pub username: String,
}

impl Packet for LoginSuccessS2c {
    const ID: i32 = 0x02;
    const NAME: &'static str = "LoginSuccessS2c";
}

impl Encode for LoginSuccessS2c {
    fn encode(&self, mut w: impl Write) -> Result<()> {
        self.uuid.encode(&mut w)?;
        self.username.encode(w)
    }
}

impl Decode<'_> for LoginSuccessS2c {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            uuid: Uuid::decode(r)?,
            username: String::decode(r)?,
        })
    }
}

/// The reason is a JSON chat component.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DisconnectS2c {
    pub reason: String,
}

impl Packet for DisconnectS2c {
    const ID: i32 = 0x00;
    const NAME: &'static str = "DisconnectS2c";
}

impl Encode for DisconnectS2c {
    fn encode(&self, w: impl Write) -> Result<()> {
        self.reason.encode(w)
    }
}

impl Decode<'_> for DisconnectS2c {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            reason: String::decode(r)?,
        })
    }
}
