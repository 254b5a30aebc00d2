use std::io::Write;

use crate::var_int::VarInt;
use crate::{Decode, Encode, Error, Packet, Result};

/// The suffixes a Forge-modded client appends to the handshake address.
pub const FORGE_SUFFIX: &str = "\0FML\0";
pub const FORGE2_SUFFIX: &str = "\0FML2\0";

/// The protocol bound on the handshake address, excluding any Forge suffix.
const MAX_ADDRESS_BYTES: usize = 255;

/// The very first packet of every connection; declares which virtual host
/// the client wants and whether it intends to ping or to log in.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct HandshakeC2s {
    pub protocol_version: VarInt,
    pub server_address: String,
    pub server_port: u16,
    pub next_state: NextState,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum NextState {
    Status,
    Login,
}

impl HandshakeC2s {
    /// The hostname used for routing: the address with any Forge suffix
    /// stripped, then dots trimmed from both ends.
    pub fn parse_server_address(&self) -> &str {
        let addr = self.server_address.as_str();
        let addr = addr.strip_suffix(FORGE_SUFFIX).unwrap_or(addr);
        let addr = addr.strip_suffix(FORGE2_SUFFIX).unwrap_or(addr);
        addr.trim_matches('.')
    }

    pub fn is_forge_address(&self) -> bool {
        self.server_address.ends_with(FORGE_SUFFIX) || self.server_address.ends_with(FORGE2_SUFFIX)
    }

    pub fn is_status_request(&self) -> bool {
        self.next_state == NextState::Status
    }

    pub fn is_login_request(&self) -> bool {
        self.next_state == NextState::Login
    }
}

impl Packet for HandshakeC2s {
    const ID: i32 = 0x00;
    const NAME: &'static str = "HandshakeC2s";
}

impl Encode for HandshakeC2s {
    fn encode(&self, mut w: impl Write) -> Result<()> {
        self.protocol_version.encode(&mut w)?;
        self.server_address.encode(&mut w)?;
        self.server_port.encode(&mut w)?;
        let tag = match self.next_state {
            NextState::Status => 1,
            NextState::Login => 2,
        };
        VarInt(tag).encode(w)
    }
}

impl Decode<'_> for HandshakeC2s {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        let protocol_version = VarInt::decode(r)?;
        let server_address = String::decode(r)?;
        let server_port = u16::decode(r)?;
        let next_state = match VarInt::decode(r)?.0 {
            1 => NextState::Status,
            2 => NextState::Login,
            tag => {
                return Err(Error::InvalidEnumTag {
                    name: "NextState",
                    tag,
                })
            }
        };

        let handshake = Self {
            protocol_version,
            server_address,
            server_port,
            next_state,
        };

        let hostname_len = handshake.parse_server_address().len();
        if hostname_len > MAX_ADDRESS_BYTES {
            return Err(Error::StringTooLong {
                len: hostname_len,
                max: MAX_ADDRESS_BYTES,
            });
        }

        Ok(handshake)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::decode::PacketFrame;

    fn handshake(addr: &str) -> HandshakeC2s {
        HandshakeC2s {
            protocol_version: VarInt(754),
            server_address: addr.to_owned(),
            server_port: 25565,
            next_state: NextState::Login,
        }
    }

    #[test]
    fn round_trip() {
        let original = handshake("hub.example.com");
        let frame = PacketFrame::from_packet(&original).unwrap();
        let decoded: HandshakeC2s = frame.decode().unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn parse_server_address_plain() {
        assert_eq!(handshake("hub.example.com").parse_server_address(), "hub.example.com");
    }

    #[test]
    fn parse_server_address_strips_forge_suffix() {
        let hs = handshake("hub.example.com\0FML\0");
        assert!(hs.is_forge_address());
        assert_eq!(hs.parse_server_address(), "hub.example.com");
    }

    #[test]
    fn parse_server_address_strips_forge2_suffix() {
        let hs = handshake("srv.example\0FML2\0");
        assert!(hs.is_forge_address());
        assert_eq!(hs.parse_server_address(), "srv.example");
    }

    #[test]
    fn parse_server_address_trims_dots() {
        assert_eq!(handshake(".hub.example.com.").parse_server_address(), "hub.example.com");
        assert_eq!(
            handshake("hub.example.com.\0FML\0").parse_server_address(),
            "hub.example.com"
        );
    }

    #[test]
    fn oversized_address_is_rejected() {
        let frame = PacketFrame::from_packet(&handshake(&"a".repeat(300))).unwrap();
        assert!(matches!(
            frame.decode::<HandshakeC2s>(),
            Err(Error::StringTooLong { .. })
        ));
    }
}
