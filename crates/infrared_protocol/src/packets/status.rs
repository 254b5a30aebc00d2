use std::io::Write;

use crate::{Decode, Encode, Packet, Result};

/// Asks for the server list entry. Carries no fields.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct QueryRequestC2s;

impl Packet for QueryRequestC2s {
    const ID: i32 = 0x00;
    const NAME: &'static str = "QueryRequestC2s";
}

impl Encode for QueryRequestC2s {
    fn encode(&self, _w: impl Write) -> Result<()> {
        Ok(())
    }
}

impl Decode<'_> for QueryRequestC2s {
    fn decode(_r: &mut &[u8]) -> Result<Self> {
        Ok(Self)
    }
}

/// The status JSON shown in the client's server list.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct QueryResponseS2c {
    pub json: String,
}

impl Packet for QueryResponseS2c {
    const ID: i32 = 0x00;
    const NAME: &'static str = "QueryResponseS2c";
}

impl Encode for QueryResponseS2c {
    fn encode(&self, w: impl Write) -> Result<()> {
        self.json.encode(w)
    }
}

impl Decode<'_> for QueryResponseS2c {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            json: String::decode(r)?,
        })
    }
}

/// Latency probe; the payload must be echoed back verbatim.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct QueryPingC2s {
    pub payload: i64,
}

impl Packet for QueryPingC2s {
    const ID: i32 = 0x01;
    const NAME: &'static str = "QueryPingC2s";
}

impl Encode for QueryPingC2s {
    fn encode(&self, w: impl Write) -> Result<()> {
        self.payload.encode(w)
    }
}

impl Decode<'_> for QueryPingC2s {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            payload: i64::decode(r)?,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct QueryPongS2c {
    pub payload: i64,
}

impl Packet for QueryPongS2c {
    const ID: i32 = 0x01;
    const NAME: &'static str = "QueryPongS2c";
}

impl Encode for QueryPongS2c {
    fn encode(&self, w: impl Write) -> Result<()> {
        self.payload.encode(w)
    }
}

impl Decode<'_> for QueryPongS2c {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            payload: i64::decode(r)?,
        })
    }
}
