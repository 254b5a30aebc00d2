use std::io::Write;

use crate::{Decode, Encode, Result};

/// Represents an angle in steps of 1/256 of a full turn.
#[derive(Copy, Clone, PartialEq, Eq, Default, Debug)]
#[repr(transparent)]
pub struct ByteAngle(pub u8);

impl Encode for ByteAngle {
    fn encode(&self, w: impl Write) -> Result<()> {
        self.0.encode(w)
    }
}

impl Decode<'_> for ByteAngle {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        Ok(ByteAngle(u8::decode(r)?))
    }
}
