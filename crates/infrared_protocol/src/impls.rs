//! [`Encode`] and [`Decode`] implementations for the primitive field types
//! of the protocol.

use std::io::Write;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use uuid::Uuid;

use crate::var_int::VarInt;
use crate::{Decode, Encode, Error, Result};

/// The protocol bound on string fields.
const MAX_STRING_BYTES: usize = 32767;

impl Encode for bool {
    fn encode(&self, mut w: impl Write) -> Result<()> {
        Ok(w.write_u8(u8::from(*self))?)
    }
}

impl Decode<'_> for bool {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        Ok(r.read_u8().map_err(|_| Error::ShortRead)? != 0)
    }
}

impl Encode for u8 {
    fn encode(&self, mut w: impl Write) -> Result<()> {
        Ok(w.write_u8(*self)?)
    }
}

impl Decode<'_> for u8 {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        r.read_u8().map_err(|_| Error::ShortRead)
    }
}

impl Encode for i8 {
    fn encode(&self, mut w: impl Write) -> Result<()> {
        Ok(w.write_i8(*self)?)
    }
}

impl Decode<'_> for i8 {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        r.read_i8().map_err(|_| Error::ShortRead)
    }
}

impl Encode for u16 {
    fn encode(&self, mut w: impl Write) -> Result<()> {
        Ok(w.write_u16::<BigEndian>(*self)?)
    }
}

impl Decode<'_> for u16 {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        r.read_u16::<BigEndian>().map_err(|_| Error::ShortRead)
    }
}

impl Encode for i32 {
    fn encode(&self, mut w: impl Write) -> Result<()> {
        Ok(w.write_i32::<BigEndian>(*self)?)
    }
}

impl Decode<'_> for i32 {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        r.read_i32::<BigEndian>().map_err(|_| Error::ShortRead)
    }
}

impl Encode for i64 {
    fn encode(&self, mut w: impl Write) -> Result<()> {
        Ok(w.write_i64::<BigEndian>(*self)?)
    }
}

impl Decode<'_> for i64 {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        r.read_i64::<BigEndian>().map_err(|_| Error::ShortRead)
    }
}

impl Encode for f32 {
    fn encode(&self, mut w: impl Write) -> Result<()> {
        Ok(w.write_f32::<BigEndian>(*self)?)
    }
}

impl Decode<'_> for f32 {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        r.read_f32::<BigEndian>().map_err(|_| Error::ShortRead)
    }
}

impl Encode for f64 {
    fn encode(&self, mut w: impl Write) -> Result<()> {
        Ok(w.write_f64::<BigEndian>(*self)?)
    }
}

impl Decode<'_> for f64 {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        r.read_f64::<BigEndian>().map_err(|_| Error::ShortRead)
    }
}

impl Encode for str {
    fn encode(&self, mut w: impl Write) -> Result<()> {
        let len = self.len();
        if len > MAX_STRING_BYTES {
            return Err(Error::StringTooLong {
                len,
                max: MAX_STRING_BYTES,
            });
        }

        VarInt(len as i32).encode(&mut w)?;
        Ok(w.write_all(self.as_bytes())?)
    }
}

impl Encode for &str {
    fn encode(&self, w: impl Write) -> Result<()> {
        str::encode(self, w)
    }
}

impl Encode for String {
    fn encode(&self, w: impl Write) -> Result<()> {
        self.as_str().encode(w)
    }
}

impl<'a> Decode<'a> for &'a str {
    fn decode(r: &mut &'a [u8]) -> Result<Self> {
        let len = VarInt::decode(r)?.0;
        if len < 0 || len as usize > MAX_STRING_BYTES {
            return Err(Error::StringTooLong {
                len: len.max(0) as usize,
                max: MAX_STRING_BYTES,
            });
        }

        let len = len as usize;
        if r.len() < len {
            return Err(Error::ShortRead);
        }

        let (bytes, rest) = r.split_at(len);
        *r = rest;

        std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
    }
}

impl Decode<'_> for String {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        Ok(<&str>::decode(r)?.to_owned())
    }
}

impl Encode for Uuid {
    fn encode(&self, mut w: impl Write) -> Result<()> {
        Ok(w.write_all(self.as_bytes())?)
    }
}

impl Decode<'_> for Uuid {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        if r.len() < 16 {
            return Err(Error::ShortRead);
        }

        let (bytes, rest) = r.split_at(16);
        *r = rest;

        Ok(Uuid::from_slice(bytes).expect("exactly 16 bytes"))
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, mut w: impl Write) -> Result<()> {
        match self {
            Some(value) => {
                true.encode(&mut w)?;
                value.encode(w)
            }
            None => false.encode(w),
        }
    }
}

impl<'a, T: Decode<'a>> Decode<'a> for Option<T> {
    fn decode(r: &mut &'a [u8]) -> Result<Self> {
        Ok(if bool::decode(r)? {
            Some(T::decode(r)?)
        } else {
            None
        })
    }
}

/// Sequences carry a leading VarInt count. `Vec<u8>` doubles as the
/// protocol's byte-array field.
impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, mut w: impl Write) -> Result<()> {
        VarInt(self.len() as i32).encode(&mut w)?;

        for value in self {
            value.encode(&mut w)?;
        }

        Ok(())
    }
}

impl<'a, T: Decode<'a>> Decode<'a> for Vec<T> {
    fn decode(r: &mut &'a [u8]) -> Result<Self> {
        let len = VarInt::decode(r)?.0;
        if len < 0 || len as usize > r.len() {
            return Err(Error::ShortRead);
        }

        let mut vec = Vec::with_capacity((len as usize).min(4096));
        for _ in 0..len {
            vec.push(T::decode(r)?);
        }

        Ok(vec)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn round_trip<'a, T>(value: &T, buf: &'a mut Vec<u8>) -> T
    where
        T: Encode + Decode<'a> + PartialEq + std::fmt::Debug,
    {
        value.encode(&mut *buf).unwrap();
        let mut slice = buf.as_slice();
        let decoded = T::decode(&mut slice).unwrap();
        assert!(slice.is_empty());
        decoded
    }

    #[test]
    fn primitive_round_trips() {
        let mut buf = vec![];
        assert!(round_trip(&true, &mut buf));
        buf.clear();
        assert_eq!(round_trip(&0xbeu8, &mut buf), 0xbe);
        buf.clear();
        assert_eq!(round_trip(&25565u16, &mut buf), 25565);
        buf.clear();
        assert_eq!(round_trip(&-1234567i32, &mut buf), -1234567);
        buf.clear();
        assert_eq!(
            round_trip(&std::f64::consts::PI, &mut buf),
            std::f64::consts::PI
        );
    }

    #[test]
    fn string_round_trip() {
        let mut buf = vec![];
        let value = "hub.example.com".to_owned();
        assert_eq!(round_trip(&value, &mut buf), value);
    }

    #[test]
    fn string_too_long_is_rejected() {
        let huge = "x".repeat(MAX_STRING_BYTES + 1);
        let mut buf = vec![];
        assert!(matches!(
            huge.encode(&mut buf),
            Err(Error::StringTooLong { .. })
        ));
    }

    #[test]
    fn uuid_round_trip() {
        let mut buf = vec![];
        let value = Uuid::from_u128(0x1234_5678_9abc_def0_1122_3344_5566_7788);
        assert_eq!(round_trip(&value, &mut buf), value);
        assert_eq!(buf.len(), 16);
    }

    #[test]
    fn byte_array_round_trip() {
        let mut buf = vec![];
        let value: Vec<u8> = (0..=255).collect();
        assert_eq!(round_trip(&value, &mut buf), value);
    }

    #[test]
    fn option_round_trip() {
        let mut buf = vec![];
        let value = Some("signed".to_owned());
        assert_eq!(round_trip(&value, &mut buf), value);
        buf.clear();
        let none: Option<String> = None;
        assert_eq!(round_trip(&none, &mut buf), none);
    }
}
