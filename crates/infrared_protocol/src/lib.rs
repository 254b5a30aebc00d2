#![doc = include_str!("../README.md")]

use std::io::Write;

use thiserror::Error;

pub mod byte_angle;
pub mod decode;
pub mod encode;
mod impls;
pub mod packets;
pub mod profile;
pub mod var_int;

pub use byte_angle::ByteAngle;
pub use decode::{PacketDecoder, PacketFrame};
pub use encode::PacketEncoder;
pub use profile::Property;
pub use var_int::VarInt;

/// The maximum number of bytes in a single Minecraft packet.
pub const MAX_PACKET_SIZE: i32 = 2097152;

/// How the codec reports failure.
#[derive(Debug, Error)]
pub enum Error {
    /// The input ended before the field or frame was complete.
    #[error("unexpected end of packet data")]
    ShortRead,
    /// A VarInt continued past its maximum width of 5 bytes.
    #[error("VarInt is wider than 5 bytes")]
    VarIntTooLong,
    /// A frame length prefix outside `1..=MAX_PACKET_SIZE`.
    #[error("packet length of {0} is out of bounds")]
    FrameLength(i32),
    /// The inner data-length field of a compressed frame is out of bounds.
    #[error("decompressed packet length of {0} is out of bounds")]
    DataLength(i32),
    /// A typed parse was attempted on a frame with a different packet id.
    #[error("expected packet id {expected:#04x}, got {actual:#04x}")]
    InvalidPacketId { expected: i32, actual: i32 },
    /// A typed parse did not consume the whole frame body.
    #[error("{0} trailing bytes after decoding packet body")]
    TrailingBytes(usize),
    /// A string field exceeded its protocol bound.
    #[error("string of {len} bytes exceeds bound of {max}")]
    StringTooLong { len: usize, max: usize },
    /// A string field held invalid UTF-8.
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,
    /// An enum field carried a tag with no matching variant.
    #[error("invalid {name} tag of {tag}")]
    InvalidEnumTag { name: &'static str, tag: i32 },
    /// The zlib stream of a compressed frame was malformed.
    #[error("failed to decompress packet: {0}")]
    Decompress(std::io::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The `Encode` trait allows objects to be written to the Minecraft
/// protocol. It is the inverse of [`Decode`].
pub trait Encode {
    /// Writes this object to the provided writer.
    ///
    /// If this type also implements [`Decode`] then successful calls to this
    /// function returning `Ok(())` must always successfully decode using the
    /// data that was written to the writer. The exact number of bytes that
    /// were originally written must be consumed during the decoding.
    fn encode(&self, w: impl Write) -> Result<()>;
}

/// The `Decode` trait allows objects to be read from the Minecraft
/// protocol. It is the inverse of [`Encode`].
///
/// `Decode` is parameterized by a lifetime. This allows the decoded value to
/// borrow data from the byte slice it was read from.
pub trait Decode<'a>: Sized {
    /// Reads this object from the provided byte slice.
    ///
    /// Implementations of `Decode` are expected to shrink the slice from the
    /// front as bytes are read.
    fn decode(r: &mut &'a [u8]) -> Result<Self>;
}

/// Types considered to be Minecraft packets.
///
/// In serialized form, a packet begins with a [`VarInt`] packet ID followed
/// by the body of the packet. If present, the implementations of [`Encode`]
/// and [`Decode`] on `Self` are expected to only encode/decode the _body_ of
/// this packet without the leading ID.
pub trait Packet: std::fmt::Debug {
    /// The leading VarInt ID of this packet.
    const ID: i32;
    /// The name of this packet for debugging purposes.
    const NAME: &'static str;

    /// Encodes this packet's VarInt ID first, followed by the packet's body.
    fn encode_with_id(&self, mut w: impl Write) -> Result<()>
    where
        Self: Encode,
    {
        VarInt(Self::ID).encode(&mut w)?;
        self.encode(w)
    }
}

/// How large a packet body must be before it is compressed.
///
/// If the inner value is >= 0, then packets with encoded lengths larger than
/// this value are compressed. If the value is negative, then compression is
/// disabled and no packets are compressed.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct CompressionThreshold(pub i32);

impl CompressionThreshold {
    /// No compression.
    pub const DEFAULT: Self = Self(-1);

    pub fn is_enabled(self) -> bool {
        self.0 >= 0
    }
}

/// No compression.
impl Default for CompressionThreshold {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<i32> for CompressionThreshold {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl From<CompressionThreshold> for i32 {
    fn from(value: CompressionThreshold) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use uuid::Uuid;

    use super::*;
    use crate::decode::PacketDecoder;
    use crate::encode::PacketEncoder;

    const CRYPT_KEY: [u8; 16] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];

    #[derive(PartialEq, Debug)]
    struct TestPacket {
        a: bool,
        b: u8,
        c: i32,
        d: f64,
        e: VarInt,
        f: String,
        g: Uuid,
        h: Vec<u8>,
        i: Option<String>,
    }

    impl Packet for TestPacket {
        const ID: i32 = 42;
        const NAME: &'static str = "TestPacket";
    }

    impl Encode for TestPacket {
        fn encode(&self, mut w: impl std::io::Write) -> Result<()> {
            self.a.encode(&mut w)?;
            self.b.encode(&mut w)?;
            self.c.encode(&mut w)?;
            self.d.encode(&mut w)?;
            self.e.encode(&mut w)?;
            self.f.encode(&mut w)?;
            self.g.encode(&mut w)?;
            self.h.encode(&mut w)?;
            self.i.encode(&mut w)
        }
    }

    impl Decode<'_> for TestPacket {
        fn decode(r: &mut &[u8]) -> Result<Self> {
            Ok(Self {
                a: bool::decode(r)?,
                b: u8::decode(r)?,
                c: i32::decode(r)?,
                d: f64::decode(r)?,
                e: VarInt::decode(r)?,
                f: String::decode(r)?,
                g: Uuid::decode(r)?,
                h: Vec::<u8>::decode(r)?,
                i: Option::<String>::decode(r)?,
            })
        }
    }

    impl TestPacket {
        fn new(string: &str) -> Self {
            Self {
                a: true,
                b: 12,
                c: -999,
                d: 1e10,
                e: VarInt(123),
                f: string.into(),
                g: Uuid::from_u128(0xdead_beef_cafe),
                h: vec![7; 32],
                i: Some("display".into()),
            }
        }
    }

    fn check_test_packet(dec: &mut PacketDecoder, string: &str) {
        let frame = dec.try_next_packet().unwrap().unwrap();

        let pkt = frame.decode::<TestPacket>().unwrap();

        assert_eq!(&pkt, &TestPacket::new(string));
    }

    #[test]
    fn packets_round_trip() {
        let mut buf = BytesMut::new();

        let mut enc = PacketEncoder::new();

        enc.append_packet(&TestPacket::new("first")).unwrap();
        enc.set_compression(0.into());
        enc.append_packet(&TestPacket::new("second")).unwrap();
        buf.unsplit(enc.take());
        enc.enable_encryption(&CRYPT_KEY);
        enc.append_packet(&TestPacket::new("third")).unwrap();
        buf.unsplit(enc.take());

        let mut dec = PacketDecoder::new();

        dec.queue_bytes(buf);

        check_test_packet(&mut dec, "first");

        dec.set_compression(0.into());

        check_test_packet(&mut dec, "second");

        dec.enable_encryption(&CRYPT_KEY);

        check_test_packet(&mut dec, "third");
    }

    #[test]
    fn round_trip_at_every_threshold() {
        for threshold in [-1, 0, 16, 256, 100_000] {
            let mut enc = PacketEncoder::new();
            enc.set_compression(threshold.into());
            enc.append_packet(&TestPacket::new("threshold")).unwrap();

            let mut dec = PacketDecoder::new();
            dec.set_compression(threshold.into());
            dec.queue_bytes(enc.take());

            check_test_packet(&mut dec, "threshold");
        }
    }

    #[test]
    fn peek_does_not_consume() {
        let mut enc = PacketEncoder::new();
        enc.append_packet(&TestPacket::new("peeked")).unwrap();

        let mut dec = PacketDecoder::new();
        dec.queue_bytes(enc.take());

        let peeked = dec.try_peek_packet().unwrap().unwrap();
        assert_eq!(peeked.id, TestPacket::ID);

        // The frame must still be readable in full afterwards.
        check_test_packet(&mut dec, "peeked");
        assert!(dec.try_next_packet().unwrap().is_none());
    }

    #[test]
    fn decode_rejects_wrong_packet_id() {
        let mut enc = PacketEncoder::new();
        enc.append_packet(&TestPacket::new("x")).unwrap();

        let mut dec = PacketDecoder::new();
        dec.queue_bytes(enc.take());

        let frame = dec.try_next_packet().unwrap().unwrap();

        #[derive(Debug)]
        struct Other;

        impl Packet for Other {
            const ID: i32 = 7;
            const NAME: &'static str = "Other";
        }

        impl Decode<'_> for Other {
            fn decode(_: &mut &[u8]) -> Result<Self> {
                Ok(Self)
            }
        }

        assert!(matches!(
            frame.decode::<Other>(),
            Err(Error::InvalidPacketId {
                expected: 7,
                actual: 42
            })
        ));
    }
}
