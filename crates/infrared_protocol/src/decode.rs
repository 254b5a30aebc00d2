use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockSizeUser, KeyIvInit};
use bytes::{Buf, BufMut, BytesMut};

use crate::var_int::{VarInt, VarIntDecodeError};
use crate::{CompressionThreshold, Decode, Encode, Error, Packet, Result, MAX_PACKET_SIZE};

/// The AES block cipher with a 128 bit key, using the CFB-8 mode of
/// operation.
type Cipher = cfb8::Decryptor<aes::Aes128>;

/// Accumulates raw bytes from a socket and splits them into packet frames,
/// inflating and decrypting along the way.
#[derive(Default)]
pub struct PacketDecoder {
    buf: BytesMut,
    decompress_buf: BytesMut,
    threshold: CompressionThreshold,
    cipher: Option<Cipher>,
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_next_packet(&mut self) -> Result<Option<PacketFrame>> {
        let mut r = &self.buf[..];

        let packet_len = match VarInt::decode_partial(&mut r) {
            Ok(len) => len,
            Err(VarIntDecodeError::Incomplete) => return Ok(None),
            Err(VarIntDecodeError::TooLarge) => return Err(Error::VarIntTooLong),
        };

        if !(1..=MAX_PACKET_SIZE).contains(&packet_len) {
            return Err(Error::FrameLength(packet_len));
        }

        if r.len() < packet_len as usize {
            // Not enough data arrived yet.
            return Ok(None);
        }

        let packet_len_len = VarInt(packet_len).written_size();

        let mut data;

        if self.threshold.is_enabled() {
            r = &r[..packet_len as usize];

            let data_len = VarInt::decode(&mut r)?.0;

            if !(0..MAX_PACKET_SIZE).contains(&data_len) {
                return Err(Error::DataLength(data_len));
            }

            // A nonzero inner length means the remainder is a zlib stream.
            if data_len > 0 {
                self.decompress_buf.clear();
                self.decompress_buf.put_bytes(0, data_len as usize);

                inflate(r, &mut self.decompress_buf)?;

                let total_packet_len = packet_len_len + packet_len as usize;
                self.buf.advance(total_packet_len);

                data = self.decompress_buf.split();
            } else {
                let remaining_len = r.len();

                self.buf.advance(packet_len_len + 1);

                data = self.buf.split_to(remaining_len);
            }
        } else {
            self.buf.advance(packet_len_len);
            data = self.buf.split_to(packet_len as usize);
        }

        // Decode the leading packet ID.
        r = &data[..];
        let packet_id = VarInt::decode(&mut r)?.0;

        data.advance(data.len() - r.len());

        Ok(Some(PacketFrame {
            id: packet_id,
            body: data,
        }))
    }

    /// Like [`try_next_packet`], but leaves the frame in the buffer so the
    /// same bytes can still be read or relayed later.
    ///
    /// [`try_next_packet`]: Self::try_next_packet
    pub fn try_peek_packet(&self) -> Result<Option<PacketFrame>> {
        let mut r = &self.buf[..];

        let packet_len = match VarInt::decode_partial(&mut r) {
            Ok(len) => len,
            Err(VarIntDecodeError::Incomplete) => return Ok(None),
            Err(VarIntDecodeError::TooLarge) => return Err(Error::VarIntTooLong),
        };

        if !(1..=MAX_PACKET_SIZE).contains(&packet_len) {
            return Err(Error::FrameLength(packet_len));
        }

        if r.len() < packet_len as usize {
            return Ok(None);
        }

        r = &r[..packet_len as usize];

        let mut data;

        if self.threshold.is_enabled() {
            let data_len = VarInt::decode(&mut r)?.0;

            if !(0..MAX_PACKET_SIZE).contains(&data_len) {
                return Err(Error::DataLength(data_len));
            }

            if data_len > 0 {
                let mut scratch = BytesMut::new();
                scratch.put_bytes(0, data_len as usize);
                inflate(r, &mut scratch)?;
                data = scratch;
            } else {
                data = BytesMut::from(r);
            }
        } else {
            data = BytesMut::from(r);
        }

        let mut body = &data[..];
        let packet_id = VarInt::decode(&mut body)?.0;

        data.advance(data.len() - body.len());

        Ok(Some(PacketFrame {
            id: packet_id,
            body: data,
        }))
    }

    pub fn compression(&self) -> CompressionThreshold {
        self.threshold
    }

    pub fn set_compression(&mut self, threshold: CompressionThreshold) {
        self.threshold = threshold;
    }

    pub fn enable_encryption(&mut self, key: &[u8; 16]) {
        assert!(self.cipher.is_none(), "encryption is already enabled");

        let mut cipher = Cipher::new_from_slices(key, key).expect("invalid key");

        // Don't forget to decrypt the data we already have.
        Self::decrypt_bytes(&mut cipher, &mut self.buf);

        self.cipher = Some(cipher);
    }

    /// Decrypts the provided byte slice in place using the cipher, without
    /// consuming the cipher.
    fn decrypt_bytes(cipher: &mut Cipher, bytes: &mut [u8]) {
        for chunk in bytes.chunks_mut(Cipher::block_size()) {
            let gen_arr = GenericArray::from_mut_slice(chunk);
            cipher.decrypt_block_mut(gen_arr);
        }
    }

    pub fn queue_bytes(&mut self, mut bytes: BytesMut) {
        if let Some(cipher) = &mut self.cipher {
            Self::decrypt_bytes(cipher, &mut bytes);
        }

        self.buf.unsplit(bytes);
    }

    pub fn queue_slice(&mut self, bytes: &[u8]) {
        let len = self.buf.len();

        self.buf.extend_from_slice(bytes);

        if let Some(cipher) = &mut self.cipher {
            let slice = &mut self.buf[len..];
            Self::decrypt_bytes(cipher, slice);
        }
    }

    /// Takes the bytes that have been queued but not yet framed. Used when a
    /// connection switches from framed reads to a raw relay.
    pub fn take_buffered(&mut self) -> BytesMut {
        self.buf.split()
    }

    pub fn take_capacity(&mut self) -> BytesMut {
        self.buf.split_off(self.buf.len())
    }

    pub fn reserve(&mut self, additional: usize) {
        self.buf.reserve(additional);
    }
}

/// Inflates `r` into `out`, which must be pre-sized to the expected length.
fn inflate(r: &[u8], out: &mut BytesMut) -> Result<()> {
    use std::io::Write;

    use flate2::write::ZlibDecoder;

    let mut z = ZlibDecoder::new(&mut out[..]);

    z.write_all(r).map_err(Error::Decompress)?;

    let leftover = z.finish().map_err(Error::Decompress)?;
    if !leftover.is_empty() {
        return Err(Error::Decompress(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "decompressed packet length is shorter than expected",
        )));
    }

    Ok(())
}

/// A packet id and the undecoded bytes of its body.
#[derive(Clone, Debug)]
pub struct PacketFrame {
    /// The ID of the decoded packet.
    pub id: i32,
    /// The contents of the packet after the leading VarInt ID.
    pub body: BytesMut,
}

impl PacketFrame {
    /// Attempts to decode this packet as type `P`. An error is returned if
    /// the packet ID does not match, the body of the packet failed to decode,
    /// or some input was missed.
    pub fn decode<'a, P>(&'a self) -> Result<P>
    where
        P: Packet + Decode<'a>,
    {
        if P::ID != self.id {
            return Err(Error::InvalidPacketId {
                expected: P::ID,
                actual: self.id,
            });
        }

        let mut r = &self.body[..];

        let pkt = P::decode(&mut r)?;

        if !r.is_empty() {
            return Err(Error::TrailingBytes(r.len()));
        }

        Ok(pkt)
    }

    /// Builds a frame from a typed packet, so it can travel through code that
    /// only deals in frames.
    pub fn from_packet<P>(pkt: &P) -> Result<Self>
    where
        P: Packet + Encode,
    {
        let mut body = Vec::new();
        pkt.encode(&mut body)?;

        Ok(Self {
            id: P::ID,
            body: BytesMut::from(&body[..]),
        })
    }
}
