//! Frame encoder and decoder over `std::io` streams.

use std::io::{Read, Write};

use crate::core::{
    Error, Result, HEADER_SIZE, MSG_DATA, MSG_HANDSHAKE_INITIATION,
};

use super::Message;

/// Writes frames to an underlying writer.
///
/// Header and payload go out in a single buffer to avoid small writes.
pub struct Encoder<W> {
    writer: W,
}

impl<W: Write> Encoder<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Encode one frame.
    pub fn encode(&mut self, msg: &Message) -> Result<()> {
        let payload_len = msg.payload_len();
        let mut buf = Vec::with_capacity(HEADER_SIZE + payload_len);
        buf.extend_from_slice(&msg.message_type().to_le_bytes());
        buf.extend_from_slice(&(payload_len as u32).to_le_bytes());
        msg.pack_payload(&mut buf);

        self.writer.write_all(&buf)?;
        Ok(())
    }
}

/// Reads frames from an underlying reader.
///
/// The decoder holds no state beyond its reader: it reads exactly eight
/// header bytes, then exactly the advertised payload length. Truncation
/// surfaces as the reader's short-read error.
pub struct Decoder<R> {
    reader: R,
}

impl<R: Read> Decoder<R> {
    /// Wrap a reader.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Decode one frame.
    pub fn decode(&mut self) -> Result<Message> {
        let mut header = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut header)?;

        let message_type = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let payload_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        // Reject before touching the payload; an unknown code makes the
        // length field untrustworthy.
        if !(MSG_HANDSHAKE_INITIATION..=MSG_DATA).contains(&message_type) {
            return Err(Error::UnknownType(message_type));
        }

        let mut payload = vec![0u8; payload_len as usize];
        self.reader.read_exact(&mut payload)?;

        Message::unpack_payload(message_type, &payload)
    }
}
