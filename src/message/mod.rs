//! Wire messages.
//!
//! Every frame is an 8-byte header (little-endian u32 type, little-endian
//! u32 payload length) followed by the payload. Handshake payloads are fixed
//! concatenations of the values in [`crate::noise`]; data payloads are
//! arbitrary-length ciphertext.

mod codec;

pub use codec::{Decoder, Encoder};

use crate::core::{
    Error, Result, ENCRYPTED_KEY_SIZE, ENCRYPTED_TIMESTAMP_SIZE, ENCRYPTED_VERSION_SIZE,
    INITIATION_SIZE, KEY_SIZE, MSG_DATA, MSG_HANDSHAKE_INITIATION, MSG_HANDSHAKE_REKEY,
    MSG_HANDSHAKE_RESPONSE, REKEY_SIZE, RESPONSE_SIZE,
};
use crate::noise::{EncryptedKey, EncryptedTimestamp, EncryptedVersion, Key};

/// First handshake message, initiator to responder.
///
/// Wire layout: `ephemeral(32) || enc_version(24) || enc_static(48)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeInitiation {
    /// The initiator's fresh ephemeral public key, in the clear.
    pub unencrypted_ephemeral: Key,
    /// The initiator's advertised version range, sealed.
    pub encrypted_version: EncryptedVersion,
    /// The initiator's static public key, sealed.
    pub encrypted_static: EncryptedKey,
}

impl Default for HandshakeInitiation {
    fn default() -> Self {
        Self {
            unencrypted_ephemeral: Key::default(),
            encrypted_version: EncryptedVersion::default(),
            encrypted_static: [0u8; ENCRYPTED_KEY_SIZE],
        }
    }
}

/// Second handshake message, responder to initiator.
///
/// Wire layout: `ephemeral(32) || enc_version(24)`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// The responder's fresh ephemeral public key, in the clear.
    pub unencrypted_ephemeral: Key,
    /// The negotiated version range, sealed.
    pub encrypted_version: EncryptedVersion,
}

/// In-session rekey message, either direction.
///
/// Wire layout: `ephemeral(32) || enc_timestamp(24)`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HandshakeRekey {
    /// A fresh ephemeral public key, in the clear.
    pub unencrypted_ephemeral: Key,
    /// The sender's current timestamp, sealed; enforces rekey freshness.
    pub encrypted_timestamp: EncryptedTimestamp,
}

/// An encrypted payload frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Data {
    /// Ciphertext plus tag, sealed under the sending session key.
    pub encrypted_data: Vec<u8>,
}

/// Any frame recognized by the codec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// Handshake initiation.
    Initiation(HandshakeInitiation),
    /// Handshake response.
    Response(HandshakeResponse),
    /// In-session rekey.
    Rekey(HandshakeRekey),
    /// Encrypted payload.
    Data(Data),
}

impl Message {
    /// The wire type code of this message.
    pub fn message_type(&self) -> u32 {
        match self {
            Message::Initiation(_) => MSG_HANDSHAKE_INITIATION,
            Message::Response(_) => MSG_HANDSHAKE_RESPONSE,
            Message::Rekey(_) => MSG_HANDSHAKE_REKEY,
            Message::Data(_) => MSG_DATA,
        }
    }

    /// The payload length in bytes.
    pub fn payload_len(&self) -> usize {
        match self {
            Message::Initiation(_) => INITIATION_SIZE,
            Message::Response(_) => RESPONSE_SIZE,
            Message::Rekey(_) => REKEY_SIZE,
            Message::Data(d) => d.encrypted_data.len(),
        }
    }

    pub(crate) fn pack_payload(&self, buf: &mut Vec<u8>) {
        match self {
            Message::Initiation(m) => {
                buf.extend_from_slice(&m.unencrypted_ephemeral);
                buf.extend_from_slice(&m.encrypted_version);
                buf.extend_from_slice(&m.encrypted_static);
            }
            Message::Response(m) => {
                buf.extend_from_slice(&m.unencrypted_ephemeral);
                buf.extend_from_slice(&m.encrypted_version);
            }
            Message::Rekey(m) => {
                buf.extend_from_slice(&m.unencrypted_ephemeral);
                buf.extend_from_slice(&m.encrypted_timestamp);
            }
            Message::Data(d) => buf.extend_from_slice(&d.encrypted_data),
        }
    }

    pub(crate) fn unpack_payload(message_type: u32, payload: &[u8]) -> Result<Message> {
        match message_type {
            MSG_HANDSHAKE_INITIATION => {
                if payload.len() != INITIATION_SIZE {
                    return Err(Error::HandshakeFailed);
                }
                let mut m = HandshakeInitiation::default();
                let (ephemeral, rest) = payload.split_at(KEY_SIZE);
                let (version, static_key) = rest.split_at(ENCRYPTED_VERSION_SIZE);
                m.unencrypted_ephemeral.copy_from_slice(ephemeral);
                m.encrypted_version.copy_from_slice(version);
                m.encrypted_static.copy_from_slice(static_key);
                Ok(Message::Initiation(m))
            }
            MSG_HANDSHAKE_RESPONSE => {
                if payload.len() != RESPONSE_SIZE {
                    return Err(Error::HandshakeFailed);
                }
                let mut m = HandshakeResponse::default();
                let (ephemeral, version) = payload.split_at(KEY_SIZE);
                m.unencrypted_ephemeral.copy_from_slice(ephemeral);
                m.encrypted_version.copy_from_slice(version);
                Ok(Message::Response(m))
            }
            MSG_HANDSHAKE_REKEY => {
                if payload.len() != REKEY_SIZE {
                    return Err(Error::HandshakeFailed);
                }
                let mut m = HandshakeRekey::default();
                let (ephemeral, timestamp) = payload.split_at(KEY_SIZE);
                m.unencrypted_ephemeral.copy_from_slice(ephemeral);
                m.encrypted_timestamp.copy_from_slice(timestamp);
                Ok(Message::Rekey(m))
            }
            MSG_DATA => Ok(Message::Data(Data {
                encrypted_data: payload.to_vec(),
            })),
            other => Err(Error::UnknownType(other)),
        }
    }
}

const _: () = assert!(ENCRYPTED_KEY_SIZE == 48 && ENCRYPTED_TIMESTAMP_SIZE == 24);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TAG_SIZE;
    use std::io::Cursor;

    fn roundtrip(frame: &[u8]) -> Message {
        let msg = Decoder::new(Cursor::new(frame.to_vec())).decode().unwrap();

        let mut out = Vec::new();
        Encoder::new(&mut out).encode(&msg).unwrap();
        assert_eq!(out, frame, "re-encoded frame differs from input");

        msg
    }

    fn frame(message_type: u32, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&message_type.to_le_bytes());
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn test_initiation_zero_value() {
        let msg = roundtrip(&frame(1, &[0u8; INITIATION_SIZE]));
        assert_eq!(msg, Message::Initiation(HandshakeInitiation::default()));
    }

    #[test]
    fn test_initiation_field_order() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&[0xAA; KEY_SIZE]);
        payload.extend_from_slice(&[0xBB; ENCRYPTED_VERSION_SIZE]);
        payload.extend_from_slice(&[0xCC; ENCRYPTED_KEY_SIZE]);

        let msg = roundtrip(&frame(1, &payload));
        assert_eq!(
            msg,
            Message::Initiation(HandshakeInitiation {
                unencrypted_ephemeral: [0xAA; KEY_SIZE],
                encrypted_version: [0xBB; ENCRYPTED_VERSION_SIZE],
                encrypted_static: [0xCC; ENCRYPTED_KEY_SIZE],
            })
        );
    }

    #[test]
    fn test_response_roundtrip() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&[0x11; KEY_SIZE]);
        payload.extend_from_slice(&[0x22; ENCRYPTED_VERSION_SIZE]);

        let msg = roundtrip(&frame(2, &payload));
        assert_eq!(
            msg,
            Message::Response(HandshakeResponse {
                unencrypted_ephemeral: [0x11; KEY_SIZE],
                encrypted_version: [0x22; ENCRYPTED_VERSION_SIZE],
            })
        );
    }

    #[test]
    fn test_rekey_roundtrip() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&[0x33; KEY_SIZE]);
        payload.extend_from_slice(&[0x44; ENCRYPTED_TIMESTAMP_SIZE]);

        let msg = roundtrip(&frame(3, &payload));
        assert_eq!(
            msg,
            Message::Rekey(HandshakeRekey {
                unencrypted_ephemeral: [0x33; KEY_SIZE],
                encrypted_timestamp: [0x44; ENCRYPTED_TIMESTAMP_SIZE],
            })
        );
    }

    #[test]
    fn test_data_roundtrip() {
        let payload: Vec<u8> = (0..(256 + TAG_SIZE)).map(|i| i as u8).collect();
        let msg = roundtrip(&frame(4, &payload));
        assert_eq!(msg, Message::Data(Data { encrypted_data: payload }));
    }

    #[test]
    fn test_data_empty_payload() {
        let msg = roundtrip(&frame(4, &[]));
        assert_eq!(msg, Message::Data(Data { encrypted_data: Vec::new() }));
    }

    #[test]
    fn test_unknown_type() {
        let err = Decoder::new(Cursor::new(frame(7, &[0u8; 4])))
            .decode()
            .unwrap_err();
        assert!(matches!(err, Error::UnknownType(7)));
    }

    #[test]
    fn test_zero_type_is_invalid() {
        let err = Decoder::new(Cursor::new(frame(0, &[])))
            .decode()
            .unwrap_err();
        assert!(matches!(err, Error::UnknownType(0)));
    }

    #[test]
    fn test_truncated_header() {
        let err = Decoder::new(Cursor::new(vec![1u8, 0, 0]))
            .decode()
            .unwrap_err();
        match err {
            Error::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("want short-read error, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_payload() {
        let mut buf = frame(1, &[0u8; INITIATION_SIZE]);
        buf.truncate(buf.len() - 1);

        let err = Decoder::new(Cursor::new(buf)).decode().unwrap_err();
        match err {
            Error::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("want short-read error, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_size_handshake_payload() {
        let err = Decoder::new(Cursor::new(frame(2, &[0u8; RESPONSE_SIZE - 1])))
            .decode()
            .unwrap_err();
        assert!(matches!(err, Error::HandshakeFailed));
    }
}
