//! Session channel: lazy handshake, sealed data frames, in-band rekeying.

use std::io::{Read, Write};
use std::time::Duration;

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;
use zeroize::Zeroize;

use crate::core::{Error, Result, DEFAULT_REJECT_AFTER, DEFAULT_REKEY_AFTER, KEY_SIZE};
use crate::handshake::{Handshake, State};
use crate::message::{Data, Decoder, Encoder, Message};
use crate::noise::{Key, SymmetricKey, Version};

/// Connection configuration.
///
/// All fields have usable defaults except the identity keys: an initiator
/// must set `static_private`, `static_public`, and `peer_public`; a
/// responder must set its own static pair and may leave `peer_public` zeroed
/// to accept any authenticated initiator.
pub struct Config {
    /// Supported protocol version range advertised in the handshake.
    pub version: Version,

    /// Long-term static public key.
    pub static_public: Key,
    /// Long-term static private key.
    pub static_private: Key,

    /// Expected peer static public key. For a responder, a zeroed value
    /// means the initiator's identity is learned from the handshake.
    pub peer_public: Key,

    /// Optional pre-shared key; a zeroed value is equivalent to none.
    pub preshared_key: Key,

    /// Sender-side maximum key age before an in-band rekey.
    /// `None` means the 120 s default; `Some(Duration::ZERO)` rekeys before
    /// every write.
    pub rekey_after: Option<Duration>,
    /// Receiver-side hard limit on key age. `None` means the 180 s default.
    /// Must be at least `rekey_after`.
    pub reject_after: Option<Duration>,

    /// Random byte source; `None` means the OS CSPRNG.
    pub rand: Option<Box<dyn RngCore + Send>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: Version::default(),
            static_public: [0u8; KEY_SIZE],
            static_private: [0u8; KEY_SIZE],
            peer_public: [0u8; KEY_SIZE],
            preshared_key: [0u8; KEY_SIZE],
            rekey_after: None,
            reject_after: None,
            rand: None,
        }
    }
}

/// An authenticated, encrypted channel over an ordered byte stream.
///
/// The session implements [`Read`] and [`Write`] with byte-stream semantics;
/// the first read or write completes the handshake. A session is not safe
/// for concurrent use; closing is delegated to the transport.
pub struct Session<T> {
    transport: T,

    initiator: bool,

    version: Version,
    static_public: Key,
    peer_public: Key,
    secrets: Secrets,

    rekey_after: Duration,
    reject_after: Duration,

    handshake: Handshake,
    rbuf: Vec<u8>,

    sending: Option<SymmetricKey>,
    receiving: Option<SymmetricKey>,
}

// Long-lived secret material, wiped on drop. Kept apart from the session so
// the transport can still be moved out by `into_inner`.
struct Secrets {
    static_private: Key,
    preshared_key: Key,
}

impl Drop for Secrets {
    fn drop(&mut self) {
        self.static_private.zeroize();
        self.preshared_key.zeroize();
    }
}

impl<T> Session<T> {
    /// Wrap `transport` as the initiating (client) side.
    pub fn new_client(transport: T, config: Config) -> Result<Self> {
        Self::new(transport, config, true)
    }

    /// Wrap `transport` as the responding (server) side.
    pub fn new_server(transport: T, config: Config) -> Result<Self> {
        Self::new(transport, config, false)
    }

    fn new(transport: T, config: Config, initiator: bool) -> Result<Self> {
        let rekey_after = config.rekey_after.unwrap_or(DEFAULT_REKEY_AFTER);
        let reject_after = config.reject_after.unwrap_or(DEFAULT_REJECT_AFTER);
        if reject_after < rekey_after {
            return Err(Error::Config(format!(
                "reject_after ({reject_after:?}) must be at least rekey_after ({rekey_after:?})"
            )));
        }

        let rng = config.rand.unwrap_or_else(|| Box::new(OsRng));

        Ok(Self {
            transport,
            initiator,
            version: config.version,
            static_public: config.static_public,
            peer_public: config.peer_public,
            secrets: Secrets {
                static_private: config.static_private,
                preshared_key: config.preshared_key,
            },
            rekey_after,
            reject_after,
            handshake: Handshake::new(rng),
            rbuf: Vec::new(),
            sending: None,
            receiving: None,
        })
    }

    /// The negotiated version range. Meaningful once the handshake is done.
    pub fn version(&self) -> Version {
        self.version
    }

    /// The peer's authenticated static public key. For a responder this is
    /// learned during the handshake.
    pub fn peer_public(&self) -> &Key {
        &self.peer_public
    }

    /// A reference to the underlying transport.
    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    /// A mutable reference to the underlying transport.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Unwrap the session, returning the transport. Session keys are
    /// discarded; the byte stream is left wherever the session left it.
    pub fn into_inner(self) -> T {
        // Drop impls on the key holders wipe the secrets.
        self.transport
    }
}

impl<T: Read + Write> Session<T> {
    /// Run the handshake to completion. Idempotent once finished.
    pub fn handshake(&mut self) -> Result<()> {
        if self.handshake.state() == State::Finished {
            return Ok(());
        }

        if self.initiator {
            if self.handshake.state() == State::Zeroed {
                self.send_initiation()?;
            }
            return self.recv_response();
        }

        if self.handshake.state() == State::Zeroed {
            self.recv_initiation()?;
        }
        self.send_response()
    }

    fn send_initiation(&mut self) -> Result<()> {
        let msg = self.handshake.create_initiation(
            &self.secrets.static_private,
            &self.static_public,
            &self.peer_public,
            self.version,
        )?;
        Encoder::new(&mut self.transport).encode(&Message::Initiation(msg))
    }

    fn recv_initiation(&mut self) -> Result<()> {
        let msg = Decoder::new(&mut self.transport).decode()?;
        let Message::Initiation(init) = msg else {
            return Err(Error::UnexpectedMessage(msg.message_type()));
        };

        let peer = self
            .handshake
            .consume_initiation(&init, &self.secrets.static_private, &self.static_public)?;

        // A configured peer key pins the initiator's identity.
        if self.peer_public != [0u8; KEY_SIZE] && peer != self.peer_public {
            return Err(Error::HandshakeFailed);
        }
        self.peer_public = peer;
        Ok(())
    }

    fn send_response(&mut self) -> Result<()> {
        let msg =
            self.handshake
                .create_response(&self.peer_public, &self.secrets.preshared_key, self.version)?;
        Encoder::new(&mut self.transport).encode(&Message::Response(msg))?;

        let (recv_key, send_key) = self.handshake.begin_session();
        self.receiving = Some(SymmetricKey::new(recv_key));
        self.sending = Some(SymmetricKey::new(send_key));
        self.finish_handshake();
        Ok(())
    }

    fn recv_response(&mut self) -> Result<()> {
        let msg = Decoder::new(&mut self.transport).decode()?;
        let Message::Response(resp) = msg else {
            return Err(Error::UnexpectedMessage(msg.message_type()));
        };

        self.handshake.consume_response(
            &resp,
            &self.secrets.static_private,
            &self.secrets.preshared_key,
            self.version,
        )?;

        let (send_key, recv_key) = self.handshake.begin_session();
        self.sending = Some(SymmetricKey::new(send_key));
        self.receiving = Some(SymmetricKey::new(recv_key));
        self.finish_handshake();
        Ok(())
    }

    fn finish_handshake(&mut self) {
        self.version = self.handshake.version();
        debug!(
            initiator = self.initiator,
            version_min = self.version.min(),
            version_max = self.version.max(),
            "handshake complete"
        );
    }

    fn send_rekey(&mut self) -> Result<()> {
        let (msg, send_key) = self.handshake.create_rekey(&self.peer_public)?;
        Encoder::new(&mut self.transport).encode(&Message::Rekey(msg))?;
        self.sending = Some(SymmetricKey::new(send_key));
        debug!("sending key rotated");
        Ok(())
    }

    fn read_inner(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.rbuf.is_empty() {
            return Ok(self.drain_rbuf(buf));
        }

        self.handshake()?;

        loop {
            let msg = Decoder::new(&mut self.transport).decode()?;
            match msg {
                Message::Data(Data { encrypted_data }) => {
                    let receiving = self.receiving.as_mut().ok_or(Error::HandshakeFailed)?;
                    if receiving.expired(self.reject_after) {
                        return Err(Error::KeyExpired);
                    }
                    self.rbuf = receiving.open(&encrypted_data)?;
                    return Ok(self.drain_rbuf(buf));
                }
                Message::Rekey(rekey) => {
                    let recv_key = self.handshake.consume_rekey(
                        &rekey,
                        &self.secrets.static_private,
                        &self.static_public,
                    )?;
                    self.receiving = Some(SymmetricKey::new(recv_key));
                    debug!("receiving key rotated");
                }
                other => return Err(Error::UnexpectedMessage(other.message_type())),
            }
        }
    }

    fn write_inner(&mut self, buf: &[u8]) -> Result<usize> {
        self.handshake()?;

        let expired = self
            .sending
            .as_ref()
            .is_some_and(|key| key.expired(self.rekey_after));
        if expired {
            self.send_rekey()?;
        }

        let sending = self.sending.as_mut().ok_or(Error::HandshakeFailed)?;
        let msg = Message::Data(Data {
            encrypted_data: sending.seal(buf),
        });
        Encoder::new(&mut self.transport).encode(&msg)?;
        Ok(buf.len())
    }

    fn drain_rbuf(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.rbuf.len());
        buf[..n].copy_from_slice(&self.rbuf[..n]);
        self.rbuf.drain(..n);
        n
    }
}

impl<T: Read + Write> Read for Session<T> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.read_inner(buf).map_err(Into::into)
    }
}

impl<T: Read + Write> Write for Session<T> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write_inner(buf).map_err(Into::into)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.transport.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{HEADER_SIZE, INITIATION_SIZE, MSG_HANDSHAKE_INITIATION};
    use crate::noise::generate_keypair;
    use std::io::Cursor;

    /// A finished server-side session plus the client half driven directly
    /// through the handshake engine, so tests can stage arbitrary inbound
    /// frames without threads.
    struct TestPair {
        server: Session<Cursor<Vec<u8>>>,
        client_hs: Handshake,
        client_sending: SymmetricKey,
        client_receiving: SymmetricKey,
        client_priv: Key,
        client_pub: Key,
        server_pub: Key,
    }

    fn establish() -> TestPair {
        let (client_priv, client_pub) = generate_keypair(&mut OsRng).unwrap();
        let (server_priv, server_pub) = generate_keypair(&mut OsRng).unwrap();
        let psk = [0u8; KEY_SIZE];

        let mut client_hs = Handshake::new(Box::new(OsRng));
        let init = client_hs
            .create_initiation(&client_priv, &client_pub, &server_pub, Version::default())
            .unwrap();
        let init_bytes = encode_frames(&[Message::Initiation(init)]);

        let mut server = Session::new_server(
            Cursor::new(init_bytes),
            Config {
                static_private: server_priv,
                static_public: server_pub,
                ..Config::default()
            },
        )
        .unwrap();
        server.handshake().unwrap();
        assert_eq!(server.peer_public(), &client_pub);

        // The server appended its response after the consumed initiation.
        let written = server.transport.get_ref().clone();
        let response_bytes = written[HEADER_SIZE + INITIATION_SIZE..].to_vec();
        let Message::Response(resp) = Decoder::new(Cursor::new(response_bytes)).decode().unwrap()
        else {
            panic!("server did not respond with a handshake response");
        };
        client_hs
            .consume_response(&resp, &client_priv, &psk, Version::default())
            .unwrap();

        let (send_key, recv_key) = client_hs.begin_session();
        TestPair {
            server,
            client_hs,
            client_sending: SymmetricKey::new(send_key),
            client_receiving: SymmetricKey::new(recv_key),
            client_priv,
            client_pub,
            server_pub,
        }
    }

    fn encode_frames(msgs: &[Message]) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        for msg in msgs {
            enc.encode(msg).unwrap();
        }
        buf
    }

    fn stage(pair: &mut TestPair, frames: Vec<u8>) {
        pair.server.transport = Cursor::new(frames);
    }

    fn data_frame(key: &mut SymmetricKey, plaintext: &[u8]) -> Message {
        Message::Data(Data {
            encrypted_data: key.seal(plaintext),
        })
    }

    // Advance the millisecond clock so a rekey created next carries a
    // timestamp strictly greater than anything accepted before it.
    fn tick() {
        std::thread::sleep(Duration::from_millis(2));
    }

    #[test]
    fn test_config_rejects_inverted_limits() {
        let err = Session::new_client(
            Cursor::new(Vec::<u8>::new()),
            Config {
                rekey_after: Some(Duration::from_secs(180)),
                reject_after: Some(Duration::from_secs(120)),
                ..Config::default()
            },
        )
        .map(|_| ())
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_read_delivers_data() {
        let mut pair = establish();
        let frame = data_frame(&mut pair.client_sending, b"hello, world");
        stage(&mut pair, encode_frames(&[frame]));

        let mut buf = [0u8; 64];
        let n = pair.server.read_inner(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello, world");
    }

    #[test]
    fn test_read_buffers_partial_delivery() {
        let mut pair = establish();
        let frame = data_frame(&mut pair.client_sending, b"hello, world");
        stage(&mut pair, encode_frames(&[frame]));

        let mut buf = [0u8; 5];
        assert_eq!(pair.server.read_inner(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(pair.server.read_inner(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b", wor");
        assert_eq!(pair.server.read_inner(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ld");
    }

    #[test]
    fn test_read_consumes_rekey_between_frames() {
        let mut pair = establish();

        let first = data_frame(&mut pair.client_sending, b"before");
        tick();
        let (rekey, new_key) = pair.client_hs.create_rekey(&pair.server_pub).unwrap();
        pair.client_sending = SymmetricKey::new(new_key);
        let second = data_frame(&mut pair.client_sending, b"after");
        stage(
            &mut pair,
            encode_frames(&[first, Message::Rekey(rekey), second]),
        );

        let mut buf = [0u8; 16];
        let n = pair.server.read_inner(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"before");
        let n = pair.server.read_inner(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"after");
    }

    #[test]
    fn test_read_expired_key_fails_before_decrypt() {
        let mut pair = establish();
        // Garbage ciphertext: if the expiry gate ran after the AEAD, this
        // would surface as DecryptFailed instead.
        stage(
            &mut pair,
            encode_frames(&[Message::Data(Data {
                encrypted_data: vec![0xFF; 64],
            })]),
        );

        pair.server
            .receiving
            .as_mut()
            .unwrap()
            .backdate(DEFAULT_REJECT_AFTER + Duration::from_secs(1));

        let mut buf = [0u8; 16];
        let err = pair.server.read_inner(&mut buf).unwrap_err();
        assert!(matches!(err, Error::KeyExpired));
    }

    #[test]
    fn test_read_tampered_data_fails() {
        let mut pair = establish();
        let mut sealed = pair.client_sending.seal(b"payload");
        sealed[0] ^= 0x01;
        stage(
            &mut pair,
            encode_frames(&[Message::Data(Data {
                encrypted_data: sealed,
            })]),
        );

        let mut buf = [0u8; 16];
        let err = pair.server.read_inner(&mut buf).unwrap_err();
        assert!(matches!(err, Error::DecryptFailed));
    }

    #[test]
    fn test_read_unknown_type_after_finished() {
        let mut pair = establish();
        let mut frame = Vec::new();
        frame.extend_from_slice(&7u32.to_le_bytes());
        frame.extend_from_slice(&0u32.to_le_bytes());
        stage(&mut pair, frame);

        let mut buf = [0u8; 16];
        let err = pair.server.read_inner(&mut buf).unwrap_err();
        assert!(matches!(err, Error::UnknownType(7)));
    }

    #[test]
    fn test_read_initiation_after_finished_is_unexpected() {
        let mut pair = establish();
        stage(
            &mut pair,
            encode_frames(&[Message::Initiation(Default::default())]),
        );

        let mut buf = [0u8; 16];
        let err = pair.server.read_inner(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            Error::UnexpectedMessage(MSG_HANDSHAKE_INITIATION)
        ));
    }

    #[test]
    fn test_replayed_rekey_fails_and_keeps_key() {
        let mut pair = establish();

        tick();
        let (rekey, new_key) = pair.client_hs.create_rekey(&pair.server_pub).unwrap();
        pair.client_sending = SymmetricKey::new(new_key);
        let data = data_frame(&mut pair.client_sending, b"fresh");
        let replay = Message::Rekey(rekey.clone());
        stage(
            &mut pair,
            encode_frames(&[Message::Rekey(rekey), data, replay]),
        );

        let mut buf = [0u8; 16];
        let n = pair.server.read_inner(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"fresh");

        let installed = *pair.server.receiving.as_ref().unwrap().key_bytes();
        let err = pair.server.read_inner(&mut buf).unwrap_err();
        assert!(matches!(err, Error::RekeyFailed));
        assert_eq!(pair.server.receiving.as_ref().unwrap().key_bytes(), &installed);
    }

    #[test]
    fn test_write_emits_rekey_when_key_expired() {
        let mut pair = establish();
        stage(&mut pair, Vec::new());

        pair.server
            .sending
            .as_mut()
            .unwrap()
            .backdate(DEFAULT_REKEY_AFTER + Duration::from_secs(1));
        tick();
        assert_eq!(pair.server.write_inner(b"x").unwrap(), 1);

        // Exactly one rekey frame precedes the data frame on the wire.
        let written = pair.server.transport.get_ref().clone();
        let mut dec = Decoder::new(Cursor::new(written));
        let Message::Rekey(rekey) = dec.decode().unwrap() else {
            panic!("expected a rekey frame before the data frame");
        };
        let Message::Data(data) = dec.decode().unwrap() else {
            panic!("expected a data frame after the rekey");
        };

        // The client can consume the rekey and open the data under the
        // freshly installed receiving key.
        let recv_key = pair
            .client_hs
            .consume_rekey(&rekey, &pair.client_priv, &pair.client_pub)
            .unwrap();
        pair.client_receiving = SymmetricKey::new(recv_key);
        let plaintext = pair.client_receiving.open(&data.encrypted_data).unwrap();
        assert_eq!(plaintext, b"x");
    }

    #[test]
    fn test_write_without_expiry_sends_single_data_frame() {
        let mut pair = establish();
        stage(&mut pair, Vec::new());

        assert_eq!(pair.server.write_inner(b"pong!").unwrap(), 5);

        let written = pair.server.transport.get_ref().clone();
        let mut dec = Decoder::new(Cursor::new(written));
        let Message::Data(data) = dec.decode().unwrap() else {
            panic!("expected a single data frame");
        };
        let plaintext = pair.client_receiving.open(&data.encrypted_data).unwrap();
        assert_eq!(plaintext, b"pong!");
    }
}
