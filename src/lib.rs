//! # SocketGuard
//!
//! SocketGuard wraps a reliable, ordered byte stream (typically TCP) in an
//! authenticated, confidential channel. Endpoints are identified by long-term
//! Curve25519 static keys and authenticate each other through a
//! `Noise_IKpsk2`-style handshake; payload is carried in framed
//! ChaCha20-Poly1305 messages whose keys come out of a BLAKE2s-driven
//! derivation schedule. Either side can rekey in-band to bound the amount of
//! data sealed under any one session key.
//!
//! - **Security**: mutual raw-key authentication, optional pre-shared key,
//!   per-direction AEAD keys with freshness limits
//! - **Simplicity**: fixed cryptographic suite, no certificates, no
//!   multiplexing
//! - **Transparency**: [`Session`] implements [`std::io::Read`] and
//!   [`std::io::Write`]; the handshake completes lazily on first use
//!
//! ## Modules
//!
//! - [`core`]: constants and error types
//! - [`noise`]: cryptographic primitives (DH, KDF, AEAD keys, timestamps)
//! - [`message`]: wire framing of the four message kinds
//! - [`offload`]: key-material record for kernel transport offload
//! - [`net`]: TCP dial/listen glue (requires `net` feature)
//!
//! ## Example
//!
//! ```no_run
//! use socketguard::{connect, Config};
//! use std::io::{Read, Write};
//!
//! let (private, public) = socketguard::noise::generate_keypair(&mut rand::rngs::OsRng)?;
//! let config = Config {
//!     static_private: private,
//!     static_public: public,
//!     peer_public: [0x42; 32], // the server's known static public key
//!     ..Config::default()
//! };
//!
//! let mut session = connect("127.0.0.1:4433", config)?;
//! session.write_all(b"ping!")?;
//! let mut buf = [0u8; 5];
//! session.read_exact(&mut buf)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod core;
pub mod message;
pub mod noise;
pub mod offload;

mod handshake;
mod session;

#[cfg(feature = "net")]
pub mod net;

pub use crate::core::{Error, Result};
pub use crate::noise::Version;
pub use crate::session::{Config, Session};

#[cfg(feature = "net")]
pub use crate::net::{connect, Listener};
