//! Protocol constants.
//!
//! These values are fixed by the wire protocol and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// DOMAIN SEPARATION
// =============================================================================

/// Construction string hashed into the initial chaining key.
pub const CONSTRUCTION: &str = "Noise_IKpsk2_25519_ChaChaPoly_BLAKE2s";

/// Identifier string hashed into the initial transcript hash.
pub const IDENTIFIER: &str = "SocketGuard v1";

// =============================================================================
// CRYPTOGRAPHIC SIZES
// =============================================================================

/// Curve25519 scalar or point; also a ChaCha20-Poly1305 key.
pub const KEY_SIZE: usize = 32;

/// BLAKE2s-256 output size (chaining key, transcript hash).
pub const HASH_SIZE: usize = 32;

/// Poly1305 authentication tag size.
pub const TAG_SIZE: usize = 16;

/// ChaCha20-Poly1305 (IETF) nonce size.
pub const NONCE_SIZE: usize = 12;

/// Little-endian millisecond timestamp size.
pub const TIMESTAMP_SIZE: usize = 8;

/// Version field size (two little-endian u16 values: min, max).
pub const VERSION_SIZE: usize = 8;

/// An encrypted 32-byte key plus its tag.
pub const ENCRYPTED_KEY_SIZE: usize = KEY_SIZE + TAG_SIZE;

/// An encrypted version field plus its tag.
pub const ENCRYPTED_VERSION_SIZE: usize = VERSION_SIZE + TAG_SIZE;

/// An encrypted timestamp plus its tag.
pub const ENCRYPTED_TIMESTAMP_SIZE: usize = TIMESTAMP_SIZE + TAG_SIZE;

// =============================================================================
// MESSAGE TYPES
// =============================================================================

/// Handshake initiation (first message, initiator to responder).
pub const MSG_HANDSHAKE_INITIATION: u32 = 1;

/// Handshake response (second message, responder to initiator).
pub const MSG_HANDSHAKE_RESPONSE: u32 = 2;

/// In-session rekey message.
pub const MSG_HANDSHAKE_REKEY: u32 = 3;

/// Encrypted payload frame.
pub const MSG_DATA: u32 = 4;

// =============================================================================
// FRAME SIZES
// =============================================================================

/// Frame header size (u32 type + u32 length, little-endian).
pub const HEADER_SIZE: usize = 8;

/// Initiation payload size: ephemeral + enc_version + enc_static.
pub const INITIATION_SIZE: usize = KEY_SIZE + ENCRYPTED_VERSION_SIZE + ENCRYPTED_KEY_SIZE;

/// Response payload size: ephemeral + enc_version.
pub const RESPONSE_SIZE: usize = KEY_SIZE + ENCRYPTED_VERSION_SIZE;

/// Rekey payload size: ephemeral + enc_timestamp.
pub const REKEY_SIZE: usize = KEY_SIZE + ENCRYPTED_TIMESTAMP_SIZE;

/// Recommended maximum data payload per frame. Not enforced by the codec.
pub const RECOMMENDED_MAX_PAYLOAD: usize = 65_535 - TAG_SIZE;

// =============================================================================
// KEY FRESHNESS
// =============================================================================

/// Default sender-side maximum key age before an in-band rekey.
pub const DEFAULT_REKEY_AFTER: Duration = Duration::from_secs(120);

/// Default receiver-side hard limit; older receiving keys are rejected.
pub const DEFAULT_REJECT_AFTER: Duration = Duration::from_secs(180);
