//! Cryptographic primitives.
//!
//! Fixed-width byte values (keys, hashes, timestamps, versions), Curve25519
//! key agreement, the BLAKE2s KDF schedule, and the per-direction AEAD
//! session keys. Everything here is leaf code: no I/O, no protocol state.

mod kdf;

pub use kdf::{hash_join, hash_sum, hmac, kdf1, kdf2, kdf3, SymmetricState};

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::core::{
    Error, Result, ENCRYPTED_KEY_SIZE, ENCRYPTED_TIMESTAMP_SIZE, ENCRYPTED_VERSION_SIZE,
    HASH_SIZE, KEY_SIZE, NONCE_SIZE, TAG_SIZE, TIMESTAMP_SIZE, VERSION_SIZE,
};

/// A Curve25519 scalar or point; also a ChaCha20-Poly1305 key.
pub type Key = [u8; KEY_SIZE];

/// A BLAKE2s-256 output: chaining key or transcript hash.
pub type HashSum = [u8; HASH_SIZE];

/// An encrypted [`Key`] plus its Poly1305 tag.
pub type EncryptedKey = [u8; ENCRYPTED_KEY_SIZE];

/// An encrypted [`Version`] plus its Poly1305 tag.
pub type EncryptedVersion = [u8; ENCRYPTED_VERSION_SIZE];

/// An encrypted [`Timestamp`] plus its Poly1305 tag.
pub type EncryptedTimestamp = [u8; ENCRYPTED_TIMESTAMP_SIZE];

/// Generate a uniformly random 32-byte key (e.g. a pre-shared key).
pub fn generate_key(rng: &mut dyn RngCore) -> Result<Key> {
    let mut key = [0u8; KEY_SIZE];
    fill_random(rng, &mut key)?;
    Ok(key)
}

/// Generate a Curve25519 key pair, returning `(private, public)`.
///
/// The private scalar carries the standard clamping
/// (`priv[0] &= 248; priv[31] = (priv[31] & 127) | 64`).
pub fn generate_keypair(rng: &mut dyn RngCore) -> Result<(Key, Key)> {
    let mut private = [0u8; KEY_SIZE];
    fill_random(rng, &mut private)?;

    private[0] &= 248;
    private[31] &= 127;
    private[31] |= 64;

    let public = public_key(&private);
    Ok((private, public))
}

/// The Curve25519 public point for `private`.
pub fn public_key(private: &Key) -> Key {
    let secret = StaticSecret::from(*private);
    *PublicKey::from(&secret).as_bytes()
}

/// X25519 shared secret between `private` and `public`.
pub fn shared_secret(private: &Key, public: &Key) -> Key {
    let secret = StaticSecret::from(*private);
    let point = PublicKey::from(*public);
    *secret.diffie_hellman(&point).as_bytes()
}

fn fill_random(rng: &mut dyn RngCore, dst: &mut [u8]) -> Result<()> {
    rng.try_fill_bytes(dst)
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))
}

/// Milliseconds since a process-wide monotonic epoch, little-endian.
///
/// The epoch is captured once, on first use; timestamps are only meaningful
/// within one process lifetime, which is all the rekey freshness check needs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timestamp([u8; TIMESTAMP_SIZE]);

fn epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

impl Timestamp {
    /// The current timestamp.
    pub fn now() -> Self {
        Self::from_millis(epoch().elapsed().as_millis() as u64)
    }

    pub(crate) fn from_millis(millis: u64) -> Self {
        Self(millis.to_le_bytes())
    }

    /// Milliseconds since the process epoch.
    pub fn millis(&self) -> u64 {
        u64::from_le_bytes(self.0)
    }

    /// Strict unsigned greater-than.
    pub fn after(&self, other: Timestamp) -> bool {
        self.millis() > other.millis()
    }

    /// Whether this timestamp is older than `period`.
    pub fn expired(&self, period: Duration) -> bool {
        let now = Self::now();
        now.millis().saturating_sub(self.millis()) > period.as_millis() as u64
    }

    /// The wire encoding.
    pub fn as_bytes(&self) -> &[u8; TIMESTAMP_SIZE] {
        &self.0
    }

    /// Reconstruct from the wire encoding.
    pub fn from_bytes(bytes: [u8; TIMESTAMP_SIZE]) -> Self {
        Self(bytes)
    }
}

/// A supported protocol version range: two little-endian u16 fields, `min`
/// at offset 0 and `max` at offset 4.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Version([u8; VERSION_SIZE]);

impl Version {
    /// Build a version range.
    pub fn new(min: u16, max: u16) -> Self {
        let mut v = [0u8; VERSION_SIZE];
        v[..2].copy_from_slice(&min.to_le_bytes());
        v[4..6].copy_from_slice(&max.to_le_bytes());
        Self(v)
    }

    /// Lower bound of the range.
    pub fn min(&self) -> u16 {
        u16::from_le_bytes([self.0[0], self.0[1]])
    }

    /// Upper bound of the range.
    pub fn max(&self) -> u16 {
        u16::from_le_bytes([self.0[4], self.0[5]])
    }

    /// Intersect two advertised ranges; `None` when they do not overlap.
    pub fn intersect(&self, other: &Version) -> Option<Version> {
        let min = self.min().max(other.min());
        let max = self.max().min(other.max());
        (min <= max).then(|| Version::new(min, max))
    }

    /// Whether `other` is a sub-range of `self`.
    pub fn covers(&self, other: &Version) -> bool {
        other.min() <= other.max() && self.min() <= other.min() && other.max() <= self.max()
    }

    /// The wire encoding.
    pub fn as_bytes(&self) -> &[u8; VERSION_SIZE] {
        &self.0
    }

    /// Reconstruct from the wire encoding.
    pub fn from_bytes(bytes: [u8; VERSION_SIZE]) -> Self {
        Self(bytes)
    }
}

/// A directional session key: AEAD key, nonce counter, creation time.
///
/// The counter is the AEAD nonce; it increments by one after every seal or
/// open and must never be shared between a reader and a writer. Exceeding
/// `u64::MAX` operations on one key is a programming error: rekeying
/// replaces the key long before.
pub struct SymmetricKey {
    key: Key,
    counter: u64,
    created: Timestamp,
}

impl SymmetricKey {
    /// Install a fresh key with a zero counter, created now.
    pub fn new(key: Key) -> Self {
        Self {
            key,
            counter: 0,
            created: Timestamp::now(),
        }
    }

    /// Whether this key is older than `period`.
    pub fn expired(&self, period: Duration) -> bool {
        self.created.expired(period)
    }

    /// Seal `plaintext` under the next nonce, returning ciphertext plus tag.
    pub fn seal(&mut self, plaintext: &[u8]) -> Vec<u8> {
        let cipher = ChaCha20Poly1305::new((&self.key).into());
        cipher
            .encrypt(&self.next_nonce(), plaintext)
            .expect("plaintext within ChaCha20-Poly1305 limits")
    }

    /// Open `ciphertext` (body plus tag) under the next nonce.
    pub fn open(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < TAG_SIZE {
            return Err(Error::DecryptFailed);
        }
        let cipher = ChaCha20Poly1305::new((&self.key).into());
        cipher
            .decrypt(&self.next_nonce(), ciphertext)
            .map_err(|_| Error::DecryptFailed)
    }

    // 64-bit little-endian counter in the last 8 bytes of a zeroed nonce;
    // increments after every use.
    fn next_nonce(&mut self) -> Nonce {
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[NONCE_SIZE - 8..].copy_from_slice(&self.counter.to_le_bytes());
        self.counter += 1;
        Nonce::from(nonce)
    }

    #[cfg(test)]
    pub(crate) fn counter(&self) -> u64 {
        self.counter
    }

    #[cfg(test)]
    pub(crate) fn backdate(&mut self, by: Duration) {
        let millis = self.created.millis().saturating_sub(by.as_millis() as u64);
        self.created = Timestamp::from_millis(millis);
    }

    #[cfg(test)]
    pub(crate) fn key_bytes(&self) -> &Key {
        &self.key
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}
