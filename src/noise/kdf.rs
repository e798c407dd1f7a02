//! BLAKE2s key derivation and transcript mixing.
//!
//! The handshake evolves two 32-byte values: a chaining key absorbed through
//! an HMAC-BLAKE2s ladder (`KDF1`/`KDF2`/`KDF3`), and a transcript hash that
//! accumulates every public value and ciphertext on the wire. The transcript
//! hash doubles as associated data for all handshake AEAD operations, which
//! binds each encrypted field to the entire exchange that preceded it.

use blake2::{Blake2s256, Digest};
use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit},
    ChaCha20Poly1305, Nonce, Tag,
};
use hmac::{Mac, SimpleHmac};
use zeroize::Zeroize;

use crate::core::{Error, Result, HASH_SIZE, NONCE_SIZE, TAG_SIZE};

use super::{HashSum, Key};

type HmacBlake2s = SimpleHmac<Blake2s256>;

/// BLAKE2s-256 of `data`.
pub fn hash_sum(data: &[u8]) -> HashSum {
    Blake2s256::new().chain_update(data).finalize().into()
}

/// BLAKE2s-256 of `sum || data`.
pub fn hash_join(sum: &HashSum, data: &[u8]) -> HashSum {
    Blake2s256::new()
        .chain_update(sum)
        .chain_update(data)
        .finalize()
        .into()
}

/// Keyed BLAKE2s-256 HMAC over the concatenation of `parts`.
pub fn hmac(key: &HashSum, parts: &[&[u8]]) -> HashSum {
    let mut mac = <HmacBlake2s as Mac>::new_from_slice(key).expect("HMAC accepts any key length");
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// One-output KDF: `HMAC(HMAC(key, data), 0x01)`.
pub fn kdf1(key: &HashSum, data: &[u8]) -> HashSum {
    let secret = hmac(key, &[data]);
    hmac(&secret, &[&[0x01]])
}

/// Two-output KDF. The first output continues the chaining key, the second
/// is a derived key.
pub fn kdf2(key: &HashSum, data: &[u8]) -> (HashSum, HashSum) {
    let secret = hmac(key, &[data]);
    let sum1 = hmac(&secret, &[&[0x01]]);
    let sum2 = hmac(&secret, &[&sum1, &[0x02]]);
    (sum1, sum2)
}

/// Three-output KDF, used for the pre-shared key mix.
pub fn kdf3(key: &HashSum, data: &[u8]) -> (HashSum, HashSum, HashSum) {
    let secret = hmac(key, &[data]);
    let sum1 = hmac(&secret, &[&[0x01]]);
    let sum2 = hmac(&secret, &[&sum1, &[0x02]]);
    let sum3 = hmac(&secret, &[&sum2, &[0x03]]);
    (sum1, sum2, sum3)
}

/// The mutable chaining-key/transcript-hash pair of a handshake transform.
///
/// All handshake sealing happens through this state: the AEAD uses a zero
/// nonce with the current transcript hash as associated data, and the
/// ciphertext is mixed back into the transcript immediately afterwards.
pub struct SymmetricState {
    chaining_key: HashSum,
    hash: HashSum,
}

impl SymmetricState {
    /// Start a transform from the given chaining key and transcript hash.
    pub fn new(chaining_key: HashSum, hash: HashSum) -> Self {
        Self { chaining_key, hash }
    }

    /// The current chaining key.
    pub fn chaining_key(&self) -> &HashSum {
        &self.chaining_key
    }

    /// The current transcript hash.
    pub fn hash(&self) -> &HashSum {
        &self.hash
    }

    /// Consume the state, yielding `(chaining_key, transcript_hash)`.
    pub fn into_parts(self) -> (HashSum, HashSum) {
        (self.chaining_key, self.hash)
    }

    /// Replace the transcript hash with `BLAKE2s(hash || data)`.
    pub fn mix_hash(&mut self, data: &[u8]) {
        self.hash = hash_join(&self.hash, data);
    }

    /// Absorb `data` into the chaining key without deriving a key.
    pub fn mix_kdf1(&mut self, data: &[u8]) {
        self.chaining_key = kdf1(&self.chaining_key, data);
    }

    /// Absorb `material` into the chaining key and derive a key from it.
    pub fn mix_key(&mut self, material: &[u8]) -> Key {
        let (chaining_key, key) = kdf2(&self.chaining_key, material);
        self.chaining_key = chaining_key;
        key
    }

    /// Absorb a Diffie-Hellman result into the chaining key.
    pub fn mix_dh(&mut self, private: &Key, public: &Key) -> Key {
        let mut shared = super::shared_secret(private, public);
        let key = self.mix_key(&shared);
        shared.zeroize();
        key
    }

    /// Absorb the pre-shared key: three-output KDF whose middle output is
    /// mixed into the transcript and whose last output is the derived key.
    pub fn mix_psk(&mut self, psk: &Key) -> Key {
        let (chaining_key, tmp_hash, key) = kdf3(&self.chaining_key, psk);
        self.chaining_key = chaining_key;
        self.mix_hash(&tmp_hash);
        key
    }

    /// Seal `plaintext` under `key` with a zero nonce and the transcript hash
    /// as associated data, writing ciphertext plus tag into `out`.
    ///
    /// `out` must be exactly `plaintext.len() + TAG_SIZE` bytes.
    pub fn seal(&mut self, key: &Key, plaintext: &[u8], out: &mut [u8]) {
        debug_assert_eq!(out.len(), plaintext.len() + TAG_SIZE);

        let cipher = ChaCha20Poly1305::new(key.into());
        let nonce = Nonce::default();
        let (body, tag_out) = out.split_at_mut(plaintext.len());
        body.copy_from_slice(plaintext);
        let tag = cipher
            .encrypt_in_place_detached(&nonce, &self.hash, body)
            .expect("plaintext within ChaCha20-Poly1305 limits");
        tag_out.copy_from_slice(&tag);
        self.hash = hash_join(&self.hash, out);
    }

    /// Open `ciphertext` (body plus tag) under `key`, writing the plaintext
    /// into `out`. On success the ciphertext is mixed into the transcript.
    ///
    /// `out` must be exactly `ciphertext.len() - TAG_SIZE` bytes.
    pub fn open(&mut self, key: &Key, ciphertext: &[u8], out: &mut [u8]) -> Result<()> {
        if ciphertext.len() < TAG_SIZE || out.len() != ciphertext.len() - TAG_SIZE {
            return Err(Error::HandshakeFailed);
        }

        let cipher = ChaCha20Poly1305::new(key.into());
        let nonce = Nonce::default();
        let (body, tag) = ciphertext.split_at(ciphertext.len() - TAG_SIZE);
        out.copy_from_slice(body);
        cipher
            .decrypt_in_place_detached(&nonce, &self.hash, out, Tag::from_slice(tag))
            .map_err(|_| Error::HandshakeFailed)?;
        self.mix_hash(ciphertext);
        Ok(())
    }
}

impl Drop for SymmetricState {
    fn drop(&mut self) {
        self.chaining_key.zeroize();
    }
}

const _: () = assert!(NONCE_SIZE == 12 && HASH_SIZE == 32);
