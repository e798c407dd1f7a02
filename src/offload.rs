//! Kernel-offload key-material record.
//!
//! A kernel transport module can take over the record protection of an
//! established connection, the same way kTLS does: the host attaches the
//! upper-layer protocol with `setsockopt(SOL_TCP, TCP_ULP, "socketguard")`
//! and then pushes the identity and key material with a driver-specific
//! option. This crate stays free of raw syscalls; it ships the option
//! constants and the exact byte layout the kernel module expects, and the
//! host glue performs the two `setsockopt` calls.

use zeroize::Zeroize;

use crate::core::KEY_SIZE;
use crate::noise::Key;
use crate::session::Config;

/// Name passed to `setsockopt(SOL_TCP, TCP_ULP, ...)`.
pub const ULP_NAME: &str = "socketguard";

/// Option number for pushing a [`CryptoInfo`] record to the kernel module.
pub const OPT_CRYPTO_INFO: u32 = 1;

/// Serialized size of a [`CryptoInfo`] record.
pub const CRYPTO_INFO_SIZE: usize = 4 + 4 * KEY_SIZE;

/// Identity and key material for a kernel-offloaded connection.
///
/// Wire layout (little-endian, no padding):
///
/// ```text
/// min_version(2) || max_version(2) || static_public(32) ||
/// static_private(32) || peer_public(32) || preshared_key(32)
/// ```
pub struct CryptoInfo {
    /// Lowest supported protocol version.
    pub min_version: u16,
    /// Highest supported protocol version.
    pub max_version: u16,
    /// Long-term static public key.
    pub static_public: Key,
    /// Long-term static private key.
    pub static_private: Key,
    /// Expected peer static public key.
    pub peer_public: Key,
    /// Optional pre-shared key; zeroed means none.
    pub preshared_key: Key,
}

impl CryptoInfo {
    /// Build a record from a session configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_version: config.version.min(),
            max_version: config.version.max(),
            static_public: config.static_public,
            static_private: config.static_private,
            peer_public: config.peer_public,
            preshared_key: config.preshared_key,
        }
    }

    /// Serialize to the layout the kernel option expects.
    pub fn to_bytes(&self) -> [u8; CRYPTO_INFO_SIZE] {
        let mut buf = [0u8; CRYPTO_INFO_SIZE];
        buf[0..2].copy_from_slice(&self.min_version.to_le_bytes());
        buf[2..4].copy_from_slice(&self.max_version.to_le_bytes());
        buf[4..36].copy_from_slice(&self.static_public);
        buf[36..68].copy_from_slice(&self.static_private);
        buf[68..100].copy_from_slice(&self.peer_public);
        buf[100..132].copy_from_slice(&self.preshared_key);
        buf
    }
}

impl Drop for CryptoInfo {
    fn drop(&mut self) {
        self.static_private.zeroize();
        self.preshared_key.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::Version;

    #[test]
    fn test_crypto_info_layout() {
        let info = CryptoInfo {
            min_version: 0x0102,
            max_version: 0x0304,
            static_public: [0xAA; KEY_SIZE],
            static_private: [0xBB; KEY_SIZE],
            peer_public: [0xCC; KEY_SIZE],
            preshared_key: [0xDD; KEY_SIZE],
        };

        let bytes = info.to_bytes();
        assert_eq!(bytes.len(), CRYPTO_INFO_SIZE);
        assert_eq!(&bytes[0..4], &[0x02, 0x01, 0x04, 0x03]);
        assert_eq!(&bytes[4..36], &[0xAA; KEY_SIZE]);
        assert_eq!(&bytes[36..68], &[0xBB; KEY_SIZE]);
        assert_eq!(&bytes[68..100], &[0xCC; KEY_SIZE]);
        assert_eq!(&bytes[100..132], &[0xDD; KEY_SIZE]);
    }

    #[test]
    fn test_crypto_info_from_config() {
        let config = Config {
            version: Version::new(1, 3),
            static_public: [0x01; KEY_SIZE],
            peer_public: [0x02; KEY_SIZE],
            ..Config::default()
        };

        let info = CryptoInfo::from_config(&config);
        assert_eq!(info.min_version, 1);
        assert_eq!(info.max_version, 3);
        assert_eq!(info.static_public, [0x01; KEY_SIZE]);
        assert_eq!(info.peer_public, [0x02; KEY_SIZE]);
    }
}
