//! Handshake state machine.
//!
//! Three transforms mutate the handshake: initiation, response, rekey. The
//! schedule is the cookieless `Noise_IKpsk2` variant:
//!
//! ```text
//! initiation:  e, es, version, version-mix, s, ss
//! response:    e, ee, se, psk, version
//! rekey:       e, es, ss, timestamp        (per-direction chaining key)
//! ```
//!
//! After the response both sides hold equal chaining keys and transcript
//! hashes; session keys are `KDF2(ck, ∅)` with the first output as the
//! initiator's sending key. Each direction then evolves its own rekey
//! chaining key, seeded from the post-handshake chaining key, one step per
//! rekey message.
//!
//! State transitions:
//!
//! ```text
//! Zeroed --create/consume initiation--> Initiated
//! Initiated --create/consume response--> Finished
//! Finished --create/consume rekey--> Finished (direction-local)
//! ```

use std::sync::OnceLock;

use rand::RngCore;
use tracing::trace;
use zeroize::Zeroize;

use crate::core::{
    Error, Result, CONSTRUCTION, HASH_SIZE, IDENTIFIER, KEY_SIZE, TIMESTAMP_SIZE, VERSION_SIZE,
};
use crate::message::{HandshakeInitiation, HandshakeRekey, HandshakeResponse};
use crate::noise::{
    generate_keypair, hash_join, hash_sum, kdf2, shared_secret, HashSum, Key, SymmetricState,
    Timestamp, Version,
};

/// Chaining key every handshake starts from: `BLAKE2s(CONSTRUCTION)`.
fn init_chaining_key() -> HashSum {
    static SUM: OnceLock<HashSum> = OnceLock::new();
    *SUM.get_or_init(|| hash_sum(CONSTRUCTION.as_bytes()))
}

/// Transcript hash every handshake starts from:
/// `BLAKE2s(init_chaining_key || IDENTIFIER)`.
fn init_hash() -> HashSum {
    static SUM: OnceLock<HashSum> = OnceLock::new();
    *SUM.get_or_init(|| hash_join(&init_chaining_key(), IDENTIFIER.as_bytes()))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum State {
    Zeroed,
    Initiated,
    Finished,
}

/// One connection's handshake. Created zeroed, never reused.
pub(crate) struct Handshake {
    rng: Box<dyn RngCore + Send>,

    state: State,

    version: Version,
    ephemeral_private: Key,
    remote_ephemeral: Key,
    remote_timestamp: Timestamp,
    static_static: Key,

    chaining_key: HashSum,
    hash: HashSum,

    // Per-direction rekey chaining keys, seeded from the post-handshake
    // chaining key and evolved independently.
    send_chain: HashSum,
    recv_chain: HashSum,
}

impl Handshake {
    pub(crate) fn new(rng: Box<dyn RngCore + Send>) -> Self {
        Self {
            rng,
            state: State::Zeroed,
            version: Version::default(),
            ephemeral_private: [0u8; KEY_SIZE],
            remote_ephemeral: [0u8; KEY_SIZE],
            remote_timestamp: Timestamp::default(),
            static_static: [0u8; KEY_SIZE],
            chaining_key: [0u8; HASH_SIZE],
            hash: [0u8; HASH_SIZE],
            send_chain: [0u8; HASH_SIZE],
            recv_chain: [0u8; HASH_SIZE],
        }
    }

    pub(crate) fn state(&self) -> State {
        self.state
    }

    /// The negotiated version range. Meaningful once `Finished`.
    pub(crate) fn version(&self) -> Version {
        self.version
    }

    /// Build the initiation message for responder static `rs`.
    pub(crate) fn create_initiation(
        &mut self,
        s_priv: &Key,
        s_pub: &Key,
        rs: &Key,
        version: Version,
    ) -> Result<HandshakeInitiation> {
        let mut msg = HandshakeInitiation::default();
        let mut st = SymmetricState::new(init_chaining_key(), hash_join(&init_hash(), rs));

        /* e */
        let (e_priv, e_pub) = generate_keypair(&mut *self.rng)?;
        msg.unencrypted_ephemeral = e_pub;
        st.mix_hash(&e_pub);
        st.mix_kdf1(&e_pub);

        /* es */
        let key = st.mix_dh(&e_priv, rs);

        /* version */
        st.seal(&key, version.as_bytes(), &mut msg.encrypted_version);

        /* version-mix, s */
        let key = st.mix_key(version.as_bytes());
        st.seal(&key, s_pub, &mut msg.encrypted_static);

        /* ss */
        let ss = shared_secret(s_priv, rs);
        let _ = st.mix_key(&ss);

        self.version = version;
        self.ephemeral_private = e_priv;
        self.static_static = ss;
        (self.chaining_key, self.hash) = st.into_parts();
        self.state = State::Initiated;

        Ok(msg)
    }

    /// Consume an initiation as the responder; returns the initiator's
    /// static public key opened from the message.
    pub(crate) fn consume_initiation(
        &mut self,
        msg: &HandshakeInitiation,
        s_priv: &Key,
        s_pub: &Key,
    ) -> Result<Key> {
        let mut st = SymmetricState::new(init_chaining_key(), hash_join(&init_hash(), s_pub));

        /* e */
        let e = msg.unencrypted_ephemeral;
        st.mix_hash(&e);
        st.mix_kdf1(&e);

        /* es */
        let key = st.mix_dh(s_priv, &e);

        /* version */
        let mut version_bytes = [0u8; VERSION_SIZE];
        st.open(&key, &msg.encrypted_version, &mut version_bytes)?;

        /* version-mix, s */
        let key = st.mix_key(&version_bytes);
        let mut s = [0u8; KEY_SIZE];
        st.open(&key, &msg.encrypted_static, &mut s)?;

        /* ss */
        let ss = shared_secret(s_priv, &s);
        let _ = st.mix_key(&ss);

        self.remote_ephemeral = e;
        self.static_static = ss;
        self.version = Version::from_bytes(version_bytes);
        (self.chaining_key, self.hash) = st.into_parts();
        self.state = State::Initiated;

        Ok(s)
    }

    /// Build the response as the responder. `rs` is the initiator's static
    /// public key; `local_version` is this endpoint's supported range, which
    /// is intersected with the range the initiator advertised.
    pub(crate) fn create_response(
        &mut self,
        rs: &Key,
        psk: &Key,
        local_version: Version,
    ) -> Result<HandshakeResponse> {
        let negotiated = self
            .version
            .intersect(&local_version)
            .ok_or(Error::VersionMismatch)?;
        trace!(
            min = negotiated.min(),
            max = negotiated.max(),
            "version negotiated"
        );

        let mut msg = HandshakeResponse::default();
        let mut st = SymmetricState::new(self.chaining_key, self.hash);

        /* e */
        let (e_priv, e_pub) = generate_keypair(&mut *self.rng)?;
        msg.unencrypted_ephemeral = e_pub;
        st.mix_hash(&e_pub);
        st.mix_kdf1(&e_pub);

        /* ee */
        let _ = st.mix_dh(&e_priv, &self.remote_ephemeral);

        /* se */
        let _ = st.mix_dh(&e_priv, rs);

        /* psk */
        let key = st.mix_psk(psk);

        /* version */
        st.seal(&key, negotiated.as_bytes(), &mut msg.encrypted_version);

        self.version = negotiated;
        (self.chaining_key, self.hash) = st.into_parts();
        self.seed_rekey_chains();
        self.state = State::Finished;

        Ok(msg)
    }

    /// Consume the response as the initiator. Verifies the negotiated
    /// version is a sub-range of what this endpoint advertised.
    pub(crate) fn consume_response(
        &mut self,
        msg: &HandshakeResponse,
        s_priv: &Key,
        psk: &Key,
        local_version: Version,
    ) -> Result<()> {
        let mut st = SymmetricState::new(self.chaining_key, self.hash);

        /* e */
        let e = msg.unencrypted_ephemeral;
        st.mix_hash(&e);
        st.mix_kdf1(&e);

        /* ee */
        let _ = st.mix_dh(&self.ephemeral_private, &e);

        /* se */
        let _ = st.mix_dh(s_priv, &e);

        /* psk */
        let key = st.mix_psk(psk);

        /* version */
        let mut version_bytes = [0u8; VERSION_SIZE];
        st.open(&key, &msg.encrypted_version, &mut version_bytes)?;
        let negotiated = Version::from_bytes(version_bytes);
        if !local_version.covers(&negotiated) {
            return Err(Error::VersionMismatch);
        }

        self.version = negotiated;
        (self.chaining_key, self.hash) = st.into_parts();
        self.seed_rekey_chains();
        self.state = State::Finished;

        Ok(())
    }

    /// Derive the initial session keys: `(initiator_send, responder_send)`.
    pub(crate) fn begin_session(&self) -> (Key, Key) {
        kdf2(&self.chaining_key, &[])
    }

    /// Build a rekey message for peer static `rs`, evolving this direction's
    /// chaining key. Returns the message and the fresh sending key.
    pub(crate) fn create_rekey(&mut self, rs: &Key) -> Result<(HandshakeRekey, Key)> {
        let mut msg = HandshakeRekey::default();
        let mut st = SymmetricState::new(self.send_chain, hash_join(&init_hash(), rs));

        /* e */
        let (e_priv, e_pub) = generate_keypair(&mut *self.rng)?;
        msg.unencrypted_ephemeral = e_pub;
        st.mix_hash(&e_pub);
        st.mix_kdf1(&e_pub);

        /* es */
        let _ = st.mix_dh(&e_priv, rs);

        /* ss */
        let key = st.mix_key(&self.static_static);

        /* {t} */
        let ts = Timestamp::now();
        st.seal(&key, ts.as_bytes(), &mut msg.encrypted_timestamp);

        let (chain, _hash) = st.into_parts();
        self.send_chain = chain;
        let (send_key, _) = kdf2(&self.send_chain, &[]);

        Ok((msg, send_key))
    }

    /// Consume a peer rekey, evolving the receive chaining key. The opened
    /// timestamp must strictly exceed the last accepted one; a stale rekey
    /// fails with [`Error::RekeyFailed`] and leaves all state untouched.
    pub(crate) fn consume_rekey(
        &mut self,
        msg: &HandshakeRekey,
        s_priv: &Key,
        s_pub: &Key,
    ) -> Result<Key> {
        let mut st = SymmetricState::new(self.recv_chain, hash_join(&init_hash(), s_pub));

        /* e */
        let e = msg.unencrypted_ephemeral;
        st.mix_hash(&e);
        st.mix_kdf1(&e);

        /* es */
        let _ = st.mix_dh(s_priv, &e);

        /* ss */
        let key = st.mix_key(&self.static_static);

        /* {t} */
        let mut ts_bytes = [0u8; TIMESTAMP_SIZE];
        st.open(&key, &msg.encrypted_timestamp, &mut ts_bytes)
            .map_err(|_| Error::RekeyFailed)?;
        let ts = Timestamp::from_bytes(ts_bytes);
        if !ts.after(self.remote_timestamp) {
            return Err(Error::RekeyFailed);
        }

        self.remote_timestamp = ts;
        let (chain, _hash) = st.into_parts();
        self.recv_chain = chain;
        let (recv_key, _) = kdf2(&self.recv_chain, &[]);

        Ok(recv_key)
    }

    fn seed_rekey_chains(&mut self) {
        self.send_chain = self.chaining_key;
        self.recv_chain = self.chaining_key;
    }

    #[cfg(test)]
    pub(crate) fn transcript(&self) -> (&HashSum, &HashSum) {
        (&self.chaining_key, &self.hash)
    }

    #[cfg(test)]
    pub(crate) fn recv_chain(&self) -> &HashSum {
        &self.recv_chain
    }
}

impl Drop for Handshake {
    fn drop(&mut self) {
        self.ephemeral_private.zeroize();
        self.static_static.zeroize();
        self.chaining_key.zeroize();
        self.send_chain.zeroize();
        self.recv_chain.zeroize();
    }
}
