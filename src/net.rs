//! TCP dial/listen glue.
//!
//! Thin convenience layer over [`std::net`]: a [`connect`] helper for
//! initiators and a [`Listener`] that wraps a bound [`TcpListener`] and
//! yields responder sessions. The handshake itself stays lazy; it runs on
//! the first read or write of each session.

use std::net::{TcpListener, TcpStream, ToSocketAddrs};

use crate::core::Result;
use crate::session::{Config, Session};

/// Connect to `addr` and wrap the stream as an initiating session.
pub fn connect(addr: impl ToSocketAddrs, config: Config) -> Result<Session<TcpStream>> {
    let stream = TcpStream::connect(addr)?;
    Session::new_client(stream, config)
}

/// A TCP listener whose accepted connections are responder sessions.
///
/// The listener keeps one configuration and applies it to every accepted
/// connection. Accepted sessions always draw randomness from the OS CSPRNG;
/// a per-session random source only applies to sessions built directly with
/// [`Session::new_server`].
pub struct Listener {
    inner: TcpListener,
    config: Config,
}

impl Listener {
    /// Bind to `addr` with the given session configuration.
    pub fn bind(addr: impl ToSocketAddrs, config: Config) -> Result<Self> {
        let inner = TcpListener::bind(addr)?;
        Ok(Self { inner, config })
    }

    /// Wrap an already-bound listener.
    pub fn from_std(inner: TcpListener, config: Config) -> Self {
        Self { inner, config }
    }

    /// The local address the listener is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    /// Accept one connection and wrap it as a responder session.
    pub fn accept(&self) -> Result<Session<TcpStream>> {
        let (stream, _addr) = self.inner.accept()?;
        Session::new_server(stream, self.session_config())
    }

    // Per-accept copy of the stored configuration. `rand` stays `None` so
    // every session gets its own OS CSPRNG handle.
    fn session_config(&self) -> Config {
        Config {
            version: self.config.version,
            static_public: self.config.static_public,
            static_private: self.config.static_private,
            peer_public: self.config.peer_public,
            preshared_key: self.config.preshared_key,
            rekey_after: self.config.rekey_after,
            reject_after: self.config.reject_after,
            rand: None,
        }
    }
}
