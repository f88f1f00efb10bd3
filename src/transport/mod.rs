//! Transport module - the connection to the host.
//!
//! Provides abstraction over:
//! - Unix Domain Sockets (Linux/macOS)
//! - Loopback TCP with a shared-secret handshake

mod socket;

pub use socket::{authenticate, connect_and_auth, HostStream, AUTH_OK};
