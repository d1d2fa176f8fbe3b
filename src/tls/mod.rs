//! TLS termination.
//!
//! # Data Flow
//! ```text
//! TcpStream ──chunks──→ TlsConnection::on_network_data
//!                           → inbound ByteChannel → engine
//!                           → decrypted buffer ──→ HttpHandler
//! HttpHandler ──bytes──→ TlsConnection::send
//!                           → engine → outbound ByteChannel ──→ Transport
//! ```
//!
//! `TlsContext` is built once at startup and shared by every connection.

pub mod channel;
pub mod cipher;
pub mod config;
pub mod connection;
pub mod context;
pub mod engine;
pub mod error;
pub mod session;
pub mod session_cache;

#[cfg(test)]
pub(crate) mod fake;

pub use channel::ByteChannel;
pub use config::{ProtocolVersion, TlsConfig};
pub use connection::{TlsConnection, TlsState, Transport};
pub use context::TlsContext;
pub use engine::{EngineSession, HandshakeStatus, Negotiated, ReadStatus, SessionFactory};
pub use error::{TlsError, TlsResult};
pub use session::RustlsSession;
