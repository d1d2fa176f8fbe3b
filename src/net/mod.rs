//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (ID, tracking for graceful shutdown)
//!     → binding.rs (socket ⇄ TlsConnection ⇄ HttpHandler)
//!     → transport.rs (ciphertext and close requests to the writer task)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - The TLS layer never touches the socket; it talks to a `Transport`

pub mod binding;
pub mod connection;
pub mod listener;
pub mod transport;
