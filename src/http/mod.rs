//! HTTP side of the terminator.
//!
//! # Data Flow
//! ```text
//! Listener
//!     → server.rs (accept loop, per-connection tasks)
//!     → net::binding (TLS termination)
//!     → handler.rs (decrypted requests → response bytes)
//! ```

pub mod handler;
pub mod server;

pub use handler::{HandlerOutcome, HttpHandler, StaticResponder};
pub use server::HttpsServer;
