//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Initialize TLS context → Bind listener
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     Stop accepting → Drain connections (bounded) → Exit
//! ```
//!
//! # Design Decisions
//! - Fail fast: a TLS context that cannot initialize stops startup
//! - Shutdown has timeout: open connections are abandoned after the drain deadline

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
