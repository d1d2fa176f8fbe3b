//! TLS termination in front of an HTTP request pipeline.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod tls;

pub use config::schema::TerminatorConfig;
pub use http::HttpsServer;
pub use lifecycle::Shutdown;
pub use tls::{TlsConfig, TlsConnection, TlsContext, TlsState};
