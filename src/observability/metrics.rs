//! Metrics collection and exposition.
//!
//! # Metrics
//! - `tls_handshakes_total` (counter): completed handshakes by `outcome`
//! - `tls_connections_active` (gauge): current connection count
//! - `tls_bytes_decrypted_total` (counter): plaintext handed to the HTTP layer
//! - `tls_bytes_encrypted_total` (counter): plaintext accepted for encryption
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter serves its own scrape endpoint

use std::net::SocketAddr;

use ::metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const HANDSHAKES_TOTAL: &str = "tls_handshakes_total";
pub const CONNECTIONS_ACTIVE: &str = "tls_connections_active";
pub const BYTES_DECRYPTED_TOTAL: &str = "tls_bytes_decrypted_total";
pub const BYTES_ENCRYPTED_TOTAL: &str = "tls_bytes_encrypted_total";

/// Install the Prometheus recorder and start its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// `outcome` is `success` or `failure`.
pub fn record_handshake(outcome: &'static str) {
    counter!(HANDSHAKES_TOTAL, "outcome" => outcome).increment(1);
}

pub fn connection_opened() {
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

pub fn connection_closed() {
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

pub fn record_decrypted(bytes: usize) {
    counter!(BYTES_DECRYPTED_TOTAL).increment(bytes as u64);
}

pub fn record_encrypted(bytes: usize) {
    counter!(BYTES_ENCRYPTED_TOTAL).increment(bytes as u64);
}
