//! TLS error types and diagnostic logging.

use std::error::Error as StdError;
use thiserror::Error;

/// Errors raised by the TLS context and by engine sessions.
#[derive(Debug, Error)]
pub enum TlsError {
    /// Configuration failed validation before touching the engine.
    #[error("invalid TLS configuration: {0}")]
    InvalidConfig(String),

    /// A certificate or key file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The certificate file contained no PEM certificates.
    #[error("no certificates found in {0}")]
    NoCertificates(String),

    /// The key file contained no supported PEM private key.
    #[error("no private key found in {0}")]
    NoPrivateKey(String),

    /// The private key does not belong to the leaf certificate.
    #[error("private key does not match certificate")]
    KeyMismatch,

    /// The cipher policy strings select nothing the engine can use.
    #[error("cipher policy rejected: {0}")]
    CipherPolicy(String),

    /// The key exchange group list is unknown or selects nothing usable.
    #[error("key exchange group policy rejected: {0}")]
    GroupPolicy(String),

    #[error("TLS context already initialized")]
    AlreadyInitialized,

    #[error("TLS context not initialized")]
    NotInitialized,

    /// The in-memory byte channels could not move data.
    #[error("byte channel failure: {0}")]
    Channel(#[source] std::io::Error),

    /// Protocol-level failure reported by the engine.
    #[error("TLS engine error: {0}")]
    Engine(#[from] rustls::Error),
}

/// Result type for TLS operations.
pub type TlsResult<T> = Result<T, TlsError>;

/// Log an error together with every diagnostic in its source chain.
///
/// The whole chain is drained at the point of failure so that nothing
/// from this failure is reported against a later, unrelated operation.
pub fn log_diagnostics(operation: &str, error: &TlsError) {
    tracing::error!(operation, error = %error, "TLS operation failed");

    let mut source = error.source();
    let mut depth = 1usize;
    while let Some(cause) = source {
        tracing::error!(operation, depth, cause = %cause, "TLS diagnostic");
        source = cause.source();
        depth += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_keeps_source() {
        let err = TlsError::Io {
            path: "/nope/cert.pem".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.to_string().contains("/nope/cert.pem"));
        assert!(err.source().is_some());
    }

    #[test]
    fn engine_error_converts() {
        let err: TlsError = rustls::Error::DecryptError.into();
        assert!(matches!(err, TlsError::Engine(rustls::Error::DecryptError)));
    }
}
