//! TLS settings.
//!
//! A plain value type loaded once at startup. Everything here is read by
//! [`TlsContext::initialize`](crate::tls::TlsContext::initialize); nothing
//! can change after the context has been built.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tls::error::TlsError;

/// Hardened legacy cipher list (TLS 1.2 and below), OpenSSL syntax.
pub const DEFAULT_CIPHER_LIST: &str = "HIGH:!aNULL:!MD5:!RC4:!3DES";

/// TLS 1.3 cipher suites in server preference order.
pub const DEFAULT_TLS13_CIPHERSUITES: &str =
    "TLS_AES_256_GCM_SHA384:TLS_AES_128_GCM_SHA256:TLS_CHACHA20_POLY1305_SHA256";

/// Key exchange groups in server preference order.
pub const DEFAULT_GROUPS: &str = "X25519:P-256:P-384";

/// Protocol versions that may be configured as the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize, Serialize)]
pub enum ProtocolVersion {
    #[serde(rename = "tls1.0")]
    Tls1_0,
    #[serde(rename = "tls1.1")]
    Tls1_1,
    #[default]
    #[serde(rename = "tls1.2")]
    Tls1_2,
    #[serde(rename = "tls1.3")]
    Tls1_3,
}

impl ProtocolVersion {
    /// Map a version negotiated by the engine back to the config enum.
    pub fn from_engine(version: rustls::ProtocolVersion) -> Option<Self> {
        match version {
            rustls::ProtocolVersion::TLSv1_0 => Some(Self::Tls1_0),
            rustls::ProtocolVersion::TLSv1_1 => Some(Self::Tls1_1),
            rustls::ProtocolVersion::TLSv1_2 => Some(Self::Tls1_2),
            rustls::ProtocolVersion::TLSv1_3 => Some(Self::Tls1_3),
            _ => None,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tls1_0 => "TLSv1.0",
            Self::Tls1_1 => "TLSv1.1",
            Self::Tls1_2 => "TLSv1.2",
            Self::Tls1_3 => "TLSv1.3",
        };
        f.write_str(name)
    }
}

/// Certificate material, protocol floor, cipher policy and session cache sizing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Leaf certificate (PEM).
    pub cert_file: String,

    /// Private key (PEM: PKCS#8, PKCS#1 or SEC1).
    pub key_file: String,

    /// Full chain (PEM). Preferred over `cert_file` when non-empty.
    pub chain_file: String,

    /// Lowest protocol version accepted from clients.
    pub min_version: ProtocolVersion,

    /// Cipher list for TLS 1.2 and below. Empty keeps engine defaults.
    pub cipher_list: String,

    /// Cipher suites for TLS 1.3. Empty keeps engine defaults.
    pub tls13_ciphersuites: String,

    /// Key exchange groups. Empty keeps engine defaults.
    pub groups: String,

    /// How long a cached session may be resumed, in seconds.
    pub session_timeout_secs: u64,

    /// Maximum number of cached sessions.
    pub session_cache_size: usize,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_file: String::new(),
            key_file: String::new(),
            chain_file: String::new(),
            min_version: ProtocolVersion::Tls1_2,
            cipher_list: DEFAULT_CIPHER_LIST.to_string(),
            tls13_ciphersuites: DEFAULT_TLS13_CIPHERSUITES.to_string(),
            groups: DEFAULT_GROUPS.to_string(),
            session_timeout_secs: 300,
            session_cache_size: 20_480,
        }
    }
}

impl TlsConfig {
    /// Config with the given certificate and key and every other field defaulted.
    pub fn with_key_pair(cert_file: impl Into<String>, key_file: impl Into<String>) -> Self {
        Self {
            cert_file: cert_file.into(),
            key_file: key_file.into(),
            ..Self::default()
        }
    }

    /// The file the certificate chain is loaded from.
    pub fn certificate_source(&self) -> &str {
        if self.chain_file.is_empty() {
            &self.cert_file
        } else {
            &self.chain_file
        }
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    /// Check the structural invariants. File contents are checked later,
    /// when the context loads them.
    pub fn validate(&self) -> Result<(), TlsError> {
        if self.key_file.trim().is_empty() {
            return Err(TlsError::InvalidConfig("private key file is empty".to_string()));
        }
        if self.cert_file.trim().is_empty() && self.chain_file.trim().is_empty() {
            return Err(TlsError::InvalidConfig(
                "one of certificate file or chain file must be set".to_string(),
            ));
        }
        if self.session_cache_size == 0 {
            return Err(TlsError::InvalidConfig(
                "session cache size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
