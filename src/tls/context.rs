//! Long-lived TLS context.
//!
//! # Lifecycle
//! ```text
//! TlsContext::new(config)      snapshot of the settings, nothing loaded
//!     → initialize()           engine bootstrap, certificates, policy
//!     → Arc<TlsContext>        shared read-only by every connection
//! ```
//!
//! # Design Decisions
//! - Misconfiguration is fatal at startup, never discovered mid-connection
//! - No partial success: the engine configuration is stored only when
//!   every step succeeded
//! - Clients are never asked for a certificate

use std::fs::File;
use std::io::BufReader;
use std::sync::{Arc, Once};

use rustls::crypto::{aws_lc_rs, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::sign::CertifiedKey;
use rustls::{InconsistentKeys, ServerConfig, SupportedProtocolVersion};

use crate::tls::cipher;
use crate::tls::config::{ProtocolVersion, TlsConfig};
use crate::tls::engine::SessionFactory;
use crate::tls::error::{log_diagnostics, TlsError, TlsResult};
use crate::tls::session::RustlsSession;
use crate::tls::session_cache::ExpiringSessionCache;

static ENGINE_BOOTSTRAP: Once = Once::new();

/// Process-wide engine setup. Runs exactly once no matter how many
/// contexts are created.
fn bootstrap_engine() {
    ENGINE_BOOTSTRAP.call_once(|| {
        if aws_lc_rs::default_provider().install_default().is_ok() {
            tracing::debug!("installed aws-lc-rs as the process crypto provider");
        } else {
            tracing::debug!("process crypto provider already installed");
        }
    });
}

/// Lowest version the engine can speak.
const ENGINE_FLOOR: ProtocolVersion = ProtocolVersion::Tls1_2;

/// Protocol range `[floor, newest supported]`.
fn protocol_range(min: ProtocolVersion) -> &'static [&'static SupportedProtocolVersion] {
    static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];
    match min {
        ProtocolVersion::Tls1_3 => TLS13_ONLY,
        _ => rustls::ALL_VERSIONS,
    }
}

fn open(path: &str) -> TlsResult<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Io {
            path: path.to_string(),
            source,
        })
}

fn load_certificates(path: &str) -> TlsResult<Vec<CertificateDer<'static>>> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.to_string(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_string()));
    }
    Ok(certs)
}

fn load_private_key(path: &str) -> TlsResult<PrivateKeyDer<'static>> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Io {
            path: path.to_string(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_string()))
}

/// One-time initialized factory for engine sessions.
#[derive(Debug)]
pub struct TlsContext {
    config: TlsConfig,
    server_config: Option<Arc<ServerConfig>>,
}

impl TlsContext {
    /// Create an uninitialized context from a settings snapshot.
    pub fn new(config: TlsConfig) -> Self {
        Self {
            config,
            server_config: None,
        }
    }

    /// Build and initialize in one step.
    pub fn from_config(config: TlsConfig) -> TlsResult<Self> {
        let mut context = Self::new(config);
        context.initialize()?;
        Ok(context)
    }

    /// Load certificates and apply every policy. On failure the context
    /// stays unusable and the cause has already been logged.
    pub fn initialize(&mut self) -> TlsResult<()> {
        if self.server_config.is_some() {
            return Err(TlsError::AlreadyInitialized);
        }

        match self.build() {
            Ok(server_config) => {
                self.server_config = Some(Arc::new(server_config));
                tracing::info!(
                    certificate = %self.config.certificate_source(),
                    min_version = %self.config.min_version.max(ENGINE_FLOOR),
                    session_cache_size = self.config.session_cache_size,
                    session_timeout_secs = self.config.session_timeout_secs,
                    "TLS context initialized"
                );
                Ok(())
            }
            Err(e) => {
                log_diagnostics("initialize TLS context", &e);
                Err(e)
            }
        }
    }

    fn build(&self) -> TlsResult<ServerConfig> {
        self.config.validate()?;

        bootstrap_engine();

        let base = aws_lc_rs::default_provider();

        if self.config.min_version < ENGINE_FLOOR {
            tracing::warn!(
                requested = %self.config.min_version,
                effective = %ENGINE_FLOOR,
                "requested protocol floor is below what the engine supports; raising it"
            );
        }
        let versions = protocol_range(self.config.min_version);
        let tls12_enabled = versions.iter().any(|v| v.version == rustls::ProtocolVersion::TLSv1_2);

        let cipher_suites = cipher::select_cipher_suites(
            &base.cipher_suites,
            &self.config.cipher_list,
            &self.config.tls13_ciphersuites,
            tls12_enabled,
        )?;
        let kx_groups = cipher::select_groups(&base.kx_groups, &self.config.groups)?;
        let provider = Arc::new(CryptoProvider {
            cipher_suites,
            kx_groups,
            ..base
        });

        let (certs, key) = self.load_key_pair(&provider)?;

        let builder = ServerConfig::builder_with_provider(provider)
            .with_protocol_versions(versions)?
            .with_no_client_auth();
        let mut server_config = builder.with_single_cert(certs, key)?;

        // SSLv2/SSLv3, TLS compression and renegotiation do not exist in the
        // engine; preferring server cipher order is the only switch left.
        server_config.ignore_client_order = true;
        tracing::debug!(
            "legacy protocols, compression and renegotiation are unavailable in the engine"
        );

        server_config.session_storage = ExpiringSessionCache::new(
            self.config.session_cache_size,
            self.config.session_timeout(),
        );

        Ok(server_config)
    }

    fn load_key_pair(
        &self,
        provider: &CryptoProvider,
    ) -> TlsResult<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
        let certs = load_certificates(self.config.certificate_source())?;
        let key = load_private_key(&self.config.key_file)?;

        let signing_key = provider.key_provider.load_private_key(key.clone_key())?;
        match CertifiedKey::new(certs.clone(), signing_key).keys_match() {
            Ok(()) => {}
            Err(rustls::Error::InconsistentKeys(InconsistentKeys::KeyMismatch)) => {
                return Err(TlsError::KeyMismatch);
            }
            Err(rustls::Error::InconsistentKeys(InconsistentKeys::Unknown)) => {
                tracing::warn!(
                    key_file = %self.config.key_file,
                    "cannot verify that the private key matches the certificate"
                );
            }
            Err(e) => return Err(e.into()),
        }

        Ok((certs, key))
    }

    pub fn is_initialized(&self) -> bool {
        self.server_config.is_some()
    }

    /// The engine configuration, once initialized.
    pub fn native_handle(&self) -> Option<&Arc<ServerConfig>> {
        self.server_config.as_ref()
    }

    pub fn config(&self) -> &TlsConfig {
        &self.config
    }
}

impl SessionFactory for TlsContext {
    type Session = RustlsSession;

    fn new_session(&self) -> TlsResult<RustlsSession> {
        let config = self.native_handle().ok_or(TlsError::NotInitialized)?;
        RustlsSession::new(Arc::clone(config))
    }
}
