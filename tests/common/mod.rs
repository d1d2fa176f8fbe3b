//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore, SupportedProtocolVersion};
use tls_terminator::tls::{TlsConfig, TlsConnection, Transport};

static FIXTURE_ID: AtomicUsize = AtomicUsize::new(0);

/// Write `contents` to a file under the temp dir no other test uses.
pub fn write_fixture(name: &str, contents: &str) -> PathBuf {
    let id = FIXTURE_ID.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!(
        "tls-terminator-it-{}-{}-{}",
        std::process::id(),
        id,
        name
    ));
    std::fs::write(&path, contents).unwrap();
    path
}

/// Self-signed certificate for `localhost` written to disk.
pub struct TestIdentity {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
    pub cert_der: CertificateDer<'static>,
}

impl TestIdentity {
    pub fn generate() -> Self {
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        Self {
            cert_file: write_fixture("cert.pem", &generated.cert.pem()),
            key_file: write_fixture("key.pem", &generated.key_pair.serialize_pem()),
            cert_der: generated.cert.der().clone(),
        }
    }

    pub fn tls_config(&self) -> TlsConfig {
        TlsConfig::with_key_pair(
            self.cert_file.to_string_lossy(),
            self.key_file.to_string_lossy(),
        )
    }

    /// Client configuration trusting this identity.
    pub fn client_config(&self, versions: &[&'static SupportedProtocolVersion]) -> Arc<ClientConfig> {
        let mut roots = RootCertStore::empty();
        roots.add(self.cert_der.clone()).unwrap();
        Arc::new(
            ClientConfig::builder_with_protocol_versions(versions)
                .with_root_certificates(roots)
                .with_no_client_auth(),
        )
    }
}

pub fn client(config: Arc<ClientConfig>) -> ClientConnection {
    let mut conn =
        ClientConnection::new(config, ServerName::try_from("localhost").unwrap()).unwrap();
    conn.set_buffer_limit(None);
    conn
}

/// Transport that keeps ciphertext until the test picks it up.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pending: Mutex<Vec<u8>>,
    shutdowns: AtomicUsize,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.pending.lock().unwrap())
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl Transport for RecordingTransport {
    fn send_bytes(&self, bytes: &[u8]) {
        self.pending.lock().unwrap().extend_from_slice(bytes);
    }

    fn request_shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Everything the client wants to send, as one buffer.
pub fn client_output(client: &mut ClientConnection) -> Vec<u8> {
    let mut out = Vec::new();
    while client.wants_write() {
        client.write_tls(&mut out).unwrap();
    }
    out
}

/// Hand server ciphertext to the client and collect the plaintext it
/// yields. `None` if the client rejected the ciphertext.
pub fn deliver_to_client(client: &mut ClientConnection, mut bytes: &[u8]) -> Option<Vec<u8>> {
    let mut plaintext = Vec::new();
    let mut buf = [0u8; 4096];
    while !bytes.is_empty() {
        client.read_tls(&mut bytes).ok()?;
        client.process_new_packets().ok()?;
        loop {
            match client.reader().read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => plaintext.extend_from_slice(&buf[..n]),
            }
        }
    }
    Some(plaintext)
}

/// Shuttle bytes both ways until neither side has anything to say.
/// Returns false if the client failed.
pub fn pump(
    client: &mut ClientConnection,
    server: &mut TlsConnection,
    transport: &RecordingTransport,
) -> bool {
    for _ in 0..32 {
        let to_server = client_output(client);
        if !to_server.is_empty() {
            server.on_network_data(&mut BytesMut::from(&to_server[..]));
        }
        let to_client = transport.take();
        if !to_client.is_empty() && deliver_to_client(client, &to_client).is_none() {
            return false;
        }
        if to_server.is_empty() && to_client.is_empty() {
            return true;
        }
    }
    panic!("connection did not settle");
}
