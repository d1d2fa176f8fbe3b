//! TLS state machine against a real rustls client, in memory.

use std::sync::Arc;

use bytes::BytesMut;
use proptest::prelude::*;
use rustls::version::{TLS12, TLS13};
use tls_terminator::tls::{ProtocolVersion, TlsConfig, TlsConnection, TlsContext, TlsError, TlsState};

mod common;
use common::{client, client_output, deliver_to_client, pump, RecordingTransport, TestIdentity};

fn server(context: &TlsContext) -> (TlsConnection, Arc<RecordingTransport>) {
    let transport = RecordingTransport::new();
    let mut conn = TlsConnection::new(context, transport.clone()).unwrap();
    conn.start_handshake();
    (conn, transport)
}

fn context_for(identity: &TestIdentity, tweak: impl FnOnce(&mut TlsConfig)) -> TlsContext {
    let mut config = identity.tls_config();
    tweak(&mut config);
    TlsContext::from_config(config).unwrap()
}

#[test]
fn end_to_end_request_and_response() {
    let identity = TestIdentity::generate();
    let context = context_for(&identity, |_| {});
    let (mut conn, transport) = server(&context);
    let mut client = client(identity.client_config(&[&TLS13, &TLS12]));

    assert!(pump(&mut client, &mut conn, &transport));
    assert!(!client.is_handshaking());
    assert!(conn.is_handshake_complete());
    assert!(conn.decrypted_buffer().is_empty());

    let negotiated = conn.negotiated().unwrap();
    assert!(negotiated.version >= ProtocolVersion::Tls1_2);
    assert!(!negotiated.cipher_suite.is_empty());

    use std::io::Write;
    client.writer().write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
    assert!(pump(&mut client, &mut conn, &transport));
    assert_eq!(
        &conn.decrypted_buffer().split()[..],
        b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n"
    );

    conn.send(b"HTTP/1.1 200 OK\r\n\r\n");
    assert_eq!(
        deliver_to_client(&mut client, &transport.take()).unwrap(),
        b"HTTP/1.1 200 OK\r\n\r\n"
    );
    assert_eq!(transport.shutdowns(), 0);
}

#[test]
fn tls12_only_client_negotiates_tls12() {
    let identity = TestIdentity::generate();
    let context = context_for(&identity, |_| {});
    let (mut conn, transport) = server(&context);
    let mut client = client(identity.client_config(&[&TLS12]));

    assert!(pump(&mut client, &mut conn, &transport));
    assert_eq!(conn.negotiated().unwrap().version, ProtocolVersion::Tls1_2);
}

#[test]
fn tls13_floor_refuses_tls12_client() {
    let identity = TestIdentity::generate();
    let context = context_for(&identity, |c| c.min_version = ProtocolVersion::Tls1_3);
    let (mut conn, transport) = server(&context);
    let mut client = client(identity.client_config(&[&TLS12]));

    let hello = client_output(&mut client);
    conn.on_network_data(&mut BytesMut::from(&hello[..]));

    assert_eq!(conn.state(), TlsState::Error);
    assert_eq!(transport.shutdowns(), 1);
    // The alert still reaches the client.
    assert!(deliver_to_client(&mut client, &transport.take()).is_none());
}

#[test]
fn send_before_handshake_writes_nothing() {
    let identity = TestIdentity::generate();
    let context = context_for(&identity, |_| {});
    let (mut conn, transport) = server(&context);

    conn.send(b"HTTP/1.1 200 OK\r\n\r\n");

    assert!(transport.take().is_empty());
    assert_eq!(conn.state(), TlsState::Handshake);
}

#[test]
fn client_close_notify_shuts_down_once() {
    let identity = TestIdentity::generate();
    let context = context_for(&identity, |_| {});
    let (mut conn, transport) = server(&context);
    let mut client = client(identity.client_config(&[&TLS13]));
    assert!(pump(&mut client, &mut conn, &transport));

    client.send_close_notify();
    let wire = client_output(&mut client);
    conn.on_network_data(&mut BytesMut::from(&wire[..]));

    assert_eq!(conn.state(), TlsState::Shutdown);
    assert_eq!(transport.shutdowns(), 1);
    assert!(conn.decrypted_buffer().is_empty());

    conn.on_network_data(&mut BytesMut::from(&b"trailing junk"[..]));
    assert_eq!(conn.state(), TlsState::Shutdown);
    assert_eq!(transport.shutdowns(), 1);
}

#[test]
fn corrupted_record_fails_once() {
    let identity = TestIdentity::generate();
    let context = context_for(&identity, |_| {});
    let (mut conn, transport) = server(&context);
    let mut client = client(identity.client_config(&[&TLS13]));
    assert!(pump(&mut client, &mut conn, &transport));

    use std::io::Write;
    client.writer().write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
    let mut wire = client_output(&mut client);
    let last = wire.len() - 1;
    wire[last] ^= 0xff;
    conn.on_network_data(&mut BytesMut::from(&wire[..]));

    assert_eq!(conn.state(), TlsState::Error);
    assert_eq!(transport.shutdowns(), 1);
    assert!(conn.decrypted_buffer().is_empty());

    client.writer().write_all(b"more").unwrap();
    let wire = client_output(&mut client);
    conn.on_network_data(&mut BytesMut::from(&wire[..]));
    assert!(conn.decrypted_buffer().is_empty());
    assert_eq!(transport.shutdowns(), 1);
}

#[test]
fn plaintext_garbage_fails_handshake() {
    let identity = TestIdentity::generate();
    let context = context_for(&identity, |_| {});
    let (mut conn, transport) = server(&context);

    conn.on_network_data(&mut BytesMut::from(&b"GET / HTTP/1.1\r\n\r\n"[..]));

    assert_eq!(conn.state(), TlsState::Error);
    assert_eq!(transport.shutdowns(), 1);
    assert!(conn.decrypted_buffer().is_empty());
}

#[test]
fn server_close_reaches_client() {
    let identity = TestIdentity::generate();
    let context = context_for(&identity, |_| {});
    let (mut conn, transport) = server(&context);
    let mut client = client(identity.client_config(&[&TLS13]));
    assert!(pump(&mut client, &mut conn, &transport));

    conn.close();

    assert_eq!(conn.state(), TlsState::Shutdown);
    assert_eq!(transport.shutdowns(), 1);
    assert!(deliver_to_client(&mut client, &transport.take()).is_some());
    assert!(client.process_new_packets().unwrap().peer_has_closed());
}

#[test]
fn sessions_resume_from_the_cache() {
    let identity = TestIdentity::generate();
    let context = context_for(&identity, |_| {});
    let client_config = identity.client_config(&[&TLS13]);

    let (mut conn, transport) = server(&context);
    let mut first = client(client_config.clone());
    assert!(pump(&mut first, &mut conn, &transport));
    assert_eq!(first.handshake_kind(), Some(rustls::HandshakeKind::Full));

    let (mut conn, transport) = server(&context);
    let mut second = client(client_config);
    assert!(pump(&mut second, &mut conn, &transport));
    assert_eq!(second.handshake_kind(), Some(rustls::HandshakeKind::Resumed));
}

#[test]
fn connection_requires_initialized_context() {
    let identity = TestIdentity::generate();
    let context = TlsContext::new(identity.tls_config());
    let result = TlsConnection::new(&context, RecordingTransport::new());
    assert!(matches!(result, Err(TlsError::NotInitialized)));
}

#[test]
fn large_messages_cross_the_channels() {
    let identity = TestIdentity::generate();
    let context = context_for(&identity, |_| {});
    let (mut conn, transport) = server(&context);
    let mut client = client(identity.client_config(&[&TLS13]));
    assert!(pump(&mut client, &mut conn, &transport));

    let upload: Vec<u8> = (0..300_000u32).map(|i| (i % 253) as u8).collect();
    use std::io::Write;
    client.writer().write_all(&upload).unwrap();
    let wire = client_output(&mut client);
    conn.on_network_data(&mut BytesMut::from(&wire[..]));
    assert_eq!(&conn.decrypted_buffer()[..], &upload[..]);

    let download = vec![b'z'; 200_000];
    conn.send(&download);
    assert_eq!(deliver_to_client(&mut client, &transport.take()).unwrap(), download);
}

#[test]
fn sends_larger_than_the_outbound_channel_arrive_whole() {
    let identity = TestIdentity::generate();
    let context = context_for(&identity, |_| {});

    for size in [65_536usize, 131_072] {
        let (mut conn, transport) = server(&context);
        let mut client = client(identity.client_config(&[&TLS13, &TLS12]));
        assert!(pump(&mut client, &mut conn, &transport));

        let download: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        conn.send(&download);

        assert_eq!(conn.state(), TlsState::Established);
        let received = deliver_to_client(&mut client, &transport.take()).unwrap();
        assert_eq!(received.len(), size);
        assert_eq!(received, download);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn arbitrary_chunking_yields_the_message(
        message in proptest::collection::vec(any::<u8>(), 1..20_000),
        cuts in proptest::collection::vec(1usize..3000, 1..32),
    ) {
        let identity = TestIdentity::generate();
        let context = context_for(&identity, |_| {});
        let (mut conn, transport) = server(&context);
        let mut client = client(identity.client_config(&[&TLS13, &TLS12]));
        prop_assert!(pump(&mut client, &mut conn, &transport));

        use std::io::Write;
        client.writer().write_all(&message).unwrap();
        let wire = client_output(&mut client);

        let mut rest = &wire[..];
        for cut in cuts.iter().cycle() {
            if rest.is_empty() {
                break;
            }
            let n = (*cut).min(rest.len());
            let mut chunk = BytesMut::from(&rest[..n]);
            conn.on_network_data(&mut chunk);
            prop_assert!(chunk.is_empty());
            rest = &rest[n..];
        }

        prop_assert_eq!(conn.state(), TlsState::Established);
        prop_assert_eq!(&conn.decrypted_buffer()[..], &message[..]);
    }
}
