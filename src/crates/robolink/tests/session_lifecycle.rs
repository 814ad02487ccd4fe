#![cfg(feature = "test-support")]
#[path = "link_support.rs"]
mod support;

use std::io::{self, BufReader, Write};
use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

use robolink::fake_host::{FakeHost, DROP_COMMAND, SLEEP_COMMAND};
use robolink::{
    wire, ItemType, LinkError, Session, SessionState, HANDSHAKE_TOKEN, PROTOCOL_VERSION,
};

#[test]
fn opens_and_closes_idempotently() {
    let host = support::start_host();
    let session = support::open(&host);
    assert!(session.is_open());
    assert_eq!(session.state(), SessionState::Open);
    assert_eq!(session.protocol_version(), Some(PROTOCOL_VERSION));

    session.close();
    session.close();
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.protocol_version(), None);

    let err = session
        .item_by_name("R1", None)
        .expect_err("closed session should refuse requests");
    assert!(matches!(err, LinkError::Closed), "unexpected error {err:?}");
}

#[test]
fn refused_connection_is_a_connect_error() {
    let port = support::free_port();
    let err = Session::connect("127.0.0.1", port).expect_err("nothing listens on the port");
    assert!(matches!(err, LinkError::Connect { .. }), "unexpected error {err:?}");
    assert!(err.is_fatal());
}

#[test]
fn unsupported_host_version_is_rejected() {
    let host = FakeHost::builder()
        .protocol_version(7)
        .start()
        .expect("fake host should start");
    let err = Session::open(support::config(&host)).expect_err("version 7 is not supported");
    match err {
        LinkError::ProtocolVersion { found, min, max } => {
            assert_eq!(found, 7);
            assert!(min <= PROTOCOL_VERSION && PROTOCOL_VERSION <= max);
        }
        other => panic!("expected a protocol version error, got {other:?}"),
    }
}

#[test]
fn garbled_reply_closes_the_session() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("ephemeral bind");
    let port = listener.local_addr().expect("local addr").port();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("client should connect");
        let mut reader = BufReader::new(stream.try_clone().expect("stream clone"));
        let mut writer = stream;
        let token = wire::read_line(&mut reader).expect("handshake line");
        assert_eq!(token.as_deref(), Some(HANDSHAKE_TOKEN));
        wire::read_int(&mut reader).expect("client version");
        wire::write_line(&mut writer, HANDSHAKE_TOKEN).expect("handshake reply");
        wire::write_int(&mut writer, PROTOCOL_VERSION).expect("handshake version");

        wire::read_line(&mut reader).expect("request line");
        // A negative string length.
        wire::write_int(&mut writer, -5).expect("garbage reply");
        io::copy(&mut reader, &mut io::sink()).expect("drain until the client hangs up");
    });

    let session = Session::connect("127.0.0.1", port).expect("handshake should succeed");
    let err = session
        .command("Trace", "On")
        .expect_err("garbled reply should fail");
    assert!(matches!(err, LinkError::Framing(_)), "unexpected error {err:?}");
    assert_eq!(session.state(), SessionState::Closed);

    let err = session
        .command("Trace", "On")
        .expect_err("session should stay closed");
    assert!(matches!(err, LinkError::Closed));
    drop(session);
    server.join().expect("fake server should finish");
}

#[test]
fn trickled_reply_still_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("ephemeral bind");
    let port = listener.local_addr().expect("local addr").port();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("client should connect");
        let mut reader = BufReader::new(stream.try_clone().expect("stream clone"));
        let mut writer = stream;
        wire::read_line(&mut reader).expect("handshake line");
        wire::read_int(&mut reader).expect("client version");
        wire::write_line(&mut writer, HANDSHAKE_TOKEN).expect("handshake reply");
        wire::write_int(&mut writer, PROTOCOL_VERSION).expect("handshake version");

        wire::read_line(&mut reader).expect("request line");
        wire::read_str(&mut reader).expect("command name");
        wire::read_str(&mut reader).expect("command value");
        let mut reply = Vec::new();
        wire::write_str(&mut reply, "OK").expect("encode reply");
        wire::write_int(&mut reply, 0).expect("encode status");
        // Every gap is shorter than the timeout, the whole reply is not.
        for byte in reply {
            thread::sleep(Duration::from_millis(100));
            if writer.write_all(&[byte]).is_err() {
                break;
            }
        }
        let _ = io::copy(&mut reader, &mut io::sink());
    });

    let session = Session::connect("127.0.0.1", port).expect("handshake should succeed");
    session
        .set_timeout(Duration::from_millis(350))
        .expect("timeout should apply");
    let started = Instant::now();
    let err = session
        .command("Trace", "On")
        .expect_err("trickled reply should time out");
    assert!(matches!(err, LinkError::Timeout(_)), "unexpected error {err:?}");
    assert!(started.elapsed() < Duration::from_millis(800));
    assert_eq!(session.state(), SessionState::Closed);
    drop(session);
    server.join().expect("fake server should finish");
}

#[test]
fn timeout_closes_and_reconnect_recovers() {
    let host = support::start_host();
    let session = support::open(&host);
    session
        .set_timeout(Duration::from_millis(200))
        .expect("timeout should apply");

    let err = session
        .command(SLEEP_COMMAND, "2000")
        .expect_err("slow reply should time out");
    assert!(matches!(err, LinkError::Timeout(_)), "unexpected error {err:?}");
    assert!(!session.is_open());

    session
        .set_timeout(Duration::from_secs(5))
        .expect("timeout should apply while closed");
    session.reconnect().expect("reconnect should succeed");
    let robot = session
        .item_by_name("R1", Some(ItemType::Robot))
        .expect("lookup should succeed after reconnect");
    assert!(robot.is_some());
}

#[test]
fn host_hang_up_is_fatal() {
    let host = support::start_host();
    let session = support::open(&host);
    let err = session
        .command(DROP_COMMAND, "")
        .expect_err("host hangs up without replying");
    assert!(err.is_fatal(), "unexpected error {err:?}");
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn close_handle_interrupts_a_request_in_flight() {
    let host = support::start_host();
    let session = support::open(&host);
    let handle = session.close_handle();

    let worker = {
        let session = session.clone();
        thread::spawn(move || session.command(SLEEP_COMMAND, "3000"))
    };
    thread::sleep(Duration::from_millis(200));
    let started = Instant::now();
    assert!(handle.close());

    let result = worker.join().expect("worker should not panic");
    let err = result.expect_err("interrupted request should fail");
    assert!(err.is_fatal(), "unexpected error {err:?}");
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(session.state(), SessionState::Closed);

    drop(session);
    assert!(!handle.close(), "handle should not outlive the session");
}

#[test]
fn host_errors_leave_the_session_open() {
    let host = support::start_host();
    let session = support::open(&host);
    let err = session
        .set_simulation_speed(-1.0)
        .expect_err("negative speed should be refused");
    assert!(matches!(err, LinkError::Host { .. }), "unexpected error {err:?}");
    assert!(!err.is_fatal());
    assert!(session.is_open());
    assert_eq!(session.command("Trace", "On").expect("session still usable"), "OK");
}
