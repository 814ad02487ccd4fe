#![cfg(feature = "test-support")]
#[path = "link_support.rs"]
mod support;

use std::fs;
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

use robolink::{ItemType, LinkError, ParamValue, Session, SessionConfig};
use tempfile::TempDir;

fn auto_start_config(port: u16) -> SessionConfig {
    SessionConfig::new("127.0.0.1", port)
        .with_timeout(Duration::from_secs(5))
        .with_auto_start(true)
        .with_executable(support::fake_station_path())
        .with_spawn_timeout(Duration::from_secs(10))
        .with_retry_interval(Duration::from_millis(50))
}

fn wait_until_closed(port: u16) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if TcpStream::connect(("127.0.0.1", port)).is_err() {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    false
}

#[test]
fn launches_the_host_when_nothing_listens() {
    let dir = TempDir::new().expect("temp dir");
    let station = dir.path().join("cell.json");
    fs::write(&station, support::cell().to_json().expect("fixture json")).expect("station file");
    let port = support::free_port();

    let session = Session::open(
        auto_start_config(port)
            .with_param("STATION", station.display().to_string())
            .with_param("SHIFT", "night"),
    )
    .expect("auto-start should bring the host up");
    let robot = session
        .item_by_name("R1", Some(ItemType::Robot))
        .expect("lookup");
    assert!(robot.is_some());
    assert_eq!(
        session.get_param("SHIFT").expect("param"),
        Some(ParamValue::Text("night".to_string()))
    );

    assert_eq!(session.launched_host_status(), None, "host is still running");

    session.quit_host().expect("quit should be acknowledged");
    assert!(!session.is_open());
    assert!(wait_until_closed(port), "host should exit after quit");

    let deadline = Instant::now() + Duration::from_secs(5);
    let status = loop {
        if let Some(status) = session.launched_host_status() {
            break status;
        }
        assert!(Instant::now() < deadline, "launched host was never reaped");
        thread::sleep(Duration::from_millis(50));
    };
    assert!(status.success(), "host exited with {status}");
}

#[test]
fn sessions_that_did_not_launch_report_no_host() {
    let host = support::start_host();
    let session = support::open(&host);
    assert_eq!(session.launched_host_status(), None);
}

#[test]
fn without_auto_start_nothing_is_launched() {
    let port = support::free_port();
    let err = Session::open(auto_start_config(port).with_auto_start(false))
        .expect_err("nothing listens on the port");
    assert!(matches!(err, LinkError::Connect { .. }), "unexpected error {err:?}");
    assert!(err.is_fatal());
}

#[test]
fn missing_executable_is_a_launch_error() {
    let port = support::free_port();
    let err = Session::open(
        auto_start_config(port).with_executable("/nonexistent/robolink-host"),
    )
    .expect_err("nothing to launch");
    assert!(matches!(err, LinkError::Launch(_)), "unexpected error {err:?}");
    assert!(err.is_fatal());
}

#[test]
fn host_exiting_during_startup_fails_fast() {
    let dir = TempDir::new().expect("temp dir");
    let port = support::free_port();
    let started = Instant::now();
    let err = Session::open(
        auto_start_config(port)
            .with_param("STATION", dir.path().join("missing.json").display().to_string()),
    )
    .expect_err("host cannot load its station");
    assert!(matches!(err, LinkError::Launch(_)), "unexpected error {err:?}");
    assert!(started.elapsed() < Duration::from_secs(10));
}
