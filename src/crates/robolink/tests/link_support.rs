#![cfg(feature = "test-support")]
#![allow(dead_code)]

use std::net::TcpListener;
use std::path::PathBuf;
use std::time::Duration;

use robolink::fake_host::{FakeHost, ItemFixture, StationFixture};
use robolink::{Session, SessionConfig};

pub const TOLERANCE: f64 = 1e-6;

/// A welding cell: a robot with a torch on a raised base, and a table
/// carrying an approach target and a part.
pub fn cell() -> StationFixture {
    StationFixture::new("Cell")
        .with_param("IO_3", "1")
        .with_item(
            ItemFixture::frame("Base")
                .with_pose([0.0, 0.0, 500.0, 0.0, 0.0, 0.0])
                .with_child(
                    ItemFixture::robot("R1").with_child(
                        ItemFixture::tool("Torch").with_pose([0.0, 0.0, 100.0, 0.0, 0.0, 0.0]),
                    ),
                ),
        )
        .with_item(
            ItemFixture::frame("Table")
                .with_pose([800.0, 0.0, 0.0, 0.0, 0.0, 0.0])
                .with_child(
                    ItemFixture::target("Approach").with_pose([0.0, 0.0, 300.0, 0.0, 0.0, 0.0]),
                )
                .with_child(ItemFixture::object("Part").with_points(vec![
                    vec![0.0, 0.0, 10.0],
                    vec![50.0, 0.0, 10.0],
                    vec![50.0, 50.0, 10.0],
                ])),
        )
}

pub fn start_host() -> FakeHost {
    start_host_with(cell())
}

pub fn start_host_with(fixture: StationFixture) -> FakeHost {
    FakeHost::builder()
        .station(fixture)
        .start()
        .expect("fake host should start")
}

pub fn config(host: &FakeHost) -> SessionConfig {
    SessionConfig::new("127.0.0.1", host.port()).with_timeout(Duration::from_secs(5))
}

pub fn open(host: &FakeHost) -> Session {
    Session::open(config(host)).expect("session should open")
}

/// A port nothing listens on right now.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("ephemeral bind");
    listener.local_addr().expect("local addr").port()
}

pub fn fake_station_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_fake_station") {
        return PathBuf::from(path);
    }
    PathBuf::from(env!("CARGO_BIN_EXE_fake_station"))
}
