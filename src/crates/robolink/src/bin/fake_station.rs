//! Stand-alone fake host. Accepts the host's launch flags, so sessions with
//! auto-start can point their executable here.
//!
//! `-STATION=<file.json>` seeds the station; any other `-KEY=VALUE` becomes
//! a station parameter. Exits when a client sends `QUIT`.

use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use robolink::fake_host::{FakeHost, StationFixture};
use robolink::DEFAULT_PORT;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const QUIT_POLL: Duration = Duration::from_millis(50);

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "robolink=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut port = DEFAULT_PORT;
    let mut builder = FakeHost::builder();
    for arg in std::env::args().skip(1) {
        let Some(flag) = arg.strip_prefix('-') else {
            warn!(%arg, "ignoring positional argument");
            continue;
        };
        match flag.split_once('=') {
            Some(("PORT", value)) => match value.parse() {
                Ok(value) => port = value,
                Err(err) => {
                    error!(%value, %err, "bad port");
                    return ExitCode::FAILURE;
                }
            },
            Some(("STATION", path)) => match StationFixture::from_file(path) {
                Ok(fixture) => builder = builder.station(fixture),
                Err(err) => {
                    error!(%path, %err, "could not load station");
                    return ExitCode::FAILURE;
                }
            },
            Some((key, value)) => builder = builder.param(key, value),
            None => info!(flag, "ignoring launch flag"),
        }
    }

    let host = match builder.bind(format!("127.0.0.1:{port}")).start() {
        Ok(host) => host,
        Err(err) => {
            error!(port, %err, "could not listen");
            return ExitCode::FAILURE;
        }
    };
    info!(addr = %host.addr(), "fake station ready");
    while !host.quit_requested() {
        thread::sleep(QUIT_POLL);
    }
    info!("shutting down");
    ExitCode::SUCCESS
}
