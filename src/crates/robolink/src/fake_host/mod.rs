//! A scriptable stand-in for the simulation host.
//!
//! [`FakeHost`] listens on a local port and answers the same command table
//! the client uses, against an in-memory [`Station`] seeded from a
//! [`StationFixture`]. Tests run it in-process; the `fake_station` binary
//! wraps it for auto-start.
//!
//! Two station commands are reserved for tests: `SCMD SLEEP <ms>` delays
//! the reply without holding the station lock, and `SCMD DROP` closes the
//! connection without replying.

mod fixture;
mod handlers;
mod kinematics;
mod station;

use std::collections::BTreeMap;
use std::io::{self, BufReader, BufWriter, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::command::{self, Command};
use crate::session::PROTOCOL_VERSION;
use crate::transport::HANDSHAKE_TOKEN;
use crate::wire::{self, Value};

pub use fixture::{FixtureKind, ItemFixture, StationFixture};
pub use handlers::PICK_SELECTION;
pub use station::Station;

use station::Handled;

/// `SCMD` name that delays the reply by the value in milliseconds.
pub const SLEEP_COMMAND: &str = "SLEEP";
/// `SCMD` name that makes the host hang up without replying.
pub const DROP_COMMAND: &str = "DROP";

const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// Settings for a [`FakeHost`] before it starts listening.
#[derive(Debug, Clone)]
pub struct FakeHostBuilder {
    station: StationFixture,
    protocol_version: i32,
    params: BTreeMap<String, String>,
    bind: String,
}

impl Default for FakeHostBuilder {
    fn default() -> Self {
        Self {
            station: StationFixture::default(),
            protocol_version: PROTOCOL_VERSION,
            params: BTreeMap::new(),
            bind: "127.0.0.1:0".to_string(),
        }
    }
}

impl FakeHostBuilder {
    pub fn station(mut self, fixture: StationFixture) -> Self {
        self.station = fixture;
        self
    }

    /// Version announced in the handshake.
    pub fn protocol_version(mut self, version: i32) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Listen address; an ephemeral local port by default.
    pub fn bind(mut self, address: impl Into<String>) -> Self {
        self.bind = address.into();
        self
    }

    pub fn start(self) -> io::Result<FakeHost> {
        let listener = TcpListener::bind(&self.bind)?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let mut station = Station::new(&self.station);
        for (key, value) in self.params {
            station.set_param(key, value);
        }
        let shared = Shared {
            station: Mutex::new(station),
            running: AtomicBool::new(true),
            connections: Mutex::new(Vec::new()),
            protocol_version: self.protocol_version,
        };
        let shared = Arc::new(shared);

        let accept_shared = Arc::clone(&shared);
        let accept = thread::Builder::new()
            .name("fake-host-accept".to_string())
            .spawn(move || accept_loop(listener, accept_shared))?;
        info!(%addr, version = self.protocol_version, "fake host listening");
        Ok(FakeHost {
            addr,
            shared,
            accept: Some(accept),
        })
    }
}

struct Shared {
    station: Mutex<Station>,
    running: AtomicBool,
    /// Clones of live sockets so shutdown can unblock their threads.
    connections: Mutex<Vec<TcpStream>>,
    protocol_version: i32,
}

impl Shared {
    fn station(&self) -> MutexGuard<'_, Station> {
        self.station.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A running fake host. Stops listening when dropped.
pub struct FakeHost {
    addr: SocketAddr,
    shared: Arc<Shared>,
    accept: Option<thread::JoinHandle<()>>,
}

impl FakeHost {
    pub fn builder() -> FakeHostBuilder {
        FakeHostBuilder::default()
    }

    /// Start with an empty default station.
    pub fn start() -> io::Result<Self> {
        Self::builder().start()
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Inspect or adjust the model between client calls.
    pub fn with_station<R>(&self, f: impl FnOnce(&mut Station) -> R) -> R {
        f(&mut *self.shared.station())
    }

    /// True once a client sent `QUIT`.
    pub fn quit_requested(&self) -> bool {
        self.shared.station().quit_requested()
    }

    /// Stop accepting and hang up on every client.
    pub fn shutdown(&mut self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let connections = std::mem::take(
            &mut *self
                .shared
                .connections
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for stream in connections {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        if let Some(accept) = self.accept.take() {
            let _ = accept.join();
        }
        debug!(addr = %self.addr, "fake host stopped");
    }
}

impl Drop for FakeHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    while shared.running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(err) = register(&shared, &stream) {
                    warn!(%peer, %err, "could not prepare connection");
                    continue;
                }
                let shared = Arc::clone(&shared);
                let spawned = thread::Builder::new()
                    .name(format!("fake-host-{peer}"))
                    .spawn(move || {
                        match serve(stream, &shared) {
                            Ok(()) => debug!(%peer, "client disconnected"),
                            Err(err) => debug!(%peer, %err, "connection ended"),
                        }
                        hang_up(&shared, peer);
                    });
                if let Err(err) = spawned {
                    warn!(%peer, %err, "could not spawn connection thread");
                }
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(err) => {
                warn!(%err, "accept failed");
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

fn register(shared: &Shared, stream: &TcpStream) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    let handle = stream.try_clone()?;
    shared
        .connections
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(handle);
    Ok(())
}

/// Drop the shutdown clone of a finished connection so its socket closes.
/// Clones of sockets that already lost their peer go too.
fn hang_up(shared: &Shared, peer: SocketAddr) {
    shared
        .connections
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .retain(|stream| matches!(stream.peer_addr(), Ok(addr) if addr != peer));
}

fn invalid_data(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

/// What a test-only station command asks the connection to do.
enum Special {
    Sleep(Duration),
    Drop,
}

fn special(command: &Command, args: &[Value]) -> Option<Special> {
    if command.name != command::COMMAND.name {
        return None;
    }
    match args {
        [Value::Str(name), Value::Str(value)] if name == SLEEP_COMMAND => {
            let ms = value.trim().parse().unwrap_or(0);
            Some(Special::Sleep(Duration::from_millis(ms)))
        }
        [Value::Str(name), _] if name == DROP_COMMAND => Some(Special::Drop),
        _ => None,
    }
}

fn serve(stream: TcpStream, shared: &Shared) -> io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = BufWriter::new(stream);

    match wire::read_line(&mut reader)? {
        Some(token) if token == HANDSHAKE_TOKEN => {}
        Some(token) => return Err(invalid_data(format!("bad handshake token {token:?}"))),
        // Readiness probes connect and hang up.
        None => return Ok(()),
    }
    let client_version = wire::read_int(&mut reader)?;
    debug!(client_version, "client handshake");
    wire::write_line(&mut writer, HANDSHAKE_TOKEN)?;
    wire::write_int(&mut writer, shared.protocol_version)?;
    writer.flush()?;

    while let Some(name) = wire::read_line(&mut reader)? {
        let command = command::lookup(&name)
            .ok_or_else(|| invalid_data(format!("unknown command {name:?}")))?;
        let args = command
            .args
            .iter()
            .map(|kind| wire::read_value(&mut reader, *kind))
            .collect::<io::Result<Vec<_>>>()?;

        let result = match special(command, &args) {
            Some(Special::Drop) => return Ok(()),
            Some(Special::Sleep(delay)) => {
                thread::sleep(delay);
                Ok(vec![Value::Str("OK".to_string())])
            }
            None => shared.station().handle(command, args),
        };
        write_reply(&mut writer, command, result)?;
        if command.name == command::QUIT.name {
            // Only after the reply is flushed.
            shared.station().quit = true;
            info!("quit requested");
            return Ok(());
        }
    }
    Ok(())
}

/// Payload in the declared shape, then the status word. Failures send
/// placeholders so the client stays in step.
fn write_reply<W: Write>(writer: &mut W, command: &Command, result: Handled) -> io::Result<()> {
    let shaped = |values: &[Value]| {
        values.len() == command.reply.len()
            && values
                .iter()
                .zip(command.reply)
                .all(|(value, kind)| value.kind() == *kind)
    };
    match result {
        Ok(values) if shaped(&values) => {
            for value in &values {
                wire::write_value(writer, value)?;
            }
            wire::write_int(writer, 0)?;
        }
        Ok(values) => {
            warn!(command = command.name, ?values, "handler reply does not match the schema");
            write_failure(writer, command, 10, "malformed reply")?;
        }
        Err(fault) => {
            let (code, message) = fault.status();
            debug!(command = command.name, code, reason = message, "request failed");
            write_failure(writer, command, code, message)?;
        }
    }
    writer.flush()
}

fn write_failure<W: Write>(writer: &mut W, command: &Command, code: i32, message: &str) -> io::Result<()> {
    for kind in command.reply {
        wire::write_value(writer, &kind.default_value())?;
    }
    wire::write_int(writer, code)?;
    wire::write_str(writer, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joints::Joints;

    #[test]
    fn failures_keep_the_reply_shape() {
        let mut bytes = Vec::new();
        write_reply(
            &mut bytes,
            &command::GET_NAME,
            Err(station::Fault::InvalidItem("gone".into())),
        )
        .unwrap();
        let mut reader = bytes.as_slice();
        assert_eq!(wire::read_str(&mut reader).unwrap(), "");
        assert_eq!(wire::read_int(&mut reader).unwrap(), 1);
        assert_eq!(wire::read_str(&mut reader).unwrap(), "gone");
        assert!(reader.is_empty());
    }

    #[test]
    fn mis_shaped_handler_output_becomes_a_host_error() {
        let mut bytes = Vec::new();
        write_reply(
            &mut bytes,
            &command::GET_JOINTS,
            Ok(vec![Value::Joints(Joints::zeros(6)), Value::Int(3)]),
        )
        .unwrap();
        let mut reader = bytes.as_slice();
        assert_eq!(
            wire::read_value(&mut reader, wire::Kind::Joints).unwrap(),
            Value::Joints(Joints::default())
        );
        assert_eq!(wire::read_int(&mut reader).unwrap(), 10);
    }

    #[test]
    fn test_commands_are_recognized() {
        let sleep = [Value::Str("SLEEP".into()), Value::Str("25".into())];
        assert!(matches!(
            special(&command::COMMAND, &sleep),
            Some(Special::Sleep(delay)) if delay == Duration::from_millis(25)
        ));
        let other = [Value::Str("Trace".into()), Value::Str("On".into())];
        assert!(special(&command::COMMAND, &other).is_none());
    }
}
