use std::collections::HashMap;
use std::fmt;
use std::net::{Shutdown, TcpStream};
use std::ops::RangeInclusive;
use std::process::{Child, ExitStatus};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError, Weak};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::command::Command;
use crate::config::SessionConfig;
use crate::error::{LinkError, LinkResult};
use crate::item::Item;
use crate::joints::Joints;
use crate::launcher::{launch_host, wait_for_listener};
use crate::matrix::Matrix;
use crate::pose::Pose;
use crate::transport::Link;
use crate::types::{ItemType, RunMode};
use crate::wire::Value;

/// Protocol version this client announces during the handshake.
pub const PROTOCOL_VERSION: i32 = 1;
/// Host protocol versions this client can talk to.
pub const SUPPORTED_PROTOCOL_VERSIONS: RangeInclusive<i32> = 1..=1;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);
static DEFAULT_SESSION: Mutex<Option<Session>> = Mutex::new(None);

/// Lifecycle of a session's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Opening,
    Open,
    Draining,
}

/// Client-side copy of the host settings a session has selected.
#[derive(Debug, Default)]
pub(crate) struct Settings {
    pub(crate) run_mode: Option<RunMode>,
    pub(crate) simulation_speed: Option<f64>,
    pub(crate) active_station: Option<i32>,
    pub(crate) path_cache: HashMap<String, String>,
}

struct Conn {
    state: SessionState,
    link: Option<Link>,
    protocol_version: Option<i32>,
    timeout: Duration,
    settings: Settings,
}

struct Inner {
    id: u64,
    config: SessionConfig,
    conn: Mutex<Conn>,
    shutdown: Mutex<Option<TcpStream>>,
    /// Host process started by auto-start, kept so it can be reaped.
    host: Mutex<Option<Child>>,
}

/// One connection to the host.
///
/// Cloning is cheap and every clone drives the same connection; only one
/// request is in flight at a time. Open one session per worker thread for
/// parallel work: handles are bound to the session that produced them.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("address", &self.inner.config.address())
            .field("state", &self.state())
            .finish()
    }
}

impl Session {
    /// Connect to the host described by `config`, launching it first when
    /// auto-start is enabled and nothing is listening.
    pub fn open(config: SessionConfig) -> LinkResult<Self> {
        let session = Self {
            inner: Arc::new(Inner {
                id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
                conn: Mutex::new(Conn {
                    state: SessionState::Closed,
                    link: None,
                    protocol_version: None,
                    timeout: config.timeout,
                    settings: Settings::default(),
                }),
                shutdown: Mutex::new(None),
                host: Mutex::new(None),
                config,
            }),
        };
        session.establish()?;
        Ok(session)
    }

    /// Shorthand for [`Session::open`] with default settings.
    pub fn connect(host: impl Into<String>, port: u16) -> LinkResult<Self> {
        Self::open(SessionConfig::new(host, port))
    }

    fn lock(&self) -> MutexGuard<'_, Conn> {
        self.inner.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn establish(&self) -> LinkResult<()> {
        let mut conn = self.lock();
        conn.state = SessionState::Opening;
        match self.open_link(conn.timeout) {
            Ok((link, version)) => {
                let handle = link.shutdown_handle()?;
                *self
                    .inner
                    .shutdown
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(handle);
                conn.link = Some(link);
                conn.protocol_version = Some(version);
                conn.state = SessionState::Open;
                info!(
                    session = self.inner.id,
                    address = %self.inner.config.address(),
                    version,
                    "session open"
                );
                Ok(())
            }
            Err(err) => {
                conn.state = SessionState::Closed;
                conn.link = None;
                warn!(session = self.inner.id, %err, "failed to open session");
                Err(err)
            }
        }
    }

    fn open_link(&self, timeout: Duration) -> LinkResult<(Link, i32)> {
        let config = &self.inner.config;
        let address = config.address();
        let mut link = match Link::connect(&address, timeout, config.debug) {
            Ok(link) => link,
            Err(err) if config.auto_start => {
                info!(%address, %err, "host not reachable, starting it");
                let mut child = launch_host(config)?;
                wait_for_listener(config, &mut child)?;
                self.inner.track_host(child);
                Link::connect(&address, timeout, config.debug)
                    .map_err(|source| LinkError::Connect { addr: address.clone(), source })?
            }
            Err(source) => return Err(LinkError::Connect { addr: address, source }),
        };

        let version = link.handshake(PROTOCOL_VERSION)?;
        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&version) {
            return Err(LinkError::ProtocolVersion {
                found: version,
                min: *SUPPORTED_PROTOCOL_VERSIONS.start(),
                max: *SUPPORTED_PROTOCOL_VERSIONS.end(),
            });
        }
        Ok((link, version))
    }

    /// Process-unique identifier of this session.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SessionState {
        match self.inner.conn.try_lock() {
            Ok(conn) => conn.state,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().state,
            // A request is in flight, which only happens while open.
            Err(TryLockError::WouldBlock) => SessionState::Open,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Version the host reported at open, `None` once closed.
    pub fn protocol_version(&self) -> Option<i32> {
        self.lock().protocol_version
    }

    /// Change the per-request deadline.
    pub fn set_timeout(&self, timeout: Duration) -> LinkResult<()> {
        let mut conn = self.lock();
        conn.timeout = timeout;
        if let Some(link) = conn.link.as_mut() {
            link.set_timeout(timeout)?;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        self.lock().timeout
    }

    /// Close the connection. Closing twice is a no-op.
    ///
    /// Safe to call from another thread while a request is in flight; that
    /// request then fails with a transport error.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Exit status of the host this session launched, once it has exited.
    ///
    /// `None` while the host runs or when the session did not start it.
    pub fn launched_host_status(&self) -> Option<ExitStatus> {
        self.inner.reap_host()
    }

    /// Capability to close this session from another thread without keeping
    /// it alive.
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Close (if needed) and open again with the same configuration.
    pub fn reconnect(&self) -> LinkResult<()> {
        self.close();
        info!(session = self.inner.id, "reconnecting");
        self.establish()
    }

    /// Send one command and read its reply.
    ///
    /// The argument list is checked against the command schema before
    /// anything is written. Transport failures close the session; host and
    /// invalid-item errors leave it open.
    pub fn call(&self, command: &Command, args: &[Value]) -> LinkResult<Reply> {
        command.check_args(args)?;
        let mut conn = self.lock();
        if conn.state != SessionState::Open {
            return Err(LinkError::Closed);
        }
        let link = conn.link.as_mut().ok_or(LinkError::Closed)?;
        match link.exchange(command, args) {
            Ok(values) => Ok(Reply::new(command.name, values)),
            Err(err) => {
                if err.is_fatal() {
                    warn!(session = self.inner.id, command = command.name, %err, "closing session");
                    conn.link = None;
                    conn.protocol_version = None;
                    conn.state = SessionState::Closed;
                    self.inner.take_shutdown_handle();
                }
                Err(err)
            }
        }
    }

    pub(crate) fn with_settings<R>(&self, f: impl FnOnce(&mut Settings) -> R) -> R {
        f(&mut self.lock().settings)
    }

    /// Wrap a host id in a handle bound to this session.
    pub(crate) fn item(&self, id: i32, kind: Option<ItemType>) -> Item {
        Item::new(self.clone(), id, kind)
    }

    /// The invalid handle: what lookups return when nothing matches.
    pub fn invalid_item(&self) -> Item {
        self.item(0, None)
    }

    /// Encode `item` as an argument, refusing handles from another session.
    pub(crate) fn item_arg(&self, item: &Item) -> LinkResult<Value> {
        if item.session().id() != self.id() {
            return Err(LinkError::CrossSession);
        }
        Ok(Value::Item(item.id()))
    }

    /// Like [`Session::item_arg`], with `None` meaning "no item" (id 0).
    pub(crate) fn optional_item_arg(&self, item: Option<&Item>) -> LinkResult<Value> {
        item.map_or(Ok(Value::Item(0)), |item| self.item_arg(item))
    }
}

impl Inner {
    fn track_host(&self, child: Child) {
        let mut host = self.host.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut previous) = host.replace(child) {
            if let Ok(None) = previous.try_wait() {
                debug!(session = self.id, pid = previous.id(), "earlier host still running");
            }
        }
    }

    /// Collect the launched host if it has exited, so it does not linger.
    fn reap_host(&self) -> Option<ExitStatus> {
        let mut host = self.host.lock().unwrap_or_else(PoisonError::into_inner);
        let child = host.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(session = self.id, pid = child.id(), %status, "host exited");
                Some(status)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(session = self.id, %err, "could not poll the launched host");
                None
            }
        }
    }

    fn take_shutdown_handle(&self) -> Option<TcpStream> {
        self.shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn close(&self) {
        self.reap_host();
        let handle = self.take_shutdown_handle();
        let mut conn = match self.conn.try_lock() {
            Ok(conn) => conn,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                // Unblock the request holding the connection, then wait for it.
                if let Some(stream) = &handle {
                    let _ = stream.shutdown(Shutdown::Both);
                }
                self.conn.lock().unwrap_or_else(PoisonError::into_inner)
            }
        };
        if conn.state == SessionState::Closed {
            return;
        }
        conn.state = SessionState::Draining;
        if let Some(link) = conn.link.take() {
            link.finish();
        }
        if let Some(stream) = handle {
            let _ = stream.shutdown(Shutdown::Both);
        }
        conn.protocol_version = None;
        conn.state = SessionState::Closed;
        info!(session = self.id, "session closed");
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.close();
    }
}

/// Closes a session from any thread.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    inner: Weak<Inner>,
}

impl CloseHandle {
    /// Close the session if it still exists. Returns whether it did.
    pub fn close(&self) -> bool {
        match self.inner.upgrade() {
            Some(inner) => {
                inner.close();
                true
            }
            None => false,
        }
    }
}

/// Decoded reply values of one command, consumed in order.
#[derive(Debug)]
pub struct Reply {
    command: &'static str,
    values: std::vec::IntoIter<Value>,
}

impl Reply {
    fn new(command: &'static str, values: Vec<Value>) -> Self {
        Self {
            command,
            values: values.into_iter(),
        }
    }

    fn next(&mut self, expected: &str) -> LinkResult<Value> {
        self.values.next().ok_or_else(|| {
            LinkError::framing(format!("{} reply is missing a {expected}", self.command))
        })
    }

    fn mismatch(&self, expected: &str, got: &Value) -> LinkError {
        LinkError::framing(format!(
            "{} reply holds {:?} where a {expected} was expected",
            self.command,
            got.kind()
        ))
    }

    pub fn int(&mut self) -> LinkResult<i32> {
        match self.next("int")? {
            Value::Int(v) => Ok(v),
            other => Err(self.mismatch("int", &other)),
        }
    }

    pub fn float(&mut self) -> LinkResult<f64> {
        match self.next("float")? {
            Value::Float(v) => Ok(v),
            other => Err(self.mismatch("float", &other)),
        }
    }

    pub fn string(&mut self) -> LinkResult<String> {
        match self.next("string")? {
            Value::Str(v) => Ok(v),
            other => Err(self.mismatch("string", &other)),
        }
    }

    pub fn item_id(&mut self) -> LinkResult<i32> {
        match self.next("item")? {
            Value::Item(v) => Ok(v),
            other => Err(self.mismatch("item", &other)),
        }
    }

    pub fn item_ids(&mut self) -> LinkResult<Vec<i32>> {
        match self.next("item list")? {
            Value::ItemList(v) => Ok(v),
            other => Err(self.mismatch("item list", &other)),
        }
    }

    pub fn matrix(&mut self) -> LinkResult<Matrix> {
        match self.next("matrix")? {
            Value::Matrix(v) => Ok(v),
            other => Err(self.mismatch("matrix", &other)),
        }
    }

    pub fn joints(&mut self) -> LinkResult<Joints> {
        match self.next("joint vector")? {
            Value::Joints(v) => Ok(v),
            other => Err(self.mismatch("joint vector", &other)),
        }
    }

    pub fn pose(&mut self) -> LinkResult<Pose> {
        match self.next("pose")? {
            Value::Pose(v) => Ok(v),
            other => Err(self.mismatch("pose", &other)),
        }
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values.collect()
    }
}

/// Process-wide session, opened on first use from
/// [`SessionConfig::from_env`].
///
/// Convenient for short scripts. Threads sharing it serialize their
/// requests and observe each other's run mode and station changes, so
/// worker threads should open their own [`Session`] instead.
pub fn default_session() -> LinkResult<Session> {
    let mut slot = DEFAULT_SESSION
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if let Some(session) = slot.as_ref().filter(|session| session.is_open()) {
        return Ok(session.clone());
    }
    let session = Session::open(SessionConfig::from_env()?)?;
    *slot = Some(session.clone());
    Ok(session)
}
