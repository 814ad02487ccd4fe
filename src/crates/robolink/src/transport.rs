use std::io::{self, BufReader, BufWriter, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::command::Command;
use crate::error::{LinkError, LinkResult};
use crate::wire::{self, Value};

/// Token exchanged at the start of every connection.
pub const HANDSHAKE_TOKEN: &str = "RDK_API";

/// One open TCP connection to the host.
pub(crate) struct Link {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    timeout: Duration,
    debug: bool,
}

impl Link {
    /// Connect to `address`, trying every resolved socket address in turn.
    pub(crate) fn connect(address: &str, timeout: Duration, debug: bool) -> io::Result<Self> {
        let mut last_error = None;
        for addr in address.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Self::from_stream(stream, timeout, debug),
                Err(err) => last_error = Some(err),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{address} did not resolve to any address"),
            )
        }))
    }

    fn from_stream(stream: TcpStream, timeout: Duration, debug: bool) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream.try_clone()?);
        Ok(Self {
            stream,
            reader,
            writer,
            timeout,
            debug,
        })
    }

    /// A second handle on the socket that can shut it down from elsewhere.
    pub(crate) fn shutdown_handle(&self) -> io::Result<TcpStream> {
        self.stream.try_clone()
    }

    pub(crate) fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.stream.set_read_timeout(Some(timeout))?;
        self.stream.set_write_timeout(Some(timeout))?;
        self.timeout = timeout;
        Ok(())
    }

    /// Flush anything still buffered and shut the socket down.
    pub(crate) fn finish(mut self) {
        if let Err(err) = self.writer.flush() {
            debug!(%err, "flush on close failed");
        }
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }

    /// Send the version token and read the host's answer.
    pub(crate) fn handshake(&mut self, client_version: i32) -> LinkResult<i32> {
        let timeout = self.timeout;
        wire::write_line(&mut self.writer, HANDSHAKE_TOKEN).map_err(|e| io_error(e, timeout))?;
        wire::write_int(&mut self.writer, client_version).map_err(|e| io_error(e, timeout))?;
        self.writer.flush().map_err(|e| io_error(e, timeout))?;

        let token = wire::read_line(&mut self.reader)
            .map_err(|e| io_error(e, timeout))?
            .ok_or_else(|| LinkError::framing("host closed the connection during handshake"))?;
        if token != HANDSHAKE_TOKEN {
            return Err(LinkError::framing(format!(
                "unexpected handshake token {token:?}"
            )));
        }
        wire::read_int(&mut self.reader).map_err(|e| io_error(e, timeout))
    }

    /// Write one request and read its reply and status.
    ///
    /// The whole reply must arrive within the timeout of the link, counted
    /// from when the request is sent. Blocking commands wait without limit.
    pub(crate) fn exchange(&mut self, command: &Command, args: &[Value]) -> LinkResult<Vec<Value>> {
        let timeout = self.timeout;
        let sent = command.request_len(args);
        self.write_request(command, args)
            .map_err(|e| io_error(e, timeout))?;

        let reply = if command.blocking {
            self.stream.set_read_timeout(None)?;
            read_reply(&mut self.reader, command)
        } else {
            let mut reader = Deadline {
                reader: &mut self.reader,
                stream: &self.stream,
                until: Instant::now() + timeout,
            };
            read_reply(&mut reader, command)
        };
        self.stream.set_read_timeout(Some(timeout))?;

        let (values, status) = reply.map_err(|e| io_error(e, timeout))?;
        let received = values.iter().map(Value::encoded_len).sum::<usize>() + 4;
        if self.debug {
            debug!(command = command.name, sent, received, status = ?status, "exchange");
        } else {
            trace!(command = command.name, sent, received, status = ?status, "exchange");
        }

        match status {
            None => Ok(values),
            Some((code, message)) => Err(LinkError::from_status(code, message)),
        }
    }

    fn write_request(&mut self, command: &Command, args: &[Value]) -> io::Result<()> {
        wire::write_line(&mut self.writer, command.name)?;
        for value in args {
            wire::write_value(&mut self.writer, value)?;
        }
        self.writer.flush()
    }
}

#[allow(clippy::type_complexity)]
fn read_reply<R: Read>(
    reader: &mut R,
    command: &Command,
) -> io::Result<(Vec<Value>, Option<(i32, String)>)> {
    let mut values = Vec::with_capacity(command.reply.len());
    for kind in command.reply {
        values.push(wire::read_value(reader, *kind)?);
    }
    let code = wire::read_int(reader)?;
    if code == 0 {
        return Ok((values, None));
    }
    let message = wire::read_str(reader)?;
    Ok((values, Some((code, message))))
}

/// Reads from the session socket until a fixed instant.
///
/// Each read that has to wait on the socket gets only the time left, so a
/// host trickling bytes cannot stretch a reply past the deadline.
struct Deadline<'a> {
    reader: &'a mut BufReader<TcpStream>,
    stream: &'a TcpStream,
    until: Instant,
}

impl Read for Deadline<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.reader.buffer().is_empty() {
            let remaining = self.until.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(io::ErrorKind::TimedOut.into());
            }
            self.stream.set_read_timeout(Some(remaining))?;
        }
        self.reader.read(buf)
    }
}

/// Classify an I/O failure on the session socket.
fn io_error(err: io::Error, timeout: Duration) -> LinkError {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => LinkError::Timeout(timeout),
        io::ErrorKind::InvalidData => LinkError::Framing(err.to_string()),
        _ => LinkError::Io(err),
    }
}
