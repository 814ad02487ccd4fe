use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result alias for every operation that talks to the host.
pub type LinkResult<T> = Result<T, LinkError>;

/// Errors raised while opening, driving or closing a host session.
///
/// Transport-class variants are fatal: the session that produced them is
/// already closed when the caller sees them. Host, invalid-item and type
/// errors leave the session usable.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to launch host: {0}")]
    Launch(String),
    #[error("host did not accept connections within {0:?}")]
    StartupTimeout(Duration),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("framing error: {0}")]
    Framing(String),
    #[error("session is closed")]
    Closed,
    #[error("host speaks protocol version {found}, supported range is {min}..={max}")]
    ProtocolVersion { found: i32, min: i32, max: i32 },
    #[error("host error {code}: {message}")]
    Host { code: i32, message: String },
    #[error("invalid item: {0}")]
    InvalidItem(String),
    #[error("item belongs to a different session")]
    CrossSession,
    #[error("type error: {0}")]
    Type(String),
    #[error("config error: {0}")]
    Config(String),
}

impl LinkError {
    /// True when the error tore the session down.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LinkError::Connect { .. }
                | LinkError::Launch(_)
                | LinkError::StartupTimeout(_)
                | LinkError::Timeout(_)
                | LinkError::Io(_)
                | LinkError::Framing(_)
                | LinkError::Closed
                | LinkError::ProtocolVersion { .. }
        )
    }

    /// True for the distinguished "host no longer knows this id" failure.
    pub fn is_invalid_item(&self) -> bool {
        matches!(self, LinkError::InvalidItem(_))
    }

    pub(crate) fn framing(message: impl Into<String>) -> Self {
        LinkError::Framing(message.into())
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        LinkError::Type(message.into())
    }

    pub(crate) fn launch(message: impl Into<String>) -> Self {
        LinkError::Launch(message.into())
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        LinkError::Config(message.into())
    }

    /// Map a non-zero status word and its message to the matching variant.
    pub(crate) fn from_status(code: i32, message: String) -> Self {
        if (1..=9).contains(&code) {
            LinkError::InvalidItem(message)
        } else {
            LinkError::Host { code, message }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_split_invalid_item_from_host_errors() {
        assert!(LinkError::from_status(1, "gone".into()).is_invalid_item());
        assert!(LinkError::from_status(9, "gone".into()).is_invalid_item());
        let host = LinkError::from_status(10, "unreachable".into());
        assert!(matches!(host, LinkError::Host { code: 10, .. }));
        assert!(!host.is_fatal());
        assert_eq!(host.to_string(), "host error 10: unreachable");
    }

    #[test]
    fn transport_errors_are_fatal() {
        assert!(LinkError::Timeout(Duration::from_secs(1)).is_fatal());
        assert!(LinkError::framing("bad length").is_fatal());
        assert!(LinkError::Closed.is_fatal());
        assert!(!LinkError::CrossSession.is_fatal());
        assert!(!LinkError::type_error("not 4x4").is_fatal());
    }
}
