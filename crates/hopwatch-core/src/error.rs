use std::fmt::{Display, Formatter};
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// A probing engine error result.
pub type Result<T> = std::result::Result<T, Error>;

/// A probing engine error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid config: {0}")]
    BadConfig(String),
    #[error("unknown host {0}: {1}")]
    UnknownHost(String, #[source] hopwatch_dns::Error),
    #[error("operation not permitted while a trace is active")]
    TraceActive,
    #[error("DNS resolver error: {0}")]
    DnsError(#[from] hopwatch_dns::Error),
    #[error("IO error: {0}")]
    IoError(#[from] IoError),
    #[error("probe worker panicked at ttl {0}")]
    ProbePanicked(u8),
    #[error("engine error: {0}")]
    Other(String),
}

/// Custom IO error result.
pub type IoResult<T> = std::result::Result<T, IoError>;

/// Custom IO error.
#[derive(Error, Debug)]
pub enum IoError {
    #[error("Sendto error for {1}: {0}")]
    SendTo(io::Error, SocketAddr),
    #[error("Failed to {0}: {1}")]
    Other(io::Error, IoOperation),
}

impl IoError {
    /// Get the custom error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SendTo(e, _) | Self::Other(e, _) => ErrorKind::from(e),
        }
    }
}

/// Custom error kind.
///
/// This includes additional error kinds that are not part of the standard [`io::ErrorKind`].
#[derive(Debug, Eq, PartialEq)]
pub enum ErrorKind {
    HostUnreachable,
    NetUnreachable,
    Std(io::ErrorKind),
}

impl ErrorKind {
    /// Did the operation fail because a read deadline passed?
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Std(io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
        )
    }
}

/// Io operation.
#[derive(Debug)]
pub enum IoOperation {
    NewSocket,
    SetHeaderIncluded,
    SetUnicastHopsV6,
    SetReadTimeout,
    RecvFrom,
}

impl Display for IoOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NewSocket => write!(f, "create new socket"),
            Self::SetHeaderIncluded => write!(f, "set header included"),
            Self::SetUnicastHopsV6 => write!(f, "set unicast hops v6"),
            Self::SetReadTimeout => write!(f, "set read timeout"),
            Self::RecvFrom => write!(f, "recv from"),
        }
    }
}
