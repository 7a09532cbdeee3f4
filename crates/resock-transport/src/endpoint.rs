use std::fmt;
#[cfg(unix)]
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::TransportError;

/// Host used when an endpoint only names a port.
pub const DEFAULT_HOST: &str = "localhost";

const UNIX_PREFIX: &str = "unix:";

/// Target address of a stream connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// TCP `host:port`.
    Tcp { host: String, port: u16 },
    /// Filesystem-path Unix domain socket.
    #[cfg(unix)]
    Unix(PathBuf),
}

impl Endpoint {
    /// TCP endpoint.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// TCP endpoint on [`DEFAULT_HOST`].
    pub fn local(port: u16) -> Self {
        Self::tcp(DEFAULT_HOST, port)
    }

    /// Unix domain socket endpoint.
    #[cfg(unix)]
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::Unix(path.into())
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self {
            Self::Tcp { .. } => "tcp",
            #[cfg(unix)]
            Self::Unix(_) => "unix-domain-socket",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            Self::Tcp { host, port } => write!(f, "{host}:{port}"),
            #[cfg(unix)]
            Self::Unix(path) => write!(f, "{UNIX_PREFIX}{}", path.display()),
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    /// Accepts `host:port`, `[v6-addr]:port`, a bare `port`, or `unix:/path`.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let invalid = |reason| TransportError::InvalidEndpoint {
            input: input.to_string(),
            reason,
        };

        if trimmed.is_empty() {
            return Err(invalid("endpoint must not be empty"));
        }

        if let Some(path) = trimmed.strip_prefix(UNIX_PREFIX) {
            #[cfg(unix)]
            {
                if path.is_empty() {
                    return Err(invalid("unix socket path must not be empty"));
                }
                return Ok(Self::Unix(PathBuf::from(path)));
            }
            #[cfg(not(unix))]
            {
                let _ = path;
                return Err(invalid("unix sockets are not supported on this platform"));
            }
        }

        let (host, port) = match trimmed.rsplit_once(':') {
            Some((host, port)) => (host, port),
            None => (DEFAULT_HOST, trimmed),
        };

        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(invalid("host must not be empty"));
        }

        if port.is_empty() {
            return Err(invalid("port is required"));
        }
        let port: u16 = port.parse().map_err(|_| invalid("port must be 0-65535"))?;

        Ok(Self::tcp(host, port))
    }
}
