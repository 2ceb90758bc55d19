//! Socket binding for the HTTP and HTTPS listeners.
//!
//! # Responsibilities
//! - Resolve `host:port` and bind before any serving starts
//! - Surface bind failures (port in use, permission denied) to the caller
//!   so the lifecycle manager can decide whether they are fatal

use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Address could not be resolved.
    #[error("cannot resolve {address}: {source}")]
    Resolve {
        address: String,
        source: std::io::Error,
    },
    /// Failed to bind to address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },
}

impl ListenerError {
    /// Short description of the underlying cause for logs.
    pub fn cause(&self) -> &'static str {
        let source = match self {
            ListenerError::Resolve { .. } => return "unresolvable address",
            ListenerError::Bind { source, .. } => source,
        };
        match source.kind() {
            std::io::ErrorKind::AddrInUse => "port already in use",
            std::io::ErrorKind::PermissionDenied => "permission denied",
            std::io::ErrorKind::AddrNotAvailable => "address not available",
            _ => "bind error",
        }
    }
}

/// A bound, non-blocking listener ready to hand to the server.
#[derive(Debug)]
pub struct BoundListener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl BoundListener {
    /// Bind to `host:port`, trying each resolved address in turn.
    pub fn bind(address: &str) -> Result<Self, ListenerError> {
        let addrs: Vec<SocketAddr> = address
            .to_socket_addrs()
            .map_err(|source| ListenerError::Resolve {
                address: address.to_string(),
                source,
            })?
            .collect();

        let mut last_err = std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "no addresses resolved");
        for addr in addrs {
            match TcpListener::bind(addr) {
                Ok(listener) => return Self::from_std(listener, address),
                Err(e) => last_err = e,
            }
        }

        Err(ListenerError::Bind {
            address: address.to_string(),
            source: last_err,
        })
    }

    /// Adopt an already bound std listener.
    pub fn from_std(listener: TcpListener, address: &str) -> Result<Self, ListenerError> {
        let bind_err = |source| ListenerError::Bind {
            address: address.to_string(),
            source,
        };
        listener.set_nonblocking(true).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        tracing::debug!(address = %local_addr, "Listener bound");

        Ok(Self {
            inner: listener,
            local_addr,
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn into_std(self) -> TcpListener {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_ephemeral_port() {
        let listener = BoundListener::bind("127.0.0.1:0").unwrap();
        assert_ne!(listener.local_addr().port(), 0);
    }

    #[test]
    fn port_in_use_is_reported() {
        let first = BoundListener::bind("127.0.0.1:0").unwrap();
        let taken = format!("127.0.0.1:{}", first.local_addr().port());

        let err = BoundListener::bind(&taken).unwrap_err();
        assert!(matches!(err, ListenerError::Bind { .. }));
        assert_eq!(err.cause(), "port already in use");
    }
}
