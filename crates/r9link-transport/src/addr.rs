use std::net::{SocketAddr, ToSocketAddrs};

use crate::error::{Result, TransportError};

/// Resolve a host and port into the first matching socket address.
///
/// IP literals resolve without touching DNS.
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let target = format!("{host}:{port}");
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            addr: target.clone(),
            source,
        })?;
    addrs.next().ok_or_else(|| TransportError::Resolve {
        addr: target,
        source: std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no addresses returned for host",
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_ip_literal() {
        let addr = resolve("127.0.0.1", 12600).unwrap();
        assert_eq!(addr, "127.0.0.1:12600".parse().unwrap());
    }

    #[test]
    fn rejects_garbage_host() {
        let result = resolve("not a host name", 1);
        assert!(matches!(result, Err(TransportError::Resolve { .. })));
    }
}
