// Socket transport mechanics shared by the dt_socket connectors

use crate::connect::argument::Argument;
use crate::connect::error::{ConnectError, ConnectResult};
use crate::connect::transport::Transport;
use crate::connection::{handshake, JdwpConnection};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

pub(crate) const ARG_TIMEOUT: &str = "timeout";

pub(crate) fn timeout_argument() -> Argument {
    Argument::integer(
        ARG_TIMEOUT,
        "Timeout",
        "Timeout in milliseconds while waiting for the target; 0 waits forever",
        0,
        i32::MAX,
    )
}

pub(crate) fn to_timeout(millis: Option<i32>) -> Option<Duration> {
    millis
        .filter(|ms| *ms > 0)
        .map(|ms| Duration::from_millis(ms as u64))
}

/// Run `fut` under an optional deadline, reporting expiry as a socket timeout
pub(crate) async fn with_timeout<T, F>(timeout: Option<Duration>, fut: F) -> ConnectResult<T>
where
    F: Future<Output = ConnectResult<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ConnectError::Timeout {
                transport: Transport::Socket,
                timeout: limit,
            })?,
        None => fut.await,
    }
}

/// Split `host:port` or a bare `port`; a missing host is `None`
pub fn parse_address(address: &str) -> Option<(Option<&str>, u16)> {
    let address = address.trim();
    match address.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().ok()?;
            let host = host.trim_start_matches('[').trim_end_matches(']');
            Some(((!host.is_empty()).then_some(host), port))
        }
        None => Some((None, address.parse().ok()?)),
    }
}

/// Connect to a listening target and handshake
pub(crate) async fn connect_target(host: &str, port: u16) -> ConnectResult<(JdwpConnection, SocketAddr)> {
    info!("Attaching to target at {}:{}", host, port);

    let mut stream = TcpStream::connect((host, port)).await?;
    let remote = stream.peer_addr()?;
    handshake(&mut stream).await?;

    Ok((JdwpConnection::from_stream(stream), remote))
}

/// Wait for one target to connect and handshake
pub(crate) async fn accept_target(listener: &TcpListener) -> ConnectResult<(JdwpConnection, SocketAddr)> {
    let (mut stream, remote) = listener.accept().await?;
    debug!("Accepted connection from {}", remote);

    handshake(&mut stream).await?;
    info!("Target connected from {}", remote);

    Ok((JdwpConnection::from_stream(stream), remote))
}

/// Concrete `host:port` a target can be told to connect to
pub(crate) fn listen_address(listener: &TcpListener) -> ConnectResult<String> {
    Ok(listener.local_addr()?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_forms() {
        assert_eq!(parse_address("localhost:8000"), Some((Some("localhost"), 8000)));
        assert_eq!(parse_address("8000"), Some((None, 8000)));
        assert_eq!(parse_address(":8000"), Some((None, 8000)));
        assert_eq!(parse_address("[::1]:5005"), Some((Some("::1"), 5005)));
        assert_eq!(parse_address("host:99999"), None);
        assert_eq!(parse_address("host"), None);
    }

    #[test]
    fn test_zero_timeout_means_none() {
        assert_eq!(to_timeout(None), None);
        assert_eq!(to_timeout(Some(0)), None);
        assert_eq!(to_timeout(Some(1500)), Some(Duration::from_millis(1500)));
    }

    #[tokio::test]
    async fn test_elapsed_deadline_is_timeout_error() {
        let result: ConnectResult<()> = with_timeout(Some(Duration::from_millis(10)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(result.unwrap_err().is_timeout());
    }
}
