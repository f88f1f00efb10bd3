//! Connection to the host's worker factory.
//!
//! - Unix: Unix Domain Socket, trusted without a handshake
//! - Any platform: TCP on 127.0.0.1, authenticated with the shared secret
//!
//! # Example
//!
//! ```ignore
//! use datasource_worker::config::ConnectionInfo;
//! use datasource_worker::transport::connect_and_auth;
//!
//! let stream = connect_and_auth(&ConnectionInfo::Port(4000), Some("secret"), timeout).await?;
//! ```

use std::net::Ipv4Addr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tracing::{debug, info};

use crate::config::ConnectionInfo;
use crate::error::{Result, WorkerError};
use crate::protocol::{ProtocolReader, ProtocolWriter};

/// Reply the host sends when the secret is accepted.
pub const AUTH_OK: &str = "ok";

/// Connected stream to the host.
pub enum HostStream {
    /// Unix domain socket.
    #[cfg(unix)]
    Unix(UnixStream),
    /// Loopback TCP.
    Tcp(TcpStream),
}

/// Connect to the host and authenticate TCP connections.
///
/// Connect plus handshake must complete within `timeout`.
pub async fn connect_and_auth(
    info: &ConnectionInfo,
    secret: Option<&str>,
    timeout: Duration,
) -> Result<HostStream> {
    tokio::time::timeout(timeout, connect_inner(info, secret))
        .await
        .map_err(|_| {
            WorkerError::Auth(format!(
                "timed out after {}s connecting to host",
                timeout.as_secs()
            ))
        })?
}

async fn connect_inner(info: &ConnectionInfo, secret: Option<&str>) -> Result<HostStream> {
    match info {
        #[cfg(unix)]
        ConnectionInfo::Socket(path) => {
            let stream = UnixStream::connect(path).await?;
            info!(path = %path.display(), "connected to host socket");
            Ok(HostStream::Unix(stream))
        }
        #[cfg(not(unix))]
        ConnectionInfo::Socket(path) => Err(WorkerError::Config(format!(
            "unix sockets are not supported on this platform: {}",
            path.display()
        ))),
        ConnectionInfo::Port(port) => {
            let secret = secret.ok_or_else(|| {
                WorkerError::Auth("no secret configured for TCP connection".to_string())
            })?;
            let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, *port)).await?;
            stream.set_nodelay(true)?;
            authenticate(&mut stream, secret).await?;
            info!(port, "connected to host port");
            Ok(HostStream::Tcp(stream))
        }
    }
}

/// Send `secret` and require the host to answer [`AUTH_OK`].
pub async fn authenticate<S>(stream: &mut S, secret: &str) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    {
        let mut writer = ProtocolWriter::with_capacity(&mut *stream, secret.len() + 4);
        writer.write_str(secret)?;
        writer.flush().await?;
    }

    let reply = ProtocolReader::new(&mut *stream).read_string().await?;
    if reply != AUTH_OK {
        return Err(WorkerError::Auth(format!(
            "unexpected reply from host: {:?}",
            reply
        )));
    }
    debug!("host accepted secret");
    Ok(())
}

impl AsyncRead for HostStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            #[cfg(unix)]
            HostStream::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
            HostStream::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for HostStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            #[cfg(unix)]
            HostStream::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
            HostStream::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            #[cfg(unix)]
            HostStream::Unix(stream) => Pin::new(stream).poll_flush(cx),
            HostStream::Tcp(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            #[cfg(unix)]
            HostStream::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
            HostStream::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
