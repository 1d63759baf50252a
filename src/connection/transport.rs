//! Raw transports (plain TCP, TLS over TCP, or a custom stream)

use rustls::ClientConfig;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

/// Byte stream produced by a custom transport factory.
///
/// Addressing defaults to "unsupported" and the stream is assumed not to
/// sit on a TCP socket; override the accessors when it does.
pub trait CustomStream: AsyncRead + AsyncWrite + Send + Unpin {
    /// Remote address, if the stream has one
    fn peer_addr(&self) -> io::Result<SocketAddr> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "custom stream has no peer address",
        ))
    }

    /// Local address, if the stream has one
    fn local_addr(&self) -> io::Result<SocketAddr> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "custom stream has no local address",
        ))
    }

    /// Underlying TCP socket, used to apply socket options
    fn tcp_stream(&self) -> Option<&TcpStream> {
        None
    }

    /// Apply TCP_NODELAY. Returns `Ok(false)` when there is no socket to
    /// configure.
    fn set_nodelay(&self, nodelay: bool) -> io::Result<bool> {
        match self.tcp_stream() {
            Some(stream) => stream.set_nodelay(nodelay).map(|_| true),
            None => Ok(false),
        }
    }
}

/// In-memory pipes, mostly useful as test doubles
impl CustomStream for DuplexStream {}

/// Raw transport to one host
#[allow(clippy::large_enum_variant)]
pub enum Transport {
    /// Plain TCP socket
    Tcp(TcpStream),
    /// TLS-encrypted TCP socket
    Tls(TlsStream<TcpStream>),
    /// Stream produced by a custom transport factory
    Custom(Box<dyn CustomStream>),
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Tcp(_) => f.write_str("Transport::Tcp(TcpStream)"),
            Transport::Tls(_) => f.write_str("Transport::Tls(TlsStream)"),
            Transport::Custom(_) => f.write_str("Transport::Custom(..)"),
        }
    }
}

impl Transport {
    /// Connect via plain TCP, giving up after `timeout` (zero = no limit)
    pub async fn connect_tcp(address: &str, timeout: Duration) -> io::Result<Self> {
        let stream = with_timeout(address, timeout, TcpStream::connect(address)).await?;
        Ok(Transport::Tcp(stream))
    }

    /// Connect via TLS-encrypted TCP.
    ///
    /// `timeout` bounds the TCP connect and the handshake together.
    pub async fn connect_tls(
        address: &str,
        timeout: Duration,
        client_config: Arc<ClientConfig>,
    ) -> io::Result<Self> {
        let server_name = super::tls::server_name_for(address)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        let connector = tokio_rustls::TlsConnector::from(client_config);

        let handshake = async {
            let tcp_stream = TcpStream::connect(address).await?;
            connector.connect(server_name, tcp_stream).await
        };
        let tls_stream = with_timeout(address, timeout, handshake).await?;
        Ok(Transport::Tls(tls_stream))
    }

    /// Wrap a custom stream
    pub fn custom(stream: impl CustomStream + 'static) -> Self {
        Transport::Custom(Box::new(stream))
    }

    /// TCP socket backing this transport, if any
    pub fn tcp_stream(&self) -> Option<&TcpStream> {
        match self {
            Transport::Tcp(stream) => Some(stream),
            Transport::Tls(stream) => Some(stream.get_ref().0),
            Transport::Custom(stream) => stream.tcp_stream(),
        }
    }

    /// Enable or disable Nagle's algorithm.
    ///
    /// Returns `Ok(false)` without doing anything when no TCP socket backs the
    /// transport.
    pub fn set_nodelay(&self, nodelay: bool) -> io::Result<bool> {
        match self {
            Transport::Tcp(stream) => stream.set_nodelay(nodelay).map(|_| true),
            Transport::Tls(stream) => stream.get_ref().0.set_nodelay(nodelay).map(|_| true),
            Transport::Custom(stream) => stream.set_nodelay(nodelay),
        }
    }

    /// Remote address
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Transport::Tcp(stream) => stream.peer_addr(),
            Transport::Tls(stream) => stream.get_ref().0.peer_addr(),
            Transport::Custom(stream) => stream.peer_addr(),
        }
    }

    /// Local address
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Transport::Tcp(stream) => stream.local_addr(),
            Transport::Tls(stream) => stream.get_ref().0.local_addr(),
            Transport::Custom(stream) => stream.local_addr(),
        }
    }
}

async fn with_timeout<T, F>(address: &str, timeout: Duration, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    if timeout.is_zero() {
        return fut.await;
    }
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("dial tcp {}: i/o timeout", address),
        )),
    }
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            Transport::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
            Transport::Custom(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            Transport::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
            Transport::Custom(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            Transport::Tls(stream) => Pin::new(stream).poll_flush(cx),
            Transport::Custom(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            Transport::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
            Transport::Custom(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
