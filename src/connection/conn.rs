//! Wrapped connection with full-read/full-write semantics

use super::logger::{tracing_logger, Logf};
use super::transport::Transport;
use crate::metrics::labels::{OP_READ, OP_WRITE};
use crate::{Error, Result};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::time::Instant;

/// Upper bound on a graceful shutdown (TLS close_notify) during close
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection to one host, owned by a single request/response driver.
///
/// * `read` fills the whole buffer or fails
/// * `write` sends the whole buffer or fails
/// * any I/O failure closes the connection and yields [`Error::BadConn`]
/// * `close` is idempotent
///
/// Read and write deadlines are only re-armed once a quarter of the
/// configured timeout has passed since the last refresh.
pub struct Connection {
    transport: Option<BufReader<Transport>>,
    logger: Logf,
    ident: usize,
    peer_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
    read_timeout: Duration,
    write_timeout: Duration,
    last_read_refresh: Option<Instant>,
    last_write_refresh: Option<Instant>,
    read_deadline: Option<Instant>,
    write_deadline: Option<Instant>,
}

impl Connection {
    /// Wrap a transport. Timeouts default to zero (no deadlines).
    pub fn new(transport: Transport, ident: usize) -> Self {
        let peer_addr = transport.peer_addr().ok();
        let local_addr = transport.local_addr().ok();
        Self {
            transport: Some(BufReader::new(transport)),
            logger: tracing_logger(),
            ident,
            peer_addr,
            local_addr,
            read_timeout: Duration::ZERO,
            write_timeout: Duration::ZERO,
            last_read_refresh: None,
            last_write_refresh: None,
            read_deadline: None,
            write_deadline: None,
        }
    }

    /// Set the read and write timeouts
    pub fn with_timeouts(mut self, read_timeout: Duration, write_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self.write_timeout = write_timeout;
        self
    }

    /// Set the logging callback
    pub fn with_logger(mut self, logger: Logf) -> Self {
        self.logger = logger;
        self
    }

    /// Identity of the dial call that produced this connection
    pub fn ident(&self) -> usize {
        self.ident
    }

    /// Whether the connection has been closed
    pub fn is_closed(&self) -> bool {
        self.transport.is_none()
    }

    /// Remote address, captured when the connection was established
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Local address, captured when the connection was established
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Current read deadline
    pub fn read_deadline(&self) -> Option<Instant> {
        self.read_deadline
    }

    /// Current write deadline
    pub fn write_deadline(&self) -> Option<Instant> {
        self.write_deadline
    }

    /// Override the read deadline until the next amortized refresh
    pub fn set_read_deadline(&mut self, deadline: Option<Instant>) {
        self.read_deadline = deadline;
    }

    /// Override the write deadline until the next amortized refresh
    pub fn set_write_deadline(&mut self, deadline: Option<Instant>) {
        self.write_deadline = deadline;
    }

    /// Read exactly `buf.len()` bytes.
    ///
    /// Returns `buf.len()` on success. There are no short reads.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        refresh_deadline(
            self.read_timeout,
            &mut self.last_read_refresh,
            &mut self.read_deadline,
        );
        let deadline = self.read_deadline;
        let Some(stream) = self.transport.as_mut() else {
            return Err(Error::BadConn { transferred: 0 });
        };

        let mut total = 0;
        while total < buf.len() {
            let result = with_deadline(deadline, stream.read(&mut buf[total..])).await;
            match result {
                Ok(0) => {
                    let err = io::Error::from(io::ErrorKind::UnexpectedEof);
                    return Err(self.fail(OP_READ, total, err));
                }
                Ok(n) => total += n,
                Err(err) => return Err(self.fail(OP_READ, total, err)),
            }
        }
        Ok(total)
    }

    /// Write all of `buf` and flush it to the transport.
    ///
    /// Returns `buf.len()` on success, not the byte count of the last
    /// underlying write; a short write is never reported as success.
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        refresh_deadline(
            self.write_timeout,
            &mut self.last_write_refresh,
            &mut self.write_deadline,
        );
        let deadline = self.write_deadline;
        let Some(stream) = self.transport.as_mut() else {
            return Err(Error::BadConn { transferred: 0 });
        };

        let mut total = 0;
        while total < buf.len() {
            let result = with_deadline(deadline, stream.write(&buf[total..])).await;
            match result {
                Ok(0) => {
                    let err = io::Error::from(io::ErrorKind::WriteZero);
                    return Err(self.fail(OP_WRITE, total, err));
                }
                Ok(n) => total += n,
                Err(err) => return Err(self.fail(OP_WRITE, total, err)),
            }
        }
        if let Err(err) = with_deadline(deadline, stream.flush()).await {
            return Err(self.fail(OP_WRITE, total, err));
        }
        Ok(total)
    }

    /// Close the connection.
    ///
    /// The first call shuts the transport down gracefully; later calls do
    /// nothing. After a failed read or write the transport has already been
    /// dropped and this is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut stream) = self.transport.take() else {
            return Ok(());
        };
        match tokio::time::timeout(CLOSE_TIMEOUT, stream.shutdown()).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "shutdown timed out",
            ))),
        }
    }

    /// Drop the transport without a graceful shutdown
    fn fail(&mut self, op: &'static str, transferred: usize, err: io::Error) -> Error {
        (self.logger)(format_args!("[connect] {} error: {}", op, err));
        tracing::debug!(ident = self.ident, op, transferred, error = %err, "connection unusable");
        crate::metrics::counters::bad_conn(op);
        self.transport = None;
        Error::BadConn { transferred }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("ident", &self.ident)
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}

/// Re-arm `deadline` when more than a quarter of `timeout` has passed since
/// the last refresh. A zero timeout leaves the deadline alone.
fn refresh_deadline(
    timeout: Duration,
    last_refresh: &mut Option<Instant>,
    deadline: &mut Option<Instant>,
) {
    if timeout.is_zero() {
        return;
    }
    let now = Instant::now();
    let stale = match *last_refresh {
        Some(at) => now.duration_since(at) > timeout / 4,
        None => true,
    };
    if stale {
        *deadline = Some(now + timeout);
        *last_refresh = Some(now);
    }
}

async fn with_deadline<T, F>(deadline: Option<Instant>, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut)
            .await
            .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::TimedOut, "i/o timeout"))),
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::logger::capture::capturing_logger;
    use crate::connection::transport::CustomStream;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
    use tokio_test::io::{Builder, Mock};

    impl CustomStream for Mock {}

    fn reset() -> io::Error {
        io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer")
    }

    /// Duplex stream counting shutdown calls
    struct CountingStream {
        inner: DuplexStream,
        shutdowns: Arc<AtomicUsize>,
    }

    impl AsyncRead for CountingStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for CountingStream {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Pin::new(&mut self.inner).poll_write(cx, buf)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_shutdown(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<io::Result<()>> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    impl CustomStream for CountingStream {}

    #[tokio::test]
    async fn test_read_accumulates_chunks() {
        let mock = Builder::new()
            .read(&[1u8; 40])
            .read(&[2u8; 40])
            .read(&[3u8; 20])
            .build();
        let mut conn = Connection::new(Transport::custom(mock), 1);

        let mut buf = [0u8; 100];
        assert_eq!(conn.read(&mut buf).await.unwrap(), 100);
        assert_eq!(&buf[..40], &[1u8; 40][..]);
        assert_eq!(&buf[40..80], &[2u8; 40][..]);
        assert_eq!(&buf[80..], &[3u8; 20][..]);
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn test_small_reads_are_buffered() {
        let mock = Builder::new().read(b"abcdef").build();
        let mut conn = Connection::new(Transport::custom(mock), 1);

        let mut first = [0u8; 2];
        let mut second = [0u8; 4];
        conn.read(&mut first).await.unwrap();
        conn.read(&mut second).await.unwrap();
        assert_eq!(&first, b"ab");
        assert_eq!(&second, b"cdef");
    }

    #[tokio::test]
    async fn test_read_error_after_partial_data() {
        let mock = Builder::new().read(&[7u8; 60]).read_error(reset()).build();
        let (logger, lines) = capturing_logger();
        let mut conn = Connection::new(Transport::custom(mock), 1).with_logger(logger);

        let mut buf = [0u8; 100];
        let err = conn.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, Error::BadConn { transferred: 60 }));
        assert!(conn.is_closed());

        // The transport is gone: no further I/O reaches it
        let err = conn.write(b"more").await.unwrap_err();
        assert!(matches!(err, Error::BadConn { transferred: 0 }));

        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("[connect] read error:"));
    }

    #[tokio::test]
    async fn test_read_eof_is_bad_conn() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);
        let mut conn = Connection::new(Transport::custom(client), 1);

        let mut buf = [0u8; 4];
        let err = conn.read(&mut buf).await.unwrap_err();
        assert!(err.is_bad_conn());
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_write_sends_everything() {
        let mock = Builder::new().write(b"hello ").write(b"world").build();
        let mut conn = Connection::new(Transport::custom(mock), 1);

        assert_eq!(conn.write(b"hello ").await.unwrap(), 6);
        assert_eq!(conn.write(b"world").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_write_error_closes() {
        let mock = Builder::new().write(b"abc").write_error(reset()).build();
        let (logger, lines) = capturing_logger();
        let mut conn = Connection::new(Transport::custom(mock), 1).with_logger(logger);

        let err = conn.write(b"abcdef").await.unwrap_err();
        assert!(matches!(err, Error::BadConn { transferred: 3 }));
        assert!(conn.is_closed());
        assert!(lines.lock().unwrap()[0].starts_with("[connect] write error:"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (client, _server) = tokio::io::duplex(64);
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let stream = CountingStream {
            inner: client,
            shutdowns: shutdowns.clone(),
        };
        let mut conn = Connection::new(Transport::custom(stream), 1);

        assert!(conn.close().await.is_ok());
        assert!(conn.close().await.is_ok());
        assert!(conn.is_closed());
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_drops_transport_without_shutdown() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let stream = CountingStream {
            inner: client,
            shutdowns: shutdowns.clone(),
        };
        let mut conn = Connection::new(Transport::custom(stream), 1);

        let mut buf = [0u8; 1];
        assert!(conn.read(&mut buf).await.is_err());
        assert!(conn.close().await.is_ok());
        assert_eq!(shutdowns.load(Ordering::SeqCst), 0);
    }

    /// Stream on which every operation, shutdown included, stays pending
    struct StuckStream;

    impl AsyncRead for StuckStream {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    impl AsyncWrite for StuckStream {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Pending
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Pending
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    impl CustomStream for StuckStream {}

    #[tokio::test(start_paused = true)]
    async fn test_write_timeout_fails_within_deadline() {
        let mut conn = Connection::new(Transport::custom(StuckStream), 1)
            .with_timeouts(Duration::ZERO, Duration::from_secs(1));

        let start = Instant::now();
        let err = conn.write(b"stuck").await.unwrap_err();
        assert!(matches!(err, Error::BadConn { transferred: 0 }));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(2));
        assert!(conn.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout_fails_within_deadline() {
        let mut conn = Connection::new(Transport::custom(StuckStream), 1)
            .with_timeouts(Duration::from_secs(2), Duration::ZERO);

        let start = Instant::now();
        let mut buf = [0u8; 4];
        assert!(conn.read(&mut buf).await.unwrap_err().is_bad_conn());
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_deadline_refresh_is_amortized() {
        let mock = Builder::new().read(b"ab").read(b"cd").read(b"ef").build();
        let mut conn = Connection::new(Transport::custom(mock), 1)
            .with_timeouts(Duration::from_secs(4), Duration::ZERO);
        let mut buf = [0u8; 2];

        let start = Instant::now();
        conn.read(&mut buf).await.unwrap();
        assert_eq!(conn.read_deadline(), Some(start + Duration::from_secs(4)));

        // Within a quarter of the timeout: deadline kept
        tokio::time::advance(Duration::from_millis(500)).await;
        conn.read(&mut buf).await.unwrap();
        assert_eq!(conn.read_deadline(), Some(start + Duration::from_secs(4)));

        // Past a quarter: deadline re-armed
        tokio::time::advance(Duration::from_millis(600)).await;
        let refreshed_at = Instant::now();
        conn.read(&mut buf).await.unwrap();
        assert_eq!(
            conn.read_deadline(),
            Some(refreshed_at + Duration::from_secs(4))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_deadline_refresh_is_amortized() {
        let mock = Builder::new().write(b"a").write(b"b").write(b"c").build();
        let mut conn = Connection::new(Transport::custom(mock), 1)
            .with_timeouts(Duration::ZERO, Duration::from_secs(8));

        let start = Instant::now();
        conn.write(b"a").await.unwrap();
        assert_eq!(conn.write_deadline(), Some(start + Duration::from_secs(8)));

        // Exactly a quarter is not enough
        tokio::time::advance(Duration::from_secs(2)).await;
        conn.write(b"b").await.unwrap();
        assert_eq!(conn.write_deadline(), Some(start + Duration::from_secs(8)));

        tokio::time::advance(Duration::from_millis(1)).await;
        let refreshed_at = Instant::now();
        conn.write(b"c").await.unwrap();
        assert_eq!(
            conn.write_deadline(),
            Some(refreshed_at + Duration::from_secs(8))
        );
        assert_eq!(conn.read_deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout_is_bad_conn() {
        let (client, _server) = tokio::io::duplex(64);
        let mut conn = Connection::new(Transport::custom(client), 1)
            .with_timeouts(Duration::from_secs(1), Duration::ZERO);

        let mut buf = [0u8; 8];
        let err = conn.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, Error::BadConn { transferred: 0 }));
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_zero_timeout_sets_no_deadline() {
        let mock = Builder::new().read(b"x").build();
        let mut conn = Connection::new(Transport::custom(mock), 1);
        let mut buf = [0u8; 1];
        conn.read(&mut buf).await.unwrap();
        assert_eq!(conn.read_deadline(), None);
    }

    #[tokio::test]
    async fn test_empty_read_and_write() {
        let (client, _server) = tokio::io::duplex(64);
        let mut conn = Connection::new(Transport::custom(client), 3);
        assert_eq!(conn.read(&mut []).await.unwrap(), 0);
        assert_eq!(conn.write(&[]).await.unwrap(), 0);
        assert_eq!(conn.ident(), 3);
    }

    #[test]
    fn test_connection_is_send() {
        fn require_send<T: Send>() {}
        require_send::<Connection>();
    }
}
