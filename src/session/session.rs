//! The mux session: one transport, many logical connections.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::SessionConfig;
use super::conn::MuxConn;
use super::ids::IdAllocator;
use super::queue::Queue;
use super::registry::ConnRegistry;
use super::{WriteQueue, pinger, reader, writer};
use crate::core::{MuxError, MuxResult, POOL_BUFFER_SIZE, Transport, TransportKind};
use crate::frame::{BufferPool, Flag, Frame};
use crate::telemetry::{Bandwidth, Gauge, LatencyCounter};

/// State shared by the session handle, its background tasks and its
/// connections.
pub(crate) struct SessionInner {
    pub(crate) config: SessionConfig,
    pub(crate) kind: TransportKind,
    local_addr: Option<SocketAddr>,
    pub(crate) registry: ConnRegistry,
    pub(crate) write_queue: WriteQueue,
    /// Inbound connections waiting for the accept-dispatch loop.
    pub(crate) accept_queue: Queue<MuxConn>,
    pub(crate) pool: BufferPool,
    ids: IdAllocator,
    closed: AtomicBool,
    pub(crate) cancel: CancellationToken,
    pub(crate) ping_misses: AtomicU32,
    /// Ping intervals since the last inbound frame.
    pub(crate) idle_ticks: AtomicU32,
    latency: Gauge,
    bandwidth: Gauge,
    accept_rx: AsyncMutex<mpsc::Receiver<MuxConn>>,
}

impl SessionInner {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Queue a frame for the writer loop.
    pub(crate) fn send(&self, frame: Frame) -> MuxResult<()> {
        if self.is_closed() {
            return Err(MuxError::SessionClosed);
        }
        let queued = if frame.flag.is_priority() {
            self.write_queue.push_priority(frame)
        } else {
            self.write_queue.push(frame)
        };
        queued.map_err(|_| MuxError::SessionClosed)
    }

    pub(crate) fn close(&self) -> MuxResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(MuxError::AlreadyClosed);
        }
        warn!(kind = %self.kind, "mux: closing session");

        self.registry.close();
        self.cancel.cancel();
        if let Ok(mut rx) = self.accept_rx.try_lock() {
            rx.close();
        }

        self.write_queue.stop();
        self.accept_queue.stop();
        let dropped = self.write_queue.drain().len();
        let staged = self.accept_queue.drain();
        for conn in &staged {
            conn.shutdown();
        }
        debug!(
            dropped_frames = dropped,
            staged_conns = staged.len(),
            "mux: session resources released"
        );
        Ok(())
    }
}

/// A multiplexing session over one physical transport.
///
/// Constructing a session spawns its background tasks on the current tokio
/// runtime. Dropping the handle closes the session.
///
/// # Example
///
/// ```no_run
/// use nomad_mux::{Session, TransportKind};
/// use tokio::net::TcpStream;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let stream = TcpStream::connect("127.0.0.1:9000").await?;
/// let session = Session::new(stream, TransportKind::Tcp);
///
/// let conn = session.open().await?;
/// conn.write(b"hello").await?;
///
/// let mut buf = [0u8; 64];
/// let n = conn.read(&mut buf).await?;
/// println!("echoed {:?}", &buf[..n]);
/// # Ok(())
/// # }
/// ```
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("kind", &self.inner.kind)
            .field("local_addr", &self.inner.local_addr)
            .field("connections", &self.inner.registry.len())
            .field("closed", &self.inner.is_closed())
            .finish()
    }
}

impl Session {
    /// Wrap an open transport with the default configuration.
    pub fn new<T: Transport>(transport: T, kind: TransportKind) -> Self {
        Self::with_config(transport, kind, SessionConfig::default())
    }

    /// Wrap an open transport.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_config<T: Transport>(
        transport: T,
        kind: TransportKind,
        config: SessionConfig,
    ) -> Self {
        let local_addr = transport.local_addr().ok();
        let (read_half, write_half) = tokio::io::split(transport);

        let (accept_tx, accept_rx) = mpsc::channel(config.accept_backlog.max(1));
        let (ping_tx, ping_rx) = mpsc::channel(config.ping_queue.max(1));
        let pool = BufferPool::new(
            POOL_BUFFER_SIZE.max(config.max_segment_size),
            config.pool_capacity,
        );
        let bandwidth = Bandwidth::new(config.max_segment_size);
        let latency = LatencyCounter::new();

        let inner = Arc::new(SessionInner {
            kind,
            local_addr,
            registry: ConnRegistry::new(),
            write_queue: WriteQueue::new(),
            accept_queue: Queue::new(),
            pool,
            ids: IdAllocator::new(),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            ping_misses: AtomicU32::new(0),
            idle_ticks: AtomicU32::new(0),
            latency: latency.gauge(),
            bandwidth: bandwidth.gauge(),
            accept_rx: AsyncMutex::new(accept_rx),
            config,
        });

        tokio::spawn(writer::write_loop(inner.clone(), write_half));
        tokio::spawn(reader::decode_loop(
            inner.clone(),
            read_half,
            bandwidth,
            ping_tx,
        ));
        tokio::spawn(reader::accept_loop(inner.clone(), accept_tx));
        tokio::spawn(pinger::emit_loop(inner.clone()));
        tokio::spawn(pinger::receive_loop(inner.clone(), ping_rx, latency));

        debug!(%kind, ?local_addr, "mux: session started");
        Self { inner }
    }

    /// Open a new logical connection to the peer.
    ///
    /// Waits until the peer accepts or refuses, up to the open timeout.
    pub async fn open(&self) -> MuxResult<MuxConn> {
        let inner = &self.inner;
        if inner.is_closed() {
            return Err(MuxError::SessionClosed);
        }

        let (conn, status) = loop {
            let id = inner.ids.next_id(|id| inner.registry.contains(id));
            let (conn, status) = MuxConn::outbound(
                id,
                Arc::downgrade(inner),
                inner.pool.clone(),
                &inner.config,
            );
            if inner.registry.insert_new(id, conn.clone()) {
                break (conn, status);
            }
            if inner.registry.is_closed() {
                return Err(MuxError::SessionClosed);
            }
        };
        let id = conn.id();
        inner.send(Frame::control(Flag::NewConn, id))?;

        tokio::select! {
            _ = inner.cancel.cancelled() => Err(MuxError::SessionClosed),
            answer = time::timeout(inner.config.open_timeout, status) => match answer {
                Ok(Ok(true)) => {
                    debug!(conn_id = id, "mux: connection opened");
                    Ok(conn)
                }
                Ok(Ok(false)) => {
                    debug!(conn_id = id, "mux: connection refused by peer");
                    inner.registry.delete(id);
                    conn.shutdown();
                    Err(MuxError::ConnectionRefused)
                }
                Ok(Err(_)) => Err(MuxError::SessionClosed),
                Err(_) => {
                    warn!(conn_id = id, "mux: open timed out");
                    Err(MuxError::OpenTimeout)
                }
            },
        }
    }

    /// Wait for the next connection opened by the peer.
    pub async fn accept(&self) -> MuxResult<MuxConn> {
        let inner = &self.inner;
        if inner.is_closed() {
            return Err(MuxError::AcceptClosed);
        }
        tokio::select! {
            _ = inner.cancel.cancelled() => Err(MuxError::AcceptClosed),
            conn = async { inner.accept_rx.lock().await.recv().await } => {
                conn.ok_or(MuxError::AcceptClosed)
            }
        }
    }

    /// Close the session and every connection on it.
    ///
    /// Returns [`MuxError::AlreadyClosed`] if the session was already closed.
    pub fn close(&self) -> MuxResult<()> {
        self.inner.close()
    }

    /// Local address of the transport, if it has one.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr
    }

    /// Kind of transport the session runs over.
    pub fn transport_kind(&self) -> TransportKind {
        self.inner.kind
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Estimated one-way latency in seconds (0 until a ping has returned).
    pub fn latency(&self) -> f64 {
        self.inner.latency.get()
    }

    /// Estimated read throughput in bytes per second.
    pub fn bandwidth(&self) -> f64 {
        Bandwidth::read_gauge(&self.inner.bandwidth)
    }

    /// Ping intervals since the last ping-return.
    pub fn ping_misses(&self) -> u32 {
        self.inner.ping_misses.load(Ordering::Acquire)
    }

    /// Whether the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.inner.registry.len()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.inner.is_closed() {
            let _ = self.inner.close();
        }
    }
}
