//! Logical connections multiplexed over a session.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tracing::{debug, trace};

use super::config::SessionConfig;
use super::session::SessionInner;
use super::window::{ReceiveWindow, Segment, SendWindow};
use crate::core::{MuxError, MuxResult};
use crate::frame::{BufferPool, Flag, Frame, PooledBuf};

struct ConnInner {
    id: i32,
    /// Back-reference used to enqueue frames; dead once the session is gone.
    session: Weak<SessionInner>,
    pool: BufferPool,
    max_segment: usize,
    recv: ReceiveWindow,
    send: SendWindow,
    /// Held for a whole `write` so messages from clones do not interleave.
    write_lock: AsyncMutex<()>,
    /// Closed locally (or by session shutdown).
    closed: AtomicBool,
    /// Closed by the peer; buffered data can still be read.
    closing: AtomicBool,
    /// Answer to our new-connection request (outbound connections only).
    status: Mutex<Option<oneshot::Sender<bool>>>,
}

/// One logical byte stream inside a mux session.
///
/// Cheap to clone; all clones refer to the same connection.
#[derive(Clone)]
pub struct MuxConn {
    inner: Arc<ConnInner>,
}

impl fmt::Debug for MuxConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MuxConn")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .field("closing", &self.is_closing())
            .finish()
    }
}

impl MuxConn {
    /// Create a connection bound to `session`.
    pub(crate) fn new(
        id: i32,
        session: Weak<SessionInner>,
        pool: BufferPool,
        config: &SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ConnInner {
                id,
                session,
                pool,
                max_segment: config.max_segment_size,
                recv: ReceiveWindow::new(config.receive_window as usize),
                send: SendWindow::new(config.receive_window),
                write_lock: AsyncMutex::new(()),
                closed: AtomicBool::new(false),
                closing: AtomicBool::new(false),
                status: Mutex::new(None),
            }),
        }
    }

    /// Create an outbound connection and the receiver for the peer's answer.
    pub(crate) fn outbound(
        id: i32,
        session: Weak<SessionInner>,
        pool: BufferPool,
        config: &SessionConfig,
    ) -> (Self, oneshot::Receiver<bool>) {
        let conn = Self::new(id, session, pool, config);
        let (tx, rx) = oneshot::channel();
        *conn.inner.status.lock() = Some(tx);
        (conn, rx)
    }

    /// Connection id, unique among the session's live connections.
    pub fn id(&self) -> i32 {
        self.inner.id
    }

    /// Read bytes into `buf`, waiting for data.
    ///
    /// Returns `Ok(0)` once the peer has closed the connection and all
    /// buffered data has been read.
    pub async fn read(&self, buf: &mut [u8]) -> MuxResult<usize> {
        if self.is_closed() {
            return Err(MuxError::ConnectionClosed(self.id()));
        }
        let n = self.inner.recv.read(buf).await;
        self.report_credit();
        Ok(n)
    }

    /// Take the next received segment with its partial/final marker.
    ///
    /// Returns `Ok(None)` once the peer has closed the connection and all
    /// buffered data has been read.
    pub async fn read_segment(&self) -> MuxResult<Option<Segment>> {
        if self.is_closed() {
            return Err(MuxError::ConnectionClosed(self.id()));
        }
        let segment = self.inner.recv.read_segment().await;
        self.report_credit();
        Ok(segment)
    }

    /// Write all of `data`, split into segments of at most the maximum
    /// segment size. Waits while the peer's window is full.
    ///
    /// Concurrent writes through clones are serialized: each message goes out
    /// as one contiguous run of segments.
    pub async fn write(&self, data: &[u8]) -> MuxResult<usize> {
        let _guard = self.inner.write_lock.lock().await;
        let mut written = 0;
        while written < data.len() {
            if self.is_closed() || self.is_closing() {
                return Err(MuxError::ConnectionClosed(self.id()));
            }
            let want = (data.len() - written).min(self.inner.max_segment);
            let n = self
                .inner
                .send
                .acquire(want)
                .await
                .ok_or(MuxError::ConnectionClosed(self.id()))?;

            let part = written + n < data.len();
            let payload = self.inner.pool.copy_from(&data[written..written + n]);
            self.send_frame(Frame::data(self.id(), payload, part))?;
            written += n;
        }
        Ok(written)
    }

    /// Close the connection.
    ///
    /// Notifies the peer unless it closed first, and removes the connection
    /// from the session. Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stop_windows();

        if let Some(session) = self.inner.session.upgrade() {
            if !self.is_closing() {
                if let Err(e) = session.send(Frame::control(Flag::ConnClose, self.id())) {
                    debug!(conn_id = self.id(), error = %e, "mux: close frame not sent");
                }
            }
            session.registry.delete(self.id());
        }
        debug!(conn_id = self.id(), "mux: connection closed");
    }

    /// Whether the connection has been closed locally.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Whether the peer has closed the connection.
    pub fn is_closing(&self) -> bool {
        self.inner.closing.load(Ordering::Acquire)
    }

    /// Remaining send credit in bytes.
    pub fn send_credit(&self) -> u32 {
        self.inner.send.remaining()
    }

    /// Received bytes not yet read.
    pub fn buffered(&self) -> usize {
        self.inner.recv.buffered()
    }

    /// Append a received segment to the receive window.
    pub(crate) fn push_segment(&self, payload: PooledBuf, part: bool) -> MuxResult<()> {
        self.inner.recv.write(self.id(), payload, part)
    }

    /// Add send credit reported by the peer.
    pub(crate) fn grant(&self, credit: u32) {
        trace!(conn_id = self.id(), credit, "mux: send credit granted");
        self.inner.send.grant(credit);
    }

    /// Deliver the peer's answer to our new-connection request.
    pub(crate) fn signal_status(&self, ok: bool) {
        if let Some(tx) = self.inner.status.lock().take() {
            let _ = tx.send(ok);
        }
    }

    /// The peer closed its side.
    pub(crate) fn close_by_peer(&self) {
        self.inner.closing.store(true, Ordering::Release);
        self.stop_windows();
    }

    /// Close without notifying the peer or touching the registry. Used when
    /// the whole session goes down.
    pub(crate) fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.stop_windows();
        self.inner.status.lock().take();
    }

    fn stop_windows(&self) {
        self.inner.recv.stop();
        self.inner.send.close();
    }

    fn send_frame(&self, frame: Frame) -> MuxResult<()> {
        match self.inner.session.upgrade() {
            Some(session) => session.send(frame),
            None => Err(MuxError::SessionClosed),
        }
    }

    fn report_credit(&self) {
        if self.is_closed() || self.is_closing() {
            return;
        }
        if let Some(credit) = self.inner.recv.take_credit(self.inner.max_segment) {
            if let Err(e) = self.send_frame(Frame::send_ok(self.id(), credit)) {
                debug!(conn_id = self.id(), error = %e, "mux: window report not sent");
            }
        }
    }
}
