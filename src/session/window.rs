//! Per-connection flow-control windows.
//!
//! The receive side buffers segments up to a fixed capacity and reports
//! consumed bytes back to the sender, which adds them to its remaining send
//! credit.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::core::{MuxError, MuxResult};
use crate::frame::PooledBuf;

/// One received message segment.
#[derive(Debug)]
pub struct Segment {
    payload: PooledBuf,
    offset: usize,
    part: bool,
}

impl Segment {
    /// Unread bytes of the segment.
    pub fn data(&self) -> &[u8] {
        &self.payload[self.offset..]
    }

    /// Whether more segments of the same message follow.
    pub fn is_part(&self) -> bool {
        self.part
    }

    /// Unread length.
    pub fn len(&self) -> usize {
        self.payload.len() - self.offset
    }

    /// Whether every byte has been read.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
struct RecvState {
    segments: VecDeque<Segment>,
    buffered: usize,
    /// Bytes consumed since the last credit report.
    consumed: usize,
    stopped: bool,
}

/// Receive side of a logical connection.
#[derive(Debug)]
pub struct ReceiveWindow {
    state: Mutex<RecvState>,
    notify: Notify,
    capacity: usize,
}

impl ReceiveWindow {
    /// Create a window buffering at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(RecvState::default()),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Append a received segment for connection `id`.
    pub fn write(&self, id: i32, payload: PooledBuf, part: bool) -> MuxResult<()> {
        {
            let mut state = self.state.lock();
            if state.stopped {
                return Err(MuxError::ConnectionClosed(id));
            }
            if state.buffered + payload.len() > self.capacity {
                return Err(MuxError::WindowOverflow {
                    id,
                    buffered: state.buffered,
                    incoming: payload.len(),
                    capacity: self.capacity,
                });
            }
            state.buffered += payload.len();
            state.segments.push_back(Segment {
                payload,
                offset: 0,
                part,
            });
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Copy buffered bytes into `buf`, waiting for data.
    ///
    /// Reads never cross a segment boundary and skip empty segments. Returns
    /// 0 only once the window is stopped and drained.
    pub async fn read(&self, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        loop {
            let notified = self.notify.notified();
            {
                let mut guard = self.state.lock();
                let state = &mut *guard;
                // Empty segments only carry a message marker.
                while state.segments.front().is_some_and(Segment::is_empty) {
                    state.segments.pop_front();
                }
                if let Some(front) = state.segments.front_mut() {
                    let n = front.len().min(buf.len());
                    buf[..n].copy_from_slice(&front.data()[..n]);
                    front.offset += n;
                    if front.is_empty() {
                        state.segments.pop_front();
                    }
                    state.buffered -= n;
                    state.consumed += n;
                    return n;
                }
                if state.stopped {
                    return 0;
                }
            }
            notified.await;
        }
    }

    /// Take the next whole segment, waiting for data.
    ///
    /// Returns `None` once the window is stopped and drained.
    pub async fn read_segment(&self) -> Option<Segment> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock();
                if let Some(segment) = state.segments.pop_front() {
                    state.buffered -= segment.len();
                    state.consumed += segment.len();
                    return Some(segment);
                }
                if state.stopped {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Take the consumed-byte credit if it is worth reporting.
    ///
    /// Credit is released once at least `threshold` bytes were consumed, or
    /// when the buffer has been fully drained.
    pub fn take_credit(&self, threshold: usize) -> Option<u32> {
        let mut state = self.state.lock();
        if state.consumed == 0 || (state.consumed < threshold && state.buffered > 0) {
            return None;
        }
        let credit = u32::try_from(state.consumed).unwrap_or(u32::MAX);
        state.consumed = 0;
        Some(credit)
    }

    /// Stop accepting segments. Readers drain what is buffered, then see EOF.
    pub fn stop(&self) {
        self.state.lock().stopped = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.state.lock().buffered
    }

    /// Whether the window has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }
}

#[derive(Debug)]
struct SendState {
    remaining: u32,
    closed: bool,
}

/// Send side of a logical connection: remaining credit granted by the peer.
#[derive(Debug)]
pub struct SendWindow {
    state: Mutex<SendState>,
    notify: Notify,
}

impl SendWindow {
    /// Create a window with `initial` bytes of credit.
    pub fn new(initial: u32) -> Self {
        Self {
            state: Mutex::new(SendState {
                remaining: initial,
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Reserve up to `want` bytes of credit, waiting while none is left.
    ///
    /// Returns `None` once the window is closed.
    pub async fn acquire(&self, want: usize) -> Option<usize> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock();
                if state.closed {
                    return None;
                }
                if state.remaining > 0 {
                    let n = want.min(state.remaining as usize);
                    state.remaining -= n as u32;
                    return Some(n);
                }
            }
            notified.await;
        }
    }

    /// Add credit reported by the peer.
    pub fn grant(&self, credit: u32) {
        {
            let mut state = self.state.lock();
            state.remaining = state.remaining.saturating_add(credit);
        }
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Remaining credit in bytes.
    pub fn remaining(&self) -> u32 {
        self.state.lock().remaining
    }

    /// Close the window and wake blocked writers.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::BufferPool;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_read_splits_and_drains() {
        let pool = BufferPool::default();
        let window = ReceiveWindow::new(1024);
        window.write(1, pool.copy_from(b"hello"), true).unwrap();
        window.write(1, pool.copy_from(b"world"), false).unwrap();
        assert_eq!(window.buffered(), 10);

        let mut buf = [0u8; 3];
        assert_eq!(window.read(&mut buf).await, 3);
        assert_eq!(&buf, b"hel");
        assert_eq!(window.read(&mut buf).await, 2);
        assert_eq!(&buf[..2], b"lo");
        assert_eq!(window.buffered(), 5);

        let segment = window.read_segment().await.unwrap();
        assert_eq!(segment.data(), b"world");
        assert!(!segment.is_part());
        drop(segment);
        assert_eq!(pool.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_empty_segment_is_not_eof() {
        let pool = BufferPool::default();
        let window = Arc::new(ReceiveWindow::new(1024));
        window.write(1, pool.copy_from(b""), false).unwrap();

        let reader = {
            let window = window.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 8];
                let n = window.read(&mut buf).await;
                buf[..n].to_vec()
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!reader.is_finished());

        window.write(1, pool.copy_from(b"abc"), false).unwrap();
        assert_eq!(reader.await.unwrap(), b"abc");
        assert_eq!(pool.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_empty_segment_keeps_marker() {
        let pool = BufferPool::default();
        let window = ReceiveWindow::new(1024);
        window.write(1, pool.copy_from(b"abc"), true).unwrap();
        window.write(1, pool.copy_from(b""), false).unwrap();

        assert!(window.read_segment().await.unwrap().is_part());
        let last = window.read_segment().await.unwrap();
        assert!(last.is_empty());
        assert!(!last.is_part());
    }

    #[tokio::test]
    async fn test_stop_drains_then_eof() {
        let pool = BufferPool::default();
        let window = ReceiveWindow::new(1024);
        window.write(1, pool.copy_from(b"tail"), false).unwrap();
        window.stop();

        assert!(window.write(1, pool.copy_from(b"late"), false).is_err());

        let mut buf = [0u8; 16];
        assert_eq!(window.read(&mut buf).await, 4);
        assert_eq!(window.read(&mut buf).await, 0);
        assert!(window.read_segment().await.is_none());
    }

    #[test]
    fn test_overflow_rejected() {
        let pool = BufferPool::default();
        let window = ReceiveWindow::new(8);
        window.write(3, pool.copy_from(b"12345"), false).unwrap();

        let err = window.write(3, pool.copy_from(b"6789"), false).unwrap_err();
        assert!(matches!(
            err,
            MuxError::WindowOverflow {
                id: 3,
                buffered: 5,
                incoming: 4,
                capacity: 8
            }
        ));
        assert_eq!(pool.outstanding(), 1);
    }

    #[tokio::test]
    async fn test_credit_threshold() {
        let pool = BufferPool::default();
        let window = ReceiveWindow::new(1024);
        window.write(1, pool.copy_from(&[0u8; 10]), false).unwrap();
        assert_eq!(window.take_credit(4), None);

        let mut buf = [0u8; 3];
        window.read(&mut buf).await;
        assert_eq!(window.take_credit(4), None);

        window.read(&mut buf).await;
        assert_eq!(window.take_credit(4), Some(6));

        // Drained buffer releases credit below the threshold.
        let mut rest = [0u8; 16];
        assert_eq!(window.read(&mut rest).await, 4);
        assert_eq!(window.take_credit(100), Some(4));
        assert_eq!(window.take_credit(100), None);
    }

    #[tokio::test]
    async fn test_send_window_blocks_until_grant() {
        let window = Arc::new(SendWindow::new(4));
        assert_eq!(window.acquire(10).await, Some(4));
        assert_eq!(window.remaining(), 0);

        let writer = {
            let window = window.clone();
            tokio::spawn(async move { window.acquire(10).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!writer.is_finished());

        window.grant(6);
        assert_eq!(writer.await.unwrap(), Some(6));
    }

    #[tokio::test]
    async fn test_send_window_close_wakes_writer() {
        let window = Arc::new(SendWindow::new(0));
        let writer = {
            let window = window.clone();
            tokio::spawn(async move { window.acquire(1).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        window.close();
        assert_eq!(writer.await.unwrap(), None);
    }
}
