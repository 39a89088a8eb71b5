//! Reader loops: frame decode/dispatch and inbound-connection dispatch.

use std::io;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use super::conn::MuxConn;
use super::session::SessionInner;
use crate::frame::{Flag, Frame, FrameError, PooledBuf};
use crate::telemetry::Bandwidth;

/// Decode frames from `reader` and dispatch them until the session closes.
/// A decode failure (including EOF) closes the session.
pub(crate) async fn decode_loop<R>(
    session: Arc<SessionInner>,
    mut reader: R,
    mut bandwidth: Bandwidth,
    ping_tx: mpsc::Sender<PooledBuf>,
) where
    R: AsyncRead + Unpin,
{
    let max_segment = session.config.max_segment_size;
    while !session.is_closed() {
        bandwidth.start_read();
        let decoded = tokio::select! {
            _ = session.cancel.cancelled() => break,
            decoded = Frame::read_from(&mut reader, &session.pool, max_segment) => decoded,
        };

        let (frame, copied) = match decoded {
            Ok(decoded) => decoded,
            Err(FrameError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                warn!("mux: transport closed by peer");
                let _ = session.close();
                break;
            }
            Err(e) => {
                error!(error = %e, "mux: frame decode failed");
                let _ = session.close();
                break;
            }
        };
        bandwidth.add_copied(copied);
        session.idle_ticks.store(0, Ordering::Release);

        dispatch(&session, frame, &ping_tx).await;
    }
    trace!("mux: decode loop exited");
}

async fn dispatch(session: &Arc<SessionInner>, mut frame: Frame, ping_tx: &mpsc::Sender<PooledBuf>) {
    match frame.flag {
        Flag::NewConn => {
            let conn = MuxConn::new(
                frame.id,
                Arc::downgrade(session),
                session.pool.clone(),
                &session.config,
            );
            if let Err(conn) = session.accept_queue.push(conn) {
                conn.shutdown();
            }
        }
        Flag::Ping => {
            if let Some(payload) = frame.take_payload() {
                let _ = session.send(Frame::ping_return(payload));
            }
        }
        Flag::PingReturn => {
            if let Some(payload) = frame.take_payload() {
                tokio::select! {
                    _ = session.cancel.cancelled() => {}
                    _ = ping_tx.send(payload) => {}
                }
            }
        }
        _ => route(session, frame),
    }
}

/// Deliver a connection-level frame to its registered connection.
fn route(session: &SessionInner, mut frame: Frame) {
    let id = frame.id;
    let Some(conn) = session.registry.get(id).filter(|conn| !conn.is_closed()) else {
        if frame.flag != Flag::ConnClose {
            trace!(flag = ?frame.flag, conn_id = id, "mux: frame for unknown connection discarded");
        }
        return;
    };

    match frame.flag {
        Flag::NewMsg | Flag::NewMsgPart => {
            let part = frame.flag == Flag::NewMsgPart;
            let Some(payload) = frame.take_payload() else {
                return;
            };
            if let Err(e) = conn.push_segment(payload, part) {
                warn!(conn_id = id, error = %e, "mux: receive window write failed");
                conn.close();
            }
        }
        Flag::NewConnOk => conn.signal_status(true),
        Flag::NewConnFail => conn.signal_status(false),
        Flag::MsgSendOk => conn.grant(frame.window),
        Flag::ConnClose => {
            debug!(conn_id = id, "mux: connection closed by peer");
            conn.close_by_peer();
        }
        Flag::NewConn | Flag::Ping | Flag::PingReturn => {}
    }
}

/// Register inbound connections, hand them to `accept` and confirm them to
/// the peer.
pub(crate) async fn accept_loop(session: Arc<SessionInner>, accept_tx: mpsc::Sender<MuxConn>) {
    loop {
        let conn = tokio::select! {
            _ = session.cancel.cancelled() => break,
            conn = session.accept_queue.pop() => match conn {
                Some(conn) => conn,
                None => break,
            },
        };
        if session.is_closed() {
            conn.shutdown();
            break;
        }

        let id = conn.id();
        if !session.registry.insert_new(id, conn.clone()) {
            conn.shutdown();
            if session.registry.is_closed() {
                break;
            }
            warn!(conn_id = id, "mux: inbound connection id already in use");
            let _ = session.send(Frame::control(Flag::NewConnFail, id));
            continue;
        }

        let published = tokio::select! {
            _ = session.cancel.cancelled() => break,
            sent = accept_tx.send(conn) => sent.is_ok(),
        };
        if !published {
            break;
        }
        if let Err(e) = session.send(Frame::control(Flag::NewConnOk, id)) {
            debug!(conn_id = id, error = %e, "mux: accept confirmation not sent");
            break;
        }
        trace!(conn_id = id, "mux: inbound connection accepted");
    }
    trace!("mux: accept loop exited");
}
