//! Writer loop: the only task that writes to the transport.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, trace};

use super::session::SessionInner;
use crate::core::MuxResult;
use crate::frame::Frame;

/// Pop frames from the write queue and write them to `writer` until the
/// session closes. A write failure closes the session.
pub(crate) async fn write_loop<W>(session: Arc<SessionInner>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(session.pool.buf_size());
    loop {
        let frame = tokio::select! {
            _ = session.cancel.cancelled() => break,
            frame = session.write_queue.pop() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        if session.is_closed() {
            break;
        }

        let result = tokio::select! {
            _ = session.cancel.cancelled() => break,
            result = write_frame(&session, &mut writer, &mut buf, &frame) => result,
        };
        drop(frame);

        if let Err(e) = result {
            error!(error = %e, "mux: transport write failed");
            let _ = session.close();
            break;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "mux: transport shutdown failed");
    }
    trace!("mux: writer loop exited");
}

async fn write_frame<W>(
    session: &SessionInner,
    writer: &mut W,
    buf: &mut BytesMut,
    frame: &Frame,
) -> MuxResult<()>
where
    W: AsyncWrite + Unpin,
{
    buf.clear();
    frame.encode(buf, session.config.max_segment_size)?;
    writer.write_all(buf).await?;
    writer.flush().await?;
    trace!(flag = ?frame.flag, conn_id = frame.id, len = buf.len(), "mux: frame written");
    Ok(())
}
