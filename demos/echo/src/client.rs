//! Echo client: opens several logical connections and checks the echoes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nomad_mux::{Session, TransportKind};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::info;

use crate::EchoError;

/// Bytes sent on each stream; larger than one segment.
const MESSAGE_LEN: usize = 16 * 1024;

/// Connect to `addr`, echo a message on `streams` logical connections and
/// report link telemetry.
pub async fn run(addr: SocketAddr, streams: usize) -> Result<(), EchoError> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    let session = Arc::new(Session::new(stream, TransportKind::Tcp));
    info!(%addr, streams, "connected");

    let mut tasks = JoinSet::new();
    for index in 0..streams {
        let session = session.clone();
        tasks.spawn(async move { echo_once(&session, index).await });
    }

    let mut result = Ok(());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => result = Err(e),
            Err(e) => result = Err(EchoError::Io(std::io::Error::other(e))),
        }
    }

    // Give the pinger a chance to report a latency sample.
    tokio::time::sleep(Duration::from_millis(100)).await;
    info!(
        latency = session.latency(),
        bandwidth = session.bandwidth(),
        ping_misses = session.ping_misses(),
        "link telemetry"
    );
    session.close()?;
    result
}

async fn echo_once(session: &Session, index: usize) -> Result<(), EchoError> {
    let started = Instant::now();
    let conn = session.open().await?;
    let message: Vec<u8> = (0..MESSAGE_LEN).map(|i| (i + index) as u8).collect();
    conn.write(&message).await?;

    let mut echoed = Vec::with_capacity(MESSAGE_LEN);
    let mut buf = vec![0u8; 8192];
    while echoed.len() < MESSAGE_LEN {
        let n = conn.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        echoed.extend_from_slice(&buf[..n]);
    }
    conn.close();

    if echoed != message {
        return Err(EchoError::Mismatch(conn.id()));
    }
    info!(
        conn_id = conn.id(),
        bytes = MESSAGE_LEN,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "stream echoed"
    );
    Ok(())
}
