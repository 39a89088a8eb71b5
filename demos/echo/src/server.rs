//! Echo server: every logical connection gets its bytes back.

use std::net::SocketAddr;

use nomad_mux::{MuxConn, Session, TransportKind};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::EchoError;

/// Accept TCP peers on `addr` forever, one mux session per peer.
pub async fn run(addr: SocketAddr) -> Result<(), EchoError> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "echo server listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true)?;
        tokio::spawn(serve_session(stream, peer));
    }
}

async fn serve_session(stream: TcpStream, peer: SocketAddr) {
    let session = Session::new(stream, TransportKind::Tcp);
    info!(%peer, "session opened");

    loop {
        match session.accept().await {
            Ok(conn) => {
                tokio::spawn(echo(conn));
            }
            Err(e) => {
                debug!(%peer, error = %e, "accept ended");
                break;
            }
        }
    }
    info!(
        %peer,
        latency = session.latency(),
        bandwidth = session.bandwidth(),
        "session closed"
    );
}

async fn echo(conn: MuxConn) {
    let mut buf = vec![0u8; 8192];
    loop {
        let n = match conn.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!(conn_id = conn.id(), error = %e, "read failed");
                break;
            }
        };
        if let Err(e) = conn.write(&buf[..n]).await {
            warn!(conn_id = conn.id(), error = %e, "write failed");
            break;
        }
    }
    conn.close();
}
