//! Keep-alive pings and latency measurement.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, trace};

use super::session::SessionInner;
use crate::core::TransportKind;
use crate::frame::{Frame, PooledBuf};
use crate::telemetry::LatencyCounter;

/// Send a ping now and then once per interval; close the session when too
/// many intervals pass without a ping-return, or (KCP only) without any
/// inbound frame.
pub(crate) async fn emit_loop(session: Arc<SessionInner>) {
    let period = session.config.ping_interval;
    send_ping(&session);

    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = session.cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if session.is_closed() {
            break;
        }

        let misses = session.ping_misses.fetch_add(1, Ordering::AcqRel) + 1;
        if misses >= session.config.ping_timeout_misses {
            error!(misses, "mux: ping timed out");
            let _ = session.close();
            break;
        }
        if session.kind == TransportKind::Kcp {
            let idle = session.idle_ticks.fetch_add(1, Ordering::AcqRel) + 1;
            if idle >= session.config.kcp_idle_limit {
                error!(idle_ticks = idle, "mux: kcp link silent");
                let _ = session.close();
                break;
            }
        }
        send_ping(&session);
    }
    trace!("mux: ping loop exited");
}

/// Consume ping-returns: reset the miss counter and feed the latency
/// estimator with half the round trip.
pub(crate) async fn receive_loop(
    session: Arc<SessionInner>,
    mut returns: mpsc::Receiver<PooledBuf>,
    mut counter: LatencyCounter,
) {
    loop {
        let payload = tokio::select! {
            _ = session.cancel.cancelled() => break,
            payload = returns.recv() => match payload {
                Some(payload) => payload,
                None => break,
            },
        };
        session.ping_misses.store(0, Ordering::Release);

        let Some(sent) = parse_timestamp(&payload) else {
            debug!(len = payload.len(), "mux: unreadable ping-return payload");
            continue;
        };
        let half_rtt = Utc::now()
            .signed_duration_since(sent)
            .num_nanoseconds()
            .map(|nanos| nanos as f64 / 2e9);
        if let Some(latency) = half_rtt.filter(|latency| *latency > 0.0) {
            let reported = counter.latency(latency);
            trace!(latency, reported, "mux: ping returned");
        }
    }
    trace!("mux: ping-receive loop exited");
}

fn send_ping(session: &SessionInner) {
    let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
    let payload = session.pool.copy_from(stamp.as_bytes());
    if let Err(e) = session.send(Frame::ping(payload)) {
        debug!(error = %e, "mux: ping not sent");
    }
}

fn parse_timestamp(payload: &[u8]) -> Option<DateTime<Utc>> {
    let text = std::str::from_utf8(payload).ok()?;
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|stamp| stamp.with_timezone(&Utc))
}
