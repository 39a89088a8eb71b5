//! NOMAD Mux Echo Demo
//!
//! Runs an echo server or client over a multiplexed TCP session.
//!
//! Environment variables:
//! - MUX_MODE: "server" or "client" (default server)
//! - MUX_ADDR: Listen address (server) or server address (client),
//!   default 127.0.0.1:19999
//! - MUX_STREAMS: Logical connections opened by the client (default 4)
//! - MUX_LOG_LEVEL: trace|debug|info|warn|error (default info)

mod client;
mod server;

use std::env;
use std::io;
use std::net::SocketAddr;

use nomad_mux::MuxError;
use thiserror::Error;
use tracing::error;
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "127.0.0.1:19999";
const DEFAULT_STREAMS: usize = 4;

/// Errors from the echo demo.
#[derive(Debug, Error)]
pub enum EchoError {
    /// Bad environment configuration.
    #[error("invalid {name}: {value}")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// Rejected value.
        value: String,
    },

    /// Echoed bytes differ from what was sent.
    #[error("stream {0} echoed different bytes")]
    Mismatch(i32),

    /// Mux session error.
    #[error(transparent)]
    Mux(#[from] MuxError),

    /// Socket error.
    #[error(transparent)]
    Io(#[from] io::Error),
}

enum Mode {
    Server,
    Client { streams: usize },
}

struct Settings {
    mode: Mode,
    addr: SocketAddr,
}

fn env_or(name: &'static str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_settings() -> Result<Settings, EchoError> {
    let addr_text = env_or("MUX_ADDR", DEFAULT_ADDR);
    let addr = addr_text.parse().map_err(|_| EchoError::InvalidEnv {
        name: "MUX_ADDR",
        value: addr_text.clone(),
    })?;

    let mode = match env_or("MUX_MODE", "server").as_str() {
        "server" => Mode::Server,
        "client" => {
            let text = env_or("MUX_STREAMS", &DEFAULT_STREAMS.to_string());
            let streams = text
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(EchoError::InvalidEnv {
                    name: "MUX_STREAMS",
                    value: text,
                })?;
            Mode::Client { streams }
        }
        other => {
            return Err(EchoError::InvalidEnv {
                name: "MUX_MODE",
                value: other.to_string(),
            });
        }
    };

    Ok(Settings { mode, addr })
}

#[tokio::main]
async fn main() {
    let level = env_or("MUX_LOG_LEVEL", "info");
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let result = match parse_settings() {
        Ok(Settings {
            mode: Mode::Server,
            addr,
        }) => server::run(addr).await,
        Ok(Settings {
            mode: Mode::Client { streams },
            addr,
        }) => client::run(addr, streams).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        error!(error = %e, "nomad-mux-echo failed");
        std::process::exit(1);
    }
}
