//! secnet - encrypted echo over TCP.
//!
//! Server: `secnet -l 8080`
//! Client: `secnet 8080 "hello"`

#![forbid(unsafe_code)]

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use secnet_core::DEFAULT_MAX_FRAME_LEN;
use secnet_crypto::ChannelConfig;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "secnet")]
#[command(about = "Encrypted echo client and server")]
#[command(version)]
struct Args {
    /// Listen mode: serve echo on this port
    #[arg(short = 'l', long = "listen", value_name = "PORT", conflicts_with_all = ["port", "message"])]
    listen: Option<u16>,

    /// Server port to connect to
    #[arg(required_unless_present = "listen")]
    port: Option<u16>,

    /// Message to send
    #[arg(required_unless_present = "listen")]
    message: Option<String>,

    /// Host to connect to in client mode
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Address to bind in listen mode
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Maximum ciphertext bytes per frame
    #[arg(
        long,
        env = "SECNET_MAX_FRAME_LEN",
        default_value_t = DEFAULT_MAX_FRAME_LEN,
        value_parser = parse_max_frame_len
    )]
    max_frame_len: usize,

    /// Client round-trip deadline in seconds
    #[arg(long, env = "SECNET_TIMEOUT_SECS", default_value_t = 10)]
    timeout_secs: u64,

    /// Log level
    #[arg(long, env = "SECNET_LOG", default_value = "info")]
    log_level: String,
}

fn parse_max_frame_len(s: &str) -> Result<usize, String> {
    let len = s.parse::<usize>().map_err(|e| e.to_string())?;
    ChannelConfig::new(len)
        .map(|config| config.max_frame_len)
        .map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    secnet_common::init_tracing_with_default(&args.log_level);

    let config = ChannelConfig::new(args.max_frame_len)?;

    if let Some(port) = args.listen {
        let addr = format!("{}:{}", args.bind, port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;

        tokio::select! {
            result = secnet_cli::serve(listener, config) => result?,
            _ = tokio::signal::ctrl_c() => info!("shutting down"),
        }
        return Ok(());
    }

    let port = args.port.ok_or_else(|| anyhow!("missing port"))?;
    let message = args.message.ok_or_else(|| anyhow!("missing message"))?;
    let addr = format!("{}:{}", args.host, port);

    let reply = tokio::time::timeout(
        Duration::from_secs(args.timeout_secs),
        secnet_cli::send_message(addr.as_str(), message.as_bytes(), config),
    )
    .await
    .map_err(|_| anyhow!("timed out after {}s waiting for {}", args.timeout_secs, addr))?
    .with_context(|| format!("echo via {addr} failed"))?;

    println!("{}", String::from_utf8_lossy(&reply));
    Ok(())
}
