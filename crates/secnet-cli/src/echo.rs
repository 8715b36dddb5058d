//! Echo over a secure channel.
//!
//! The server handshakes every accepted connection on its own task and writes
//! each decrypted frame straight back as one frame. Any channel error ends that
//! connection; the accept loop keeps running.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use secnet_crypto::{dial_with_config, open_tcp, ChannelConfig, ChannelError};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, info, warn};

/// Pause after a failed `accept` so descriptor exhaustion does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept connections forever, echoing on each.
pub async fn serve(listener: TcpListener, config: ChannelConfig) -> Result<()> {
    info!("echo server listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("accept failed: {}", e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        tokio::spawn(async move {
            match handle_connection(stream, peer, config).await {
                Ok(frames) => debug!(%peer, frames, "connection closed"),
                Err(e) if e.is_clean_close() => debug!(%peer, "peer hung up"),
                Err(e) => warn!(%peer, "connection dropped: {}", e),
            }
        });
    }
}

/// Run the handshake on `stream` and echo frames until the peer closes.
///
/// Returns the number of frames echoed.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    config: ChannelConfig,
) -> Result<u64, ChannelError> {
    let mut channel = open_tcp(stream, config).await?;
    debug!(%peer, "handshake complete");

    let mut echoed = 0u64;
    loop {
        let message = match channel.read().await {
            Ok(message) => message,
            Err(e) if e.is_clean_close() => break,
            Err(e) => return Err(e),
        };
        channel.write(&message).await?;
        echoed += 1;
    }

    channel.close().await?;
    Ok(echoed)
}

/// Dial `addr`, send `message` as one frame, and return the echoed reply.
pub async fn send_message<A: ToSocketAddrs>(
    addr: A,
    message: &[u8],
    config: ChannelConfig,
) -> Result<Vec<u8>, ChannelError> {
    let mut channel = dial_with_config(addr, config).await?;
    channel.write(message).await?;
    let reply = channel.read().await?;
    channel.close().await?;
    Ok(reply)
}
