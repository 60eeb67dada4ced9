use anyhow::Context;
use log::{info, warn};
use serde::Deserialize;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Deserialize)]
struct BlockData {
    level: u64,
}

/// Listens for new-block notifications on a local UDP port.
///
/// The block watcher broadcasts `{ "level": n }` datagrams out-of-band;
/// each decoded level is published to a watch channel that keeps only the
/// latest value. Notifications arriving while a pipeline pass is running
/// are therefore coalesced rather than queued, and the next pass naturally
/// covers the skipped range.
pub struct BlockListener {
    port: u16,
}

impl BlockListener {
    pub fn new(port: u16) -> Self {
        Self {
            port,
        }
    }

    pub async fn run(
        self,
        levels: watch::Sender<u64>,
        cancellation_token: CancellationToken,
    ) -> anyhow::Result<()> {
        let socket = UdpSocket::bind(("0.0.0.0", self.port))
            .await
            .with_context(|| format!("Failed to bind UDP port {}", self.port))?;

        info!("Listening for blocks on port {}", self.port);

        let mut buf = [0u8; 1024];

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("Block listener received cancellation signal");
                    break;
                }
                res = socket.recv_from(&mut buf) => {
                    let (len, _) = res.context("UDP receive failed")?;
                    match serde_json::from_slice::<BlockData>(&buf[..len]) {
                        Ok(block) => {
                            let _ = levels.send(block.level);
                        },
                        Err(e) => {
                            warn!("Ignoring malformed block datagram: {}", e);
                        },
                    }
                }
            }
        }

        Ok(())
    }
}
