use std::time::Duration;

use log::{error, info};
use tokio_util::sync::CancellationToken;

use crate::config::HeartbeatSettings;

/// Periodic ping to an external uptime monitor.
///
/// This pipeline has no interactive surface; the monitor going silent is
/// the operational signal that processing has stopped. Ping failures are
/// logged and never fatal.
pub struct Heartbeat {
    url: Option<String>,
    interval: Duration,
    http: reqwest::Client,
}

impl Heartbeat {
    pub fn new(settings: &HeartbeatSettings) -> Self {
        Self {
            url: settings.url.clone(),
            interval: Duration::from_secs(settings.interval_seconds),
            http: reqwest::Client::new(),
        }
    }

    pub async fn run(self, cancellation_token: CancellationToken) {
        let Some(ref url) = self.url else {
            info!("Heartbeat disabled (no URL configured)");
            return;
        };

        loop {
            if let Err(e) = self.pump(&url).await {
                error!("Unable to reach heartbeat service: {}", e);
            }

            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("Heartbeat received cancellation signal");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    async fn pump(&self, url: &str) -> reqwest::Result<()> {
        self.http.get(url).send().await?.error_for_status()?;
        Ok(())
    }
}
