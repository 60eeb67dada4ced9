use std::sync::Arc;

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use plentyd::{BlockListener, Database, Heartbeat, Indexer, Settings, TzktProvider};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .unwrap();

    // Load configuration
    let settings = Arc::new(
        Settings::new()
            .context("Failed to load config.yaml. Please ensure it exists and is valid")?,
    );

    let db = Arc::new(
        Database::new(settings.clone())
            .await
            .context("Failed to initialize database connection")?,
    );

    let tzkt = Arc::new(TzktProvider::new(&settings.tzkt)?);

    let cancellation_token = CancellationToken::new();

    // Start sending periodic pings to the uptime monitor
    let heartbeat = Heartbeat::new(&settings.heartbeat);
    let heartbeat_handle = tokio::spawn(heartbeat.run(cancellation_token.child_token()));

    // Block listener publishing the latest notified level
    let (level_tx, mut level_rx) = watch::channel(0u64);
    let listener = BlockListener::new(settings.indexer.block_port);
    let listener_token = cancellation_token.child_token();
    let listener_handle = tokio::spawn(async move {
        if let Err(e) = listener.run(level_tx, listener_token).await {
            error!("Block listener failed: {:#}", e);
        }
    });

    // Pipeline loop: one pass at a time. The watch channel hands over the
    // latest known level, so notifications arriving mid-pass are coalesced
    // into the next pass instead of queueing.
    let indexer = Indexer::new(db.clone(), tzkt.clone(), settings.clone());
    let reorg_lag = settings.indexer.reorg_lag;
    let pipeline_token = cancellation_token.child_token();
    let pipeline_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = pipeline_token.cancelled() => {
                    info!("Pipeline received cancellation signal");
                    break;
                }
                res = level_rx.changed() => {
                    if res.is_err() {
                        break;
                    }
                    // Hold back a few levels so a chain reorg cannot
                    // invalidate already-recorded transactions
                    let target = level_rx.borrow_and_update().saturating_sub(reorg_lag);
                    if target == 0 {
                        continue;
                    }
                    info!("Processing up to level {}", target);
                    if let Err(e) = indexer.process_up_to(target).await {
                        error!("Pipeline pass failed: {:#}", e);
                    }
                }
            }
        }
    });

    info!("Indexer running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm_stream =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
        };
    }

    // Cancel all running tasks
    info!("Finishing all tasks...");

    cancellation_token.cancel();

    let _ = pipeline_handle.await;
    let _ = listener_handle.await;
    let _ = heartbeat_handle.await;

    info!("Shutdown complete");
    Ok(())
}
