//! Hardly working: the smallest useful Admiral deployment.
//!
//! Add work:      cargo run --example hardly_working -- 1 2 3
//! Start workers: cargo run --example hardly_working
//!
//! Spawn as many workers as you like and add as many ids as you please.
//! Each job runs for 25 seconds and comes due again 30 seconds later.

use admiral::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const JOB_TYPE: &str = "task";

#[tokio::main]
async fn main() -> Result<(), QueueError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = QueueConfig::new("hardly-working").with_default_wait(Duration::from_secs(30));
    let redis = RedisConfig::from_env().build();
    let queue = Queue::connect(redis, config).await?;

    let ids: Vec<String> = std::env::args().skip(1).collect();
    if !ids.is_empty() {
        for id in &ids {
            queue.create(JOB_TYPE, id).await?;
            info!(job_id = %id, "📦 Queued");
        }
        return Ok(());
    }

    let mut events = queue.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            error!(kind = event.kind(), "ERR: {}", event.message());
        }
    });

    let count = Arc::new(AtomicU32::new(1));
    let worker = queue.process(JOB_TYPE, move |item: WorkItem| {
        let count = count.clone();
        async move {
            info!(
                "👷 Processing {} that was queued at {}",
                item.id, item.timestamp
            );
            tokio::time::sleep(Duration::from_secs(25)).await;
            info!(
                "✅ Finished #{} {}",
                count.fetch_add(1, Ordering::SeqCst),
                item.id
            );
            Completion::ok()
        }
    });

    info!("Waiting for work..");

    tokio::select! {
        _ = worker => {}
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }
    Ok(())
}
