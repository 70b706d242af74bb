use campfund_engine::{events::EventProducers, HttpWalletService, OutboxRelay, SqliteDatabase};
use log::*;
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::{cache::ServerCache, config::OutboxWorkerConfig};

/// Starts the outbox relay. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_outbox_worker(
    db: SqliteDatabase,
    wallet: HttpWalletService,
    cache: ServerCache,
    producers: EventProducers,
    config: OutboxWorkerConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(config.poll_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let relay = OutboxRelay::new(db, wallet, cache, producers, config.relay);
        info!("🕰️ Outbox relay worker started. Polling every {}s", config.poll_interval.as_secs());
        loop {
            timer.tick().await;
            match relay.run_once().await {
                Ok(report) if report.skipped => debug!("🕰️ Previous relay cycle is still running"),
                Ok(report) if report.is_idle() => trace!("🕰️ Outbox is empty"),
                Ok(report) => info!(
                    "🕰️ Outbox cycle: {} fetched, {} completed, {} retried, {} dead-lettered, {} stale claims released",
                    report.fetched, report.completed, report.retried, report.dead_lettered, report.released
                ),
                Err(e) => error!("🕰️ Error running outbox relay cycle: {e}"),
            }
        }
    })
}
