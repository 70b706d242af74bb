use std::{sync::Arc, time::Duration};

use campfund_engine::{CampaignScheduler, JobReport, SchedulerJob, SqliteDatabase};
use chrono::Utc;
use log::*;
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::config::SchedulerWorkerConfig;

/// Starts one worker per campaign status job. Do not await the returned JoinHandles, as they run indefinitely.
pub fn start_scheduler_workers(db: SqliteDatabase, config: SchedulerWorkerConfig) -> Vec<JoinHandle<()>> {
    let scheduler = Arc::new(CampaignScheduler::new(db, config.scheduler));
    [
        (SchedulerJob::Activation, config.activation_interval),
        (SchedulerJob::Completion, config.completion_interval),
        (SchedulerJob::Expiration, config.expiration_interval),
    ]
    .into_iter()
    .map(|(job, period)| start_job_worker(Arc::clone(&scheduler), job, period))
    .collect()
}

fn start_job_worker(
    scheduler: Arc<CampaignScheduler<SqliteDatabase>>,
    job: SchedulerJob,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(period);
        // A slow run must not be followed by a burst of catch-up runs
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("🕰️ Campaign {job} worker started. Running every {}s", period.as_secs());
        loop {
            timer.tick().await;
            debug!("🕰️ Running campaign {job} job");
            match scheduler.run_job(job, Utc::now()).await {
                Ok(report) => log_report(&report),
                Err(e) => error!("🕰️ Error running campaign {job} job: {e}"),
            }
        }
    })
}

fn log_report(report: &JobReport) {
    if report.candidates == 0 {
        trace!("🕰️ {report}");
        return;
    }
    if report.failed() > 0 {
        warn!("🕰️ {report}");
    } else {
        info!("🕰️ {report}");
    }
}
