//! Worker binary: polls the job registry for pending recalculation
//! jobs and runs them through the engine.
//!
//! Deliberately thin plumbing: environment parsing, logger setup, and
//! a poll loop. Everything interesting lives in the library.

use log::{error, info};
use spincost::spincost::config::EngineConfig;
use spincost::spincost::domain::{JobStatus, JobType};
use spincost::spincost::server::RecalcJobServer;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_secs(30);
const POLL_WINDOW: i64 = 10;

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = EngineConfig::from_env();
    info!(
        "starting worker service with {} evaluators and batch size {}",
        config.worker_count, config.batch_size
    );

    let server = match RecalcJobServer::connect(&config).await {
        Ok(server) => server,
        Err(err) => {
            error!("failed to connect to database: {err}");
            std::process::exit(1);
        }
    };

    info!("worker service ready, polling for jobs every {}s", POLL_INTERVAL.as_secs());
    let mut ticker = tokio::time::interval(POLL_INTERVAL);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down worker service");
                break;
            }
            _ = ticker.tick() => {
                poll_once(&server).await;
            }
        }
    }
}

async fn poll_once(server: &RecalcJobServer) {
    let jobs = match server.list_recent_jobs(POLL_WINDOW).await {
        Ok(jobs) => jobs,
        Err(err) => {
            error!("failed to list jobs: {err}");
            return;
        }
    };

    for job in jobs {
        if job.status != JobStatus::Pending || job.job_type != JobType::RecalculateAll {
            continue;
        }
        info!("found pending job {}", job.id);
        // run_pending_job reads the parameter bag from the job
        // metadata and blocks until the pipeline finishes
        if let Err(err) = server.run_pending_job(&job).await {
            error!("job {}: {err}", job.id);
        }
    }
}
