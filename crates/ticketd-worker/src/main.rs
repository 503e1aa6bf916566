use std::sync::Arc;

use anyhow::{Context, Result};

use ticketd_core::telemetry::{init_telemetry, TelemetryConfig};
use ticketd_core::ProcessQueue;
use ticketd_tracker::RestConnector;
use ticketd_worker::{PollingService, Supervisor, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_telemetry(&TelemetryConfig::from_env());

    tracing::info!("ticketd starting");

    let config = WorkerConfig::from_env().context("configuration error")?;
    tracing::info!(
        worker_id = %config.worker_id,
        capacity = config.service.queue_capacity,
        poll_interval_secs = config.service.poll_interval.as_secs(),
        "configuration loaded"
    );

    let queue = ProcessQueue::new();
    let connector = Arc::new(RestConnector::new(config.tracker.clone()));
    let mut service = PollingService::new(config.service.clone(), connector, queue.clone());
    let stop = service.stop_handle();

    let supervisor = Supervisor::new(queue.clone(), config.supervisor_scan);
    let reaper = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.watch().await }
    });

    let mut service_task = tokio::spawn(async move { service.run().await });

    let result = tokio::select! {
        result = &mut service_task => {
            // The service only returns on its own for fatal errors.
            supervisor.kill_remaining();
            match result {
                Ok(outcome) => outcome,
                Err(join_err) => Err(anyhow::anyhow!("service task panicked: {join_err}")),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            stop.stop();
            // Let the current iteration observe the stop flag and exit,
            // then kill whatever is still in flight.
            let outcome = match service_task.await {
                Ok(outcome) => outcome,
                Err(join_err) => Err(anyhow::anyhow!("service task panicked: {join_err}")),
            };
            supervisor.kill_remaining();
            outcome
        }
    };

    reaper.abort();
    tracing::info!("ticketd stopped");
    result
}
