// Supervisor: reaps finished workers and kills the rest at shutdown
//
// Reaping is a periodic scan over the shared queue, not a completion
// notification - workers end on their own schedule and the supervisor
// notices on its next pass.

use std::time::Duration;

use chrono::Utc;
use tracing::info;

use ticketd_core::ProcessQueue;

#[derive(Clone)]
pub struct Supervisor {
    queue: ProcessQueue,
    scan_interval: Duration,
}

impl Supervisor {
    pub fn new(queue: ProcessQueue, scan_interval: Duration) -> Self {
        Self {
            queue,
            scan_interval,
        }
    }

    /// Scan the queue forever, removing records whose worker has ended.
    /// Runs as its own task and is aborted at shutdown.
    pub async fn watch(&self) {
        let mut interval = tokio::time::interval(self.scan_interval);
        loop {
            interval.tick().await;
            for record in self.queue.reap_finished() {
                let elapsed = (Utc::now() - record.started_at).num_seconds();
                info!(ticket = %record.ticket_key, elapsed_secs = elapsed, "worker ended");
            }
        }
    }

    /// Abort whatever is still in flight. Each worker is cancelled at its
    /// next await point.
    pub fn kill_remaining(&self) {
        for record in self.queue.kill_all() {
            info!(ticket = %record.ticket_key, "worker killed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketd_core::{Ticket, WorkRecord};

    #[tokio::test]
    async fn watch_reaps_finished_workers() {
        let queue = ProcessQueue::new();
        queue.push(WorkRecord::starting(Ticket::new("OPS-1", "x")));
        queue.attach("OPS-1", tokio::spawn(async {}));

        let supervisor = Supervisor::new(queue.clone(), Duration::from_millis(5));
        let watcher = tokio::spawn({
            let supervisor = supervisor.clone();
            async move { supervisor.watch().await }
        });

        for _ in 0..200 {
            if queue.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert!(queue.is_empty());
        watcher.abort();
    }

    #[tokio::test]
    async fn kill_remaining_empties_the_queue() {
        let queue = ProcessQueue::new();
        let (_tx, rx) = tokio::sync::oneshot::channel::<()>();
        queue.push(WorkRecord::starting(Ticket::new("OPS-1", "x")));
        queue.attach(
            "OPS-1",
            tokio::spawn(async move {
                let _ = rx.await;
            }),
        );

        let supervisor = Supervisor::new(queue.clone(), Duration::from_secs(1));
        supervisor.kill_remaining();
        assert!(queue.is_empty());
    }
}
