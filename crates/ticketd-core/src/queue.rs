// Shared queue of in-flight ticket workers
//
// The polling service appends, the supervisor reaps; both actors hold a
// clone of the same handle, so every access goes through one mutex.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::ticket::Ticket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    Running,
    Ended,
    Killed,
}

/// One in-flight worker: the spawned task plus the ticket it was accepted
/// for. The handle is attached right after the worker starts; a record
/// without a handle is a worker still being constructed.
#[derive(Debug)]
pub struct WorkRecord {
    pub handle: Option<JoinHandle<()>>,
    pub ticket: Ticket,
    pub ticket_key: String,
    pub status: WorkStatus,
    pub started_at: DateTime<Utc>,
}

impl WorkRecord {
    /// Record for a worker that is about to be started.
    pub fn starting(ticket: Ticket) -> Self {
        let ticket_key = ticket.key.clone();
        Self {
            handle: None,
            ticket,
            ticket_key,
            status: WorkStatus::Running,
            started_at: Utc::now(),
        }
    }

    fn is_finished(&self) -> bool {
        self.handle.as_ref().is_some_and(JoinHandle::is_finished)
    }
}

/// The collection of in-flight workers, shared between the polling service
/// (producer) and the supervisor (consumer). Capacity is enforced by the
/// polling service; the queue itself only guards its own consistency.
#[derive(Clone, Default)]
pub struct ProcessQueue {
    records: Arc<Mutex<Vec<WorkRecord>>>,
}

impl ProcessQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<WorkRecord>> {
        self.records.lock().expect("process queue lock poisoned")
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether a worker for this ticket key is already in flight.
    pub fn contains(&self, ticket_key: &str) -> bool {
        self.lock().iter().any(|r| r.ticket_key == ticket_key)
    }

    pub fn push(&self, record: WorkRecord) {
        self.lock().push(record);
    }

    /// Attach the task handle once the worker has been spawned.
    pub fn attach(&self, ticket_key: &str, handle: JoinHandle<()>) {
        if let Some(record) = self
            .lock()
            .iter_mut()
            .find(|r| r.ticket_key == ticket_key)
        {
            record.handle = Some(handle);
        }
    }

    /// Drop the record for a ticket key, e.g. to roll back an optimistic
    /// enqueue after a failed worker start.
    pub fn remove(&self, ticket_key: &str) -> Option<WorkRecord> {
        let mut records = self.lock();
        let index = records.iter().position(|r| r.ticket_key == ticket_key)?;
        Some(records.remove(index))
    }

    /// Remove and return every record whose task has ended.
    pub fn reap_finished(&self) -> Vec<WorkRecord> {
        let mut records = self.lock();
        let mut reaped = Vec::new();
        let mut index = 0;
        while index < records.len() {
            if records[index].is_finished() {
                let mut record = records.remove(index);
                record.status = WorkStatus::Ended;
                reaped.push(record);
            } else {
                index += 1;
            }
        }
        reaped
    }

    /// Abort every in-flight worker and empty the queue. Abort interrupts a
    /// worker at its next await point; work between await points finishes.
    pub fn kill_all(&self) -> Vec<WorkRecord> {
        let mut records = self.lock();
        records
            .drain(..)
            .map(|mut record| {
                if let Some(handle) = &record.handle {
                    handle.abort();
                }
                record.status = WorkStatus::Killed;
                record
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn record(key: &str) -> WorkRecord {
        WorkRecord::starting(Ticket::new(key, "Credit hold request"))
    }

    #[test]
    fn push_contains_remove() {
        let queue = ProcessQueue::new();
        queue.push(record("OPS-1"));
        queue.push(record("OPS-2"));

        assert_eq!(queue.len(), 2);
        assert!(queue.contains("OPS-1"));
        assert!(!queue.contains("OPS-3"));

        let removed = queue.remove("OPS-1").expect("present");
        assert_eq!(removed.ticket_key, "OPS-1");
        assert_eq!(queue.len(), 1);
        assert!(queue.remove("OPS-1").is_none());
    }

    #[test]
    fn record_without_handle_is_not_reaped() {
        let queue = ProcessQueue::new();
        queue.push(record("OPS-1"));
        assert!(queue.reap_finished().is_empty());
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn reap_returns_only_finished_workers() {
        let queue = ProcessQueue::new();

        let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
        queue.push(record("OPS-1"));
        queue.attach(
            "OPS-1",
            tokio::spawn(async move {
                let _ = done_rx.await;
            }),
        );

        let (_hold_tx, hold_rx) = tokio::sync::oneshot::channel::<()>();
        queue.push(record("OPS-2"));
        queue.attach(
            "OPS-2",
            tokio::spawn(async move {
                let _ = hold_rx.await;
            }),
        );

        assert!(queue.reap_finished().is_empty());

        done_tx.send(()).expect("worker is waiting");
        let reaped = wait_for_reap(&queue, 1).await;
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].ticket_key, "OPS-1");
        assert_eq!(reaped[0].status, WorkStatus::Ended);

        assert_eq!(queue.len(), 1);
        assert!(queue.contains("OPS-2"));
    }

    #[tokio::test]
    async fn kill_all_aborts_and_empties() {
        let queue = ProcessQueue::new();

        let (_tx, rx) = tokio::sync::oneshot::channel::<()>();
        queue.push(record("OPS-1"));
        queue.attach(
            "OPS-1",
            tokio::spawn(async move {
                let _ = rx.await;
            }),
        );

        let killed = queue.kill_all();
        assert_eq!(killed.len(), 1);
        assert_eq!(killed[0].status, WorkStatus::Killed);
        assert!(queue.is_empty());

        let handle = killed.into_iter().next().and_then(|r| r.handle);
        let joined = handle.expect("handle attached").await;
        assert!(joined.unwrap_err().is_cancelled());
    }

    async fn wait_for_reap(queue: &ProcessQueue, want: usize) -> Vec<WorkRecord> {
        let mut reaped = Vec::new();
        for _ in 0..100 {
            reaped.extend(queue.reap_finished());
            if reaped.len() >= want {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        reaped
    }
}
