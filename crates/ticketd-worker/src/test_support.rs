// Test doubles for the tracker seam

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use ticketd_core::{
    AttachmentRef, SharedSession, Ticket, TrackerConnector, TrackerError, TrackerSession,
};

/// Scriptable tracker session: canned search batches, recorded writes,
/// switchable failures.
#[derive(Default)]
pub struct FakeTracker {
    batches: Mutex<VecDeque<Vec<Ticket>>>,
    comments: Mutex<Vec<(String, String)>>,
    transitions: Mutex<Vec<(String, u32)>>,
    field_updates: Mutex<Vec<(String, Value)>>,
    searches: AtomicUsize,
    fail_search: AtomicBool,
    fail_comment: AtomicBool,
    fail_update: AtomicBool,
    fail_transition: AtomicBool,
}

impl FakeTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue one search result batch; each search pops one batch, an empty
    /// queue searches empty.
    pub fn push_batch(&self, tickets: Vec<Ticket>) {
        self.batches.lock().unwrap().push_back(tickets);
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn comments(&self) -> Vec<(String, String)> {
        self.comments.lock().unwrap().clone()
    }

    pub fn transitions(&self) -> Vec<(String, u32)> {
        self.transitions.lock().unwrap().clone()
    }

    pub fn field_updates(&self) -> Vec<(String, Value)> {
        self.field_updates.lock().unwrap().clone()
    }

    pub fn fail_searches(&self) {
        self.fail_search.store(true, Ordering::SeqCst);
    }

    pub fn fail_comments(&self) {
        self.fail_comment.store(true, Ordering::SeqCst);
    }

    pub fn fail_field_updates(&self) {
        self.fail_update.store(true, Ordering::SeqCst);
    }

    pub fn fail_transitions(&self) {
        self.fail_transition.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TrackerSession for FakeTracker {
    async fn search(&self, _query: &str) -> Result<Vec<Ticket>, TrackerError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(TrackerError::Connection("search failed".to_string()));
        }
        Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn transition(&self, ticket_key: &str, transition_id: u32) -> Result<(), TrackerError> {
        if self.fail_transition.load(Ordering::SeqCst) {
            return Err(TrackerError::Api {
                status: 400,
                message: "transition not allowed".to_string(),
            });
        }
        self.transitions
            .lock()
            .unwrap()
            .push((ticket_key.to_string(), transition_id));
        Ok(())
    }

    async fn comment(&self, ticket_key: &str, body: &str) -> Result<(), TrackerError> {
        if self.fail_comment.load(Ordering::SeqCst) {
            return Err(TrackerError::Api {
                status: 500,
                message: "comment rejected".to_string(),
            });
        }
        self.comments
            .lock()
            .unwrap()
            .push((ticket_key.to_string(), body.to_string()));
        Ok(())
    }

    async fn update_fields(&self, ticket_key: &str, fields: Value) -> Result<(), TrackerError> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(TrackerError::Api {
                status: 400,
                message: "field update rejected".to_string(),
            });
        }
        self.field_updates
            .lock()
            .unwrap()
            .push((ticket_key.to_string(), fields));
        Ok(())
    }

    async fn fetch_attachment(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, TrackerError> {
        Err(TrackerError::Api {
            status: 404,
            message: format!("no attachment {}", attachment.id),
        })
    }
}

/// Connector handing out the same fake session, with switchable connect
/// failures.
pub struct FakeConnector {
    session: Arc<FakeTracker>,
    fail_next: AtomicBool,
}

impl FakeConnector {
    pub fn new(session: Arc<FakeTracker>) -> Self {
        Self {
            session,
            fail_next: AtomicBool::new(false),
        }
    }

    /// The next connect attempt fails; later ones succeed again.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TrackerConnector for FakeConnector {
    async fn connect(&self) -> Result<SharedSession, TrackerError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TrackerError::Connection(
                "no route to tracker".to_string(),
            ));
        }
        Ok(self.session.clone() as SharedSession)
    }
}
