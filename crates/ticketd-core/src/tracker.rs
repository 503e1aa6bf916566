// The seam between the orchestration core and the issue tracker
//
// The core never talks HTTP itself; it drives these traits. The REST
// implementation lives in ticketd-tracker, tests use in-memory fakes.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::ticket::{AttachmentRef, Ticket};

pub type SharedSession = Arc<dyn TrackerSession>;

/// Errors from the tracker collaborator.
///
/// The polling service maps every variant to "connection unavailable this
/// cycle"; handlers distinguish transition failures (swallowed) from
/// comment failures (propagated).
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracker connection failed: {0}")]
    Connection(String),

    #[error("tracker rejected the configured credentials")]
    Auth,

    #[error("tracker returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed tracker response: {0}")]
    Malformed(String),
}

/// One authenticated conversation with the tracker.
#[async_trait]
pub trait TrackerSession: Send + Sync {
    /// Run the saved search; tickets come back in tracker result order.
    async fn search(&self, query: &str) -> Result<Vec<Ticket>, TrackerError>;

    /// Request the workflow transition with the given id on a ticket.
    async fn transition(&self, ticket_key: &str, transition_id: u32) -> Result<(), TrackerError>;

    /// Append a comment to a ticket.
    async fn comment(&self, ticket_key: &str, body: &str) -> Result<(), TrackerError>;

    /// Update issue fields, e.g. reassign to the automation operator.
    async fn update_fields(&self, ticket_key: &str, fields: Value) -> Result<(), TrackerError>;

    /// Download an attachment's content.
    async fn fetch_attachment(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, TrackerError>;
}

/// Builds a fresh session for each polling cycle.
///
/// The service deliberately reconnects every iteration instead of holding a
/// session open, so staleness never accumulates; the connector is the seam
/// that makes that testable.
#[async_trait]
pub trait TrackerConnector: Send + Sync {
    async fn connect(&self) -> Result<SharedSession, TrackerError>;
}
