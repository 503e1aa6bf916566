// Handler contract: the capability set every ticket-type automation implements
//
// A handler is constructed from a HandlerContext and runs as its own task.
// Construction is async so handlers that need storage can connect eagerly;
// a required database that cannot be reached is fatal for the process.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::error;

use crate::error::HandlerError;
use crate::ticket::Ticket;
use crate::tracker::{SharedSession, TrackerError};
use crate::transition::Transition;

/// Connection settings for the relational database handlers may require.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl DatabaseSettings {
    /// Connection URL in the form sqlx expects.
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// SMTP relay settings for handlers that notify by mail.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub host: String,
    pub port: u16,
    /// Address notifications are sent from.
    pub sender: String,
}

/// Everything a handler is constructed from: the ticket it owns, the
/// session it talks to the tracker with, and the collaborator settings it
/// may need. Logging is ambient via tracing.
#[derive(Clone)]
pub struct HandlerContext {
    pub ticket: Ticket,
    pub database: Option<DatabaseSettings>,
    pub tracker: SharedSession,
    pub mail_list_lookup_code: String,
    pub relay: Option<RelaySettings>,
}

impl HandlerContext {
    /// Request a workflow transition on the owned ticket.
    ///
    /// Transition failures leave the ticket in its prior tracker state; they
    /// are logged and swallowed so the run continues. No retry.
    pub async fn set_status(&self, transition: Transition) {
        if let Err(err) = self
            .tracker
            .transition(&self.ticket.key, transition.id())
            .await
        {
            error!(
                ticket = %self.ticket.key,
                %transition,
                error = %err,
                "status transition failed"
            );
        }
    }

    /// Append a comment to the owned ticket.
    ///
    /// Unlike transitions, comment failures propagate and end the worker
    /// abnormally: a run whose outcome cannot be recorded must not be
    /// reported as clean.
    pub async fn include_comment(&self, body: &str) -> Result<(), TrackerError> {
        self.tracker.comment(&self.ticket.key, body).await
    }
}

/// A unit of ticket work, running on its own task.
#[async_trait]
pub trait TicketHandler: Send {
    /// The registry kind this worker was resolved from.
    fn kind(&self) -> &'static str;

    /// Domain steps for one ticket.
    async fn run(&mut self) -> Result<(), HandlerError>;
}

pub type BoxedHandler = Box<dyn TicketHandler>;

/// Constructor contract a registrable handler satisfies.
#[async_trait]
pub trait HandlerSpec: TicketHandler + Sized + 'static {
    /// Registry key for this handler type.
    const KIND: &'static str;

    async fn build(ctx: HandlerContext) -> Result<Self, HandlerError>;
}

pub type HandlerFuture = BoxFuture<'static, Result<BoxedHandler, HandlerError>>;

/// Type-erased constructor stored in the registry.
pub type HandlerFactory = Arc<dyn Fn(HandlerContext) -> HandlerFuture + Send + Sync>;
