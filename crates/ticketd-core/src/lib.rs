// Core contracts for the ticketd automation worker
//
// This crate defines what the polling service expects from its collaborators
// and the pieces the worker binary wires together:
// - the Ticket model and workflow transitions
// - the TrackerSession/TrackerConnector seam the REST client implements
// - the handler contract (HandlerSpec/TicketHandler) and the registry that
//   resolves ticket summaries to handler constructors
// - the shared ProcessQueue of in-flight workers

pub mod error;
pub mod handler;
pub mod queue;
pub mod registry;
pub mod telemetry;
pub mod ticket;
pub mod tracker;
pub mod transition;

pub use error::HandlerError;
pub use handler::{
    BoxedHandler, DatabaseSettings, HandlerContext, HandlerFactory, HandlerSpec, RelaySettings,
    TicketHandler,
};
pub use queue::{ProcessQueue, WorkRecord, WorkStatus};
pub use registry::HandlerRegistry;
pub use ticket::{AttachmentRef, Ticket};
pub use tracker::{SharedSession, TrackerConnector, TrackerError, TrackerSession};
pub use transition::Transition;
