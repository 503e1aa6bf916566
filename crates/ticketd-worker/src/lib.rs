// ticketd worker: the polling service, the supervisor that reaps finished
// workers, and the shipped ticket handlers

pub mod config;
pub mod handlers;
pub mod providers;
pub mod service;
pub mod supervisor;

#[cfg(test)]
mod test_support;

pub use config::{HandlerDefinitions, WorkerConfig};
pub use service::{PollingService, ServiceConfig, StopHandle};
pub use supervisor::Supervisor;
