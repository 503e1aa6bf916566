// Polling service: the automation's long-lived loop
//
// Each cycle: reconnect to the tracker from scratch, gate on queue
// capacity, run the saved search, and dispatch one worker per accepted
// ticket. The loop never waits on a worker; the supervisor reaps them.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use ticketd_core::{
    BoxedHandler, DatabaseSettings, HandlerContext, HandlerRegistry, ProcessQueue, RelaySettings,
    SharedSession, Ticket, TrackerConnector, WorkRecord,
};

use crate::config::HandlerDefinitions;
use crate::providers;

/// Settings the polling loop runs with.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Saved search executed every cycle.
    pub search_query: String,
    /// Maximum number of in-flight workers.
    pub queue_capacity: usize,
    /// Pause between cycles; the first cycle runs immediately.
    pub poll_interval: Duration,
    /// Account tickets are reassigned to before processing.
    pub operator: String,
    pub mail_list_lookup_code: String,
    pub database: Option<DatabaseSettings>,
    pub relay: Option<RelaySettings>,
    /// Handler-definition file loaded during startup.
    pub handler_definitions: PathBuf,
}

/// Handle for stopping the service from outside the loop. The flag is
/// observed at the top of the next iteration; an iteration in flight runs
/// to completion first.
#[derive(Clone)]
pub struct StopHandle(watch::Sender<bool>);

impl StopHandle {
    pub fn stop(&self) {
        info!("stopping ticket service");
        let _ = self.0.send(true);
    }
}

pub struct PollingService {
    config: ServiceConfig,
    connector: Arc<dyn TrackerConnector>,
    registry: HandlerRegistry,
    queue: ProcessQueue,
    /// Rebuilt from scratch every cycle, never reused.
    connection: Option<SharedSession>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    /// The first cycle skips the poll pause for a fast initial pass.
    slept_once: bool,
}

impl PollingService {
    pub fn new(
        config: ServiceConfig,
        connector: Arc<dyn TrackerConnector>,
        queue: ProcessQueue,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            connector,
            registry: HandlerRegistry::new(),
            queue,
            connection: None,
            shutdown_tx,
            shutdown_rx,
            slept_once: false,
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.shutdown_tx.clone())
    }

    #[cfg(test)]
    pub(crate) fn registry_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.registry
    }

    /// One-time setup, then the loop. Returns Err only on fatal conditions:
    /// unreadable handler definitions, an unknown provider, or a handler
    /// whose required database is unreachable.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        info!("ticket service started");

        let definitions = HandlerDefinitions::load(&self.config.handler_definitions)?;
        providers::apply(&definitions, &mut self.registry)
            .context("handler registration failed")?;
        info!(
            providers = definitions.providers.len(),
            routes = definitions.routes.len(),
            "handlers registered"
        );

        self.service_loop().await
    }

    async fn service_loop(&mut self) -> anyhow::Result<()> {
        while !*self.shutdown_rx.borrow() {
            self.pace().await;
            if *self.shutdown_rx.borrow() {
                break;
            }
            self.run_iteration().await?;
        }
        info!("ticket service stopped");
        Ok(())
    }

    /// Heartbeat and pacing: every cycle after the first waits out the poll
    /// interval before touching the tracker. The pause is cut short by a
    /// stop signal.
    async fn pace(&mut self) {
        if self.slept_once {
            let mut shutdown = self.shutdown_rx.clone();
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        } else {
            self.slept_once = true;
        }
        info!("ticket service loop");
    }

    /// One polling cycle. Connectivity problems end the cycle early and are
    /// retried on the next one; only fatal handler-construction errors
    /// escape.
    pub(crate) async fn run_iteration(&mut self) -> anyhow::Result<()> {
        self.set_connection().await;
        let Some(connection) = self.connection.clone() else {
            return Ok(());
        };

        if self.queue_full() {
            return Ok(());
        }

        let tickets = match connection.search(&self.config.search_query).await {
            Ok(tickets) => tickets,
            Err(err) => {
                error!(error = %err, "ticket search failed");
                self.connection = None;
                return Ok(());
            }
        };
        if tickets.is_empty() {
            return Ok(());
        }

        for ticket in tickets {
            if self.queue_full() {
                // The rest of this batch is dropped; the next poll
                // re-fetches whatever is still open.
                break;
            }
            if self.queue.contains(&ticket.key) {
                info!(ticket = %ticket.key, "ticket already in flight; skipping");
                continue;
            }
            self.dispatch(connection.clone(), ticket).await?;
        }

        Ok(())
    }

    /// Rebuild the tracker session. Any failure leaves the service
    /// disconnected for this cycle.
    async fn set_connection(&mut self) {
        match self.connector.connect().await {
            Ok(session) => self.connection = Some(session),
            Err(err) => {
                error!(error = %err, "tracker connection error");
                self.connection = None;
            }
        }
    }

    fn queue_full(&self) -> bool {
        if self.queue.len() >= self.config.queue_capacity {
            info!(capacity = self.config.queue_capacity, "work queue is full");
            return true;
        }
        false
    }

    /// Resolve a handler for the ticket, reassign it to the operator,
    /// enqueue a record, and start the worker. The enqueue is optimistic:
    /// a failed start rolls it back and annotates the ticket.
    async fn dispatch(
        &mut self,
        connection: SharedSession,
        ticket: Ticket,
    ) -> anyhow::Result<()> {
        let Some(factory) = self.registry.resolve(&ticket.summary) else {
            return Ok(());
        };

        self.assign_operator(&connection, &ticket).await;

        let ticket_key = ticket.key.clone();
        let context = HandlerContext {
            ticket: ticket.clone(),
            database: self.config.database.clone(),
            tracker: Arc::clone(&connection),
            mail_list_lookup_code: self.config.mail_list_lookup_code.clone(),
            relay: self.config.relay.clone(),
        };

        self.queue.push(WorkRecord::starting(ticket));

        match factory(context).await {
            Ok(handler) => {
                let handle = spawn_worker(ticket_key.clone(), handler);
                self.queue.attach(&ticket_key, handle);
                info!(ticket = %ticket_key, "worker started");
            }
            Err(err) if err.is_fatal() => {
                self.queue.remove(&ticket_key);
                return Err(anyhow::Error::from(err)
                    .context(format!("fatal error starting worker for {ticket_key}")));
            }
            Err(err) => {
                error!(ticket = %ticket_key, error = %err, "worker start error");
                if let Err(comment_err) = connection
                    .comment(&ticket_key, &format!("Worker start error: {err}"))
                    .await
                {
                    warn!(
                        ticket = %ticket_key,
                        error = %comment_err,
                        "could not annotate the start failure"
                    );
                }
                self.queue.remove(&ticket_key);
            }
        }

        Ok(())
    }

    /// Reassign the ticket to the automation operator. Failure is
    /// tolerated: the ticket proceeds to processing regardless.
    async fn assign_operator(&self, connection: &SharedSession, ticket: &Ticket) {
        let fields = json!({ "assignee": { "name": self.config.operator } });
        if let Err(err) = connection.update_fields(&ticket.key, fields).await {
            error!(ticket = %ticket.key, error = %err, "ticket assignee error");
        }
    }
}

fn spawn_worker(ticket_key: String, mut handler: BoxedHandler) -> JoinHandle<()> {
    tokio::spawn(async move {
        let kind = handler.kind();
        match handler.run().await {
            Ok(()) => info!(ticket = %ticket_key, kind, "worker finished"),
            Err(err) => {
                error!(ticket = %ticket_key, kind, error = %err, "worker ended abnormally")
            }
        }
    })
}
