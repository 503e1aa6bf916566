// Configuration: environment-driven settings plus the handler-definition file

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use ticketd_core::{DatabaseSettings, RelaySettings};
use ticketd_tracker::TrackerConfig;

use crate::service::ServiceConfig;

const DEFAULT_QUEUE_CAPACITY: usize = 10;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
const DEFAULT_SUPERVISOR_SCAN_SECS: u64 = 1;
const DEFAULT_HANDLER_DEFINITIONS: &str = "config/handlers.json";

/// Everything the worker binary needs, read from the environment.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Unique identity for this worker instance, for log correlation.
    pub worker_id: String,
    pub tracker: TrackerConfig,
    pub service: ServiceConfig,
    /// How often the supervisor scans for finished workers.
    pub supervisor_scan: Duration,
}

impl WorkerConfig {
    /// Read configuration from environment variables (after dotenvy).
    ///
    /// Required: `TICKETD_TRACKER_URL`, `TICKETD_TRACKER_USER`,
    /// `TICKETD_TRACKER_TOKEN`, `TICKETD_SEARCH_QUERY`,
    /// `TICKETD_MAIL_LIST_CODE`. Database settings activate when
    /// `TICKETD_DB_HOST` is set, the mail relay when `TICKETD_SMTP_HOST`
    /// is set.
    pub fn from_env() -> Result<Self> {
        let tracker = TrackerConfig::new(
            require("TICKETD_TRACKER_URL")?,
            require("TICKETD_TRACKER_USER")?,
            require("TICKETD_TRACKER_TOKEN")?,
        );

        let database = match std::env::var("TICKETD_DB_HOST") {
            Ok(host) => Some(DatabaseSettings {
                host,
                port: parse_var("TICKETD_DB_PORT", 5432)?,
                user: require("TICKETD_DB_USER")?,
                password: require("TICKETD_DB_PASSWORD")?,
                database: require("TICKETD_DB_NAME")?,
            }),
            Err(_) => None,
        };

        let relay = match std::env::var("TICKETD_SMTP_HOST") {
            Ok(host) => Some(RelaySettings {
                host,
                port: parse_var("TICKETD_SMTP_PORT", 25)?,
                sender: require("TICKETD_SMTP_SENDER")?,
            }),
            Err(_) => None,
        };

        // Tickets are reassigned to the tracker account unless a dedicated
        // operator identity is configured.
        let operator =
            std::env::var("TICKETD_OPERATOR").unwrap_or_else(|_| tracker.user.clone());

        let service = ServiceConfig {
            search_query: require("TICKETD_SEARCH_QUERY")?,
            queue_capacity: parse_var("TICKETD_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?,
            poll_interval: Duration::from_secs(parse_var(
                "TICKETD_POLL_INTERVAL_SECS",
                DEFAULT_POLL_INTERVAL_SECS,
            )?),
            operator,
            mail_list_lookup_code: require("TICKETD_MAIL_LIST_CODE")?,
            database,
            relay,
            handler_definitions: std::env::var("TICKETD_HANDLER_DEFINITIONS")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_HANDLER_DEFINITIONS)),
        };

        Ok(Self {
            worker_id: std::env::var("TICKETD_WORKER_ID")
                .unwrap_or_else(|_| format!("ticketd-{}", uuid::Uuid::now_v7())),
            tracker,
            service,
            supervisor_scan: Duration::from_secs(parse_var(
                "TICKETD_SUPERVISOR_SCAN_SECS",
                DEFAULT_SUPERVISOR_SCAN_SECS,
            )?),
        })
    }
}

fn require(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("missing required environment variable {name}"))
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("invalid value for {name}: {raw}")),
        Err(_) => Ok(default),
    }
}

/// The handler-definition file: which providers to enable, and how ticket
/// summaries route to handler kinds. Routing stays configuration data so it
/// can change without touching the provider table.
#[derive(Debug, Clone, Deserialize)]
pub struct HandlerDefinitions {
    pub providers: Vec<String>,
    #[serde(default)]
    pub routes: HashMap<String, String>,
}

impl HandlerDefinitions {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read handler definitions at {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid handler definitions at {}", path.display()))
    }
}
