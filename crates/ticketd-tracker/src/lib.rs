// REST issue-tracker client
//
// Implements the TrackerSession/TrackerConnector seams from ticketd-core
// over the tracker's JSON REST API. One session per polling cycle; the
// connector validates credentials up front so a bad configuration surfaces
// as a connect failure, not as a string of mysterious 401s mid-cycle.

mod client;

pub use client::{RestConnector, RestTracker, TrackerConfig};
