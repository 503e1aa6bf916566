// Ticket model shared by the tracker client and the handlers

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reference to a file attached to a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub id: String,
    pub filename: String,
}

/// A unit of work fetched from the issue tracker.
///
/// Routing is keyed on the summary text; everything a handler may need
/// beyond that travels in the raw field map so the core does not have to
/// know each ticket type's custom fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    /// Tracker-unique issue key, e.g. "OPS-1423".
    pub key: String,
    pub summary: String,
    /// Custom fields as returned by the tracker.
    #[serde(default)]
    pub fields: serde_json::Map<String, Value>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

impl Ticket {
    pub fn new(key: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            summary: summary.into(),
            fields: serde_json::Map::new(),
            attachments: Vec::new(),
        }
    }

    /// String value of a custom field, if present and textual.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn first_attachment(&self) -> Option<&AttachmentRef> {
        self.attachments.first()
    }
}
