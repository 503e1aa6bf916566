// Handler registry: resolves ticket summaries to handler constructors
//
// Resolution is two-level on purpose: summary -> kind comes from the
// handler-definition file (editable configuration data), kind -> factory
// comes from provider registration (code). Unresolvable summaries are
// negatively cached so a backlog of unhandled ticket types logs once, not
// once per poll.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::error;

use crate::handler::{BoxedHandler, HandlerFactory, HandlerSpec};

#[derive(Default)]
pub struct HandlerRegistry {
    /// summary text -> handler kind, from configuration.
    routes: HashMap<String, String>,
    /// handler kind -> constructor, from provider registration.
    factories: HashMap<String, HandlerFactory>,
    /// summaries known to resolve to nothing.
    not_found: HashSet<String>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_routes(routes: HashMap<String, String>) -> Self {
        Self {
            routes,
            ..Self::default()
        }
    }

    /// Route a summary text to a handler kind.
    pub fn add_route(&mut self, summary: impl Into<String>, kind: impl Into<String>) {
        self.routes.insert(summary.into(), kind.into());
    }

    /// Register a handler type under its kind constant.
    pub fn register<H: HandlerSpec>(&mut self) {
        let factory: HandlerFactory = Arc::new(|ctx| {
            Box::pin(async move { H::build(ctx).await.map(|h| Box::new(h) as BoxedHandler) })
        });
        self.factories.insert(H::KIND.to_string(), factory);
    }

    /// Remove a registered kind; reports whether it was present.
    pub fn unregister(&mut self, kind: &str) -> bool {
        self.factories.remove(kind).is_some()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Resolve a constructor for a ticket summary.
    ///
    /// A miss on either level logs one error, remembers the summary, and
    /// returns None; repeat lookups for the same summary return None
    /// without logging again.
    pub fn resolve(&mut self, summary: &str) -> Option<HandlerFactory> {
        if self.not_found.contains(summary) {
            return None;
        }

        let factory = self
            .routes
            .get(summary)
            .and_then(|kind| self.factories.get(kind));

        match factory {
            Some(factory) => Some(Arc::clone(factory)),
            None => {
                error!(summary, "no handler registered for ticket type");
                self.not_found.insert(summary.to_string());
                None
            }
        }
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("routes", &self.routes)
            .field("kinds", &self.factories.keys().collect::<Vec<_>>())
            .field("not_found", &self.not_found)
            .finish()
    }
}
