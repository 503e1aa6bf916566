// Provider registration table
//
// The startup-time replacement for loading handler modules by name: each
// provider is a function that registers its handler kinds. The
// handler-definition file selects providers; an unknown name is a fatal
// startup error, just like a failed module import used to be.

use anyhow::{bail, Result};

use ticketd_core::HandlerRegistry;

use crate::config::HandlerDefinitions;
use crate::handlers;

type ProviderFn = fn(&mut HandlerRegistry);

pub const PROVIDERS: &[(&str, ProviderFn)] = &[
    ("credit_hold", handlers::credit_hold::register),
    ("price_list", handlers::price_list::register),
    ("users", handlers::users::register),
];

/// Populate the registry from the definition file: enable each listed
/// provider, then install the summary routes.
pub fn apply(definitions: &HandlerDefinitions, registry: &mut HandlerRegistry) -> Result<()> {
    for name in &definitions.providers {
        let Some(entry) = PROVIDERS.iter().find(|entry| entry.0 == name.as_str()) else {
            bail!("unknown handler provider: {name}");
        };
        (entry.1)(registry);
    }
    for (summary, kind) in &definitions.routes {
        registry.add_route(summary, kind);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn apply_registers_the_selected_providers() {
        let definitions = HandlerDefinitions {
            providers: vec!["credit_hold".to_string(), "users".to_string()],
            routes: HashMap::from([(
                "Credit hold request".to_string(),
                "credit_hold".to_string(),
            )]),
        };

        let mut registry = HandlerRegistry::new();
        apply(&definitions, &mut registry).expect("providers apply");

        assert!(registry.contains("credit_hold"));
        assert!(registry.contains("user_create"));
        assert!(registry.contains("password_reset"));
        assert!(!registry.contains("price_list"));
    }

    #[test]
    fn unknown_provider_is_fatal() {
        let definitions = HandlerDefinitions {
            providers: vec!["spreadsheet_magic".to_string()],
            routes: HashMap::new(),
        };

        let mut registry = HandlerRegistry::new();
        let err = apply(&definitions, &mut registry).expect_err("must fail");
        assert!(err.to_string().contains("spreadsheet_magic"));
    }
}
