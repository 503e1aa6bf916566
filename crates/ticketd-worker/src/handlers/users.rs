// User-administration ticket kinds
//
// Routing targets exist for these requests so they get picked up and
// assigned, but the automated steps are placeholders: runs log and leave
// the ticket untouched for a human to finish.

use async_trait::async_trait;
use tracing::warn;

use ticketd_core::{HandlerContext, HandlerError, HandlerRegistry, HandlerSpec, TicketHandler};

pub fn register(registry: &mut HandlerRegistry) {
    registry.register::<CreateUserHandler>();
    registry.register::<PasswordResetHandler>();
}

pub struct CreateUserHandler {
    ctx: HandlerContext,
}

#[async_trait]
impl HandlerSpec for CreateUserHandler {
    const KIND: &'static str = "user_create";

    async fn build(ctx: HandlerContext) -> Result<Self, HandlerError> {
        Ok(Self { ctx })
    }
}

#[async_trait]
impl TicketHandler for CreateUserHandler {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    async fn run(&mut self) -> Result<(), HandlerError> {
        warn!(
            ticket = %self.ctx.ticket.key,
            "user creation is not automated yet; leaving ticket untouched"
        );
        Ok(())
    }
}

pub struct PasswordResetHandler {
    ctx: HandlerContext,
}

#[async_trait]
impl HandlerSpec for PasswordResetHandler {
    const KIND: &'static str = "password_reset";

    async fn build(ctx: HandlerContext) -> Result<Self, HandlerError> {
        Ok(Self { ctx })
    }
}

#[async_trait]
impl TicketHandler for PasswordResetHandler {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    async fn run(&mut self) -> Result<(), HandlerError> {
        warn!(
            ticket = %self.ctx.ticket.key,
            "password reset is not automated yet; leaving ticket untouched"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeTracker;
    use ticketd_core::Ticket;

    #[tokio::test]
    async fn placeholder_handlers_build_and_finish_cleanly() {
        let tracker = FakeTracker::new();
        let ctx = HandlerContext {
            ticket: Ticket::new("OPS-5", "Password reset"),
            database: None,
            tracker: tracker.clone(),
            mail_list_lookup_code: "OPS_ONCALL".to_string(),
            relay: None,
        };

        let mut handler = PasswordResetHandler::build(ctx).await.expect("builds");
        handler.run().await.expect("runs");

        // The ticket is left exactly as it was.
        assert!(tracker.comments().is_empty());
        assert!(tracker.transitions().is_empty());
    }
}
