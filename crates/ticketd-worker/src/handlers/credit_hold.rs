// Credit-hold maintenance: include or exclude a customer on the hold list
//
// The ticket carries the customer code and the requested operation. The
// handler walks the usual Take -> AnalyzeProblem -> WorkInLocalSolution
// transitions, applies the change to the code-lookup table, comments the
// outcome, and resolves. Database failures are reported on the ticket and
// by mail to the operator list.

use async_trait::async_trait;
use tracing::{error, warn};

use ticketd_core::{
    HandlerContext, HandlerError, HandlerRegistry, HandlerSpec, TicketHandler, Transition,
};
use ticketd_mailer::{Mailer, MessageBuilder};
use ticketd_storage::{Database, StorageError};

const LOOKUP_CLASS: &str = "CREDIT_HOLD";
const LOOKUP_DESCRIPTION: &str = "Customer with credit on hold";
const ERROR_COMMENT: &str = "Error updating the credit hold list";

pub fn register(registry: &mut HandlerRegistry) {
    registry.register::<CreditHoldHandler>();
}

/// What a run reports back on the ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Created,
    Updated,
    AlreadyIncluded,
    AlreadyExcluded,
}

impl Outcome {
    fn message(self) -> &'static str {
        match self {
            Outcome::Created => "Customer added to the credit hold list",
            Outcome::Updated => "Customer updated on the credit hold list",
            Outcome::AlreadyIncluded => "Customer is already on the credit hold list",
            Outcome::AlreadyExcluded => "Customer is not on the credit hold list",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Action {
    Insert,
    Update,
    Keep(Outcome),
}

/// Decide the table change from the current flag and the requested one.
/// A customer absent from the list is inserted on include and left alone
/// on exclude.
fn decide(current: Option<&str>, requested: &str) -> Action {
    match current {
        None if requested == "Y" => Action::Insert,
        None => Action::Keep(Outcome::AlreadyExcluded),
        Some(flag) if flag == requested => Action::Keep(if requested == "Y" {
            Outcome::AlreadyIncluded
        } else {
            Outcome::AlreadyExcluded
        }),
        Some(_) => Action::Update,
    }
}

pub struct CreditHoldHandler {
    ctx: HandlerContext,
    database: Database,
}

#[async_trait]
impl HandlerSpec for CreditHoldHandler {
    const KIND: &'static str = "credit_hold";

    async fn build(ctx: HandlerContext) -> Result<Self, HandlerError> {
        let settings = ctx
            .database
            .as_ref()
            .ok_or_else(|| HandlerError::database("credit hold handler requires a database"))?;
        let database = Database::connect(settings)
            .await
            .map_err(|err| HandlerError::database(err.to_string()))?;
        Ok(Self { ctx, database })
    }
}

#[async_trait]
impl TicketHandler for CreditHoldHandler {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    async fn run(&mut self) -> Result<(), HandlerError> {
        self.ctx.set_status(Transition::Take).await;
        self.ctx.set_status(Transition::AnalyzeProblem).await;
        self.ctx.set_status(Transition::WorkInLocalSolution).await;

        let ticket = self.ctx.ticket.clone();
        let customer_code = ticket
            .field_str("customer_code")
            .ok_or_else(|| HandlerError::missing_field(&ticket.key, "customer_code"))?
            .to_string();
        let operation = ticket
            .field_str("operation")
            .ok_or_else(|| HandlerError::missing_field(&ticket.key, "operation"))?;
        let requested = if operation.eq_ignore_ascii_case("include") {
            "Y"
        } else {
            "N"
        };

        match self.apply(&customer_code, requested).await {
            Ok(outcome) => {
                self.ctx.include_comment(outcome.message()).await?;
                self.ctx
                    .include_comment("Credit hold processed, ticket resolved.")
                    .await?;
                self.ctx.set_status(Transition::Resolve).await;
            }
            Err(err) => {
                error!(
                    ticket = %ticket.key,
                    customer = %customer_code,
                    error = %err,
                    "credit hold update failed"
                );
                self.ctx.include_comment(ERROR_COMMENT).await?;
                self.notify_operators().await;
            }
        }

        Ok(())
    }
}

impl CreditHoldHandler {
    async fn apply(&mut self, customer_code: &str, requested: &str) -> Result<Outcome, StorageError> {
        let current = self
            .database
            .code_lookup_flag(LOOKUP_CLASS, customer_code)
            .await?;

        match decide(current.as_deref(), requested) {
            Action::Insert => {
                self.database
                    .insert_code_lookup(LOOKUP_CLASS, customer_code, LOOKUP_DESCRIPTION, requested)
                    .await?;
                Ok(Outcome::Created)
            }
            Action::Update => {
                self.database
                    .update_code_lookup_flag(LOOKUP_CLASS, customer_code, requested)
                    .await?;
                Ok(Outcome::Updated)
            }
            Action::Keep(outcome) => Ok(outcome),
        }
    }

    /// Domain errors also go to the operator mail list. Notification is
    /// best effort: a missing relay, an empty list, or a delivery failure
    /// is logged and the run continues.
    async fn notify_operators(&mut self) {
        let Some(relay) = self.ctx.relay.clone() else {
            warn!("no mail relay configured; skipping error notification");
            return;
        };

        let recipients = match self
            .database
            .mail_list(&self.ctx.mail_list_lookup_code)
            .await
        {
            Ok(list) if !list.is_empty() => list,
            Ok(_) => {
                warn!(
                    code = %self.ctx.mail_list_lookup_code,
                    "operator mail list is empty; skipping error notification"
                );
                return;
            }
            Err(err) => {
                error!(error = %err, "could not load the operator mail list");
                return;
            }
        };

        let message = MessageBuilder::new()
            .sender(relay.sender.clone())
            .recipients(recipients)
            .subject(format!("[tracker] handler error on {}", self.ctx.ticket.key))
            .body(ERROR_COMMENT)
            .build();

        match message {
            Ok(message) => {
                if let Err(err) = Mailer::from_settings(&relay).send(message).await {
                    error!(error = %err, "error notification could not be delivered");
                }
            }
            Err(err) => error!(error = %err, "error notification could not be built"),
        }
    }
}
