// Outbound mail: multipart message builder + SMTP relay delivery
//
// Used only by handlers that notify operators on domain errors. Delivery
// goes through an internal relay with no authentication; the relay host and
// port come from configuration.

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::info;

use ticketd_core::RelaySettings;

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("invalid content type: {0}")]
    ContentType(String),

    #[error("message has no recipients")]
    NoRecipients,

    #[error("failed to send message: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Builds a multipart message: text or html body plus optional attachments.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    subject: String,
    body: String,
    html: bool,
    sender: String,
    recipients: Vec<String>,
    bcc: Vec<String>,
    attachments: Vec<(String, Vec<u8>)>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self.html = false;
        self
    }

    pub fn html_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self.html = true;
        self
    }

    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    pub fn recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipients.push(recipient.into());
        self
    }

    pub fn recipients<I, S>(mut self, recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recipients.extend(recipients.into_iter().map(Into::into));
        self
    }

    pub fn bcc(mut self, recipient: impl Into<String>) -> Self {
        self.bcc.push(recipient.into());
        self
    }

    pub fn attachment(mut self, filename: impl Into<String>, content: Vec<u8>) -> Self {
        self.attachments.push((filename.into(), content));
        self
    }

    pub fn build(self) -> Result<Message, MailerError> {
        if self.recipients.is_empty() && self.bcc.is_empty() {
            return Err(MailerError::NoRecipients);
        }

        let mut builder = Message::builder()
            .from(self.sender.parse::<Mailbox>()?)
            .subject(self.subject);
        for recipient in &self.recipients {
            builder = builder.to(recipient.parse::<Mailbox>()?);
        }
        for recipient in &self.bcc {
            builder = builder.bcc(recipient.parse::<Mailbox>()?);
        }

        let content_type = if self.html {
            ContentType::TEXT_HTML
        } else {
            ContentType::TEXT_PLAIN
        };
        let text = SinglePart::builder()
            .header(content_type)
            .body(self.body);

        let mut multipart = MultiPart::mixed().singlepart(text);
        for (filename, content) in self.attachments {
            let content_type = ContentType::parse("application/octet-stream")
                .map_err(|err| MailerError::ContentType(err.to_string()))?;
            multipart = multipart.singlepart(Attachment::new(filename).body(content, content_type));
        }

        Ok(builder.multipart(multipart)?)
    }
}

/// Delivers messages over the configured relay.
pub struct Mailer {
    host: String,
    port: u16,
}

impl Mailer {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn from_settings(settings: &RelaySettings) -> Self {
        Self::new(settings.host.clone(), settings.port)
    }

    /// Deliver one message. The relay accepts unauthenticated submissions
    /// from inside the network, so no credentials are involved.
    pub async fn send(&self, message: Message) -> Result<(), MailerError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.host)
            .port(self.port)
            .build();
        transport.send(message).await?;
        info!(relay = %self.host, port = self.port, "notification mail delivered");
        Ok(())
    }
}
