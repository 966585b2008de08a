//! SMTP delivery of call listings.

use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::{Attachment as MailAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::info;

use crate::error::{InfraError, InfraResult};
use crate::ports::{MailMessage, Mailer};

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// Empty disables authentication.
    pub user: String,
    pub password: String,
    pub from: String,
    pub timeout: Duration,
}

pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> InfraResult<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| InfraError::Config(format!("SMTP_FROM: {e}")))?;

        // Plain relay for a local MTA, STARTTLS with credentials otherwise.
        let builder = if config.user.is_empty() {
            SmtpTransport::builder_dangerous(&config.host)
        } else {
            SmtpTransport::starttls_relay(&config.host)
                .map_err(|e| InfraError::Config(format!("SMTP_HOST: {e}")))?
                .credentials(Credentials::new(config.user.clone(), config.password.clone()))
        };

        let transport = builder
            .port(config.port)
            .timeout(Some(config.timeout))
            .build();

        Ok(Self { transport, from })
    }
}

/// Text body followed by one part per attachment.
pub fn build_message(from: &Mailbox, message: &MailMessage) -> InfraResult<Message> {
    let to: Mailbox = message
        .to
        .parse()
        .map_err(|e| InfraError::Mail(format!("invalid recipient '{}': {e}", message.to)))?;

    let mut body = MultiPart::mixed().singlepart(
        SinglePart::builder()
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone()),
    );
    for attachment in &message.attachments {
        let content_type = ContentType::parse(&attachment.content_type)
            .map_err(|e| InfraError::Mail(format!("content type '{}': {e}", attachment.content_type)))?;
        body = body.singlepart(
            MailAttachment::new(attachment.file_name.clone()).body(attachment.content.clone(), content_type),
        );
    }

    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(message.subject.as_str())
        .multipart(body)
        .map_err(|e| InfraError::Mail(format!("cannot build message: {e}")))
}

impl Mailer for SmtpMailer {
    fn send(&self, message: &MailMessage) -> InfraResult<()> {
        let email = build_message(&self.from, message)?;
        self.transport
            .send(&email)
            .map_err(|e| InfraError::Mail(e.to_string()))?;
        info!(to = %message.to, subject = %message.subject, "mail sent");
        Ok(())
    }
}
