use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{config::MailConfig, templates::emails::RenderedEmail};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address {0}")]
    Address(String),

    #[error("failed to build email: {0}")]
    Build(String),

    #[error("failed to send email: {0}")]
    Transport(String),
}

impl MailError {
    /// Errors that sending the same message again cannot fix.
    pub fn is_permanent(&self) -> bool {
        matches!(self, MailError::Address(_) | MailError::Build(_))
    }
}

/// One message to a list of recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: Vec<String>,
    pub email: RenderedEmail,
}

pub trait Mailer
where
    Self: Clone,
{
    async fn send(&self, message: &OutgoingEmail) -> Result<(), MailError>;
}

#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|_| MailError::Address(config.from.clone()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| MailError::Transport(format!("SMTP relay error: {e}")))?
            .port(config.smtp_port);

        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

/// Parses the recipient list, dropping entries that are not valid addresses.
///
/// Fails only when nothing deliverable is left.
pub fn recipients(to: &[String]) -> Result<Vec<Mailbox>, MailError> {
    let mailboxes: Vec<Mailbox> = to
        .iter()
        .filter_map(|to| match to.parse::<Mailbox>() {
            Ok(mailbox) => Some(mailbox),
            Err(e) => {
                warn!("[Mail] Skipping invalid recipient {:?}: {}", to, e);
                None
            }
        })
        .collect();

    if mailboxes.is_empty() {
        return Err(MailError::Address(to.join(", ")));
    }

    Ok(mailboxes)
}

fn build_message(from: &Mailbox, message: &OutgoingEmail) -> Result<Message, MailError> {
    let mut builder = Message::builder()
        .from(from.clone())
        .subject(message.email.subject.clone());

    for mailbox in recipients(&message.to)? {
        builder = builder.to(mailbox);
    }

    builder
        .multipart(MultiPart::alternative_plain_html(
            message.email.text.clone(),
            message.email.html.clone(),
        ))
        .map_err(|e| MailError::Build(e.to_string()))
}

impl Mailer for SmtpMailer {
    async fn send(&self, message: &OutgoingEmail) -> Result<(), MailError> {
        let email = build_message(&self.from, message)?;

        self.transport
            .send(email)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        debug!("[Mail] Sent \"{}\" to {:?}", message.email.subject, message.to);

        Ok(())
    }
}
