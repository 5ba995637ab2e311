use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    config::EventConfig,
    db::{repositories::models::registration::Registration, Role, SessionRepository},
    notifications::mailer::{Mailer, OutgoingEmail},
    templates::emails,
};

const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Registered(Registration),
}

/// Sending half, handed to request handlers.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queues a notification. Only fails once the dispatcher has stopped.
    pub fn notify(&self, notification: Notification) -> Result<(), Notification> {
        self.tx.send(notification).map_err(|e| e.0)
    }
}

pub struct NotificationDispatcher<R, M> {
    rx: mpsc::UnboundedReceiver<Notification>,
    repository: R,
    mailer: M,
    event: EventConfig,
    send_attempts: u32,
    retry_delay: Duration,
}

impl<R, M> NotificationDispatcher<R, M>
where
    R: SessionRepository,
    M: Mailer,
{
    pub fn new(
        rx: mpsc::UnboundedReceiver<Notification>,
        repository: R,
        mailer: M,
        event: EventConfig,
        send_attempts: u32,
    ) -> Self {
        Self {
            rx,
            repository,
            mailer,
            event,
            send_attempts: send_attempts.max(1),
            retry_delay: RETRY_BASE_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Runs until every `Notifier` has been dropped and the queue is drained.
    pub async fn run(mut self) {
        debug!("Starting notification dispatcher");

        while let Some(notification) = self.rx.recv().await {
            self.dispatch(notification).await;
        }

        debug!("Notification dispatcher stopped");
    }

    async fn dispatch(&self, notification: Notification) {
        match notification {
            Notification::Registered(registration) => self.registered(&registration).await,
        }
    }

    async fn registered(&self, registration: &Registration) {
        let registrant = OutgoingEmail {
            to: vec![registration.email_address.clone()],
            email: emails::registrant(&self.event, registration),
        };

        let managers = match self.repository.get_role_emails(Role::Manager).await {
            Ok(recipients) if recipients.is_empty() => {
                warn!("No managers to notify about registration {}", registration.id);
                None
            }
            Ok(recipients) => Some(OutgoingEmail {
                to: recipients,
                email: emails::managers(&self.event, registration),
            }),
            Err(e) => {
                error!("Unable to query for managers: {}", e);
                None
            }
        };

        let sent = match &managers {
            Some(managers) => {
                let (a, b) =
                    futures::future::join(self.send(&registrant), self.send(managers)).await;
                (a, Some(b))
            }
            None => (self.send(&registrant).await, None),
        };

        if sent.0 {
            info!(
                "Sent registration email to {} ({})",
                registration.full_name, registration.email_address
            );
        }
        if sent.1 == Some(true) {
            info!(
                "Sent emails to managers regarding registration for {} ({})",
                registration.full_name, registration.email_address
            );
        }
    }

    /// Sends with linear backoff; returns whether it went out.
    async fn send(&self, message: &OutgoingEmail) -> bool {
        for attempt in 1..=self.send_attempts {
            match self.mailer.send(message).await {
                Ok(()) => return true,
                Err(e) if e.is_permanent() => {
                    error!(
                        "Not sending email \"{}\" to {:?}: {}",
                        message.email.subject, message.to, e
                    );
                    return false;
                }
                Err(e) if attempt < self.send_attempts => {
                    warn!(
                        "Error sending email \"{}\" (attempt {}/{}): {}",
                        message.email.subject, attempt, self.send_attempts, e
                    );
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
                Err(e) => {
                    error!(
                        "Giving up on email \"{}\" to {:?}: {}",
                        message.email.subject, message.to, e
                    );
                }
            }
        }

        false
    }
}
