//! Outgoing registration emails.
//!
//! Handlers only enqueue a [`Notification`]; the [`NotificationDispatcher`]
//! task renders, addresses and sends the messages off the request path.

pub mod dispatcher;
pub mod mailer;

pub use dispatcher::{Notification, NotificationDispatcher, Notifier};
pub use mailer::{Mailer, SmtpMailer};
