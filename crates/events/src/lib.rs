//! Outbound notifications.
//!
//! The worker sends mail through the [`Mailer`] trait: [`SmtpMailer`] when
//! SMTP is configured, [`LogMailer`] otherwise.

pub mod mailer;
pub mod smtp;
pub mod templates;

pub use mailer::{EmailMessage, LogMailer, MailError, Mailer};
pub use smtp::{MailConfig, SmtpMailer};
