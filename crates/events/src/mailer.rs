//! Mail sending abstraction.

use async_trait::async_trait;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// Relay unreachable, rejected credentials, or a refused envelope.
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build email: {0}")]
    Build(String),
}

impl MailError {
    /// Address errors will fail the same way on every attempt.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Address(_))
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A plain-text email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

// ---------------------------------------------------------------------------
// Mailer
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

/// Writes messages to the log instead of sending them.
///
/// Used when `SMTP_HOST` is unset so local environments still surface
/// verification links.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.body,
            "Email not sent (SMTP not configured)",
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        let msg = EmailMessage {
            to: "bob@example.com".into(),
            subject: "hi".into(),
            body: "hello".into(),
        };
        assert!(LogMailer.send(&msg).await.is_ok());
    }

    #[test]
    fn address_errors_are_permanent() {
        let addr_err: Result<lettre::Address, _> = "not-an-email".parse();
        let err = MailError::Address(addr_err.unwrap_err());
        assert!(err.is_permanent());
        assert!(err.to_string().contains("Email address parse error"));
        assert!(!MailError::Build("x".into()).is_permanent());
    }
}
