//! Message templates.

use crate::mailer::EmailMessage;

pub const VERIFY_EMAIL_SUBJECT: &str = "Welcome to Tessera";

/// Link the user follows to verify their address.
pub fn verification_link(base_url: &str, email_id: i64, secret_code: &str) -> String {
    format!("{base_url}?email_id={email_id}&secret_code={secret_code}")
}

pub fn verify_email(to: &str, full_name: &str, link: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: VERIFY_EMAIL_SUBJECT.to_string(),
        body: format!(
            "Hello {full_name},\n\n\
             Thank you for registering with us!\n\
             Please verify your email address by opening the link below:\n\n\
             {link}\n\n\
             The link expires in 15 minutes.\n"
        ),
    }
}
