//! Handler for [`TASK_SEND_VERIFY_EMAIL`].
//!
//! Issues a verification code for the user and mails them a link carrying
//! the code id and secret. Codes are keyed by the task key, so a redelivered
//! task resends the code it already issued instead of minting another one.

use std::sync::Arc;

use async_trait::async_trait;
use tessera_core::secret::generate_secret_code;
use tessera_core::tasks::{PayloadSendVerifyEmail, TASK_SEND_VERIFY_EMAIL};
use tessera_db::models::task::Task;
use tessera_db::models::verification_code::CreateVerificationCode;
use tessera_events::{templates, Mailer};
use tessera_service::ports::{UserStore, VerificationStore};

use crate::handler::{TaskError, TaskHandler};

pub struct SendVerifyEmailHandler {
    users: Arc<dyn UserStore>,
    codes: Arc<dyn VerificationStore>,
    mailer: Arc<dyn Mailer>,
    verify_url: String,
}

impl SendVerifyEmailHandler {
    pub fn new(
        users: Arc<dyn UserStore>,
        codes: Arc<dyn VerificationStore>,
        mailer: Arc<dyn Mailer>,
        verify_url: impl Into<String>,
    ) -> Self {
        Self {
            users,
            codes,
            mailer,
            verify_url: verify_url.into(),
        }
    }
}

#[async_trait]
impl TaskHandler for SendVerifyEmailHandler {
    async fn handle(&self, task: &Task) -> Result<(), TaskError> {
        let payload: PayloadSendVerifyEmail = serde_json::from_value(task.payload.clone())
            .map_err(|e| TaskError::Skip(format!("malformed {TASK_SEND_VERIFY_EMAIL} payload: {e}")))?;

        let Some(user) = self.users.get_user(&payload.username).await? else {
            return Err(TaskError::Skip(format!(
                "user {} no longer exists",
                payload.username
            )));
        };

        if user.is_email_verified {
            tracing::info!(username = %user.username, "Email already verified; nothing to send");
            return Ok(());
        }

        let code = self
            .codes
            .issue_code(CreateVerificationCode {
                username: user.username.clone(),
                email: user.email.clone(),
                secret_code: generate_secret_code(),
                task_key: Some(task.task_key.clone()),
            })
            .await?;

        let link = templates::verification_link(&self.verify_url, code.id, &code.secret_code);
        let message = templates::verify_email(&code.email, &user.full_name, &link);

        self.mailer.send(&message).await.map_err(|e| {
            if e.is_permanent() {
                TaskError::Skip(e.to_string())
            } else {
                TaskError::Retry(e.to_string())
            }
        })?;

        tracing::info!(
            username = %user.username,
            email_id = code.id,
            task_key = %task.task_key,
            "Verification email sent",
        );
        Ok(())
    }
}
