//! Email verification: consume a code and mark its user verified.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tessera_core::error::CoreError;
use tessera_core::types::DbId;
use tessera_core::validation::validate_verify_email;
use tessera_db::models::user::User;
use tessera_db::models::verification_code::VerificationCode;

use crate::deadline::with_deadline;
use crate::ports::VerificationStore;

#[derive(Debug, Clone)]
pub struct VerifyEmailParams {
    pub email_id: DbId,
    pub secret_code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyEmailResult {
    pub user: User,
    pub verification_code: VerificationCode,
}

pub struct VerifyEmailApplication {
    store: Arc<dyn VerificationStore>,
    operation_timeout: Duration,
}

impl VerifyEmailApplication {
    pub fn new(store: Arc<dyn VerificationStore>, operation_timeout: Duration) -> Self {
        Self {
            store,
            operation_timeout,
        }
    }

    /// Succeeds at most once per code. A wrong, used, or expired code all
    /// fail with [`CoreError::VerificationFailed`].
    pub async fn verify_email(
        &self,
        params: VerifyEmailParams,
    ) -> Result<VerifyEmailResult, CoreError> {
        validate_verify_email(params.email_id, &params.secret_code)?;

        with_deadline(self.operation_timeout, async {
            let (user, verification_code) = self
                .store
                .verify_email(params.email_id, &params.secret_code)
                .await?
                .ok_or(CoreError::VerificationFailed)?;

            tracing::info!(
                username = %user.username,
                email_id = verification_code.id,
                "Email verified",
            );

            Ok(VerifyEmailResult {
                user,
                verification_code,
            })
        })
        .await
    }
}
