//! Translation of driver errors into [`CoreError`].
//!
//! Repositories return raw `sqlx::Error`; callers above the store map them
//! here so constraint names never leak past this crate.

use sqlx::error::DatabaseError;
use sqlx::postgres::PgDatabaseError;
use tessera_core::error::CoreError;

/// PostgreSQL SQLSTATE codes we react to.
pub mod sqlstate {
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    pub const SERIALIZATION_FAILURE: &str = "40001";
    pub const DEADLOCK_DETECTED: &str = "40P01";
    pub const ADMIN_SHUTDOWN: &str = "57P01";
    /// Class 08: connection exceptions.
    pub const CONNECTION_EXCEPTION_CLASS: &str = "08";
}

/// Constraint names from the migrations.
pub mod constraints {
    pub const USERS_PKEY: &str = "users_pkey";
    pub const USERS_EMAIL: &str = "uq_users_email";
    pub const SESSIONS_USERNAME_FK: &str = "fk_sessions_username";
    pub const VERIFICATION_CODES_USERNAME_FK: &str = "fk_verification_codes_username";
}

/// Map a driver error into the domain taxonomy.
///
/// Unexpected errors are logged here, once, before becoming
/// [`CoreError::Internal`].
pub fn map_db_error(err: sqlx::Error) -> CoreError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(mapped) = classify_database_error(&**db_err) {
                return mapped;
            }
            tracing::error!(error = %db_err, "Database error");
            CoreError::Internal(db_err.message().to_string())
        }
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => {
            tracing::warn!(error = %err, "Database unavailable");
            CoreError::Transient(err.to_string())
        }
        other => {
            tracing::error!(error = %other, "Database error");
            CoreError::Internal(other.to_string())
        }
    }
}

fn classify_database_error(db_err: &(dyn DatabaseError + 'static)) -> Option<CoreError> {
    let code = db_err.code()?;
    let constraint = db_err.constraint();

    match code.as_ref() {
        sqlstate::UNIQUE_VIOLATION => match constraint {
            Some(constraints::USERS_PKEY) => Some(CoreError::UsernameAlreadyExists),
            Some(constraints::USERS_EMAIL) => Some(CoreError::EmailAlreadyExists),
            _ => None,
        },
        sqlstate::FOREIGN_KEY_VIOLATION => match constraint {
            Some(constraints::SESSIONS_USERNAME_FK)
            | Some(constraints::VERIFICATION_CODES_USERNAME_FK) => {
                Some(CoreError::user_not_found(referenced_key(db_err)))
            }
            _ => None,
        },
        sqlstate::SERIALIZATION_FAILURE | sqlstate::DEADLOCK_DETECTED | sqlstate::ADMIN_SHUTDOWN => {
            Some(CoreError::Transient(db_err.message().to_string()))
        }
        c if c.starts_with(sqlstate::CONNECTION_EXCEPTION_CLASS) => {
            Some(CoreError::Transient(db_err.message().to_string()))
        }
        _ => None,
    }
}

/// Pull `bob` out of a detail line like `Key (username)=(bob) is not present ...`.
fn referenced_key(db_err: &(dyn DatabaseError + 'static)) -> String {
    db_err
        .try_downcast_ref::<PgDatabaseError>()
        .and_then(|pg| pg.detail())
        .and_then(parse_key_detail)
        .unwrap_or_default()
}

fn parse_key_detail(detail: &str) -> Option<String> {
    let (_, rest) = detail.split_once("=(")?;
    let (key, _) = rest.split_once(')')?;
    Some(key.to_string())
}
