//! Input validation for the user and verification operations.
//!
//! Every rule appends to a shared list instead of returning early, so one call
//! reports all violations at once. The order of the list follows the order in
//! which the fields are checked.

use std::fmt;
use std::sync::LazyLock;

use lettre::message::Mailbox;
use regex::Regex;
use serde::Serialize;

use crate::types::DbId;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 100;
pub const FULL_NAME_MIN: usize = 3;
pub const FULL_NAME_MAX: usize = 100;
pub const PASSWORD_MIN: usize = 6;
pub const PASSWORD_MAX: usize = 100;
pub const EMAIL_MIN: usize = 3;
pub const EMAIL_MAX: usize = 200;
pub const SECRET_CODE_MIN: usize = 32;
pub const SECRET_CODE_MAX: usize = 128;

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]+$").expect("valid regex"));

static FULL_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z ]+$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// A single violated rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Ordered, non-empty list of field violations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Names of the offending fields, in check order.
    pub fn fields(&self) -> Vec<&'static str> {
        self.errors.iter().map(|e| e.field).collect()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        write!(f, "{}", joined.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// Accumulates field errors during one validation pass.
#[derive(Debug, Default)]
struct Collector {
    errors: Vec<FieldError>,
}

impl Collector {
    fn check(&mut self, field: &'static str, result: Result<(), String>) {
        if let Err(message) = result {
            self.errors.push(FieldError { field, message });
        }
    }

    fn finish(self) -> Result<(), ValidationError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                errors: self.errors,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Field rules
// ---------------------------------------------------------------------------

fn check_length(value: &str, min: usize, max: usize) -> Result<(), String> {
    let n = value.chars().count();
    if n < min || n > max {
        return Err(format!("must contain from {min}-{max} characters"));
    }
    Ok(())
}

pub fn validate_username(value: &str) -> Result<(), String> {
    check_length(value, USERNAME_MIN, USERNAME_MAX)?;
    if !USERNAME_RE.is_match(value) {
        return Err("must contain only lowercase letters, digits or underscores".into());
    }
    Ok(())
}

pub fn validate_full_name(value: &str) -> Result<(), String> {
    check_length(value, FULL_NAME_MIN, FULL_NAME_MAX)?;
    if !FULL_NAME_RE.is_match(value) {
        return Err("must contain only letters or spaces".into());
    }
    Ok(())
}

pub fn validate_password(value: &str) -> Result<(), String> {
    check_length(value, PASSWORD_MIN, PASSWORD_MAX)
}

/// Accepts RFC 5322 mailboxes, with or without a display name.
pub fn validate_email(value: &str) -> Result<(), String> {
    check_length(value, EMAIL_MIN, EMAIL_MAX)?;
    if value.parse::<Mailbox>().is_err() {
        return Err("is not a valid email address".into());
    }
    Ok(())
}

pub fn validate_email_id(value: DbId) -> Result<(), String> {
    if value <= 0 {
        return Err("must be a positive integer".into());
    }
    Ok(())
}

pub fn validate_secret_code(value: &str) -> Result<(), String> {
    check_length(value, SECRET_CODE_MIN, SECRET_CODE_MAX)
}

// ---------------------------------------------------------------------------
// Operation validators
// ---------------------------------------------------------------------------

pub fn validate_create_user(
    username: &str,
    full_name: &str,
    email: &str,
    password: &str,
) -> Result<(), ValidationError> {
    let mut c = Collector::default();
    c.check("username", validate_username(username));
    c.check("password", validate_password(password));
    c.check("full_name", validate_full_name(full_name));
    c.check("email", validate_email(email));
    c.finish()
}

/// Only the supplied optional fields are checked; the username always is.
pub fn validate_update_user(
    username: &str,
    full_name: Option<&str>,
    email: Option<&str>,
    password: Option<&str>,
) -> Result<(), ValidationError> {
    let mut c = Collector::default();
    c.check("username", validate_username(username));
    if let Some(full_name) = full_name {
        c.check("full_name", validate_full_name(full_name));
    }
    if let Some(password) = password {
        c.check("password", validate_password(password));
    }
    if let Some(email) = email {
        c.check("email", validate_email(email));
    }
    c.finish()
}

pub fn validate_login(username: &str, password: &str) -> Result<(), ValidationError> {
    let mut c = Collector::default();
    c.check("username", validate_username(username));
    c.check("password", validate_password(password));
    c.finish()
}

pub fn validate_verify_email(email_id: DbId, secret_code: &str) -> Result<(), ValidationError> {
    let mut c = Collector::default();
    c.check("email_id", validate_email_id(email_id));
    c.check("secret_code", validate_secret_code(secret_code));
    c.finish()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
