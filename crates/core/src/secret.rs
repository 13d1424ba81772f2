//! Random secrets for email verification links.

use rand::Rng;

/// Length of a generated verification secret (alphanumeric characters).
pub const SECRET_CODE_LENGTH: usize = 32;

/// Generate a fresh alphanumeric verification secret.
pub fn generate_secret_code() -> String {
    random_alphanumeric(SECRET_CODE_LENGTH)
}

pub fn random_alphanumeric(len: usize) -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate_secret_code;

    #[test]
    fn secret_code_shape() {
        let code = generate_secret_code();
        assert_eq!(code.len(), SECRET_CODE_LENGTH);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(validate_secret_code(&code).is_ok());
    }

    #[test]
    fn secret_codes_are_unique() {
        assert_ne!(generate_secret_code(), generate_secret_code());
    }
}
