/// Header the client sends on every request.
pub const SECRET_HEADER: &str = "x-secret-key";

/// Gate that compares a caller-supplied token with a server-held secret.
#[derive(Clone, Debug)]
pub struct SecretValidator {
    secret: Option<String>,
}

impl SecretValidator {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret: secret.filter(|s| !s.trim().is_empty()) }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Exact, case-sensitive equality. A missing secret on either side denies.
    pub fn validate(&self, candidate: Option<&str>) -> bool {
        match (&self.secret, candidate) {
            (Some(expected), Some(provided)) => expected.as_str() == provided,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_is_valid() {
        let v = SecretValidator::new(Some("abc".into()));
        assert!(v.validate(Some("abc")));
    }

    #[test]
    fn comparison_is_case_sensitive() {
        let v = SecretValidator::new(Some("abc".into()));
        assert!(!v.validate(Some("ABC")));
        assert!(!v.validate(Some("abc ")));
    }

    #[test]
    fn missing_candidate_or_secret_denies() {
        let v = SecretValidator::new(Some("abc".into()));
        assert!(!v.validate(None));

        let unconfigured = SecretValidator::new(None);
        assert!(!unconfigured.validate(Some("abc")));
        assert!(!unconfigured.is_configured());

        let blank = SecretValidator::new(Some("   ".into()));
        assert!(!blank.validate(Some("   ")));
    }
}
