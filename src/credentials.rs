//! Authorization credentials and environment selection.
//!
//! Out of scope for the core protocol; kept thin and grounded on
//! `forwarder::config`'s token-file convention (raw string, trimmed on
//! read).

use crate::error::Error;

/// One of the two mutually exclusive authorization schemes the server
/// accepts on the WebSocket handshake.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// `Authorization: Bearer <jwt>`.
    Jwt(String),
    /// `Authorization: MayStreet-Data-Lake-Secret <hex64>`.
    Secret(String),
}

impl Credentials {
    /// Read a JWT from `path`, trimming surrounding whitespace.
    pub fn jwt_from_file(path: &str) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Transport(format!("reading JWT file '{path}': {e}")))?;
        Ok(Self::Jwt(content.trim().to_owned()))
    }

    /// A static shared secret; expected to be 64 hex digits but not
    /// validated here (the server rejects a malformed one).
    pub fn secret(value: impl Into<String>) -> Self {
        Self::Secret(value.into())
    }

    /// Resolve credentials from the process environment: `jwt_file_var`
    /// takes priority over `secret_var` if both happen to be set.
    pub fn from_env(jwt_file_var: &str, secret_var: &str) -> Result<Self, Error> {
        if let Ok(path) = std::env::var(jwt_file_var) {
            return Self::jwt_from_file(&path);
        }
        if let Ok(secret) = std::env::var(secret_var) {
            return Ok(Self::secret(secret));
        }
        Err(Error::Transport(format!(
            "no credentials: neither {jwt_file_var} nor {secret_var} is set"
        )))
    }

    /// Render the literal `Authorization` header value.
    pub fn authorization_header(&self) -> String {
        match self {
            Self::Jwt(jwt) => format!("Bearer {jwt}"),
            Self::Secret(secret) => format!("MayStreet-Data-Lake-Secret {secret}"),
        }
    }
}

/// Deployment profile selected from an environment variable's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Staging,
    Production,
}

/// `production` is selected whenever the variable's value contains the
/// substring `"production"`; anything else (including unset) is staging.
pub fn select_environment(var_name: &str) -> Environment {
    match std::env::var(var_name) {
        Ok(value) if value.contains("production") => Environment::Production,
        _ => Environment::Staging,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jwt_from_file_trims_whitespace() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("hpq-client-test-jwt-{}", std::process::id()));
        std::fs::write(&path, "  token-value\n").unwrap();
        let creds = Credentials::jwt_from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(creds.authorization_header(), "Bearer token-value");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn secret_header_format() {
        let creds = Credentials::secret("a".repeat(64));
        assert_eq!(
            creds.authorization_header(),
            format!("MayStreet-Data-Lake-Secret {}", "a".repeat(64))
        );
    }

    #[test]
    fn select_environment_matches_substring() {
        assert_eq!(select_environment("HPQ_CLIENT_TEST_ENV_NONEXISTENT"), Environment::Staging);
    }
}
