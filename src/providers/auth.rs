//! Provider Authentication
//!
//! Every provider authenticates with a bearer token. Tokens come from the
//! command line, the provider's environment variable, or the config file, in
//! that order.

use anyhow::{bail, Result};

/// Provider API token
#[derive(Clone)]
pub struct ApiToken(String);

impl ApiToken {
    /// Wrap a token after validating it
    pub fn new(token: &str) -> Result<Self> {
        let token = token.trim();
        if !validate_token(token) {
            bail!("Invalid API token format");
        }
        Ok(Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiToken {
    // Never print the secret
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiToken(***{} chars)", self.0.len())
    }
}

/// Tokens are non-empty, printable, and free of whitespace
fn validate_token(token: &str) -> bool {
    !token.is_empty() && token.len() <= 4096 && token.chars().all(|c| c.is_ascii_graphic())
}

/// Resolve a token: CLI flag > environment variable > config value
pub fn resolve_token(flag: Option<&str>, env_var: &str, configured: Option<&str>) -> Option<ApiToken> {
    if let Some(token) = flag {
        match ApiToken::new(token) {
            Ok(token) => return Some(token),
            Err(_) => tracing::warn!("Ignoring invalid token passed on the command line"),
        }
    }

    if let Ok(token) = std::env::var(env_var) {
        match ApiToken::new(&token) {
            Ok(token) => return Some(token),
            Err(_) => tracing::warn!("Invalid token format in {}", env_var),
        }
    }

    configured.and_then(|token| match ApiToken::new(token) {
        Ok(token) => Some(token),
        Err(_) => {
            tracing::warn!("Invalid token format in config file");
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_validation() {
        assert!(ApiToken::new("ghp_abc123").is_ok());
        assert!(ApiToken::new("  fo1_token  ").is_ok());
        assert!(ApiToken::new("").is_err());
        assert!(ApiToken::new("has space").is_err());
    }

    #[test]
    fn test_debug_does_not_leak_token() {
        let token = ApiToken::new("super-secret").unwrap();
        let printed = format!("{:?}", token);
        assert!(!printed.contains("super-secret"));
    }

    #[test]
    fn test_resolve_prefers_flag_then_config() {
        let env_var = "DESCRIBER_TEST_TOKEN_UNSET_VAR";
        let token = resolve_token(Some("from-flag"), env_var, Some("from-config")).unwrap();
        assert_eq!(token.as_str(), "from-flag");

        let token = resolve_token(None, env_var, Some("from-config")).unwrap();
        assert_eq!(token.as_str(), "from-config");

        let token = resolve_token(Some("bad token"), env_var, None);
        assert!(token.is_none());
    }
}
