//! API-key authentication.
//!
//! Clients send the `x-api-key` and `x-secret-key` headers on every
//! request. Header names match case-insensitively.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use lexis_sync_protocol::{API_KEY_HEADER, SECRET_KEY_HEADER};

/// Validates request credentials against the configured keys.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyAuth {
    api_key: Option<String>,
    secret_key: Option<String>,
}

impl ApiKeyAuth {
    /// Creates a validator from the server configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
        }
    }

    /// Returns true if no credentials are required.
    pub fn is_open(&self) -> bool {
        self.api_key.is_none() && self.secret_key.is_none()
    }

    /// Checks the credentials carried by `headers`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::AuthenticationFailed`] if a required header is
    /// missing or does not match.
    pub fn validate(&self, headers: &[(String, String)]) -> ServerResult<()> {
        Self::check(headers, API_KEY_HEADER, self.api_key.as_deref())?;
        Self::check(headers, SECRET_KEY_HEADER, self.secret_key.as_deref())
    }

    fn check(headers: &[(String, String)], name: &str, expected: Option<&str>) -> ServerResult<()> {
        let Some(expected) = expected else {
            return Ok(());
        };
        match header(headers, name) {
            Some(value) if constant_time_eq(value.as_bytes(), expected.as_bytes()) => Ok(()),
            Some(_) => Err(ServerError::AuthenticationFailed(format!("invalid {name}"))),
            None => Err(ServerError::AuthenticationFailed(format!("missing {name}"))),
        }
    }
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
