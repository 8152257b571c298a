//! HTTP utilities for provider REST and GraphQL calls

use crate::describer::DescribeError;
use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

const USER_AGENT: &str = concat!("describer/", env!("CARGO_PKG_VERSION"));

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound for one request, independent of the collector deadline
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Append query parameters, skipping empty values
pub fn with_query(url: &str, params: &[(&str, String)]) -> String {
    let query_parts: Vec<String> = params
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect();

    if query_parts.is_empty() {
        url.to_string()
    } else if url.contains('?') {
        format!("{}&{}", url, query_parts.join("&"))
    } else {
        format!("{}?{}", url, query_parts.join("&"))
    }
}

/// HTTP client wrapper shared by all provider clients
#[derive(Clone)]
pub struct ProviderHttpClient {
    client: Client,
}

impl ProviderHttpClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// GET a JSON document
    pub async fn get(&self, url: &str, token: &str) -> Result<Value> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(DescribeError::Transport)
            .context("Failed to send request")?;

        Self::read_json(response).await
    }

    /// POST a JSON body and read a JSON document back
    pub async fn post(&self, url: &str, token: &str, body: &Value) -> Result<Value> {
        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(DescribeError::Transport)
            .context("Failed to send request")?;

        Self::read_json(response).await
    }

    async fn read_json(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(DescribeError::Transport)
            .context("Failed to read response body")?;

        if !status.is_success() {
            // Never log the raw body
            let message = sanitize_for_log(&body);
            tracing::error!("API error: {} - {}", status, message);
            return Err(DescribeError::Api {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        if body.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body)
            .map_err(DescribeError::Decode)
            .context("Failed to parse response JSON")
    }
}

/// Format a describe error for display
/// Maps well-known statuses to short messages without echoing API bodies
pub fn format_api_error(error: &anyhow::Error) -> String {
    let status = error
        .chain()
        .find_map(|e| e.downcast_ref::<DescribeError>())
        .and_then(DescribeError::status);

    match status {
        Some(401) => return "Authentication failed. Check the provider API token.".to_string(),
        Some(403) => return "Permission denied. Check the token scopes.".to_string(),
        Some(404) => return "Resource not found.".to_string(),
        Some(429) => return "Rate limit exceeded. Please try again later.".to_string(),
        Some(400) => return "Invalid request. Check your parameters.".to_string(),
        Some(500..=599) => return "Provider service temporarily unavailable. Please try again.".to_string(),
        Some(status) => return format!("Request failed with status {}.", status),
        None => {}
    }

    let error_str = format!("{:#}", error);
    let sanitized = error_str
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(120)
        .collect::<String>();

    if sanitized.len() < error_str.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let out = sanitize_for_log(&body);
        assert!(out.starts_with(&"x".repeat(200)));
        assert!(out.contains("500 bytes total"));
    }

    #[test]
    fn test_sanitize_strips_control_chars() {
        assert_eq!(sanitize_for_log("bad\nrequest\t!"), "badrequest!");
    }

    #[test]
    fn test_with_query_encodes_and_skips_empty() {
        let url = with_query(
            "https://api.example.com/v1/apps",
            &[("org_slug", "my org".to_string()), ("cursor", String::new())],
        );
        assert_eq!(url, "https://api.example.com/v1/apps?org_slug=my%20org");

        let url = with_query("https://x/y?a=1", &[("b", "2".to_string())]);
        assert_eq!(url, "https://x/y?a=1&b=2");
    }

    #[test]
    fn test_format_api_error_uses_status() {
        let err = anyhow::Error::from(DescribeError::Api {
            status: 429,
            message: String::new(),
        })
        .context("listing apps");
        assert_eq!(format_api_error(&err), "Rate limit exceeded. Please try again later.");
    }

    #[test]
    fn test_format_api_error_names_unmapped_status() {
        for status in [409u16, 422] {
            let err = anyhow::Error::from(DescribeError::Api {
                status,
                message: "conflict".to_string(),
            });
            let message = format_api_error(&err);
            assert_eq!(message, format!("Request failed with status {}.", status));
            assert!(!message.contains("network"));
        }
    }

    #[test]
    fn test_format_api_error_falls_back_to_chain() {
        let err = anyhow::anyhow!("connection reset");
        assert_eq!(format_api_error(&err), "connection reset");
    }
}
