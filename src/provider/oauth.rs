//! Refresh-token exchange shared by the Gmail and Outlook providers.

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::config::OAuthConfig;

/// Token response from an OAuth2 token endpoint. We only need the bearer token.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[allow(dead_code)]
    #[serde(default)]
    token_type: String,
}

/// HTTP client for the token endpoint and the Gmail API. Building it can fail when the
/// TLS backend can't be initialised.
pub fn http_client() -> Result<Client> {
    Client::builder()
        .build()
        .context("Unable to initialise the HTTP client")
}

/// Trade the stored refresh token for a fresh access token.
///
/// There is no caching: every run asks for a new token.
pub fn refresh_access_token(
    client: &Client,
    token_url: &str,
    oauth: &OAuthConfig,
    scope: Option<&str>,
) -> Result<String> {
    let mut form = vec![
        ("client_id", oauth.client_id.as_str()),
        ("client_secret", oauth.client_secret.as_str()),
        ("refresh_token", oauth.refresh_token.as_str()),
        ("grant_type", "refresh_token"),
    ];
    if let Some(scope) = scope {
        form.push(("scope", scope));
    }

    log::debug!("refreshing access token at {}", token_url);

    let response = client
        .post(token_url)
        .form(&form)
        .send()
        .map_err(|e| anyhow!("Token refresh request failed: {}", e))?;

    if !response.status().is_success() {
        let status = response.status();
        let error_body = response.text().unwrap_or_default();
        return Err(anyhow!("Token refresh failed ({}): {}", status, error_body));
    }

    let token: TokenResponse = response
        .json()
        .map_err(|e| anyhow!("Failed to parse token response: {}", e))?;

    log::debug!("access token retrieved");
    Ok(token.access_token)
}
