use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::oauth::{http_client, refresh_access_token};
use super::Transport;
use crate::config::MailConfig;
use crate::message::OutgoingMessage;

pub const GMAIL_API_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Gmail API send request
#[derive(Debug, Serialize)]
struct GmailSendRequest {
    raw: String,
}

/// Gmail API send response
#[derive(Debug, Deserialize)]
struct GmailSendResponse {
    id: String,
}

/// Sends through the Gmail REST API with the refresh token from the `oauth` block.
pub struct GmailProvider<'a> {
    config: &'a MailConfig,
}

impl<'a> GmailProvider<'a> {
    pub fn new(config: &'a MailConfig) -> Self {
        Self { config }
    }
}

/// The `raw` field of a Gmail send request: the whole message, base64url encoded.
pub fn encode_raw(message: &OutgoingMessage) -> String {
    URL_SAFE_NO_PAD.encode(&message.raw)
}

/// POST the message to `api_url` and return the id Gmail gave it. A non-2xx status
/// is an error carrying the response body.
pub fn post_message(
    client: &Client,
    api_url: &str,
    access_token: &str,
    message: &OutgoingMessage,
) -> Result<String> {
    let request = GmailSendRequest {
        raw: encode_raw(message),
    };

    log::debug!("sending email");
    let response = client
        .post(api_url)
        .bearer_auth(access_token)
        .json(&request)
        .send()
        .map_err(|e| anyhow!("Gmail API request failed: {}", e))?;

    let status = response.status();
    if !status.is_success() {
        let error_body = response.text().unwrap_or_default();
        log::error!("Gmail API error {}: {}", status, error_body);
        return Err(anyhow!("Gmail error ({}): {}", status, error_body));
    }

    let sent: GmailSendResponse = response
        .json()
        .map_err(|e| anyhow!("Failed to parse Gmail response: {}", e))?;
    Ok(sent.id)
}

impl Transport for GmailProvider<'_> {
    fn send(&self, message: &OutgoingMessage) -> Result<()> {
        let oauth = self
            .config
            .oauth_block()
            .ok_or_else(|| anyhow!("No OAuth configuration for Gmail"))?;
        let client = http_client()?;

        log::debug!("parsing Oauth config");
        let token_url = oauth.token_uri.as_deref().unwrap_or(GOOGLE_TOKEN_URL);
        let access_token = refresh_access_token(&client, token_url, oauth, None)?;

        let id = post_message(&client, GMAIL_API_URL, &access_token, message)?;
        log::info!("Email Sent via Gmail, id {}", id);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "gmail-oauth"
    }
}
