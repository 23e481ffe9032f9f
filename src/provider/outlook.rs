use anyhow::{anyhow, Context, Result};
use lettre::Transport as _;
use super::oauth::{http_client, refresh_access_token};
use super::smtp::{build_transport, envelope_for, Security, SmtpAuth};
use super::Transport;
use crate::config::MailConfig;
use crate::message::OutgoingMessage;

pub const OUTLOOK_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
pub const OUTLOOK_SMTP_SCOPE: &str = "https://outlook.office.com/SMTP.Send offline_access";
pub const OUTLOOK_SMTP_HOST: &str = "smtp.office365.com";
pub const OUTLOOK_SMTP_PORT: u16 = 587;

/// SMTP submission to Office 365, authenticated with XOAUTH2.
///
/// A new access token is fetched from the refresh token before every send.
pub struct OutlookProvider<'a> {
    config: &'a MailConfig,
}

impl<'a> OutlookProvider<'a> {
    pub fn new(config: &'a MailConfig) -> Self {
        Self { config }
    }

    /// The mailbox we authenticate as.
    fn user(&self) -> &str {
        if self.config.user.is_empty() {
            &self.config.fromemail
        } else {
            &self.config.user
        }
    }

    fn host(&self) -> &str {
        if self.config.outgoingserver.is_empty() {
            OUTLOOK_SMTP_HOST
        } else {
            &self.config.outgoingserver
        }
    }

    fn security(&self) -> Result<Security> {
        if self.config.security.is_empty() {
            Ok(Security::Tls)
        } else {
            self.config.security.parse()
        }
    }
}

impl Transport for OutlookProvider<'_> {
    fn send(&self, message: &OutgoingMessage) -> Result<()> {
        let oauth = self
            .config
            .oauth_block()
            .ok_or_else(|| anyhow!("No OAuth configuration for Outlook"))?;
        let security = self.security()?;

        let token_url = oauth.token_uri.as_deref().unwrap_or(OUTLOOK_TOKEN_URL);
        let client = http_client()?;
        let access_token =
            refresh_access_token(&client, token_url, oauth, Some(OUTLOOK_SMTP_SCOPE))?;

        let transport = build_transport(
            self.host(),
            Some(self.config.port.unwrap_or(OUTLOOK_SMTP_PORT)),
            security,
            SmtpAuth::XOAuth2 {
                user: self.user().to_string(),
                access_token,
            },
        )?;
        let envelope = envelope_for(self.user(), message)?;

        transport
            .send_raw(&envelope, &message.raw)
            .context("Outlook SMTP send failed")?;

        log::info!("Email Sent via Outlook");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "outlook-oauth"
    }
}
