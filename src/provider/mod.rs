//! Delivery providers, and the rules that pick one from the mail configuration.

pub mod gmail;
pub mod oauth;
pub mod outlook;
pub mod smtp;

use std::fmt;

use anyhow::{anyhow, Result};

use crate::config::MailConfig;
use crate::message::OutgoingMessage;

pub use gmail::GmailProvider;
pub use outlook::OutlookProvider;
pub use smtp::SmtpProvider;

/// Which backend will carry the message.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum ProviderKind {
    Smtp,
    GmailOAuth,
    OutlookOAuth,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Smtp => write!(f, "smtp"),
            Self::GmailOAuth => write!(f, "gmail-oauth"),
            Self::OutlookOAuth => write!(f, "outlook-oauth"),
        }
    }
}

/// Something that can transmit an assembled message.
pub trait Transport {
    /// Send the message once. Any error is final; nothing is retried.
    fn send(&self, message: &OutgoingMessage) -> Result<()>;

    fn name(&self) -> &'static str;
}

fn smtp_with_login(config: &MailConfig) -> bool {
    config.smtp && !config.has_oauth()
}

fn oauth_gmail(config: &MailConfig) -> bool {
    config
        .oauth_block()
        .is_some_and(|oauth| oauth.provider.is_empty() || oauth.provider.eq_ignore_ascii_case("gmail"))
}

fn oauth_outlook(config: &MailConfig) -> bool {
    config
        .oauth_block()
        .is_some_and(|oauth| oauth.provider.eq_ignore_ascii_case("outlook"))
}

fn smtp_without_login(config: &MailConfig) -> bool {
    !config.smtp && !config.has_oauth()
}

/// Provider rules, checked top to bottom. The first predicate that holds decides.
pub const PROVIDER_RULES: &[(fn(&MailConfig) -> bool, ProviderKind)] = &[
    (smtp_with_login, ProviderKind::Smtp),
    (oauth_gmail, ProviderKind::GmailOAuth),
    (oauth_outlook, ProviderKind::OutlookOAuth),
    (smtp_without_login, ProviderKind::Smtp),
];

/// Classify the mail configuration. Fails if no rule matches, e.g. an OAuth block
/// naming a provider we don't know.
pub fn select_provider(config: &MailConfig) -> Result<ProviderKind> {
    let kind = PROVIDER_RULES
        .iter()
        .find(|(applies, _)| applies(config))
        .map(|(_, kind)| *kind)
        .ok_or_else(|| anyhow!("Can't switch provider"))?;

    if kind == ProviderKind::Smtp && !config.smtp {
        log::info!("** SMTP Version - without login **");
    } else {
        log::info!("** {} version **", kind);
    }
    Ok(kind)
}

/// Build the transport for `kind`. Credentials are only acquired when sending.
pub fn transport_for<'a>(kind: ProviderKind, config: &'a MailConfig) -> Box<dyn Transport + 'a> {
    match kind {
        ProviderKind::Smtp => Box::new(SmtpProvider::new(config)),
        ProviderKind::GmailOAuth => Box::new(GmailProvider::new(config)),
        ProviderKind::OutlookOAuth => Box::new(OutlookProvider::new(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_mail_config, OAuthConfig};

    fn oauth(provider: &str) -> Option<OAuthConfig> {
        Some(OAuthConfig {
            provider: provider.to_string(),
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            refresh_token: "refresh".to_string(),
            token_uri: None,
        })
    }

    #[test]
    fn test_smtp_with_login() {
        let config = MailConfig {
            smtp: true,
            outgoingserver: "mail.example.com".to_string(),
            ..Default::default()
        };
        assert_eq!(select_provider(&config).unwrap(), ProviderKind::Smtp);
    }

    #[test]
    fn test_empty_config_is_smtp_without_login() {
        let config = parse_mail_config("{}").unwrap();
        assert_eq!(select_provider(&config).unwrap(), ProviderKind::Smtp);
    }

    #[test]
    fn test_outlook() {
        let config = MailConfig {
            oauth: oauth("outlook"),
            ..Default::default()
        };
        assert_eq!(select_provider(&config).unwrap(), ProviderKind::OutlookOAuth);
    }

    #[test]
    fn test_gmail_explicit_and_default() {
        let config = MailConfig {
            oauth: oauth("gmail"),
            ..Default::default()
        };
        assert_eq!(select_provider(&config).unwrap(), ProviderKind::GmailOAuth);

        let config = MailConfig {
            oauth: oauth(""),
            ..Default::default()
        };
        assert_eq!(select_provider(&config).unwrap(), ProviderKind::GmailOAuth);
    }

    #[test]
    fn test_oauth_beats_login_flag() {
        let config = MailConfig {
            smtp: true,
            oauth: oauth("outlook"),
            ..Default::default()
        };
        assert_eq!(select_provider(&config).unwrap(), ProviderKind::OutlookOAuth);
    }

    #[test]
    fn test_unknown_oauth_provider() {
        let config = MailConfig {
            oauth: oauth("yahoo"),
            ..Default::default()
        };
        let err = select_provider(&config).unwrap_err();
        assert_eq!(err.to_string(), "Can't switch provider");
    }

    #[test]
    fn test_transport_names() {
        let config = MailConfig::default();
        assert_eq!(transport_for(ProviderKind::Smtp, &config).name(), "smtp");
        assert_eq!(transport_for(ProviderKind::GmailOAuth, &config).name(), "gmail-oauth");
        assert_eq!(transport_for(ProviderKind::OutlookOAuth, &config).name(), "outlook-oauth");
    }
}
