use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use lettre::address::Envelope;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{Address, SmtpTransport, Transport as _};

use super::Transport;
use crate::config::MailConfig;
use crate::message::OutgoingMessage;

/// Connection security as named in the NAS mail config.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Security {
    /// No encryption.
    Plain,
    /// Implicit TLS from the first byte.
    Ssl,
    /// STARTTLS upgrade.
    Tls,
}

impl FromStr for Security {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PLAIN" => Ok(Self::Plain),
            "SSL" => Ok(Self::Ssl),
            "TLS" => Ok(Self::Tls),
            other => bail!("something wrong switching SMTP security level: '{}'", other),
        }
    }
}

/// How to authenticate against the SMTP server, if at all.
#[derive(Debug, Clone)]
pub enum SmtpAuth {
    None,
    Password { user: String, password: String },
    XOAuth2 { user: String, access_token: String },
}

impl SmtpAuth {
    /// Credentials and the mechanisms allowed to present them, if logging in at all.
    pub fn credentials(self) -> Option<(Credentials, Vec<Mechanism>)> {
        match self {
            Self::None => None,
            Self::Password { user, password } => Some((
                Credentials::new(user, password),
                vec![Mechanism::Plain, Mechanism::Login],
            )),
            Self::XOAuth2 { user, access_token } => {
                Some((Credentials::new(user, access_token), vec![Mechanism::Xoauth2]))
            }
        }
    }
}

/// Build a blocking SMTP transport for `host`.
///
/// `port` falls back to lettre's default for the chosen security level.
pub fn build_transport(
    host: &str,
    port: Option<u16>,
    security: Security,
    auth: SmtpAuth,
) -> Result<SmtpTransport> {
    log::debug!("establishing connection with security level {:?}", security);

    let mut builder = match security {
        Security::Tls => SmtpTransport::starttls_relay(host)
            .map_err(|e| anyhow!("SMTP STARTTLS relay init failed: {}", e))?,
        Security::Ssl => SmtpTransport::relay(host)
            .map_err(|e| anyhow!("SMTP TLS relay init failed: {}", e))?,
        Security::Plain => SmtpTransport::builder_dangerous(host),
    };

    if let Some(port) = port {
        builder = builder.port(port);
    }

    if let Some((credentials, mechanisms)) = auth.credentials() {
        log::debug!("entering credentials");
        builder = builder.credentials(credentials).authentication(mechanisms);
    }

    Ok(builder.build())
}

/// Envelope for `message`: `mail_from` if it is a usable address, otherwise whatever
/// the `From:` header said. Recipients always come from the message.
pub fn envelope_for(mail_from: &str, message: &OutgoingMessage) -> Result<Envelope> {
    let from = mail_from
        .parse::<Address>()
        .ok()
        .or_else(|| message.sender.clone());

    Envelope::new(from, message.recipients.clone()).map_err(|e| anyhow!("Envelope error: {}", e))
}

/// Plain SMTP delivery using the server, security level and (optional) login from the
/// NAS mail config.
pub struct SmtpProvider<'a> {
    config: &'a MailConfig,
}

impl<'a> SmtpProvider<'a> {
    pub fn new(config: &'a MailConfig) -> Self {
        Self { config }
    }

    /// Envelope sender: the login user when logging in, the configured from address
    /// otherwise.
    fn mail_from(&self) -> &str {
        if self.config.smtp {
            &self.config.user
        } else {
            log::debug!("smtp login disabled, sending as {}", self.config.fromemail);
            &self.config.fromemail
        }
    }
}

impl Transport for SmtpProvider<'_> {
    fn send(&self, message: &OutgoingMessage) -> Result<()> {
        let security: Security = self.config.security.parse()?;

        let auth = if self.config.smtp {
            SmtpAuth::Password {
                user: self.config.user.clone(),
                password: self.config.pass.clone(),
            }
        } else {
            SmtpAuth::None
        };

        let transport = build_transport(
            &self.config.outgoingserver,
            self.config.port,
            security,
            auth,
        )?;
        let envelope = envelope_for(self.mail_from(), message)?;

        log::debug!("sending {:?} email", security);
        transport
            .send_raw(&envelope, &message.raw)
            .context("SMTP send failed")?;

        log::info!("Email Sent via SMTP");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> OutgoingMessage {
        OutgoingMessage {
            raw: b"To: a@x.com\r\n\r\nhi".to_vec(),
            recipients: vec!["a@x.com".parse().unwrap(), "b@y.com".parse().unwrap()],
            sender: Some("header@example.com".parse().unwrap()),
        }
    }

    #[test]
    fn test_parse_security() {
        assert_eq!("TLS".parse::<Security>().unwrap(), Security::Tls);
        assert_eq!("SSL".parse::<Security>().unwrap(), Security::Ssl);
        assert_eq!("PLAIN".parse::<Security>().unwrap(), Security::Plain);
        assert!("STARTTLS".parse::<Security>().is_err());
    }

    #[test]
    fn test_xoauth2_sasl_payload() {
        let auth = SmtpAuth::XOAuth2 {
            user: "u@x.com".to_string(),
            access_token: "TOK".to_string(),
        };
        let (credentials, mechanisms) = auth.credentials().unwrap();

        assert_eq!(mechanisms, vec![Mechanism::Xoauth2]);
        assert_eq!(
            mechanisms[0].response(&credentials, None).unwrap(),
            "user=u@x.com\x01auth=Bearer TOK\x01\x01"
        );
    }

    #[test]
    fn test_password_and_anonymous_auth() {
        let auth = SmtpAuth::Password {
            user: "login".to_string(),
            password: "secret".to_string(),
        };
        let (credentials, mechanisms) = auth.credentials().unwrap();
        assert_eq!(mechanisms, vec![Mechanism::Plain, Mechanism::Login]);
        assert_eq!(
            Mechanism::Plain.response(&credentials, None).unwrap(),
            "\u{0}login\u{0}secret"
        );

        assert!(SmtpAuth::None.credentials().is_none());
    }

    #[test]
    fn test_envelope_uses_mail_from() {
        let envelope = envelope_for("login@example.com", &message()).unwrap();
        assert_eq!(envelope.from().unwrap().to_string(), "login@example.com");
        assert_eq!(envelope.to().len(), 2);
    }

    #[test]
    fn test_envelope_falls_back_to_header_sender() {
        let envelope = envelope_for("admin", &message()).unwrap();
        assert_eq!(envelope.from().unwrap().to_string(), "header@example.com");
    }

    #[test]
    fn test_mail_from_depends_on_login_flag() {
        let mut config = MailConfig {
            user: "login@example.com".to_string(),
            fromemail: "nas@example.com".to_string(),
            ..Default::default()
        };
        assert_eq!(SmtpProvider::new(&config).mail_from(), "nas@example.com");

        config.smtp = true;
        assert_eq!(SmtpProvider::new(&config).mail_from(), "login@example.com");
    }

    #[test]
    fn test_bad_security_fails_before_connecting() {
        let config = MailConfig {
            security: "BOGUS".to_string(),
            outgoingserver: "mail.example.com".to_string(),
            ..Default::default()
        };
        let err = SmtpProvider::new(&config).send(&message()).unwrap_err();
        assert!(err.to_string().contains("security level"));
    }
}
