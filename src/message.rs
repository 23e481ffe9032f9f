use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Local};
use lettre::message::header::{Header, HeaderName, HeaderValue};
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::{Address, Message};

use crate::content::decode_base64;

/// Used for the Message-ID when neither the SMTP user nor the sender has a domain.
pub const FALLBACK_MESSAGE_ID_DOMAIN: &str = "local.me";

/// An assembled message, ready for whichever provider was picked.
///
/// `raw` is the full RFC 5322 text. `recipients` and `sender` are what we learned
/// from the headers while building (or parsing) it, and seed the SMTP envelope.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub raw: Vec<u8>,
    pub recipients: Vec<Address>,
    pub sender: Option<Address>,
}

/// The sender identity that ends up in `From:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub name: Option<String>,
    pub email: String,
}

impl Sender {
    pub fn mailbox(&self) -> Result<Mailbox> {
        let address: Address = self
            .email
            .parse()
            .map_err(|e| anyhow!("Invalid sender address '{}': {}", self.email, e))?;
        Ok(Mailbox::new(self.name.clone(), address))
    }
}

/// Every place a sender name or address may come from, highest precedence first:
/// command-line overrides, then the local tool config, then the NAS mail config.
#[derive(Debug, Default, Clone)]
pub struct SenderSources<'a> {
    pub override_name: &'a str,
    pub override_email: &'a str,
    pub local_name: &'a str,
    pub local_email: &'a str,
    pub daemon_name: &'a str,
    pub daemon_email: &'a str,
}

fn filled(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

/// Pick the `From:` identity. Full name+address pairs are tried before bare addresses;
/// the first fully populated candidate wins.
pub fn resolve_sender(sources: &SenderSources) -> Option<Sender> {
    let pairs = [
        (sources.override_name, sources.override_email),
        (sources.local_name, sources.local_email),
        (sources.daemon_name, sources.daemon_email),
        (sources.override_name, sources.daemon_email),
        (sources.local_name, sources.daemon_email),
    ];
    let bare = [
        sources.override_email,
        sources.local_email,
        sources.daemon_email,
    ];

    pairs
        .iter()
        .find_map(|(name, email)| {
            Some(Sender {
                name: Some(filled(name)?.to_string()),
                email: filled(email)?.to_string(),
            })
        })
        .or_else(|| {
            bare.iter().find_map(|email| {
                Some(Sender {
                    name: None,
                    email: filled(email)?.to_string(),
                })
            })
        })
}

/// Split a `To` value into addresses: comma separated if it has commas, one address
/// otherwise. Entries are trimmed and blanks dropped.
///
/// Example
///
/// ```
/// use sendemail::message::parse_recipients;
///
/// assert_eq!(parse_recipients("a@x.com, b@y.com"), vec!["a@x.com", "b@y.com"]);
/// assert_eq!(parse_recipients(" a@x.com "), vec!["a@x.com"]);
/// ```
///
pub fn parse_recipients(to: &str) -> Vec<String> {
    if to.contains(',') {
        to.split(',')
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(str::to_string)
            .collect()
    } else {
        let addr = to.trim();
        if addr.is_empty() {
            Vec::new()
        } else {
            vec![addr.to_string()]
        }
    }
}

fn domain_of(address: &str) -> Option<&str> {
    address.split('@').nth(1).filter(|domain| !domain.is_empty())
}

/// Domain for the Message-ID: the SMTP user's, else the sender's, else a fixed one.
pub fn message_id_domain(smtp_user: &str, sender_email: &str) -> String {
    domain_of(smtp_user)
        .or_else(|| {
            log::debug!("{} not a valid address, trying on {}", smtp_user, sender_email);
            domain_of(sender_email)
        })
        .unwrap_or_else(|| {
            log::debug!("{} not a valid address, need to use a fallback", sender_email);
            FALLBACK_MESSAGE_ID_DOMAIN
        })
        .to_string()
}

/// `<timestamp-to-the-millisecond + uuid @ domain>`
pub fn generate_message_id(time: &DateTime<Local>, domain: &str) -> String {
    format!(
        "<{}{}@{}>",
        time.format("%Y_%m_%d_%H_%M_%S_%3f"),
        uuid::Uuid::new_v4(),
        domain
    )
}

/// `Date:` header rendered in the local time zone. lettre's own `Date` header
/// always renders UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDate(String);

impl From<&DateTime<Local>> for LocalDate {
    fn from(date: &DateTime<Local>) -> Self {
        Self(date.to_rfc2822())
    }
}

impl Header for LocalDate {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("Date")
    }

    fn parse(s: &str) -> std::result::Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self(s.trim().to_string()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}

/// Fields of a discrete-mode send.
#[derive(Debug, Clone)]
pub struct DiscreteFields<'a> {
    pub subject: &'a str,
    pub to: &'a str,
    pub html: &'a str,
    /// Authenticated SMTP user, if any. Only used to pick the Message-ID domain.
    pub smtp_user: &'a str,
    pub date: DateTime<Local>,
}

/// Assemble a `multipart/mixed` message: the HTML body, then each attachment part.
pub fn build_discrete(
    fields: &DiscreteFields,
    sender: &Sender,
    attachments: Vec<SinglePart>,
) -> Result<OutgoingMessage> {
    let recipients = parse_recipients(fields.to);
    if recipients.is_empty() {
        bail!("No recipient address provided");
    }

    let domain = message_id_domain(fields.smtp_user, &sender.email);
    let message_id = generate_message_id(&fields.date, &domain);
    log::debug!("messageid: {}", message_id);

    let mut builder = Message::builder()
        .from(sender.mailbox()?)
        .subject(fields.subject)
        .message_id(Some(message_id))
        .header(LocalDate::from(&fields.date));

    for recipient in &recipients {
        let mailbox: Mailbox = recipient
            .parse()
            .map_err(|e| anyhow!("Invalid recipient address '{}': {}", recipient, e))?;
        builder = builder.to(mailbox);
    }

    let multipart = attachments.into_iter().fold(
        MultiPart::mixed().singlepart(SinglePart::html(fields.html.to_string())),
        |multipart, part| multipart.singlepart(part),
    );

    let message = builder
        .multipart(multipart)
        .context("Failed to build message")?;

    let envelope = message.envelope();
    Ok(OutgoingMessage {
        recipients: envelope.to().to_vec(),
        sender: envelope.from().cloned(),
        raw: message.formatted(),
    })
}

/// Decode a pre-built base64 MIME message and pull out its recipients and sender.
///
/// The message bytes are passed through untouched; a message without any `To:`
/// address is rejected.
pub fn parse_bulk(blob: &str) -> Result<OutgoingMessage> {
    let raw = decode_base64(blob)?;
    std::str::from_utf8(&raw).map_err(|e| anyhow!("Error decoding Base64 content: {}", e))?;
    log::debug!("bulk email successfully decoded from Base64");

    let (recipients, sender) = {
        let parsed = mail_parser::MessageParser::default()
            .parse(raw.as_slice())
            .ok_or_else(|| anyhow!("Error decoding Base64 content: not a MIME message"))?;

        let recipients: Vec<Address> = parsed
            .to()
            .map(|list| {
                list.iter()
                    .filter_map(|addr| addr.address())
                    .filter_map(|email| email.parse::<Address>().ok())
                    .collect()
            })
            .unwrap_or_default();

        let sender = parsed
            .from()
            .and_then(|list| list.first())
            .and_then(|addr| addr.address())
            .and_then(|email| email.parse::<Address>().ok());

        (recipients, sender)
    };

    if recipients.is_empty() {
        bail!("failed retrieving recipient");
    }
    log::debug!("recipient retrieved");

    Ok(OutgoingMessage {
        raw,
        recipients,
        sender,
    })
}
