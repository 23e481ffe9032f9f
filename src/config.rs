use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Deserializer};

/// Name of the per-tool config file consulted for fallback sender identity.
pub const LOCAL_CONFIG_FILE: &str = "multi_report_config.txt";

/// Mail configuration as returned by `midclt call mail.config`.
///
/// Only the fields we use are modelled. The middleware happily returns `null` for
/// unset fields, so everything is defaulted rather than required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    #[serde(deserialize_with = "null_as_default")]
    pub fromemail: String,
    #[serde(deserialize_with = "null_as_default")]
    pub fromname: String,
    #[serde(deserialize_with = "null_as_default")]
    pub outgoingserver: String,
    pub port: Option<u16>,
    #[serde(deserialize_with = "null_as_default")]
    pub security: String,
    /// Login flag: whether the SMTP server wants `user`/`pass`.
    #[serde(deserialize_with = "null_as_default")]
    pub smtp: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub user: String,
    #[serde(deserialize_with = "null_as_default")]
    pub pass: String,
    pub oauth: Option<OAuthConfig>,
}

/// The `oauth` block of the mail configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    #[serde(deserialize_with = "null_as_default")]
    pub provider: String,
    #[serde(deserialize_with = "null_as_default")]
    pub client_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub client_secret: String,
    #[serde(deserialize_with = "null_as_default")]
    pub refresh_token: String,
    pub token_uri: Option<String>,
}

impl OAuthConfig {
    /// An `oauth: {}` block is reported by the middleware when OAuth isn't configured.
    pub fn is_empty(&self) -> bool {
        self.provider.is_empty()
            && self.client_id.is_empty()
            && self.client_secret.is_empty()
            && self.refresh_token.is_empty()
    }
}

impl MailConfig {
    /// The OAuth block, if one is actually populated.
    pub fn oauth_block(&self) -> Option<&OAuthConfig> {
        self.oauth.as_ref().filter(|oauth| !oauth.is_empty())
    }

    pub fn has_oauth(&self) -> bool {
        self.oauth_block().is_some()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse the JSON emitted by the middleware into a `MailConfig`.
pub fn parse_mail_config(json: &str) -> Result<MailConfig> {
    serde_json::from_str(json).map_err(|e| anyhow!("Unable to parse mail.config: {}", e))
}

/// Run the config command (normally `midclt call mail.config`) and parse its output.
///
/// A non-zero exit status is an error carrying whatever the command wrote to stderr.
pub fn read_mail_config(command: &[String]) -> Result<MailConfig> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow!("No config command configured"))?;

    log::debug!("trying read mail.config via {:?}", command);

    let output = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("Failed to call {}", program))?;

    if !output.status.success() {
        bail!(
            "Failed to call midclt: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let stdout = String::from_utf8(output.stdout)
        .map_err(|e| anyhow!("mail.config output is not valid UTF-8: {}", e))?;
    let config = parse_mail_config(&stdout)?;

    log::debug!("read mail.config successfully");
    Ok(config)
}

/// Look up `key` in the local `key=value` config file found in `dir`.
///
/// Anything after a `#` is a comment. The first line starting with `key=` wins, and its
/// value is the text between the first and second `=`, trimmed and with surrounding
/// double quotes removed. A missing file, unreadable file or absent key all give an
/// empty string.
pub fn lookup_local_value(dir: &Path, key: &str) -> String {
    let path = dir.join(LOCAL_CONFIG_FILE);

    let file = match File::open(&path) {
        Ok(file) => file,
        Err(e) => {
            log::debug!("{} not found: {}", LOCAL_CONFIG_FILE, e);
            return String::new();
        }
    };

    let prefix = format!("{}=", key);
    for line in BufReader::new(file).lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::debug!("{} unreadable: {}", LOCAL_CONFIG_FILE, e);
                return String::new();
            }
        };

        let key_value = line.split('#').next().unwrap_or_default().trim();
        if key_value.starts_with(&prefix) {
            log::debug!("{} found", key);
            let value = key_value.split('=').nth(1).unwrap_or_default();
            return value.trim().trim_matches('"').to_string();
        }
    }

    String::new()
}
