use std::io::Write;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use clap::error::ErrorKind;
use clap::{command, Arg, ArgAction, ArgMatches, Command};

pub mod attachments;
pub mod config;
pub mod content;
pub mod logfile;
pub mod message;
pub mod provider;
pub mod report;
pub mod workdir;

use config::MailConfig;
use message::{OutgoingMessage, SenderSources};
use provider::ProviderKind;
use report::{RunContext, RunOutcome};

/// Where the assembled message goes.
/// In production, this should be `Provider`; in testing, we might
/// instead write it to some `OutputStream`.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum MessageDestination {
    Provider,
    OutputStream,
}

/// Main context for the program. Represents values injected into main() for easy testing.
///
/// Fields:
///
/// - `args`: command-line arguments
/// - `config_command`: command printing the mail configuration as JSON, normally
///   `midclt call mail.config`
/// - `work_dir`: directory holding `sendemail_log/` and the local config file
/// - `message_destination`: where to deliver mail to (the selected provider or an
///   output stream)
/// - `started_at`: time the program was invoked. Used for the `Date:` header, the
///   Message-ID and the log file name.
#[derive(Debug)]
pub struct MainContext {
    pub args: Vec<String>,
    pub config_command: Vec<String>,
    pub work_dir: PathBuf,
    pub message_destination: MessageDestination,
    pub started_at: chrono::DateTime<Local>,
}

/// Subject, recipients, body and attachment paths, given separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscreteRequest {
    pub subject: String,
    pub to: String,
    pub body: String,
    pub attachments: Vec<String>,
}

/// What the caller asked us to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendRequest {
    Discrete(DiscreteRequest),
    Bulk { blob: String },
}

/// Validated command-line options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub request: SendRequest,
    /// Length of `--attachment_files`, whatever the mode.
    pub total_attach: usize,
    pub debug_enabled: bool,
    pub override_fromname: String,
    pub override_fromemail: String,
}

/// Build a CLI parser for the program.
///
/// There are two ways to call it. Either pass `--mail_body_html` (a file path, or the
/// HTML itself) together with `--subject`, `--to_address` and optionally
/// `--attachment_files`; or pass `--mail_bulk`, a complete base64-encoded MIME
/// message (again a path or the literal text), whose `To:` header names the
/// recipients.
pub fn build_cli() -> Command {
    command!()
        .arg(Arg::new("subject").long("subject").value_name("SUBJECT")
            .help("Email subject. Mandatory when using --mail_body_html"))
        .arg(Arg::new("to_address").long("to_address").value_name("ADDRESSES")
            .help("Recipient email address, or a comma-separated list. Mandatory when using --mail_body_html"))
        .arg(Arg::new("mail_body_html").long("mail_body_html").value_name("BODY")
            .help("File path for the email body, or just plain text/html. No encoding needed"))
        .arg(Arg::new("attachment_files").long("attachment_files").value_name("FILE")
            .num_args(0..)
            .action(ArgAction::Append)
            .help("Optional attachments, as a list of file paths. No encoding needed"))
        .arg(Arg::new("mail_bulk").long("mail_bulk").value_name("BULK")
            .help("Complete email, base64 encoded without newlines. File path or literal text. The recipient is taken from the message's To header"))
        .arg(Arg::new("debug_enabled").long("debug_enabled")
            .action(ArgAction::SetTrue)
            .help("Write a log file for this run under sendemail_log/"))
        .arg(Arg::new("override_fromname").long("override_fromname").value_name("NAME")
            .help("Sender name to use instead of the configured one"))
        .arg(Arg::new("override_fromemail").long("override_fromemail").value_name("ADDRESS")
            .help("Sender address to use instead of the configured one"))
}

fn non_empty(matches: &ArgMatches, id: &str) -> Option<String> {
    matches
        .get_one::<String>(id)
        .filter(|value| !value.is_empty())
        .cloned()
}

/// Check the flag combination and collect the options.
///
/// Exactly one input mode is used: `--mail_body_html` wins over `--mail_bulk`, and
/// needs both `--subject` and `--to_address`.
pub fn parse_options(matches: &ArgMatches) -> Result<Options> {
    let attachments: Vec<String> = matches
        .get_many::<String>("attachment_files")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let total_attach = attachments.len();

    let request = match (non_empty(matches, "mail_body_html"), non_empty(matches, "mail_bulk")) {
        (Some(body), _) => {
            match (non_empty(matches, "subject"), non_empty(matches, "to_address")) {
                (Some(subject), Some(to)) => SendRequest::Discrete(DiscreteRequest {
                    subject,
                    to,
                    body,
                    attachments,
                }),
                _ => bail!(
                    "Error: If --mail_body_html is provided, both --subject and --to_address are required."
                ),
            }
        }
        (None, Some(blob)) => SendRequest::Bulk { blob },
        (None, None) => bail!("Error: You must provide at least --mail_bulk or --mail_body_html."),
    };

    Ok(Options {
        request,
        total_attach,
        debug_enabled: matches.get_flag("debug_enabled"),
        override_fromname: non_empty(matches, "override_fromname").unwrap_or_default(),
        override_fromemail: non_empty(matches, "override_fromemail").unwrap_or_default(),
    })
}

/// Assemble the message for a discrete-mode send, recording attachment counts in `run`.
fn build_discrete_message(
    ctx: &MainContext,
    run: &mut RunContext,
    options: &Options,
    config: &MailConfig,
    request: &DiscreteRequest,
) -> Result<OutgoingMessage> {
    log::debug!("mail html provided");
    let html = content::load_content(&request.body)?;

    let local_name = config::lookup_local_value(&run.work_dir, "FromName");
    let local_email = config::lookup_local_value(&run.work_dir, "From");
    let sources = SenderSources {
        override_name: &options.override_fromname,
        override_email: &options.override_fromemail,
        local_name: &local_name,
        local_email: &local_email,
        daemon_name: &config.fromname,
        daemon_email: &config.fromemail,
    };
    let sender = message::resolve_sender(&sources)
        .ok_or_else(|| anyhow!("No sender address available: set a from address"))?;
    log::debug!("using sender {:?}", sender);

    let bundle = attachments::bundle_attachments(&request.attachments)?;
    run.ok_attach = bundle.ok_count();

    let fields = message::DiscreteFields {
        subject: &request.subject,
        to: &request.to,
        html: &html,
        smtp_user: &config.user,
        date: ctx.started_at,
    };
    message::build_discrete(&fields, &sender, bundle.parts)
}

/// Hand the message to the selected provider, or write it to `output`.
fn deliver<W: Write>(
    ctx: &MainContext,
    kind: ProviderKind,
    config: &MailConfig,
    message: &OutgoingMessage,
    output_opt: Option<&mut W>,
) -> Result<()> {
    match (ctx.message_destination, output_opt) {
        (MessageDestination::Provider, None) => {
            let transport = provider::transport_for(kind, config);
            log::debug!("sending via {}", transport.name());
            transport.send(message).map_err(|e| anyhow!("KO: {:#}", e))
        }
        (MessageDestination::OutputStream, Some(output)) => {
            output
                .write_all(&message.raw)
                .and_then(|_| output.flush())
                .context("Error writing message")?;
            log::debug!("Message for {} written to output stream", kind);
            Ok(())
        }
        _ => bail!("Invalid combination of message destination and output stream"),
    }
}

/// The send pipeline: checks, logging, config, provider choice, message, delivery.
/// Stops at the first failure.
fn send_pipeline<W: Write>(
    ctx: &MainContext,
    run: &mut RunContext,
    options: &Options,
    output_opt: Option<&mut W>,
) -> Result<()> {
    workdir::check_writable(&ctx.work_dir)?;
    run.security_advice = workdir::security_advice(&ctx.work_dir)?;

    if options.debug_enabled {
        let log_file = logfile::create_log_file(&ctx.work_dir, &ctx.started_at)?;
        logfile::init_logger(&log_file.path)?;
        run.log_file = Some(log_file.path.clone());
        log::info!("File {} successfully generated", log_file.path.display());
        log::info!("{} totals file log", log_file.existing);
    }
    log::info!("{} totals attachment", run.total_attach);

    let config = config::read_mail_config(&ctx.config_command)?;
    let kind = provider::select_provider(&config)?;

    let message = match &options.request {
        SendRequest::Discrete(request) => {
            build_discrete_message(ctx, run, options, &config, request)?
        }
        SendRequest::Bulk { blob } => {
            log::debug!("using bulk email provided");
            message::parse_bulk(&content::load_content(blob)?)?
        }
    };

    deliver(ctx, kind, &config, &message, output_opt)
}

/// Main logic for the program. Various I/O-type values get injected here as arguments,
/// for easy testing.
///
/// Arguments:
/// - `ctx`: main context, containing arguments, the config command, the working
///   directory, time we were invoked, etc.
/// - `output_opt`: optional output stream to write the message to. Should be `None` in
///   production, but can be used for testing.
///
/// Returns the outcome to report; printing it and exiting is left to the caller.
/// `--help` and `--version` print and exit directly.
pub fn main<W: Write>(ctx: &MainContext, output_opt: Option<&mut W>) -> RunOutcome {
    let cli_matches = match build_cli().try_get_matches_from(ctx.args.iter()) {
        Ok(matches) => matches,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            let usage = e.render().to_string();
            return RunContext::new(&ctx.work_dir, 0).finish(Err(anyhow!("{}", usage.trim())));
        }
    };

    let options = match parse_options(&cli_matches) {
        Ok(options) => options,
        Err(e) => return RunContext::new(&ctx.work_dir, 0).finish(Err(e)),
    };

    let mut run_ctx = RunContext::new(&ctx.work_dir, options.total_attach);
    let result = send_pipeline(ctx, &mut run_ctx, &options, output_opt);
    run_ctx.finish(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options> {
        let matches = build_cli().try_get_matches_from(args)?;
        parse_options(&matches)
    }

    #[test]
    fn test_discrete_options() {
        let options = parse(&[
            "sendemail",
            "--subject", "Report",
            "--to_address", "a@x.com",
            "--mail_body_html", "<p>hi</p>",
            "--attachment_files", "/tmp/a.txt", "/tmp/b.txt",
            "--debug_enabled",
        ])
        .unwrap();

        assert_eq!(options.total_attach, 2);
        assert!(options.debug_enabled);
        assert_eq!(
            options.request,
            SendRequest::Discrete(DiscreteRequest {
                subject: "Report".to_string(),
                to: "a@x.com".to_string(),
                body: "<p>hi</p>".to_string(),
                attachments: vec!["/tmp/a.txt".to_string(), "/tmp/b.txt".to_string()],
            })
        );
    }

    #[test]
    fn test_bulk_options() {
        let options = parse(&["sendemail", "--mail_bulk", "SGVsbG8="]).unwrap();
        assert_eq!(
            options.request,
            SendRequest::Bulk {
                blob: "SGVsbG8=".to_string()
            }
        );
        assert!(!options.debug_enabled);
        assert_eq!(options.total_attach, 0);
    }

    #[test]
    fn test_body_requires_subject_and_to() {
        let err = parse(&["sendemail", "--mail_body_html", "x", "--subject", "s"]).unwrap_err();
        assert!(err.to_string().contains("--subject and --to_address are required"));
    }

    #[test]
    fn test_needs_some_input() {
        let err = parse(&["sendemail", "--subject", "s"]).unwrap_err();
        assert!(err.to_string().contains("at least --mail_bulk or --mail_body_html"));
    }

    #[test]
    fn test_overrides() {
        let options = parse(&[
            "sendemail",
            "--mail_bulk", "SGVsbG8=",
            "--override_fromname", "Reports",
            "--override_fromemail", "reports@example.com",
        ])
        .unwrap();
        assert_eq!(options.override_fromname, "Reports");
        assert_eq!(options.override_fromemail, "reports@example.com");
    }
}
