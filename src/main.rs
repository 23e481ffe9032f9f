use std::path::PathBuf;

use chrono::Local;

use sendemail::{MainContext, MessageDestination};

fn main() {
    let midclt_path = env!("SENDEMAIL_MIDCLT_PATH");
    let cli_args: Vec<String> = std::env::args().collect();
    let work_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let now: chrono::DateTime<Local> = Local::now();

    let ctx = MainContext {
        args: cli_args,
        config_command: vec![
            midclt_path.to_string(),
            "call".to_string(),
            "mail.config".to_string(),
        ],
        work_dir,
        message_destination: MessageDestination::Provider,
        started_at: now,
    };

    let output_opt: Option<&mut std::io::Stdout> = None;

    let outcome = sendemail::main(&ctx, output_opt);

    println!("{}", outcome.to_json());
    std::process::exit(outcome.exit_code());
}
