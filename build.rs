use std::env;

fn main() {
    // Path to the middleware client used to fetch the mail configuration.
    let midclt_path =
        env::var("SENDEMAIL_MIDCLT_PATH").unwrap_or_else(|_| "/usr/bin/midclt".to_string());

    println!("cargo:rerun-if-env-changed=SENDEMAIL_MIDCLT_PATH");

    println!("cargo:rustc-env=SENDEMAIL_MIDCLT_PATH={}", midclt_path);
}
