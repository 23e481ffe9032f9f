use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use crate::logfile::append_line;

pub const SENT_DETAIL: &str = "<< Email Sent >>";
pub const SOFT_WARNING: &str =
    "\n>> Soft warning: something wrong with 1 or more attachments, check logs for more info >>";

/// The one JSON object a run prints on stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub error: bool,
    pub detail: String,
    pub logfile: Option<String>,
    pub total_attach: usize,
    pub ok_attach: usize,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        if self.error {
            1
        } else {
            0
        }
    }

    pub fn to_json(&self) -> String {
        // plain strings, bools and integers: serialization can't fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Per-run state threaded through the pipeline.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub work_dir: PathBuf,
    pub log_file: Option<PathBuf>,
    pub total_attach: usize,
    pub ok_attach: usize,
    pub security_advice: String,
}

impl RunContext {
    pub fn new(work_dir: &Path, total_attach: usize) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            log_file: None,
            total_attach,
            ok_attach: 0,
            security_advice: String::new(),
        }
    }

    /// Detail line for a successful send.
    pub fn success_detail(&self) -> String {
        let mut detail = SENT_DETAIL.to_string();
        if self.ok_attach < self.total_attach {
            detail.push_str(SOFT_WARNING);
        }
        detail.push_str(&self.security_advice);
        detail
    }

    /// Turn the pipeline result into the final outcome, recording its detail in the log
    /// file. If that write fails, the run fails too.
    pub fn finish(&self, result: Result<()>) -> RunOutcome {
        let (error, detail) = match result {
            Ok(()) => (false, self.success_detail()),
            Err(e) => (true, format!("{:#}", e)),
        };

        let outcome = self.outcome(error, detail);
        match &self.log_file {
            Some(path) => match append_line(path, &outcome.detail) {
                Ok(()) => outcome,
                Err(e) => self.outcome(true, format!("Error: {:#}", e)),
            },
            None => outcome,
        }
    }

    fn outcome(&self, error: bool, detail: String) -> RunOutcome {
        RunOutcome {
            error,
            detail,
            logfile: self
                .log_file
                .as_ref()
                .map(|path| path.display().to_string()),
            total_attach: self.total_attach,
            ok_attach: self.ok_attach,
        }
    }
}
