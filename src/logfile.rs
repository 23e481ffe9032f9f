//! Per-run log files under `sendemail_log/`.
//!
//! Each run with debugging enabled gets its own timestamped file. At most
//! `MAX_LOG_FILES` are kept: when the limit is reached, the oldest one goes before the
//! new one is created. The directory is kept at 0700 and the files at 0600.

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Local};
use simplelog::{LevelFilter, WriteLogger};

pub const LOG_DIR_NAME: &str = "sendemail_log";
pub const MAX_LOG_FILES: usize = 15;

const DIR_MODE: u32 = 0o700;
const FILE_MODE: u32 = 0o600;

/// The log file created for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    pub path: PathBuf,
    /// Number of log files that were already there.
    pub existing: usize,
}

/// Regular, non-symlink `*.txt` files in `dir`.
fn existing_log_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Can't list {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        // symlink_metadata doesn't follow links, so links are never "regular files"
        let is_regular = fs::symlink_metadata(&path)
            .map(|m| m.file_type().is_file())
            .unwrap_or(false);
        if is_regular && path.extension().is_some_and(|ext| ext == "txt") {
            files.push(path);
        }
    }
    Ok(files)
}

fn remove_oldest(files: &[PathBuf]) -> Result<()> {
    let oldest = files
        .iter()
        .filter_map(|path| {
            let meta = fs::symlink_metadata(path).ok()?;
            Some(((meta.ctime(), meta.ctime_nsec()), path))
        })
        .min_by_key(|(ctime, _)| *ctime)
        .map(|(_, path)| path);

    if let Some(oldest) = oldest {
        fs::remove_file(oldest)
            .with_context(|| format!("Can't remove old log file {}", oldest.display()))?;
    }
    Ok(())
}

/// Create this run's log file in `<work_dir>/sendemail_log`, rotating old ones.
///
/// A symlinked log directory is refused outright. Failing to tighten permissions is
/// only reported on stderr.
pub fn create_log_file(work_dir: &Path, now: &DateTime<Local>) -> Result<LogFile> {
    let log_dir = work_dir.join(LOG_DIR_NAME);

    if log_dir.is_symlink() {
        bail!("Something wrong is happening here: the {} folder is a symlink", LOG_DIR_NAME);
    }

    let existing = if !log_dir.exists() {
        DirBuilder::new()
            .recursive(true)
            .mode(DIR_MODE)
            .create(&log_dir)
            .map_err(|e| anyhow!("Something wrong managing logs: {}", e))?;
        0
    } else {
        let mode = fs::metadata(&log_dir)?.permissions().mode() & 0o777;
        if mode != DIR_MODE {
            if let Err(e) = fs::set_permissions(&log_dir, fs::Permissions::from_mode(DIR_MODE)) {
                eprintln!("Can't apply permission to log folder {}", e);
            }
        }

        let files = existing_log_files(&log_dir)?;
        if files.len() >= MAX_LOG_FILES {
            remove_oldest(&files)?;
        }
        files.len()
    };

    let path = log_dir.join(format!("{}.txt", now.format("%Y%m%d_%H%M%S")));
    if !path.exists() {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(FILE_MODE)
            .open(&path)
            .map_err(|e| anyhow!("Something wrong managing logs: {}", e))?;
    }

    Ok(LogFile { path, existing })
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .append(true)
        .open(path)
        .with_context(|| format!("Can't open log file {}", path.display()))
}

/// Route the `log` macros into `path`.
pub fn init_logger(path: &Path) -> Result<()> {
    let file = open_append(path)?;
    // only the first logger installed in a process wins; later calls are no-ops
    let _ = WriteLogger::init(LevelFilter::Trace, simplelog::Config::default(), file);
    Ok(())
}

/// Append one line to the log file.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = open_append(path)?;
    writeln!(file, "{}", line).with_context(|| format!("Can't write log file {}", path.display()))
}
