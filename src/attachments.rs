use std::fs;

use anyhow::{anyhow, Result};
use lettre::message::{header::ContentType, Attachment, SinglePart};

/// What happened to one requested attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentStatus {
    Attached,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentResult {
    pub path: String,
    pub status: AttachmentStatus,
}

/// Attachment parts ready to go into a message, plus a per-file record of how each
/// requested path fared.
#[derive(Debug, Default)]
pub struct AttachmentBundle {
    pub parts: Vec<SinglePart>,
    pub results: Vec<AttachmentResult>,
}

impl AttachmentBundle {
    pub fn ok_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == AttachmentStatus::Attached)
            .count()
    }

    pub fn total_count(&self) -> usize {
        self.results.len()
    }
}

/// Last `/`-separated component of `path`, used as the attachment file name.
pub fn attachment_filename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Read each file and wrap it as an `application/octet-stream` part.
///
/// Unreadable files are logged and recorded, never fatal: the rest of the batch (and
/// the message itself) still goes out.
pub fn bundle_attachments(paths: &[String]) -> Result<AttachmentBundle> {
    let mut bundle = AttachmentBundle::default();
    let content_type = ContentType::parse("application/octet-stream")
        .map_err(|e| anyhow!("Invalid attachment content type: {}", e))?;

    for path in paths {
        let status = match fs::read(path) {
            Ok(data) => {
                let part = Attachment::new(attachment_filename(path).to_string())
                    .body(data, content_type.clone());
                bundle.parts.push(part);
                log::debug!("OK {}", path);
                AttachmentStatus::Attached
            }
            Err(e) => {
                log::warn!("KO {}: {}", path, e);
                AttachmentStatus::Failed(e.to_string())
            }
        };
        bundle.results.push(AttachmentResult {
            path: path.clone(),
            status,
        });
    }

    log::debug!("{} ok attachments", bundle.ok_count());
    Ok(bundle)
}
