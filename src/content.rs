use std::fs;
use std::path::Path;

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD, Engine};

/// Inputs longer than this are never treated as paths.
pub const MAX_PATH_LEN: usize = 255;

/// Resolve a body argument to its content.
///
/// Long inputs are taken literally. Shorter ones are read from disk if a file by that
/// name exists, otherwise they are taken literally too. So a short path to a file
/// that doesn't exist is sent as-is.
pub fn load_content(input: &str) -> Result<String> {
    if input.chars().count() > MAX_PATH_LEN {
        log::debug!("body can't be a file, too much long");
        return Ok(input.to_string());
    }

    if Path::new(input).exists() {
        log::debug!("body is a file");
        return fs::read_to_string(input)
            .map_err(|e| anyhow!("Something wrong on body content {}", e));
    }

    log::debug!("no file found, plain text/html output");
    Ok(input.to_string())
}

/// Strictly decode standard base64. Whitespace, including newlines, is rejected.
pub fn decode_base64(input: &str) -> Result<Vec<u8>> {
    let decoded = STANDARD
        .decode(input)
        .map_err(|e| anyhow!("Invalid Base64 content. {}", e))?;
    log::debug!("Base64 message is valid.");
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{create_dir_all, write};
    use tempfile::tempdir;

    #[test]
    fn test_short_missing_path_is_literal() {
        let input = "/no/such/dir/report.html";
        assert_eq!(load_content(input).unwrap(), input);
    }

    #[test]
    fn test_literal_html_is_literal() {
        let input = "<html><body><b>all pools healthy</b></body></html>";
        assert_eq!(load_content(input).unwrap(), input);
    }

    #[test]
    fn test_existing_file_is_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("body.html");
        write(&path, "<p>from file</p>").unwrap();

        let content = load_content(path.to_str().unwrap()).unwrap();
        assert_eq!(content, "<p>from file</p>");
    }

    #[test]
    fn test_long_input_never_treated_as_path() {
        // nest directories until the full path is past the threshold; each
        // component stays well under the filesystem's name limit
        let dir = tempdir().unwrap();
        let mut nested = dir.path().to_path_buf();
        while nested.to_string_lossy().len() <= MAX_PATH_LEN {
            nested.push("a_fairly_long_directory_name_0123456789");
        }
        create_dir_all(&nested).unwrap();
        let path = nested.join("body.html");
        write(&path, "<p>from file</p>").unwrap();

        let input = path.to_str().unwrap();
        assert!(input.len() > MAX_PATH_LEN);
        assert_eq!(load_content(input).unwrap(), input);
    }

    #[test]
    fn test_unreadable_path_is_error() {
        // a directory exists, but can't be read as a file
        let dir = tempdir().unwrap();
        let result = load_content(dir.path().to_str().unwrap());
        assert!(result.is_err(), "Expected an error, but got: {:?}", result);
    }

    #[test]
    fn test_decode_base64_valid() {
        assert_eq!(decode_base64("SGVsbG8=").unwrap(), b"Hello");
    }

    #[test]
    fn test_decode_base64_rejects_garbage() {
        let err = decode_base64("!!!not base64!!!").unwrap_err();
        assert!(err.to_string().contains("Invalid Base64 content"));
    }

    #[test]
    fn test_decode_base64_rejects_newlines() {
        assert!(decode_base64("SGVs\nbG8=").is_err());
    }
}
