//! Checks on the directory we're run from. Logs and the local config live there, so
//! it has to be writable, and we'd like to know if other users can tamper with it.

use std::path::Path;

use anyhow::{anyhow, Result};
use nix::sys::stat::{stat, Mode};
use nix::unistd::{access, AccessFlags, Uid};

/// Fail unless the current user can write to `dir`.
pub fn check_writable(dir: &Path) -> Result<()> {
    access(dir, AccessFlags::W_OK).map_err(|_| {
        anyhow!(
            "Current user doesn't have permission in the execution folder: {}",
            dir.display()
        )
    })
}

/// Advice about `dir` worth passing on to the operator: a directory owned by someone
/// else, or one that's world-writable. Empty if there's nothing to report.
pub fn security_advice(dir: &Path) -> Result<String> {
    let info = stat(dir).map_err(|e| {
        anyhow!(
            "Something wrong checking security issue: {} checking {}",
            e,
            dir.display()
        )
    })?;

    let uid = Uid::current();
    let mut advice = String::new();

    if Uid::from_raw(info.st_uid) != uid {
        advice.push_str(&format!(
            "Security Advice: The current user (UID={}) is not the owner of the directory '{}' (Owner UID={}).",
            uid,
            dir.display(),
            info.st_uid
        ));
    }

    if info.st_mode & Mode::S_IWOTH.bits() != 0 {
        advice.push_str(
            "SECURITY WARNING: this folder is accessible to non-privileged users that are not owner or in group",
        );
    }

    Ok(advice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{set_permissions, Permissions};
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    #[test]
    fn test_own_private_dir_needs_no_advice() {
        let dir = tempdir().unwrap();
        set_permissions(dir.path(), Permissions::from_mode(0o700)).unwrap();

        check_writable(dir.path()).unwrap();
        assert_eq!(security_advice(dir.path()).unwrap(), "");
    }

    #[test]
    fn test_world_writable_dir_is_flagged() {
        let dir = tempdir().unwrap();
        set_permissions(dir.path(), Permissions::from_mode(0o777)).unwrap();

        let advice = security_advice(dir.path()).unwrap();
        assert!(advice.contains("SECURITY WARNING"), "got: {}", advice);
    }

    #[test]
    fn test_missing_dir() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("gone");

        assert!(check_writable(&missing).is_err());
        assert!(security_advice(&missing).is_err());
    }
}
