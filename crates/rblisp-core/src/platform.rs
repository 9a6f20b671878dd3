//! Platform-specific lookup of the running executable
//!
//! Each submodule exposes the same `current_executable_path()` function; the
//! rest of the crate only uses [`current_executable_directory`].

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
use self::linux::current_executable_path;

#[cfg(not(target_os = "linux"))]
mod generic;
#[cfg(not(target_os = "linux"))]
use self::generic::current_executable_path;

/// Canonical directory containing the running executable
///
/// Symbolic links are resolved, so a binary started through a symlink in
/// `/usr/local/bin` still finds the data shipped next to the real file.
pub fn current_executable_directory() -> Result<PathBuf> {
    let exe = current_executable_path().map_err(Error::Resolution)?;
    parent_dir(&exe)
}

fn parent_dir(exe: &Path) -> Result<PathBuf> {
    exe.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            Error::Resolution(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} has no parent directory", exe.display()),
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_executable_directory_is_absolute_dir() {
        let dir = current_executable_directory().unwrap();
        assert!(dir.is_absolute());
        assert!(dir.is_dir());
    }

    #[test]
    fn test_parent_dir_of_bare_name_fails() {
        assert!(matches!(
            parent_dir(Path::new("rblisp")),
            Err(Error::Resolution(_))
        ));
        assert_eq!(
            parent_dir(Path::new("/opt/rblisp/rblisp")).unwrap(),
            PathBuf::from("/opt/rblisp")
        );
    }
}
