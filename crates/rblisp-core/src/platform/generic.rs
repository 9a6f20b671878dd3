//! macOS, Windows and other targets: ask std, then resolve symlinks

use std::io;
use std::path::PathBuf;

pub fn current_executable_path() -> io::Result<PathBuf> {
    std::env::current_exe()?.canonicalize()
}
