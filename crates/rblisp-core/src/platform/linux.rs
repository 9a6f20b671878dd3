//! Linux: the kernel exposes the resolved executable path in procfs

use std::io;
use std::path::PathBuf;

pub fn current_executable_path() -> io::Result<PathBuf> {
    match std::fs::read_link("/proc/self/exe") {
        Ok(path) => Ok(path),
        // procfs may not be mounted (containers, early boot)
        Err(e) => {
            log::debug!("readlink /proc/self/exe failed: {}", e);
            std::env::current_exe()?.canonicalize()
        }
    }
}
