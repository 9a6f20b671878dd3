//! Eflash loader image reader
//!
//! The loader image is a 176-byte boot header immediately followed by one
//! or more segment records, each a 16-byte [`SegmentHeader`] and exactly
//! `length` bytes of payload:
//!
//! ```text
//! +-------------+----------+-----------+----------+-----------+-----
//! | boot header | seg hdr0 | payload 0 | seg hdr1 | payload 1 | ...
//! |  176 bytes  | 16 bytes | len0      | 16 bytes | len1      |
//! +-------------+----------+-----------+----------+-----------+-----
//! ```
//!
//! Reads are sequential and fail fast: a short read anywhere is reported
//! as [`Error::TruncatedFile`].

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use crate::chip::ChipProfile;
use crate::error::{Error, Result};
use crate::platform::current_executable_directory;
use crate::session::{SegmentHeader, BOOT_HEADER_LEN, SEGMENT_HEADER_LEN};

/// Directory, relative to the base directory, that holds per-chip loaders
pub const DATA_DIR: &str = "data";

/// Path of the eflash loader for `profile` below `base_dir`
///
/// `<base_dir>/data/<chip>/eflash_loader_<xtal>.bin`
pub fn loader_path(base_dir: &Path, profile: &ChipProfile) -> PathBuf {
    base_dir
        .join(DATA_DIR)
        .join(profile.type_str)
        .join(profile.loader_file_name())
}

/// Resolve the loader path, defaulting to the executable's directory
pub fn resolve_loader_path(profile: &ChipProfile, base_dir: Option<&Path>) -> Result<PathBuf> {
    let base = match base_dir {
        Some(dir) => dir.to_path_buf(),
        None => current_executable_directory()?,
    };
    Ok(loader_path(&base, profile))
}

/// Sequential reader over a loader image
pub struct LoaderImage<R> {
    reader: R,
    path: Option<PathBuf>,
}

impl LoaderImage<BufReader<File>> {
    /// Open the loader image for `profile`
    ///
    /// With `base_dir` set, the image is looked up below that directory
    /// instead of next to the running executable.
    pub fn open(profile: &ChipProfile, base_dir: Option<&Path>) -> Result<Self> {
        let path = resolve_loader_path(profile, base_dir)?;
        Self::open_path(&path)
    }

    /// Open a loader image at an explicit path
    pub fn open_path(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;
        log::debug!("Opened loader image {}", path.display());
        Ok(Self {
            reader: BufReader::new(file),
            path: Some(path.to_path_buf()),
        })
    }
}

impl<R: Read> LoaderImage<R> {
    /// Wrap an arbitrary reader positioned at the start of an image
    pub fn from_reader(reader: R) -> Self {
        Self { reader, path: None }
    }

    /// Path the image was opened from, if it came from a file
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read the fixed-size boot header
    pub fn read_header(&mut self) -> Result<[u8; BOOT_HEADER_LEN]> {
        let mut header = [0u8; BOOT_HEADER_LEN];
        self.read_exact(&mut header, "boot header")?;
        Ok(header)
    }

    /// Read the next segment header
    ///
    /// Returns `Ok(None)` when the image ends cleanly at a record boundary.
    pub fn read_segment_header(&mut self) -> Result<Option<SegmentHeader>> {
        let mut raw = [0u8; SEGMENT_HEADER_LEN];
        let mut filled = 0;
        while filled < raw.len() {
            match self.reader.read(&mut raw[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }

        match filled {
            0 => Ok(None),
            SEGMENT_HEADER_LEN => Ok(Some(SegmentHeader::from_bytes(&raw))),
            _ => Err(Error::TruncatedFile {
                what: "segment header",
                expected: SEGMENT_HEADER_LEN,
            }),
        }
    }

    /// Fill `buf` entirely with the next payload bytes
    pub fn read_payload(&mut self, buf: &mut [u8]) -> Result<()> {
        self.read_exact(buf, "segment payload")
    }

    fn read_exact(&mut self, buf: &mut [u8], what: &'static str) -> Result<()> {
        self.reader.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::TruncatedFile {
                what,
                expected: buf.len(),
            },
            _ => Error::Io(e),
        })
    }
}
