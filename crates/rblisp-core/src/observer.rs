//! Status and progress reporting
//!
//! The orchestrator emits human-readable status lines and per-chunk
//! progress through a [`FlashObserver`]. Front-ends decide how to render
//! them (plain lines, progress bars, log records).

use std::fmt;

/// Progress of the segment currently being transferred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    /// Bytes submitted to the device so far
    pub sent: u32,
    /// Declared segment length
    pub total: u32,
}

impl TransferProgress {
    /// Completion percentage, for display only
    pub fn percent(&self) -> f32 {
        if self.total == 0 {
            return 100.0;
        }
        self.sent as f32 / self.total as f32 * 100.0
    }
}

impl fmt::Display for TransferProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}b / {}b ({:.2}%)",
            self.sent,
            self.total,
            self.percent()
        )
    }
}

/// Sink for flashing status
pub trait FlashObserver {
    /// A status line (handshake, boot info, step transitions)
    fn status(&mut self, line: &str);

    /// A segment transfer is about to start
    ///
    /// `index` counts from 1.
    fn segment_start(&mut self, index: usize, total: u32) {
        self.status(&format!("Flashing {}. segment", index));
        self.status(&TransferProgress { sent: 0, total }.to_string());
    }

    /// One chunk has been accepted by the device
    fn progress(&mut self, progress: &TransferProgress) {
        self.status(&progress.to_string());
    }
}

impl<O: FlashObserver + ?Sized> FlashObserver for &mut O {
    fn status(&mut self, line: &str) {
        (**self).status(line)
    }

    fn segment_start(&mut self, index: usize, total: u32) {
        (**self).segment_start(index, total)
    }

    fn progress(&mut self, progress: &TransferProgress) {
        (**self).progress(progress)
    }
}

/// An observer that discards everything
pub struct NoObserver;

impl FlashObserver for NoObserver {
    fn status(&mut self, _line: &str) {}
    fn segment_start(&mut self, _index: usize, _total: u32) {}
    fn progress(&mut self, _progress: &TransferProgress) {}
}

/// An observer that forwards everything to the `log` facade
pub struct LogObserver;

impl FlashObserver for LogObserver {
    fn status(&mut self, line: &str) {
        log::info!("{}", line);
    }

    fn progress(&mut self, progress: &TransferProgress) {
        log::debug!("{}", progress);
    }
}
