//! Write command implementation

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use rblisp_core::flasher::{FlashConfig, Flasher};
use rblisp_core::observer::{FlashObserver, TransferProgress};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::backends;
use crate::cli::DeviceArgs;

/// Progress reporter using indicatif progress bars
struct IndicatifProgress {
    multi: MultiProgress,
    current_bar: Option<ProgressBar>,
}

impl IndicatifProgress {
    fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            current_bar: None,
        }
    }

    fn create_bar(&mut self, total: u64, index: usize) {
        let pb = self.multi.add(ProgressBar::new(total));
        pb.set_style(
            ProgressStyle::default_bar()
                .template(&format!(
                    "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) Segment {}",
                    index
                ))
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        self.current_bar = Some(pb);
    }

    fn finish(&mut self) {
        if let Some(pb) = self.current_bar.take() {
            pb.finish();
        }
    }

    fn abandon(&mut self) {
        if let Some(pb) = self.current_bar.take() {
            pb.abandon_with_message("Aborted");
        }
    }
}

impl FlashObserver for IndicatifProgress {
    fn status(&mut self, line: &str) {
        self.multi.suspend(|| println!("{}", line));
    }

    fn segment_start(&mut self, index: usize, total: u32) {
        self.finish();
        self.status(&format!("Flashing {}. segment", index));
        self.create_bar(total as u64, index);
    }

    fn progress(&mut self, progress: &TransferProgress) {
        if let Some(pb) = &self.current_bar {
            pb.set_position(progress.sent as u64);
        }
        if progress.sent == progress.total {
            self.finish();
        }
        log::trace!("{}", progress);
    }
}

/// Run the write command
pub fn run_write(
    device: &DeviceArgs,
    loader_dir: Option<&Path>,
    input: &Path,
    running: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = FlashConfig::new(device.chip.as_str(), input);
    config.port = device.port.clone();
    config.loader_dir = loader_dir.map(Path::to_path_buf);

    let backend = device.backend;
    let baud = device.baud;
    let mut flasher = Flasher::new(IndicatifProgress::new()).with_cancel_flag(running);
    let result = flasher.run(&config, |profile| {
        backends::init_session(backend, profile, baud)
    });

    let mut progress = flasher.into_observer();
    match result {
        Ok(summary) => {
            progress.finish();
            println!(
                "Loaded {} segment(s), {} bytes; eflash loader is running",
                summary.segment_lengths.len(),
                summary.bytes_sent()
            );
            println!(
                "Firmware {} ({} bytes) is ready for the loader",
                input.display(),
                summary.input_len
            );
            Ok(())
        }
        Err(e) => {
            progress.abandon();
            Err(e.into())
        }
    }
}
