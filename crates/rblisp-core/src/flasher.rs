//! Flash orchestrator
//!
//! Runs the complete ISP sequence for one chip/port combination:
//!
//! 1. validate the chip selector and the firmware input
//! 2. initialise and open a device session
//! 3. handshake and read the boot info
//! 4. load the eflash loader header, then every segment in chunks
//! 5. let the device check the image and jump into it
//!
//! Once the session is open it is owned by a guard that closes it when the
//! run ends, successful or not. The loader image file is dropped before
//! the session is closed.

use std::io::{self, Read};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::chip::ChipProfile;
use crate::error::{Error, Result, Step};
use crate::loader::LoaderImage;
use crate::observer::FlashObserver;
use crate::session::{BootInfo, DeviceResult, DeviceSession};
use crate::transfer::{chunk_sizes, transfer};

/// Parameters of one flashing run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashConfig {
    /// Chip-type selector, e.g. `"bl70x"`
    pub chip_type: String,
    /// Serial port; `None` means auto-discovery
    pub port: Option<String>,
    /// Firmware image to write
    pub input_path: PathBuf,
    /// Directory containing `data/<chip>/`; defaults to the executable's
    pub loader_dir: Option<PathBuf>,
}

impl FlashConfig {
    /// Create a config with auto-discovered port and default loader location
    pub fn new(chip_type: impl Into<String>, input_path: impl Into<PathBuf>) -> Self {
        Self {
            chip_type: chip_type.into(),
            port: None,
            input_path: input_path.into(),
            loader_dir: None,
        }
    }
}

/// What a successful run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashSummary {
    /// Boot info reported by the device
    pub boot_info: BootInfo,
    /// Declared length of every transferred segment, in order
    pub segment_lengths: Vec<u32>,
    /// Size of the firmware input file
    pub input_len: u64,
}

impl FlashSummary {
    /// Total loader payload bytes sent to the device
    pub fn bytes_sent(&self) -> u64 {
        self.segment_lengths.iter().map(|&l| l as u64).sum()
    }
}

/// Owns an open session and closes it exactly once on drop
struct SessionGuard<S: DeviceSession> {
    session: S,
}

impl<S: DeviceSession> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: DeviceSession> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: DeviceSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        log::debug!("Closing device session");
        self.session.close();
    }
}

/// Flash orchestrator
pub struct Flasher<O> {
    observer: O,
    running: Arc<AtomicBool>,
}

impl<O: FlashObserver> Flasher<O> {
    /// Create an orchestrator reporting to `observer`
    pub fn new(observer: O) -> Self {
        Self {
            observer,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Use a shared flag for cancellation
    ///
    /// Storing `false` stops the transfer at the next chunk boundary.
    pub fn with_cancel_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    /// Access the observer
    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Consume the orchestrator and return its observer
    pub fn into_observer(self) -> O {
        self.observer
    }

    /// Run the full flashing sequence
    ///
    /// `init` creates the device session for the resolved chip profile. It
    /// is not called when the chip selector or the input file is invalid.
    pub fn run<S, F>(&mut self, config: &FlashConfig, init: F) -> Result<FlashSummary>
    where
        S: DeviceSession,
        F: FnOnce(&'static ChipProfile) -> DeviceResult<S>,
    {
        let profile = ChipProfile::resolve(&config.chip_type)?;
        let input_len = check_input(&config.input_path)?;
        log::info!(
            "Firmware input {} ({} bytes)",
            config.input_path.display(),
            input_len
        );

        let mut session = open_session(profile, config.port.as_deref(), init)?;

        let boot_info = self.identify(&mut *session)?;
        let segment_lengths =
            self.load_eflash_loader(&mut *session, profile, config.loader_dir.as_deref())?;

        Ok(FlashSummary {
            boot_info,
            segment_lengths,
            input_len,
        })
    }

    /// Connect, handshake and read the boot info only
    pub fn probe<S, F>(&mut self, chip_type: &str, port: Option<&str>, init: F) -> Result<BootInfo>
    where
        S: DeviceSession,
        F: FnOnce(&'static ChipProfile) -> DeviceResult<S>,
    {
        let profile = ChipProfile::resolve(chip_type)?;
        let mut session = open_session(profile, port, init)?;
        self.identify(&mut *session)
    }

    fn identify<S: DeviceSession + ?Sized>(&mut self, session: &mut S) -> Result<BootInfo> {
        self.observer.status("Sending a handshake...");
        session
            .handshake()
            .map_err(|e| Error::protocol(Step::Handshake, e))?;
        self.observer.status("Handshake OK");

        self.observer.status("Getting chip info...");
        let boot_info = session
            .get_boot_info()
            .map_err(|e| Error::protocol(Step::BootInfo, e))?;
        self.observer.status(&boot_info.to_string());

        Ok(boot_info)
    }

    fn load_eflash_loader<S: DeviceSession + ?Sized>(
        &mut self,
        session: &mut S,
        profile: &ChipProfile,
        loader_dir: Option<&Path>,
    ) -> Result<Vec<u32>> {
        let mut image = LoaderImage::open(profile, loader_dir)?;
        let header = image.read_header()?;

        self.observer.status("Loading eflash_loader...");
        session
            .load_boot_header(&header)
            .map_err(|e| Error::protocol(Step::LoadBootHeader, e))?;

        let segment_lengths = self.load_segments(session, &mut image, profile.chunk_size)?;

        self.observer.status("Checking image...");
        session
            .check_image()
            .map_err(|e| Error::protocol(Step::CheckImage, e))?;

        self.observer.status("Running image...");
        session
            .run_image()
            .map_err(|e| Error::protocol(Step::RunImage, e))?;

        Ok(segment_lengths)
    }

    fn load_segments<S, R>(
        &mut self,
        session: &mut S,
        image: &mut LoaderImage<R>,
        chunk_size: usize,
    ) -> Result<Vec<u32>>
    where
        S: DeviceSession + ?Sized,
        R: Read,
    {
        let mut lengths = Vec::new();

        while let Some(header) = image.read_segment_header()? {
            let index = lengths.len() + 1;
            log::debug!(
                "Segment {}: {} bytes to 0x{:08X} in {} chunks",
                index,
                header.length,
                header.dest_addr,
                chunk_sizes(header.length, chunk_size).count()
            );

            session
                .load_segment_header(&header)
                .map_err(|e| Error::protocol(Step::LoadSegmentHeader, e))?;

            self.observer.segment_start(index, header.length);
            transfer(
                session,
                image,
                header.length,
                chunk_size,
                &mut self.observer,
                &self.running,
            )?;
            lengths.push(header.length);
        }

        if lengths.is_empty() {
            return Err(Error::NoSegments);
        }
        Ok(lengths)
    }
}

/// Initialise and open a session, handing it to a closing guard
fn open_session<S, F>(
    profile: &'static ChipProfile,
    port: Option<&str>,
    init: F,
) -> Result<SessionGuard<S>>
where
    S: DeviceSession,
    F: FnOnce(&'static ChipProfile) -> DeviceResult<S>,
{
    let mut session = init(profile).map_err(Error::DeviceInit)?;

    match port {
        Some(p) => log::info!("Opening {} session on {}", profile.chip_type, p),
        None => log::info!("Opening {} session (auto-detecting port)", profile.chip_type),
    }
    session.open(port).map_err(Error::Connection)?;

    Ok(SessionGuard { session })
}

/// Size of the firmware input, failing if it is not a readable file
fn check_input(path: &Path) -> Result<u64> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(meta.len()),
        Ok(_) => Err(Error::InputNotFound(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(Error::InputNotFound(path.to_path_buf()))
        }
        Err(e) => Err(Error::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::BL70X;
    use crate::error::DeviceError;
    use crate::loader::loader_path;
    use crate::observer::TransferProgress;
    use crate::session::{SegmentHeader, BOOT_HEADER_LEN};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    /// Calls made to a MockSession, shared with the test after the session
    /// has been dropped
    type CallLog = Rc<RefCell<Vec<String>>>;

    struct MockSession {
        calls: CallLog,
        fail_on: Option<&'static str>,
        data_bytes: Rc<RefCell<usize>>,
    }

    impl MockSession {
        fn new(calls: &CallLog) -> Self {
            Self {
                calls: calls.clone(),
                fail_on: None,
                data_bytes: Rc::new(RefCell::new(0)),
            }
        }

        fn failing_on(calls: &CallLog, op: &'static str) -> Self {
            Self {
                fail_on: Some(op),
                ..Self::new(calls)
            }
        }

        fn call(&mut self, op: &'static str) -> DeviceResult<()> {
            self.calls.borrow_mut().push(op.to_string());
            if self.fail_on == Some(op) {
                Err(DeviceError::Rejected(0x0102))
            } else {
                Ok(())
            }
        }
    }

    impl DeviceSession for MockSession {
        fn open(&mut self, _port: Option<&str>) -> DeviceResult<()> {
            self.call("open")
        }
        fn handshake(&mut self) -> DeviceResult<()> {
            self.call("handshake")
        }
        fn get_boot_info(&mut self) -> DeviceResult<BootInfo> {
            self.call("get_boot_info")?;
            Ok(BootInfo {
                rom_version: [1, 0, 2, 7],
                chip_id: [0xAB; 8],
            })
        }
        fn load_boot_header(&mut self, _header: &[u8; BOOT_HEADER_LEN]) -> DeviceResult<()> {
            self.call("load_boot_header")
        }
        fn load_segment_header(&mut self, _header: &SegmentHeader) -> DeviceResult<()> {
            self.call("load_segment_header")
        }
        fn load_segment_data(&mut self, data: &[u8]) -> DeviceResult<()> {
            self.call("load_segment_data")?;
            *self.data_bytes.borrow_mut() += data.len();
            Ok(())
        }
        fn check_image(&mut self) -> DeviceResult<()> {
            self.call("check_image")
        }
        fn run_image(&mut self) -> DeviceResult<()> {
            self.call("run_image")
        }
        fn close(&mut self) {
            self.calls.borrow_mut().push("close".to_string());
        }
    }

    #[derive(Default)]
    struct Recorder {
        lines: Vec<String>,
        progress: Vec<TransferProgress>,
    }

    impl FlashObserver for Recorder {
        fn status(&mut self, line: &str) {
            self.lines.push(line.to_string());
        }
        fn progress(&mut self, progress: &TransferProgress) {
            self.progress.push(*progress);
        }
    }

    struct Fixture {
        dir: TempDir,
        config: FlashConfig,
    }

    /// Loader directory with one image of the given segment lengths plus a
    /// firmware input file
    fn fixture(segment_lengths: &[u32]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = loader_path(dir.path(), &BL70X);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();

        let mut image = vec![0x42; BOOT_HEADER_LEN];
        for &len in segment_lengths {
            let header = SegmentHeader {
                dest_addr: 0x2201_0000,
                length: len,
                reserved: 0,
                crc32: 0,
            };
            image.extend_from_slice(&header.to_bytes());
            image.extend(std::iter::repeat(0x5A).take(len as usize));
        }
        std::fs::write(&path, image).unwrap();

        let input = dir.path().join("firmware.bin");
        std::fs::write(&input, [0u8; 64]).unwrap();

        let config = FlashConfig {
            chip_type: "bl70x".to_string(),
            port: Some("/dev/ttyACM0".to_string()),
            input_path: input,
            loader_dir: Some(dir.path().to_path_buf()),
        };
        Fixture { dir, config }
    }

    fn calls_of(log: &CallLog) -> Vec<String> {
        log.borrow().clone()
    }

    fn count(log: &CallLog, op: &str) -> usize {
        log.borrow().iter().filter(|c| c.as_str() == op).count()
    }

    #[test]
    fn test_full_sequence_order() {
        let fx = fixture(&[10_000]);
        let log = CallLog::default();
        let mut flasher = Flasher::new(Recorder::default());

        let summary = flasher
            .run(&fx.config, |_| Ok(MockSession::new(&log)))
            .unwrap();

        assert_eq!(
            calls_of(&log),
            vec![
                "open",
                "handshake",
                "get_boot_info",
                "load_boot_header",
                "load_segment_header",
                "load_segment_data",
                "load_segment_data",
                "load_segment_data",
                "check_image",
                "run_image",
                "close",
            ]
        );
        assert_eq!(summary.segment_lengths, vec![10_000]);
        assert_eq!(summary.bytes_sent(), 10_000);
        assert_eq!(summary.input_len, 64);
        assert_eq!(summary.boot_info.rom_version, [1, 0, 2, 7]);

        let recorder = flasher.into_observer();
        assert!(recorder
            .lines
            .contains(&"BootROM version 1.0.2.7, ChipID: ABABABABABABABAB".to_string()));
        assert!(recorder.lines.contains(&"Flashing 1. segment".to_string()));
        assert_eq!(recorder.progress.last().unwrap().sent, 10_000);
    }

    #[test]
    fn test_segment_bytes_match_declared_length() {
        let fx = fixture(&[5000]);
        let log = CallLog::default();
        let session = MockSession::new(&log);
        let bytes = session.data_bytes.clone();

        Flasher::new(Recorder::default())
            .run(&fx.config, move |_| Ok(session))
            .unwrap();

        assert_eq!(*bytes.borrow(), 5000);
    }

    #[test]
    fn test_multiple_segments() {
        let fx = fixture(&[100, 4093]);
        let log = CallLog::default();
        let mut flasher = Flasher::new(Recorder::default());

        let summary = flasher
            .run(&fx.config, |_| Ok(MockSession::new(&log)))
            .unwrap();

        assert_eq!(summary.segment_lengths, vec![100, 4093]);
        assert_eq!(count(&log, "load_segment_header"), 2);
        assert_eq!(count(&log, "load_segment_data"), 3);
        assert_eq!(count(&log, "close"), 1);
        assert!(flasher
            .observer()
            .lines
            .contains(&"Flashing 2. segment".to_string()));
    }

    #[test]
    fn test_invalid_chip_never_inits() {
        let mut fx = fixture(&[16]);
        fx.config.chip_type = "esp32".to_string();
        let mut init_called = false;

        let result = Flasher::new(Recorder::default()).run(&fx.config, |_| {
            init_called = true;
            Ok(MockSession::new(&CallLog::default()))
        });

        assert!(matches!(result, Err(Error::InvalidChip(ref c)) if c == "esp32"));
        assert!(!init_called);
    }

    #[test]
    fn test_missing_input_never_inits() {
        let mut fx = fixture(&[16]);
        fx.config.input_path = fx.dir.path().join("nope.bin");
        let mut init_called = false;

        let result = Flasher::new(Recorder::default()).run(&fx.config, |_| {
            init_called = true;
            Ok(MockSession::new(&CallLog::default()))
        });

        assert!(matches!(result, Err(Error::InputNotFound(_))));
        assert!(!init_called);
    }

    #[test]
    fn test_init_failure() {
        let fx = fixture(&[16]);
        let result = Flasher::new(Recorder::default())
            .run::<MockSession, _>(&fx.config, |_| Err(DeviceError::Io("no serial".into())));
        assert!(matches!(result, Err(Error::DeviceInit(_))));
    }

    #[test]
    fn test_open_failure_is_connection_error_without_close() {
        let fx = fixture(&[16]);
        let log = CallLog::default();
        let result = Flasher::new(Recorder::default())
            .run(&fx.config, |_| Ok(MockSession::failing_on(&log, "open")));

        assert!(matches!(result, Err(Error::Connection(_))));
        assert_eq!(calls_of(&log), vec!["open"]);
    }

    #[test]
    fn test_handshake_failure() {
        let fx = fixture(&[16]);
        let log = CallLog::default();
        let result = Flasher::new(Recorder::default())
            .run(&fx.config, |_| Ok(MockSession::failing_on(&log, "handshake")));

        let err = result.unwrap_err();
        assert_eq!(err.step(), Some(Step::Handshake));
        assert_eq!(calls_of(&log), vec!["open", "handshake", "close"]);
    }

    #[test]
    fn test_every_device_failure_closes_once() {
        let steps = [
            ("handshake", Step::Handshake),
            ("get_boot_info", Step::BootInfo),
            ("load_boot_header", Step::LoadBootHeader),
            ("load_segment_header", Step::LoadSegmentHeader),
            ("load_segment_data", Step::LoadSegmentData),
            ("check_image", Step::CheckImage),
            ("run_image", Step::RunImage),
        ];

        for (op, step) in steps {
            let fx = fixture(&[5000]);
            let log = CallLog::default();
            let result = Flasher::new(Recorder::default())
                .run(&fx.config, |_| Ok(MockSession::failing_on(&log, op)));

            let err = result.unwrap_err();
            assert_eq!(err.step(), Some(step), "failing op {}", op);
            assert_eq!(count(&log, "close"), 1, "failing op {}", op);
            assert_eq!(log.borrow().last().unwrap(), "close");
            assert_eq!(count(&log, op), 1, "{} must not be retried", op);
        }
    }

    #[test]
    fn test_missing_loader_image_closes_session() {
        let fx = fixture(&[16]);
        std::fs::remove_file(loader_path(fx.dir.path(), &BL70X)).unwrap();
        let log = CallLog::default();

        let result = Flasher::new(Recorder::default())
            .run(&fx.config, |_| Ok(MockSession::new(&log)));

        assert!(matches!(result, Err(Error::FileNotFound(_))));
        assert_eq!(
            calls_of(&log),
            vec!["open", "handshake", "get_boot_info", "close"]
        );
    }

    #[test]
    fn test_truncated_loader_closes_session() {
        let fx = fixture(&[]);
        let path = loader_path(fx.dir.path(), &BL70X);
        std::fs::write(&path, [0u8; 100]).unwrap();
        let log = CallLog::default();

        let result = Flasher::new(Recorder::default())
            .run(&fx.config, |_| Ok(MockSession::new(&log)));

        assert!(matches!(result, Err(Error::TruncatedFile { .. })));
        assert_eq!(count(&log, "load_boot_header"), 0);
        assert_eq!(count(&log, "close"), 1);
    }

    #[test]
    fn test_loader_without_segments() {
        let fx = fixture(&[]);
        let log = CallLog::default();

        let result = Flasher::new(Recorder::default())
            .run(&fx.config, |_| Ok(MockSession::new(&log)));

        assert!(matches!(result, Err(Error::NoSegments)));
        assert_eq!(count(&log, "check_image"), 0);
        assert_eq!(count(&log, "close"), 1);
    }

    #[test]
    fn test_cancelled_run_closes_session() {
        let fx = fixture(&[5000]);
        let log = CallLog::default();
        let running = Arc::new(AtomicBool::new(true));
        running.store(false, Ordering::SeqCst);

        let result = Flasher::new(Recorder::default())
            .with_cancel_flag(running)
            .run(&fx.config, |_| Ok(MockSession::new(&log)));

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(count(&log, "load_segment_data"), 0);
        assert_eq!(count(&log, "close"), 1);
    }

    #[test]
    fn test_probe_reads_boot_info_and_closes() {
        let log = CallLog::default();
        let info = Flasher::new(Recorder::default())
            .probe("bl70x", None, |_| Ok(MockSession::new(&log)))
            .unwrap();

        assert_eq!(info.chip_id, [0xAB; 8]);
        assert_eq!(calls_of(&log), vec!["open", "handshake", "get_boot_info", "close"]);
    }

    #[test]
    fn test_init_receives_resolved_profile() {
        let fx = fixture(&[16]);
        let log = CallLog::default();
        let mut seen = None;

        Flasher::new(Recorder::default())
            .run(&fx.config, |profile| {
                seen = Some(profile.type_str);
                Ok(MockSession::new(&log))
            })
            .unwrap();

        assert_eq!(seen, Some("bl70x"));
    }
}
