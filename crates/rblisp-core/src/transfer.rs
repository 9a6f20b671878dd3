//! Segmented transfer engine
//!
//! Streams one segment payload from the loader image into the device in
//! chunks no larger than the profile's transfer limit. Only the byte
//! counters decide when the loop ends; the percentage reported to the
//! observer is cosmetic.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result, Step};
use crate::loader::LoaderImage;
use crate::observer::{FlashObserver, TransferProgress};
use crate::session::DeviceSession;

/// Transfer `total` payload bytes from `image` into `session`
///
/// `running` is polled before every chunk; once it reads `false` the
/// transfer stops with [`Error::Cancelled`]. A chunk that has started is
/// always completed, since the device cannot resynchronise mid-frame.
///
/// A device rejection aborts immediately without retrying. Returns the
/// number of bytes sent, which always equals `total` on success.
pub fn transfer<S, R, O>(
    session: &mut S,
    image: &mut LoaderImage<R>,
    total: u32,
    chunk_size: usize,
    observer: &mut O,
    running: &AtomicBool,
) -> Result<u32>
where
    S: DeviceSession + ?Sized,
    R: Read,
    O: FlashObserver + ?Sized,
{
    if chunk_size == 0 {
        return Err(Error::InvalidChunkSize(chunk_size));
    }

    let mut buffer = vec![0u8; chunk_size.min(total as usize)];
    let mut sent: u32 = 0;

    while sent < total {
        if !running.load(Ordering::SeqCst) {
            log::warn!("Transfer cancelled after {} of {} bytes", sent, total);
            return Err(Error::Cancelled);
        }

        let len = chunk_len(chunk_size, total - sent);
        let chunk = &mut buffer[..len];
        image.read_payload(chunk)?;

        session
            .load_segment_data(chunk)
            .map_err(|e| Error::protocol(Step::LoadSegmentData, e))?;

        sent += len as u32;
        observer.progress(&TransferProgress { sent, total });
    }

    Ok(sent)
}

/// Size of the next chunk given the bytes still to send
fn chunk_len(chunk_size: usize, remaining: u32) -> usize {
    chunk_size.min(remaining as usize)
}

/// Sizes of the chunks a segment of `total` bytes is split into
pub fn chunk_sizes(total: u32, chunk_size: usize) -> impl Iterator<Item = usize> {
    let mut remaining = total;
    std::iter::from_fn(move || {
        if remaining == 0 || chunk_size == 0 {
            return None;
        }
        let len = chunk_len(chunk_size, remaining);
        remaining -= len as u32;
        Some(len)
    })
}
