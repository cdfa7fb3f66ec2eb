//! Scan Engine: walk the log forward from an absolute address, one page at a
//! time, classifying what's there.
//!
//! `scan_page` works in the medium's own absolute address space (it bounds
//! itself against `base_addr + len` and drives `Medium` directly); only the
//! Store Facade translates to/from relative addresses at the cursor boundary.

use crate::error::NvrError;
use crate::header::{self, DecodeOutcome, RecordHeader, HEADER_SIZE};
use crate::medium::{Geometry, Medium, ERASE_BYTE};

/// What a single page-sized read at some address turned out to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEvent {
    /// A recognized header (and the payload length it claims) starting at
    /// `abs_start`. `size` is `HEADER_SIZE + data_size`.
    Found { abs_start: u32, header: RecordHeader, size: u32 },
    /// The inspected region is entirely the erase pattern.
    Empty,
    /// The inspected region contains neither a recognized header nor only
    /// erased bytes.
    Corrupted,
    /// `addr` leaves no room for even one header before the end of the medium.
    EndOfMedium,
}

/// Read one page's worth of bytes (or less, near the end of the medium)
/// starting at the absolute address `addr`, and byte-search it for a header.
pub fn scan_page<M: Medium>(
    medium: &mut M,
    geom: &Geometry,
    scratch: &mut [u8],
    addr: u32,
) -> Result<ScanEvent, NvrError> {
    let end = geom.end_addr();
    if addr.saturating_add(HEADER_SIZE as u32) > end {
        return Ok(ScanEvent::EndOfMedium);
    }

    let bytes_to_read = geom.page_size.min(end - addr) as usize;
    debug_assert!(bytes_to_read >= HEADER_SIZE);
    let window = &mut scratch[..bytes_to_read];
    medium.read(addr, window)?;

    for o in 0..=(bytes_to_read - HEADER_SIZE) {
        if let DecodeOutcome::Valid(h) = header::try_decode(&window[o..o + HEADER_SIZE]) {
            let abs_start = addr + o as u32;
            let size = HEADER_SIZE as u32 + h.data_size;
            log::trace!("scan_page: found file_id={} at abs {abs_start} size {size}", h.file_id);
            return Ok(ScanEvent::Found { abs_start, header: h, size });
        }
    }

    if window.iter().all(|&b| b == ERASE_BYTE) {
        Ok(ScanEvent::Empty)
    } else {
        log::warn!("scan_page: corrupted region at abs {addr}, skipping one page");
        Ok(ScanEvent::Corrupted)
    }
}
