//! Store Facade: owns the runtime handle (geometry, medium, scratch buffer,
//! cursor) and exposes `init_geometry`/`open`/`read`/`write`/`close`/
//! `erase_all`, combining the Scan and Append engines per open-time flags.

use bitflags::bitflags;

use crate::append::{self, Appended};
use crate::crc::payload_crc32;
use crate::error::{NvrError, Result};
use crate::header::HEADER_SIZE;
use crate::medium::{Geometry, Medium};
use crate::scan::{self, ScanEvent};

bitflags! {
    /// Persistent feature flags that shape on-medium layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StoreFlags: u32 {
        /// Every new record starts on a page boundary.
        const PAGE_ALIGN = 1 << 0;
    }
}

bitflags! {
    /// Per-call search policy passed to [`StoreFacade::open`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        /// Start the scan at the cursor instead of the base address.
        const FROM_CURRENT_POS = 1 << 0;
        /// Start at mid-medium and bisect toward the base on empty probes.
        const BINARY_SEARCH    = 1 << 1;
        /// Stop at the first id match.
        const FIRST_MATCH      = 1 << 2;
        /// Treat every valid record as a match.
        const ANY_ID           = 1 << 3;
        /// Match the largest id strictly less than the requested one.
        const NEAREST          = 1 << 4;
        /// Match the record with the largest id seen (requires a monotonic tail).
        const MAX_ID           = 1 << 5;
        /// Start the scan at the current record's back-link.
        const PREVIOUS         = 1 << 6;
        /// Start the scan at the current record's tail.
        const NEXT             = 1 << 7;
    }
}

impl OpenFlags {
    /// Semantic alias for [`OpenFlags::PREVIOUS`]. The source only
    /// implements two concrete cursor-relative start positions.
    pub const BACKWARD: OpenFlags = OpenFlags::PREVIOUS;
}

#[derive(Debug, Clone, Copy)]
struct FoundRecord {
    id: u64,
    /// Relative address of the payload start.
    addr: u32,
    size: u32,
    /// Raw back-link stored in the header; 0 means none.
    prev_addr: u32,
    payload_crc32: u32,
}

#[derive(Debug, Default)]
struct Cursor {
    /// Retained across `close()`; cleared only by `move_to_start()`, by
    /// `erase_all()`, or at the start of the next `open()`.
    record: Option<FoundRecord>,
    /// Whether `record` is the confirmed result of a search or write, as
    /// opposed to stale position data left over from before a `close()`.
    file_found: bool,
}

/// The store's runtime handle: geometry, medium, scratch buffer, and cursor.
///
/// Construction folds the source's `init_callbacks` step into `new` (there is
/// no null-callback state to represent); [`init_geometry`](Self::init_geometry)
/// must still run before any other operation is accepted, preserving the
/// two-step init gate as a testable property.
pub struct StoreFacade<'s, M: Medium> {
    medium: M,
    geom: Option<Geometry>,
    flags: StoreFlags,
    scratch: &'s mut [u8],
    cursor: Cursor,
    try_to_open: bool,
}

impl<'s, M: Medium> StoreFacade<'s, M> {
    /// Construct a handle over `medium`, borrowing `scratch` for its whole
    /// lifetime. `scratch` must be at least as large as the page size passed
    /// to `init_geometry`.
    pub fn new(medium: M, scratch: &'s mut [u8]) -> Self {
        Self {
            medium,
            geom: None,
            flags: StoreFlags::empty(),
            scratch,
            cursor: Cursor::default(),
            try_to_open: false,
        }
    }

    /// Validate and install the medium's geometry and feature flags.
    pub fn init_geometry(
        &mut self,
        page_size: u32,
        sector_size: u32,
        base_addr: u32,
        len: u32,
        flags: StoreFlags,
    ) -> Result<()> {
        let geom = Geometry::new(page_size, sector_size, base_addr, len)?;
        if self.scratch.len() < page_size as usize {
            return Err(NvrError::Argument);
        }
        self.geom = Some(geom);
        self.flags = flags;
        Ok(())
    }

    fn geom(&self) -> Result<Geometry> {
        self.geom.ok_or(NvrError::Init)
    }

    /// Search the log for a record per `flags`, populating the cursor on a
    /// match. Returns the matched record's payload size.
    pub fn open(&mut self, id: u64, flags: OpenFlags, empty_page_limit: u32) -> Result<u32> {
        let geom = self.geom()?;

        let mut half = 0u32;
        let mut start: u32;
        let mut skip_scan = false;

        if !flags.contains(OpenFlags::FROM_CURRENT_POS) || self.cursor.record.is_none() {
            if flags.contains(OpenFlags::BINARY_SEARCH) {
                half = geom.len / 2;
                start = geom.to_absolute(half);
            } else {
                start = geom.base_addr;
            }
        } else if flags.contains(OpenFlags::PREVIOUS) {
            match self.get_prev_addr() {
                // The back-link is the previous record's payload-start address;
                // the scan must begin at its header, HEADER_SIZE bytes earlier.
                Some(a) => start = geom.to_absolute(a - HEADER_SIZE as u32),
                None => {
                    start = geom.base_addr;
                    skip_scan = true;
                }
            }
        } else if flags.contains(OpenFlags::NEXT) {
            start = geom.to_absolute(self.get_next_addr());
        } else {
            start = geom.to_absolute(self.get_current_addr());
        }

        let end = geom.end_addr();
        self.try_to_open = true;
        self.cursor.record = None;
        self.cursor.file_found = false;

        let mut file_id_prev: u64 = 0;
        let mut file_id_max: u64 = 0;
        let mut empty_pages: u32 = 0;
        let mut found: Option<FoundRecord> = None;
        let mut prev_record: Option<FoundRecord> = None;
        let mut exit = skip_scan;

        while start < end && !exit {
            match scan::scan_page(&mut self.medium, &geom, self.scratch, start)? {
                ScanEvent::Found { abs_start, header, size } => {
                    let mut next = abs_start + size;
                    if self.flags.contains(StoreFlags::PAGE_ALIGN) {
                        let page_filled = next % geom.page_size;
                        if page_filled != 0 {
                            next += geom.page_size - page_filled;
                        }
                    }
                    start = next;

                    let record = FoundRecord {
                        id: header.file_id,
                        addr: geom.to_relative(abs_start) + HEADER_SIZE as u32,
                        size: header.data_size,
                        prev_addr: header.prev_addr,
                        payload_crc32: header.payload_crc32,
                    };

                    if id == header.file_id || flags.contains(OpenFlags::ANY_ID) {
                        found = Some(record);
                        if flags.contains(OpenFlags::FIRST_MATCH) {
                            exit = true;
                        }
                    } else if flags.contains(OpenFlags::NEAREST) {
                        // The straddling record (header.file_id > id) is the
                        // one that just overshot; the match is the record
                        // seen immediately before it, held in `prev_record`.
                        if id > file_id_prev && id < header.file_id {
                            found = prev_record;
                            exit = true;
                        }
                    } else if flags.contains(OpenFlags::MAX_ID) {
                        if header.file_id >= file_id_max {
                            file_id_max = header.file_id;
                            found = Some(record);
                        } else {
                            exit = true;
                        }
                    }
                    file_id_prev = header.file_id;
                    prev_record = Some(record);
                }
                ScanEvent::Empty => {
                    if empty_pages < empty_page_limit {
                        empty_pages += 1;
                    } else {
                        exit = true;
                    }
                    if file_id_prev == 0 {
                        if flags.contains(OpenFlags::BINARY_SEARCH) {
                            if half >= geom.page_size * 2 {
                                half /= 2;
                            }
                            if start >= geom.base_addr + half {
                                start -= half;
                            } else if start == geom.base_addr {
                                return Err(NvrError::Empty);
                            } else {
                                start = geom.base_addr;
                            }
                        } else {
                            start += geom.page_size;
                        }
                    } else {
                        exit = true;
                    }
                    if found.is_some() {
                        exit = true;
                    }
                }
                ScanEvent::Corrupted => start += geom.page_size,
                ScanEvent::EndOfMedium => break,
            }
        }

        match found {
            Some(f) => {
                log::debug!("open: matched file_id={} at rel_addr={} size={}", f.id, f.addr, f.size);
                let size = f.size;
                self.cursor.record = Some(f);
                self.cursor.file_found = true;
                Ok(size)
            }
            None => Err(NvrError::NotFound),
        }
    }

    /// Read `dst.len()` bytes from the currently opened record starting at
    /// relative position `pos`, verifying the result against the stored CRC.
    pub fn read(&mut self, pos: u32, dst: &mut [u8]) -> Result<()> {
        self.geom()?;
        if !self.try_to_open || !self.cursor.file_found {
            return Err(NvrError::NotFound);
        }
        let f = self.cursor.record.ok_or(NvrError::NotFound)?;
        if dst.is_empty() || pos.checked_add(dst.len() as u32).map_or(true, |end| end > f.size) {
            return Err(NvrError::Argument);
        }

        let geom = self.geom()?;
        let abs_addr = geom.to_absolute(f.addr + pos);
        read_through(&mut self.medium, &geom, abs_addr, dst)?;

        if payload_crc32(dst) != f.payload_crc32 {
            log::warn!("read: CRC mismatch for file_id={}", f.id);
            return Err(NvrError::Crc);
        }
        Ok(())
    }

    /// Append `payload` under `id`, using the current tail as the write
    /// position. Updates the cursor so the new record is immediately
    /// readable, even when the tail wrapped (`EndOfMedium` is then returned
    /// as a soft status after the write has already completed).
    pub fn write(&mut self, id: u64, payload: &[u8]) -> Result<()> {
        if !self.try_to_open {
            return Err(NvrError::NotFound);
        }
        if payload.is_empty() {
            return Err(NvrError::Argument);
        }
        let geom = self.geom()?;

        let (addr_hint, prev_addr) = match self.cursor.record {
            Some(f) => (f.addr + f.size, f.addr),
            None => (0, 0),
        };

        let page_align = self.flags.contains(StoreFlags::PAGE_ALIGN);
        let Appended { rel_addr, size, prev_addr, payload_crc32, wrapped } =
            append::append(&mut self.medium, &geom, self.scratch, addr_hint, page_align, id, prev_addr, payload)?;

        self.cursor.record = Some(FoundRecord { id, addr: rel_addr, size, prev_addr, payload_crc32 });
        self.cursor.file_found = true;

        if wrapped {
            log::warn!("write: tail wrapped to the start of the medium while writing file_id={id}");
            Err(NvrError::EndOfMedium)
        } else {
            Ok(())
        }
    }

    /// Clear `TryToOpen` and the found flag; cursor position data is
    /// retained so a subsequent `open(FROM_CURRENT_POS)` can resume.
    pub fn close(&mut self) -> Result<()> {
        self.geom()?;
        self.try_to_open = false;
        self.cursor.file_found = false;
        Ok(())
    }

    /// Erase every sector in the store's region and reset the cursor.
    pub fn erase_all(&mut self) -> Result<()> {
        let geom = self.geom()?;
        let mut addr = geom.base_addr;
        while addr < geom.end_addr() {
            self.medium.erase_sector(addr)?;
            addr += geom.sector_size;
        }
        self.cursor.record = None;
        self.cursor.file_found = false;
        log::info!("erase_all: cleared {} bytes starting at {}", geom.len, geom.base_addr);
        Ok(())
    }

    /// Relative address of the current record's header, or 0 if none.
    pub fn get_current_addr(&self) -> u32 {
        match self.cursor.record {
            Some(f) if f.addr > HEADER_SIZE as u32 => f.addr - HEADER_SIZE as u32,
            _ => 0,
        }
    }

    /// Relative address just past the current record's payload, page-aligned
    /// if `PAGE_ALIGN` is set, or 0 if there is no current record.
    pub fn get_next_addr(&self) -> u32 {
        let f = match self.cursor.record {
            Some(f) if f.addr > 0 => f,
            _ => return 0,
        };
        let mut addr = f.addr + f.size;
        if self.flags.contains(StoreFlags::PAGE_ALIGN) {
            if let Some(geom) = self.geom {
                let page_filled = addr % geom.page_size;
                if page_filled != 0 {
                    addr += geom.page_size - page_filled;
                }
            }
        }
        addr
    }

    /// The back-link stored in the current record, or `None` if it is 0.
    pub fn get_prev_addr(&self) -> Option<u32> {
        match self.cursor.record {
            Some(f) if f.prev_addr != 0 => Some(f.prev_addr),
            _ => None,
        }
    }

    /// The id of the current record, or 0 if there is none.
    pub fn get_found_id(&self) -> u64 {
        self.cursor.record.map(|f| f.id).unwrap_or(0)
    }

    /// Clear the cursor without closing the store.
    pub fn move_to_start(&mut self) {
        self.cursor.record = None;
        self.cursor.file_found = false;
    }
}

/// Issue page-bounded reads across `dst`, mirroring the page-chunked read
/// loop a physical NOR driver needs even though `Medium::read` itself
/// imposes no such limit.
fn read_through<M: Medium>(medium: &mut M, geom: &Geometry, mut addr: u32, dst: &mut [u8]) -> Result<()> {
    let mut offset = 0usize;
    let mut remain = dst.len() as u32;
    let mut page_remain = geom.page_size - (addr % geom.page_size);

    while remain > 0 {
        let chunk_len = page_remain.min(remain);
        medium.read(addr, &mut dst[offset..offset + chunk_len as usize])?;
        offset += chunk_len as usize;
        addr += chunk_len;
        remain -= chunk_len;
        page_remain = geom.page_size;
    }
    Ok(())
}
