//! Append Engine: find the next free address honoring page alignment and
//! wrap, build a header, and write header+payload through the page/sector
//! bounded write protocol.

use crate::crc::payload_crc32;
use crate::error::NvrError;
use crate::header::{self, HEADER_SIZE};
use crate::medium::{Geometry, Medium};

/// Result of a successful append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appended {
    /// Relative address of the new record's payload start.
    pub rel_addr: u32,
    pub size: u32,
    /// The back-link that was embedded in the new header.
    pub prev_addr: u32,
    /// CRC-32 computed over the payload and embedded in the new header.
    pub payload_crc32: u32,
    /// Whether the tail crossed the end of the medium and wrapped to 0.
    pub wrapped: bool,
}

/// Append `payload` under `file_id`, starting the search for free space at
/// `addr_hint` (relative). `prev_addr` is the back-link to embed (the
/// previous cursor's payload-start address, or 0 for the very first record).
pub fn append<M: Medium>(
    medium: &mut M,
    geom: &Geometry,
    scratch: &mut [u8],
    addr_hint: u32,
    page_align: bool,
    file_id: u64,
    prev_addr: u32,
    payload: &[u8],
) -> Result<Appended, NvrError> {
    if payload.is_empty() {
        return Err(NvrError::Argument);
    }
    if scratch.len() < geom.page_size as usize {
        return Err(NvrError::Argument);
    }

    let header_size = HEADER_SIZE as u32;
    let payload_len = payload.len() as u32;

    let mut addr = addr_hint;
    let mut page_filled = addr % geom.page_size;
    let page_remain = geom.page_size - page_filled;
    if page_remain < header_size || (page_align && page_filled != 0) {
        addr += page_remain;
        page_filled = 0;
    }

    let mut wrapped = false;
    if addr + header_size + payload_len > geom.len {
        addr = 0;
        page_filled = 0;
        wrapped = true;
    }

    let crc = payload_crc32(payload);
    let header_bytes = header::emit(file_id, payload_len, prev_addr, crc);
    let abs_addr = geom.to_absolute(addr);

    if page_filled + header_size + payload_len <= geom.page_size {
        let total = HEADER_SIZE + payload.len();
        scratch[..HEADER_SIZE].copy_from_slice(&header_bytes);
        scratch[HEADER_SIZE..total].copy_from_slice(payload);
        write_through(medium, geom, abs_addr, &scratch[..total])?;
    } else {
        let first_payload_len = (geom.page_size - page_filled - header_size) as usize;
        let total = HEADER_SIZE + first_payload_len;
        scratch[..HEADER_SIZE].copy_from_slice(&header_bytes);
        scratch[HEADER_SIZE..total].copy_from_slice(&payload[..first_payload_len]);
        write_through(medium, geom, abs_addr, &scratch[..total])?;
        write_through(medium, geom, abs_addr + total as u32, &payload[first_payload_len..])?;
    }

    log::debug!(
        "append: wrote file_id={file_id} at rel_addr={} size={payload_len} wrapped={wrapped}",
        addr + header_size
    );

    Ok(Appended { rel_addr: addr + header_size, size: payload_len, prev_addr, payload_crc32: crc, wrapped })
}

/// Low-level page/sector-bounded writer: erases each sector exactly once
/// before its first program call, and never erases the sector `addr` starts
/// in if `addr` is not sector-aligned (that sector is assumed to already be
/// either the active tail or pre-erased by a previous wrap).
fn write_through<M: Medium>(
    medium: &mut M,
    geom: &Geometry,
    mut addr: u32,
    data: &[u8],
) -> Result<(), NvrError> {
    let mut remain = data.len() as u32;
    let mut offset = 0usize;
    let mut finish_sector = addr % geom.sector_size != 0;
    let mut sector_remain = geom.sector_size - (addr % geom.sector_size);
    let mut page_remain = geom.page_size - (addr % geom.page_size);

    loop {
        let sector_chunk_len = sector_remain.min(remain);
        remain -= sector_chunk_len;

        if finish_sector {
            finish_sector = false;
        } else {
            let sector_start = addr - (addr % geom.sector_size);
            medium.erase_sector(sector_start)?;
        }

        let mut sector_chunk_remain = sector_chunk_len;
        loop {
            let chunk_len = sector_chunk_remain.min(page_remain);
            medium.program(addr, &data[offset..offset + chunk_len as usize])?;
            offset += chunk_len as usize;
            addr += chunk_len;
            sector_chunk_remain -= chunk_len;
            if sector_chunk_remain == 0 {
                page_remain -= chunk_len;
                if page_remain == 0 {
                    page_remain = geom.page_size;
                }
                break;
            }
            page_remain = geom.page_size;
        }

        sector_remain = geom.sector_size;
        if remain == 0 {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::DecodeOutcome;
    use crate::medium::{HwError, ERASE_BYTE};

    struct FakeMedium {
        data: Vec<u8>,
        erase_log: Vec<u32>,
    }

    impl FakeMedium {
        fn new(len: usize) -> Self {
            Self { data: vec![ERASE_BYTE; len], erase_log: Vec::new() }
        }
    }

    impl Medium for FakeMedium {
        fn read(&mut self, addr: u32, dst: &mut [u8]) -> Result<(), HwError> {
            let a = addr as usize;
            dst.copy_from_slice(&self.data[a..a + dst.len()]);
            Ok(())
        }
        fn program(&mut self, addr: u32, src: &[u8]) -> Result<(), HwError> {
            let a = addr as usize;
            self.data[a..a + src.len()].copy_from_slice(src);
            Ok(())
        }
        fn erase_sector(&mut self, addr: u32) -> Result<(), HwError> {
            self.erase_log.push(addr);
            let a = addr as usize;
            self.data[a..a + 4096].fill(ERASE_BYTE);
            Ok(())
        }
    }

    fn geom() -> Geometry {
        Geometry::new(256, 4096, 0, 65536).unwrap()
    }

    #[test]
    fn appends_small_record_in_one_page() {
        let mut m = FakeMedium::new(65536);
        let g = geom();
        let mut scratch = vec![0u8; g.page_size as usize];

        let r = append(&mut m, &g, &mut scratch, 0, false, 0x42, 0, b"HELLO").unwrap();
        assert_eq!(r.rel_addr, HEADER_SIZE as u32);
        assert_eq!(r.size, 5);
        assert!(!r.wrapped);

        match header::try_decode(&m.data[0..HEADER_SIZE]) {
            DecodeOutcome::Valid(h) => assert_eq!(h.file_id, 0x42),
            other => panic!("expected valid header, got {other:?}"),
        }
        assert_eq!(&m.data[HEADER_SIZE..HEADER_SIZE + 5], b"HELLO");
        // The first sector must have been erased exactly once before writing.
        assert_eq!(m.erase_log, vec![0]);
    }

    #[test]
    fn skips_to_next_page_when_header_would_not_fit() {
        let mut m = FakeMedium::new(65536);
        let g = geom();
        let mut scratch = vec![0u8; g.page_size as usize];

        // Leave fewer than HEADER_SIZE bytes at the end of the first page.
        let hint = g.page_size - (HEADER_SIZE as u32 - 1);
        let r = append(&mut m, &g, &mut scratch, hint, false, 1, 0, b"x").unwrap();
        assert_eq!(r.rel_addr, g.page_size + HEADER_SIZE as u32);
    }

    #[test]
    fn page_align_forces_every_record_to_a_page_boundary() {
        let mut m = FakeMedium::new(65536);
        let g = geom();
        let mut scratch = vec![0u8; g.page_size as usize];

        let r = append(&mut m, &g, &mut scratch, 10, true, 1, 0, b"x").unwrap();
        assert_eq!(r.rel_addr, g.page_size);
    }

    #[test]
    fn wraps_and_signals_soft_end_of_medium() {
        let mut m = FakeMedium::new(65536);
        let g = geom();
        let mut scratch = vec![0u8; g.page_size as usize];

        let hint = g.len - (HEADER_SIZE as u32 + 10 - 1);
        let r = append(&mut m, &g, &mut scratch, hint, false, 9, 0, &[0u8; 32]).unwrap();
        assert!(r.wrapped);
        assert_eq!(r.rel_addr, HEADER_SIZE as u32);
    }

    #[test]
    fn large_payload_spans_multiple_pages_and_sectors() {
        let mut m = FakeMedium::new(65536);
        let g = geom();
        let mut scratch = vec![0u8; g.page_size as usize];

        let payload = vec![b'y'; 5000]; // spans several pages and crosses a sector boundary
        let r = append(&mut m, &g, &mut scratch, 0, false, 7, 0, &payload).unwrap();
        assert_eq!(r.size, 5000);

        match header::try_decode(&m.data[0..HEADER_SIZE]) {
            DecodeOutcome::Valid(h) => assert_eq!(h.data_size, 5000),
            other => panic!("expected valid header, got {other:?}"),
        }
        let start = HEADER_SIZE;
        assert!(m.data[start..start + 5000].iter().all(|&b| b == b'y'));
        // Entered a second sector (4096-aligned) partway through the payload.
        assert!(m.erase_log.contains(&0));
        assert!(m.erase_log.contains(&4096));
    }

    #[test]
    fn zero_length_payload_is_rejected() {
        let mut m = FakeMedium::new(65536);
        let g = geom();
        let mut scratch = vec![0u8; g.page_size as usize];
        assert_eq!(
            append(&mut m, &g, &mut scratch, 0, false, 1, 0, &[]).unwrap_err(),
            NvrError::Argument
        );
    }

    #[test]
    fn back_link_is_embedded_verbatim() {
        let mut m = FakeMedium::new(65536);
        let g = geom();
        let mut scratch = vec![0u8; g.page_size as usize];
        let r = append(&mut m, &g, &mut scratch, 0, false, 1, HEADER_SIZE as u32, b"abc").unwrap();
        match header::try_decode(&m.data[r.rel_addr as usize - HEADER_SIZE..r.rel_addr as usize]) {
            DecodeOutcome::Valid(h) => assert_eq!(h.prev_addr, HEADER_SIZE as u32),
            other => panic!("expected valid header, got {other:?}"),
        }
    }
}
