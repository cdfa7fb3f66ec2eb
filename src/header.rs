//! Header Codec: the fixed 40-byte record header, its integrity predicate,
//! and the encode/decode pair the Scan and Append engines drive.

use crate::medium::ERASE_BYTE;

/// Fixed magic identifying a header. Little-endian on the wire.
pub const PREAMBLE: u32 = 0x1FAC_ADE1;

/// Exact byte width of a record header:
/// preamble(4) + crc(4) + id(8) + id_inv(8) + size(4) + size_inv(4) + prev(4) + prev_inv(4).
pub const HEADER_SIZE: usize = 4 + 4 + 8 + 8 + 4 + 4 + 4 + 4;

const OFF_PREAMBLE: usize = 0;
const OFF_CRC: usize = 4;
const OFF_ID: usize = 8;
const OFF_ID_INV: usize = 16;
const OFF_SIZE: usize = 24;
const OFF_SIZE_INV: usize = 28;
const OFF_PREV: usize = 32;
const OFF_PREV_INV: usize = 36;

/// The fields of a recognized header, already de-duplicated (the inverted
/// copies exist only on the wire to detect torn writes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub payload_crc32: u32,
    pub file_id: u64,
    pub data_size: u32,
    /// Relative address of the previous record's payload start, or 0 if this
    /// is the first record ever appended to the log.
    pub prev_addr: u32,
}

/// Outcome of inspecting `HEADER_SIZE` bytes at some offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    Valid(RecordHeader),
    NotAHeader,
    /// Every byte in the inspected slice equals the erase pattern.
    Empty,
}

/// Serialize a header into a fresh `HEADER_SIZE`-byte buffer.
pub fn emit(file_id: u64, data_size: u32, prev_addr: u32, payload_crc32: u32) -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    buf[OFF_PREAMBLE..OFF_PREAMBLE + 4].copy_from_slice(&PREAMBLE.to_le_bytes());
    buf[OFF_CRC..OFF_CRC + 4].copy_from_slice(&payload_crc32.to_le_bytes());
    buf[OFF_ID..OFF_ID + 8].copy_from_slice(&file_id.to_le_bytes());
    buf[OFF_ID_INV..OFF_ID_INV + 8].copy_from_slice(&(!file_id).to_le_bytes());
    buf[OFF_SIZE..OFF_SIZE + 4].copy_from_slice(&data_size.to_le_bytes());
    buf[OFF_SIZE_INV..OFF_SIZE_INV + 4].copy_from_slice(&(!data_size).to_le_bytes());
    buf[OFF_PREV..OFF_PREV + 4].copy_from_slice(&prev_addr.to_le_bytes());
    buf[OFF_PREV_INV..OFF_PREV_INV + 4].copy_from_slice(&(!prev_addr).to_le_bytes());
    buf
}

/// Inspect exactly `HEADER_SIZE` bytes at the start of `bytes` (which must be
/// at least `HEADER_SIZE` long) and classify them.
pub fn try_decode(bytes: &[u8]) -> DecodeOutcome {
    debug_assert!(bytes.len() >= HEADER_SIZE);
    let bytes = &bytes[..HEADER_SIZE];

    if bytes.iter().all(|&b| b == ERASE_BYTE) {
        return DecodeOutcome::Empty;
    }

    let preamble = u32::from_le_bytes(bytes[OFF_PREAMBLE..OFF_PREAMBLE + 4].try_into().unwrap());
    let file_id = u64::from_le_bytes(bytes[OFF_ID..OFF_ID + 8].try_into().unwrap());
    let file_id_inv = u64::from_le_bytes(bytes[OFF_ID_INV..OFF_ID_INV + 8].try_into().unwrap());
    let data_size = u32::from_le_bytes(bytes[OFF_SIZE..OFF_SIZE + 4].try_into().unwrap());
    let data_size_inv = u32::from_le_bytes(bytes[OFF_SIZE_INV..OFF_SIZE_INV + 4].try_into().unwrap());
    let prev_addr = u32::from_le_bytes(bytes[OFF_PREV..OFF_PREV + 4].try_into().unwrap());
    let prev_addr_inv = u32::from_le_bytes(bytes[OFF_PREV_INV..OFF_PREV_INV + 4].try_into().unwrap());

    let recognized = preamble == PREAMBLE
        && file_id ^ file_id_inv == u64::MAX
        && data_size != 0
        && data_size ^ data_size_inv == u32::MAX
        && prev_addr ^ prev_addr_inv == u32::MAX;

    if !recognized {
        return DecodeOutcome::NotAHeader;
    }

    let payload_crc32 = u32::from_le_bytes(bytes[OFF_CRC..OFF_CRC + 4].try_into().unwrap());
    DecodeOutcome::Valid(RecordHeader { payload_crc32, file_id, data_size, prev_addr })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_emit_and_decode() {
        let buf = emit(0x42, 5, 0, 0xDEAD_BEEF);
        match try_decode(&buf) {
            DecodeOutcome::Valid(h) => {
                assert_eq!(h.file_id, 0x42);
                assert_eq!(h.data_size, 5);
                assert_eq!(h.prev_addr, 0);
                assert_eq!(h.payload_crc32, 0xDEAD_BEEF);
            }
            other => panic!("expected Valid, got {other:?}"),
        }
    }

    #[test]
    fn all_erased_bytes_are_empty() {
        let buf = [ERASE_BYTE; HEADER_SIZE];
        assert_eq!(try_decode(&buf), DecodeOutcome::Empty);
    }

    #[test]
    fn random_garbage_is_not_a_header() {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = 0xAA;
        assert_eq!(try_decode(&buf), DecodeOutcome::NotAHeader);
    }

    #[test]
    fn zero_data_size_is_never_valid() {
        let mut buf = emit(1, 10, 0, 0);
        // DataSize = 0 and DataSizeInv = !0, which still satisfies predicate 4
        // but must fail the DataSize != 0 clause of predicate 3.
        buf[24..28].copy_from_slice(&0u32.to_le_bytes());
        buf[28..32].copy_from_slice(&(!0u32).to_le_bytes());
        assert_eq!(try_decode(&buf), DecodeOutcome::NotAHeader);
    }

    #[test]
    fn torn_write_on_one_inverted_pair_is_rejected() {
        let mut buf = emit(1, 10, 0, 0);
        // Flip a single byte of FileIdInv without touching FileId: breaks predicate 2.
        buf[16] ^= 0xFF;
        assert_eq!(try_decode(&buf), DecodeOutcome::NotAHeader);
    }

    #[test]
    fn emit_size_matches_header_size_constant() {
        assert_eq!(emit(0, 1, 0, 0).len(), HEADER_SIZE);
        assert_eq!(HEADER_SIZE, 40);
    }
}
