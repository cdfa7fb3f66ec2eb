//! Payload checksum. CRC-32 computation is an external collaborator per the
//! design (§1) — this module wires in a real implementation rather than
//! reimplementing the algorithm, and is the only place that dependency is named.

/// CRC-32 (IEEE, seed 0) over payload bytes only; header fields are never
/// covered by this checksum.
pub fn payload_crc32(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}
