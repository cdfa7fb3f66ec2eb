//! The one error currency for every fallible operation in this crate.

use thiserror::Error;

/// Error taxonomy for the store facade and its sub-engines.
///
/// Every public operation is synchronous and returns one of these variants on
/// failure; the crate never panics or unwinds across a public call boundary.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum NvrError {
    /// Bad geometry, or an operation attempted before `init_geometry` has run.
    #[error("store not initialized (bad geometry or init not yet complete)")]
    Init,

    /// A bad caller argument: null/empty buffer, zero size, out-of-range position.
    #[error("invalid argument")]
    Argument,

    /// A `Medium` callback reported failure.
    #[error("hardware error from the medium")]
    Hw,

    /// A scan found only the erase pattern in the inspected region.
    #[error("region contains only erased bytes")]
    Empty,

    /// A scan or write reached the physical end of the medium.
    #[error("reached the end of the medium")]
    EndOfMedium,

    /// `open` found no matching record, or `read`/`write` ran without a prior open.
    #[error("no matching record found")]
    NotFound,

    /// The payload read back does not match the header's stored CRC.
    #[error("payload failed its CRC check")]
    Crc,

    /// Reserved: a byte-walk found neither a recognized header nor an all-erased
    /// region. The Scan Engine always resolves this internally to a `Corrupted`
    /// event and recovers by skipping a page; no facade operation ever returns
    /// this variant. Kept only so the taxonomy stays complete.
    #[error("header region is neither valid nor empty")]
    Header,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, NvrError>;
