//! A log-structured key/value store for NOR-flash-like block devices.
//!
//! Application code stores byte blobs ("files") under integer keys ("file
//! ids") in a forward-only append log, and later retrieves them by id,
//! nearest-id, max-id, or plain iteration. The store is built on three
//! injected primitives — page read, page program, sector erase — so it has
//! no opinion on the driver underneath it; see [`medium::Medium`].
//!
//! The flash driver itself and CRC-32 computation are external collaborators:
//! this crate never talks to hardware directly and never reimplements the
//! checksum, only the forward-log algorithm on top of both.
//!
//! ```
//! use nvkv::{Medium, StoreFacade, StoreFlags, OpenFlags};
//!
//! struct Ram(Vec<u8>);
//! impl Medium for Ram {
//!     fn read(&mut self, addr: u32, dst: &mut [u8]) -> Result<(), nvkv::HwError> {
//!         dst.copy_from_slice(&self.0[addr as usize..addr as usize + dst.len()]);
//!         Ok(())
//!     }
//!     fn program(&mut self, addr: u32, src: &[u8]) -> Result<(), nvkv::HwError> {
//!         self.0[addr as usize..addr as usize + src.len()].copy_from_slice(src);
//!         Ok(())
//!     }
//!     fn erase_sector(&mut self, addr: u32) -> Result<(), nvkv::HwError> {
//!         self.0[addr as usize..addr as usize + 4096].fill(0xFF);
//!         Ok(())
//!     }
//! }
//!
//! let mut scratch = [0u8; 256];
//! let mut store = StoreFacade::new(Ram(vec![0xFF; 65536]), &mut scratch);
//! store.init_geometry(256, 4096, 0, 65536, StoreFlags::empty()).unwrap();
//! let _ = store.open(0x42, OpenFlags::FIRST_MATCH, 2); // sets TryToOpen
//! store.write(0x42, b"HELLO").unwrap();
//! store.open(0x42, OpenFlags::FIRST_MATCH, 2).unwrap();
//! let mut buf = [0u8; 5];
//! store.read(0, &mut buf).unwrap();
//! assert_eq!(&buf, b"HELLO");
//! ```

pub mod append;
pub mod crc;
pub mod error;
pub mod header;
pub mod medium;
pub mod scan;
pub mod store;

pub use error::{NvrError, Result};
pub use header::{DecodeOutcome, RecordHeader, HEADER_SIZE, PREAMBLE};
pub use medium::{Geometry, HwError, Medium, ERASE_BYTE};
pub use scan::ScanEvent;
pub use store::{OpenFlags, StoreFacade, StoreFlags};
