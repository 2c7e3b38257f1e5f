//! FAT12/16/32 cluster-chain allocation table engine.
//!
//! Presents a uniform "read/write the next-pointer of cluster *e*" model
//! over three physically distinct on-disk entry encodings, keeps *N*
//! redundant FAT copies byte-identical after every mutation, and offers
//! transactional-looking allocate/free operations serialized by a single
//! per-volume lock.
//!
//! The block-buffer cache, discard/TRIM issuance, and the FSINFO
//! persistence record are external collaborators (see [`cache`]) owned
//! by the host filesystem; this crate never touches a superblock or a
//! directory entry itself.

mod allocator;
mod cache;
mod codec;
mod constants;
mod cursor;
mod error;
mod mirror;
mod params;
mod table_io;
mod volume;

pub use cache::{BlockCache, BlockHandle, Discard, ErrorReporter, FsInfoSink, NoFsInfo};
pub use constants::{FAT_START_ENT, FREE, MAX_DIRTY_SET};
pub use error::{FatEngineError, FatResult};
pub use params::{FatVariant, VolumeParams};
pub use volume::FatVolume;

#[cfg(test)]
pub(crate) mod test_support;
