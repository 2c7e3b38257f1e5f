//! On-disk sentinel values for each FAT variant.
//!
//! Mirrors `cluster_values` in the teacher's `cluster_chain.rs`, but adds
//! the 12-bit constants that module never needed.

/// First entry index a caller may address. Entries 0 and 1 are reserved
/// by the FAT specification and never touched by this engine.
pub const FAT_START_ENT: u32 = 2;

pub const FREE: u32 = 0x0000_0000;

pub const EOF_FAT12: u32 = 0x0FF8;
pub const EOF_FAT16: u32 = 0xFFF8;
pub const EOF_FAT32: u32 = 0x0FFF_FFF8;

pub const BAD_FAT12: u32 = 0x0FF7;
pub const BAD_FAT16: u32 = 0xFFF7;
pub const BAD_FAT32: u32 = 0x0FFF_FFF7;

/// 128 KiB, the readahead window used by the allocator scan and the
/// free-cluster count scan alike.
pub const READAHEAD_WINDOW_BYTES: u64 = 128 * 1024;

/// Maximum pinned buffers a per-call dirty set may hold before an
/// in-place flush (sync + mirror + release) is forced. Bounds the memory
/// a single allocate/free/mark-bad call can pin at once (§5's resource
/// policy).
pub const MAX_DIRTY_SET: usize = 64;
