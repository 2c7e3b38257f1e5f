use crate::error::{FatEngineError, FatResult};

/// Which of the three on-disk entry encodings a volume uses.
///
/// Carried on [`VolumeParams`] and used once, at mount time, to select a
/// codec (see [`crate::codec`]) rather than branching on it throughout the
/// engine — the dispatch-table approach the spec calls for instead of
/// open-ended inheritance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatVariant {
    Fat12,
    Fat16,
    Fat32,
}

impl FatVariant {
    /// Bytes occupied by one entry in the simple (non-FAT12) encodings,
    /// expressed as a left-shift amount: `bytes = entry << shift`.
    pub(crate) fn shift(self) -> Option<u32> {
        match self {
            FatVariant::Fat16 => Some(1),
            FatVariant::Fat32 => Some(2),
            FatVariant::Fat12 => None,
        }
    }

    /// The canonical in-memory EOF sentinel for this variant. Passing
    /// this to a codec's `put` is a no-op normalization, since any value
    /// at or above the variant's BAD threshold is rewritten to exactly
    /// this constant.
    pub(crate) fn eof(self) -> u32 {
        match self {
            FatVariant::Fat12 => crate::constants::EOF_FAT12,
            FatVariant::Fat16 => crate::constants::EOF_FAT16,
            FatVariant::Fat32 => crate::constants::EOF_FAT32,
        }
    }

    /// The canonical "bad cluster" marker for this variant.
    pub(crate) fn bad(self) -> u32 {
        match self {
            FatVariant::Fat12 => crate::constants::BAD_FAT12,
            FatVariant::Fat16 => crate::constants::BAD_FAT16,
            FatVariant::Fat32 => crate::constants::BAD_FAT32,
        }
    }
}

/// Immutable-after-mount geometry of a FAT volume, as seen by the entry
/// engine. Constructed and owned by the mount layer; this crate never
/// reads a superblock itself.
#[derive(Debug, Clone, Copy)]
pub struct VolumeParams {
    pub variant: FatVariant,
    /// Block size in bytes. Must be a power of two, >= 512.
    pub block_size: u32,
    /// First block number of the primary FAT.
    pub fat_start_block: u64,
    /// Blocks occupied by a single FAT copy.
    pub blocks_per_fat: u64,
    /// Number of FAT copies on disk, including the primary. Always >= 1.
    pub fat_copies: u32,
    /// Sectors per cluster, used only to size discard requests.
    pub sectors_per_cluster: u32,
    /// One past the highest valid entry index (exclusive upper bound `M`).
    pub max_cluster: u32,
}

impl VolumeParams {
    pub fn new(
        variant: FatVariant,
        block_size: u32,
        fat_start_block: u64,
        blocks_per_fat: u64,
        fat_copies: u32,
        sectors_per_cluster: u32,
        max_cluster: u32,
    ) -> FatResult<Self> {
        if block_size < 512 || !block_size.is_power_of_two() {
            return Err(FatEngineError::Invalid(format!(
                "block size {block_size} is not a power of two >= 512"
            )));
        }
        if fat_copies == 0 {
            return Err(FatEngineError::Invalid(
                "a FAT volume needs at least one FAT copy".into(),
            ));
        }
        if max_cluster <= crate::constants::FAT_START_ENT {
            return Err(FatEngineError::Invalid(format!(
                "max_cluster {max_cluster} leaves no addressable entries"
            )));
        }
        if sectors_per_cluster == 0 {
            return Err(FatEngineError::Invalid(
                "sectors_per_cluster must be nonzero".into(),
            ));
        }
        Ok(VolumeParams {
            variant,
            block_size,
            fat_start_block,
            blocks_per_fat,
            fat_copies,
            sectors_per_cluster,
            max_cluster,
        })
    }

    /// `true` iff `entry` is in the addressable range `[2, max_cluster)`.
    pub fn is_valid_entry(&self, entry: u32) -> bool {
        entry >= crate::constants::FAT_START_ENT && entry < self.max_cluster
    }

    /// The canonical EOF value `read_entry` normalizes a chain's tail to
    /// for this volume's variant.
    pub fn eof_value(&self) -> u32 {
        self.variant.eof()
    }

    /// The canonical "bad cluster" marker for this volume's variant.
    pub fn bad_value(&self) -> u32 {
        self.variant.bad()
    }
}
