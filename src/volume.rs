//! The mounted FAT volume handle (§6, "Public API to outer layers"):
//! owns the chosen codec, the collaborator trait objects, and the
//! allocation state guarded by the volume FAT lock.
//!
//! Grounded in the shape of the teacher's `Fat16Reader`/`Fat32Reader`
//! (`filesystems/src/fat16/reader.rs`, `fat32/reader.rs`): one struct per
//! mounted volume, holding its geometry and a handle to its backing
//! store, with `log` calls at the seams a caller would want visibility
//! into.

use std::sync::{Arc, Mutex};

use crate::cache::{BlockCache, Discard, ErrorReporter, FsInfoSink, NoFsInfo};
use crate::codec::{codec_for, EntryCodec};
use crate::constants::FAT_START_ENT;
use crate::cursor::EntryCursor;
use crate::error::{FatEngineError, FatResult};
use crate::params::VolumeParams;

/// Allocation bookkeeping guarded by the volume FAT lock (§5): the
/// resumable allocation hint and the lazily-populated free-cluster
/// counter.
pub(crate) struct AllocState {
    pub(crate) prev_free: u32,
    pub(crate) free_counter: Option<u32>,
}

/// A mounted FAT volume. Built once by the mount layer and shared
/// (typically behind an `Arc`) across every caller that needs entry
/// access.
pub struct FatVolume {
    pub(crate) params: VolumeParams,
    pub(crate) codec: Box<dyn EntryCodec>,
    pub(crate) cache: Arc<dyn BlockCache>,
    pub(crate) discard: Option<Arc<dyn Discard>>,
    pub(crate) fsinfo: Arc<dyn FsInfoSink>,
    pub(crate) reporter: ErrorReporter,
    pub(crate) lock: Mutex<AllocState>,
}

impl FatVolume {
    /// Mount a volume: select the codec for `params.variant` once (the
    /// dispatch-table choice from the Design Notes) and start with an
    /// empty free-cluster counter, per the lifecycle rule that it is
    /// lazily populated on first query.
    pub fn mount(
        params: VolumeParams,
        cache: Arc<dyn BlockCache>,
        discard: Option<Arc<dyn Discard>>,
        fsinfo: Option<Arc<dyn FsInfoSink>>,
    ) -> Self {
        log::debug!(
            "mounting FAT{:?} volume: block_size={} fat_start_block={} blocks_per_fat={} fat_copies={} max_cluster={}",
            params.variant,
            params.block_size,
            params.fat_start_block,
            params.blocks_per_fat,
            params.fat_copies,
            params.max_cluster,
        );
        FatVolume {
            codec: codec_for(params.variant),
            params,
            cache,
            discard,
            fsinfo: fsinfo.unwrap_or_else(|| Arc::new(NoFsInfo)),
            reporter: ErrorReporter::default(),
            lock: Mutex::new(AllocState {
                prev_free: FAT_START_ENT - 1,
                free_counter: None,
            }),
        }
    }

    pub(crate) fn cursor(&self) -> EntryCursor<'_> {
        EntryCursor::new(self.codec.as_ref(), self.cache.clone(), self.params)
    }

    pub(crate) fn check_entry(&self, entry: u32) -> FatResult<()> {
        if self.params.is_valid_entry(entry) {
            Ok(())
        } else {
            self.reporter.report(&format!("entry {entry} out of range"));
            Err(FatEngineError::Invalid(format!(
                "entry {entry} not in [{}, {})",
                FAT_START_ENT, self.params.max_cluster
            )))
        }
    }

    pub fn params(&self) -> &VolumeParams {
        &self.params
    }

    /// `read_entry(e)`: does not take the volume FAT lock. FAT16/32
    /// reads are aligned primitive loads and FAT12 reads are guarded by
    /// their own short codec lock, so single reads are safe without it
    /// (§5).
    pub fn read_entry(&self, entry: u32) -> FatResult<u32> {
        self.check_entry(entry)?;
        let mut cursor = self.cursor();
        cursor.set_entry(entry)?;
        Ok(cursor.get())
    }

    /// `write_entry(e, v, wait)`: writes one entry and mirrors it to
    /// every secondary FAT copy before returning, satisfying invariant 3
    /// for a single-entry mutation outside the batched allocator/freer
    /// paths. `wait` additionally forces a synchronous flush of both the
    /// primary and mirrored blocks.
    pub fn write_entry(&self, entry: u32, value: u32, wait: bool) -> FatResult<()> {
        self.check_entry(entry)?;
        let mut cursor = self.cursor();
        cursor.set_entry(entry)?;
        let touched = cursor.put(value);
        drop(cursor);
        if wait {
            self.cache.sync(&touched)?;
        }
        crate::mirror::mirror_blocks(self.cache.as_ref(), &self.params, &touched, wait)
    }
}

#[cfg(test)]
mod tests {
    use crate::constants::EOF_FAT16;
    use crate::params::FatVariant;
    use crate::test_support::MockCache;

    use super::*;

    #[test]
    fn write_entry_mirrors_to_every_secondary_copy() {
        let params = VolumeParams::new(FatVariant::Fat16, 512, 0, 10, 2, 1, 4096).unwrap();
        let cache = MockCache::new(512);
        let volume = FatVolume::mount(params, cache.clone(), None, None);

        volume.write_entry(10, 11, true).unwrap();
        volume.write_entry(11, EOF_FAT16, true).unwrap();

        assert_eq!(volume.read_entry(10).unwrap(), 11);
        assert_eq!(volume.read_entry(11).unwrap(), EOF_FAT16);
        assert_eq!(&cache.bytes(0)[20..22], &[0x0B, 0x00]);
        assert_eq!(&cache.bytes(10)[20..22], &[0x0B, 0x00]);
    }

    #[test]
    fn fat12_straddling_entry_round_trips_through_the_public_api() {
        let params = VolumeParams::new(FatVariant::Fat12, 512, 0, 6, 1, 1, 4096).unwrap();
        let cache = MockCache::new(512);
        let volume = FatVolume::mount(params, cache, None, None);

        volume.write_entry(341, 0xABC, true).unwrap();
        assert_eq!(volume.read_entry(341).unwrap(), 0xABC);
    }

    #[test]
    fn fat32_write_preserves_the_reserved_high_nibble() {
        let params = VolumeParams::new(FatVariant::Fat32, 512, 0, 100, 1, 1, 1 << 20).unwrap();
        let cache = MockCache::new(512);
        let volume = FatVolume::mount(params, cache.clone(), None, None);

        let mut seeded = cache.bytes(0);
        seeded[400..404].copy_from_slice(&0xF000_0005u32.to_le_bytes());
        cache.set_bytes(0, seeded);

        volume.write_entry(100, 7, true).unwrap();
        assert_eq!(volume.read_entry(100).unwrap(), 7);
        let word = u32::from_le_bytes(cache.bytes(0)[400..404].try_into().unwrap());
        assert_eq!(word, 0xF000_0007);
    }

    #[test]
    fn out_of_range_entry_is_rejected() {
        let params = VolumeParams::new(FatVariant::Fat16, 512, 0, 10, 1, 1, 16).unwrap();
        let cache = MockCache::new(512);
        let volume = FatVolume::mount(params, cache, None, None);

        assert!(matches!(
            volume.read_entry(0),
            Err(FatEngineError::Invalid(_))
        ));
        assert!(matches!(
            volume.read_entry(16),
            Err(FatEngineError::Invalid(_))
        ));
    }
}
