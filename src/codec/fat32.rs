use crate::cache::BlockHandle;
use crate::constants::{BAD_FAT32, EOF_FAT32};
use crate::cursor::EntryCursor;
use crate::params::VolumeParams;

use super::{EntryCodec, EntryLocation};

/// 4-byte little-endian entries; only the low 28 bits are the value, the
/// high 4 bits are reserved and must survive every write untouched
/// (invariant 5). Grounded in `fat32_ent_get`/`fat32_ent_put` in the
/// original source.
pub(crate) struct Fat32Codec;

const ENTRY_SIZE: usize = 4;
const VALUE_MASK: u32 = 0x0FFF_FFFF;

impl EntryCodec for Fat32Codec {
    fn locate(&self, params: &VolumeParams, entry: u32) -> EntryLocation {
        let bytes = (entry as u64) << 2;
        EntryLocation {
            block0: params.fat_start_block + bytes / params.block_size as u64,
            offset: (bytes % params.block_size as u64) as usize,
            straddles: false,
        }
    }

    fn bind(&self, cursor: &mut EntryCursor, location: EntryLocation) {
        debug_assert_eq!(location.offset % 4, 0, "FAT32 entry must be 4-byte aligned");
        cursor.mark_bound(location.offset, false);
    }

    fn get(&self, cursor: &EntryCursor) -> u32 {
        let buf = cursor.buf0.as_ref().expect("FAT32 cursor missing buffer");
        let data = buf.read();
        let raw = read_u32_le(&data, cursor.offset) & VALUE_MASK;
        if raw >= BAD_FAT32 {
            EOF_FAT32
        } else {
            raw
        }
    }

    fn put(&self, cursor: &EntryCursor, value: u32) -> Vec<BlockHandle> {
        let canonical = if value >= BAD_FAT32 { EOF_FAT32 } else { value };
        debug_assert_eq!(canonical & !VALUE_MASK, 0, "FAT32 value must fit in 28 bits");

        let buf = cursor.buf0.as_ref().expect("FAT32 cursor missing buffer");
        let mut data = buf.write();
        let existing = read_u32_le(&data, cursor.offset);
        let reserved_high = existing & !VALUE_MASK;
        let word = (canonical & VALUE_MASK) | reserved_high;
        data[cursor.offset..cursor.offset + 4].copy_from_slice(&word.to_le_bytes());
        drop(data);
        vec![buf.clone()]
    }

    fn advance(&self, cursor: &mut EntryCursor) -> bool {
        let block_size = cursor.params().block_size as usize;
        let next_offset = cursor.offset + ENTRY_SIZE;
        cursor.entry += 1;
        if next_offset + ENTRY_SIZE <= block_size {
            cursor.mark_bound(next_offset, false);
            true
        } else {
            cursor.mark_unbound();
            false
        }
    }
}

fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}
