use crate::cache::BlockHandle;
use crate::constants::{BAD_FAT16, EOF_FAT16};
use crate::cursor::EntryCursor;
use crate::params::VolumeParams;

use super::{EntryCodec, EntryLocation};

/// 2-byte little-endian entries, never straddling a block boundary.
/// Grounded in `fat_ent_blocknr`/`fat16_ent_set_ptr`/`fat16_ent_get`/
/// `fat16_ent_put`/`fat16_ent_next` in the original source.
pub(crate) struct Fat16Codec;

const ENTRY_SIZE: usize = 2;

impl EntryCodec for Fat16Codec {
    fn locate(&self, params: &VolumeParams, entry: u32) -> EntryLocation {
        let bytes = (entry as u64) << 1;
        EntryLocation {
            block0: params.fat_start_block + bytes / params.block_size as u64,
            offset: (bytes % params.block_size as u64) as usize,
            straddles: false,
        }
    }

    fn bind(&self, cursor: &mut EntryCursor, location: EntryLocation) {
        debug_assert_eq!(location.offset % 2, 0, "FAT16 entry must be 2-byte aligned");
        cursor.mark_bound(location.offset, false);
    }

    fn get(&self, cursor: &EntryCursor) -> u32 {
        let buf = cursor.buf0.as_ref().expect("FAT16 cursor missing buffer");
        let data = buf.read();
        let raw = u16::from_le_bytes([data[cursor.offset], data[cursor.offset + 1]]) as u32;
        if raw >= BAD_FAT16 {
            EOF_FAT16
        } else {
            raw
        }
    }

    fn put(&self, cursor: &EntryCursor, value: u32) -> Vec<BlockHandle> {
        let canonical = if value >= BAD_FAT16 { EOF_FAT16 } else { value };
        let buf = cursor.buf0.as_ref().expect("FAT16 cursor missing buffer");
        let bytes = (canonical as u16).to_le_bytes();
        let mut data = buf.write();
        data[cursor.offset] = bytes[0];
        data[cursor.offset + 1] = bytes[1];
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
