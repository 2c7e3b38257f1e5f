use crate::cache::BlockHandle;
use crate::constants::{BAD_FAT12, EOF_FAT12};
use crate::cursor::EntryCursor;
use crate::params::VolumeParams;

use super::{EntryCodec, EntryLocation};

/// A single process-wide short critical section protecting the 2-byte
/// read/modify every FAT12 `get`/`put` performs, since an odd entry's
/// bytes are shared with its even neighbor (invariant 6). Grounded in
/// `static DEFINE_SPINLOCK(fat12_entry_lock)` in the original source; the
/// `spin` crate is adopted from `watos-fat`, the one example crate that
/// already builds this exact short-critical-section pattern for FAT12.
///
/// One process-wide lock (rather than one per volume) is sufficient per
/// the spec's Design Notes: FAT12 volumes are rare and writes are
/// bounded, so cross-volume contention is not a practical concern. Shard
/// by volume if that stops being true.
static FAT12_ENTRY_LOCK: spin::Mutex<()> = spin::Mutex::new(());

/// 12-bit entries packed two-to-three-bytes, straddling block boundaries
/// at odd entries. Grounded in `fat12_ent_blocknr`/`fat12_ent_set_ptr`/
/// `fat12_ent_get`/`fat12_ent_put`/`fat12_ent_next` in the original
/// source.
pub(crate) struct Fat12Codec;

impl EntryCodec for Fat12Codec {
    fn locate(&self, params: &VolumeParams, entry: u32) -> EntryLocation {
        let bytes = entry as u64 + entry as u64 / 2;
        let block_size = params.block_size as u64;
        let offset = (bytes % block_size) as usize;
        EntryLocation {
            block0: params.fat_start_block + bytes / block_size,
            offset,
            straddles: offset + 1 >= params.block_size as usize,
        }
    }

    fn bind(&self, cursor: &mut EntryCursor, location: EntryLocation) {
        cursor.mark_bound(location.offset, location.straddles);
    }

    fn get(&self, cursor: &EntryCursor) -> u32 {
        let odd = cursor.entry & 1 != 0;
        let _guard = FAT12_ENTRY_LOCK.lock();
        let (p0, p1) = read_pair(cursor);
        let raw = decode(odd, p0, p1);
        if raw >= BAD_FAT12 {
            EOF_FAT12
        } else {
            raw
        }
    }

    fn put(&self, cursor: &EntryCursor, value: u32) -> Vec<BlockHandle> {
        let canonical = if value >= BAD_FAT12 { EOF_FAT12 } else { value };
        let odd = cursor.entry & 1 != 0;
        let offset = cursor.offset;
        let buf0 = cursor.buf0.as_ref().expect("FAT12 cursor missing buffer");

        let _guard = FAT12_ENTRY_LOCK.lock();
        if cursor.straddles {
            let buf1 = cursor
                .buf1
                .as_ref()
                .expect("FAT12 straddling cursor missing second buffer");
            let mut data0 = buf0.write();
            let mut data1 = buf1.write();
            let (new_p0, new_p1) = encode(odd, canonical, data0[offset], data1[0]);
            data0[offset] = new_p0;
            data1[0] = new_p1;
            drop(data0);
            drop(data1);
            vec![buf0.clone(), buf1.clone()]
        } else {
            let mut data0 = buf0.write();
            let (new_p0, new_p1) = encode(odd, canonical, data0[offset], data0[offset + 1]);
            data0[offset] = new_p0;
            data0[offset + 1] = new_p1;
            drop(data0);
            vec![buf0.clone()]
        }
    }

    fn advance(&self, cursor: &mut EntryCursor) -> bool {
        let next_entry = cursor.entry + 1;
        let location = self.locate(cursor.params(), next_entry);
        cursor.entry = next_entry;

        if cursor.straddles {
            // The odd entry we just read ended in buf1; that block becomes
            // the new buf0 and we continue iterating inside it.
            let shifted = cursor.buf1.take().expect("straddling cursor missing buf1");
            cursor.buf0 = Some(shifted);
            cursor.buf1 = None;
            debug_assert!(!location.straddles, "entry after a straddle cannot itself straddle");
            cursor.mark_bound(location.offset, location.straddles);
            true
        } else {
            let still_covered = cursor
                .buf0
                .as_ref()
                .is_some_and(|b| b.block_no() == location.block0);
            if still_covered && !location.straddles {
                cursor.mark_bound(location.offset, false);
                true
            } else {
                cursor.mark_unbound();
                false
            }
        }
    }
}

/// Read the two raw bytes an entry's value is packed into, regardless of
/// whether they live in one buffer or span the pinned pair.
fn read_pair(cursor: &EntryCursor) -> (u8, u8) {
    let buf0 = cursor.buf0.as_ref().expect("FAT12 cursor missing buffer");
    let data0 = buf0.read();
    if cursor.straddles {
        let buf1 = cursor
            .buf1
            .as_ref()
            .expect("FAT12 straddling cursor missing second buffer");
        (data0[cursor.offset], buf1.read()[0])
    } else {
        (data0[cursor.offset], data0[cursor.offset + 1])
    }
}

fn decode(odd: bool, p0: u8, p1: u8) -> u32 {
    let raw = if odd {
        ((p0 as u32) >> 4) | ((p1 as u32) << 4)
    } else {
        ((p1 as u32) << 8) | (p0 as u32)
    };
    raw & 0x0FFF
}

fn encode(odd: bool, new: u32, old_p0: u8, old_p1: u8) -> (u8, u8) {
    if odd {
        let p0 = ((new << 4) as u8) | (old_p0 & 0x0F);
        let p1 = (new >> 4) as u8;
        (p0, p1)
    } else {
        let p0 = (new & 0xFF) as u8;
        let p1 = ((old_p1 & 0xF0) as u32 | (new >> 8)) as u8;
        (p0, p1)
    }
}
