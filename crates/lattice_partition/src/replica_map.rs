//! Client-facing replica maps.
//!
//! Each namespace publishes one bitmap per replica role; bit `pid` is set
//! when this node plays that role for partition `pid`. The Base64 rendering
//! is maintained incrementally: a single-bit flip only dirties one 3-byte
//! bitmap chunk, so only the matching 4-character Base64 window is
//! re-encoded.

use std::sync::atomic::{AtomicU8, Ordering};

use base64::{engine::general_purpose, Engine as _};
use parking_lot::Mutex;
use tracing::debug;

use crate::namespace::Namespace;
use crate::types::{CLIENT_B64MAP_BYTES, CLIENT_BITMAP_BYTES};

/// One replica role's partition ownership bitmap plus its Base64 rendering.
///
/// Readers never lock: bytes are relaxed atomics, and a flip observed mid
/// re-encode yields a stale-but-valid map. Misrouted clients get redirected,
/// so the staleness window is harmless; keep reads lock-free.
#[derive(Debug)]
pub struct ClientReplicaMap {
    write_lock: Mutex<()>,
    bitmap: [AtomicU8; CLIENT_BITMAP_BYTES],
    b64map: [AtomicU8; CLIENT_B64MAP_BYTES],
}

impl ClientReplicaMap {
    pub(crate) fn new() -> Self {
        let map = Self {
            write_lock: Mutex::new(()),
            bitmap: std::array::from_fn(|_| AtomicU8::new(0)),
            b64map: std::array::from_fn(|_| AtomicU8::new(0)),
        };
        map.encode_all();
        map
    }

    /// Lock-free bit probe.
    pub fn is_set(&self, pid: u32) -> bool {
        let byte = self.bitmap[(pid >> 3) as usize].load(Ordering::Relaxed);
        byte & (0x80 >> (pid & 7)) != 0
    }

    /// Base64 rendering of the whole bitmap, as published to clients.
    pub fn b64map(&self) -> String {
        let bytes: Vec<u8> = self
            .b64map
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect();
        String::from_utf8(bytes).unwrap_or_default()
    }

    /// Raw bitmap snapshot.
    pub fn bitmap(&self) -> [u8; CLIENT_BITMAP_BYTES] {
        std::array::from_fn(|i| self.bitmap[i].load(Ordering::Relaxed))
    }

    pub(crate) fn clear_all(&self) {
        let _guard = self.write_lock.lock();

        for byte in &self.bitmap {
            byte.store(0, Ordering::Relaxed);
        }
        self.encode_all();
    }

    fn encode_all(&self) {
        let bytes: Vec<u8> = self
            .bitmap
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect();
        let encoded = general_purpose::STANDARD.encode(&bytes);

        for (slot, ch) in self.b64map.iter().zip(encoded.into_bytes()) {
            slot.store(ch, Ordering::Relaxed);
        }
    }

    /// Flip `pid`'s bit and re-encode just the dirtied 3-byte chunk into its
    /// 4-character Base64 window.
    pub(crate) fn flip(&self, pid: u32) {
        let byte_ix = (pid >> 3) as usize;
        let chunk = byte_ix / 3;
        let bitmap_offset = chunk * 3;
        let b64map_offset = chunk * 4;
        let input_len = (CLIENT_BITMAP_BYTES - bitmap_offset).min(3);

        let _guard = self.write_lock.lock();

        let byte = &self.bitmap[byte_ix];
        byte.store(
            byte.load(Ordering::Relaxed) ^ (0x80 >> (pid & 7)),
            Ordering::Relaxed,
        );

        let mut chunk_bytes = [0u8; 3];
        for (i, slot) in self.bitmap[bitmap_offset..bitmap_offset + input_len]
            .iter()
            .enumerate()
        {
            chunk_bytes[i] = slot.load(Ordering::Relaxed);
        }

        let encoded = general_purpose::STANDARD.encode(&chunk_bytes[..input_len]);
        for (slot, ch) in self.b64map[b64map_offset..].iter().zip(encoded.into_bytes()) {
            slot.store(ch, Ordering::Relaxed);
        }
    }
}

impl Namespace {
    /// Role index this node advertises for `pid`, if any.
    ///
    /// Takes the partition lock briefly; callers must not already hold it.
    pub fn replica_self_index(&self, pid: u32) -> Option<usize> {
        let replication_factor = self.replication_factor();
        self.partition(pid)
            .lock()
            .replica_self_index(self.self_node(), replication_factor)
    }

    /// Re-zero every replica map. The balance engine calls this on a cluster
    /// key change, before replaying per-partition ownership.
    pub fn clear_replica_maps(&self) {
        for map in self.replica_maps() {
            map.clear_all();
        }
        debug!(namespace = %self.name(), "client replica maps cleared");
    }

    /// Sync `pid`'s bit across all replica maps; returns true when any map
    /// changed.
    ///
    /// The partition record is read in a separate, briefly-locked phase; a
    /// map's write lock is never held together with a partition lock. A
    /// racing balance mutation at worst makes this call redundant, and the
    /// balance engine follows every mutation with another update.
    pub fn update_replica_maps(&self, pid: u32) -> bool {
        let replica = self.replica_self_index(pid);
        let mut changed = false;

        for (repl_ix, map) in self.replica_maps().iter().enumerate() {
            let owned = replica == Some(repl_ix);

            if owned == map.is_set(pid) {
                continue;
            }

            map.flip(pid);
            changed = true;
        }

        changed
    }

    /// Lock-free master-map probe used to gate query routing.
    pub fn is_partition_queryable(&self, pid: u32) -> bool {
        self.replica_maps()[0].is_set(pid)
    }
}
