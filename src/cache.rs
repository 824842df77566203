//! Bounded in-memory store for captured frames
//!
//! Frames are concatenated into one buffer that is reserved up front, with a
//! parallel index of frame lengths. A frame that does not fit is counted and
//! dropped, never truncated.

use std::mem;

use crate::error::CaptureError;
use crate::{NOMINAL_FRAME_BYTES, PACKET_FLOOR};

/// Point-in-time view of a cache
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total_packets: usize,
    pub total_bytes: u64,
    pub cache_capacity: usize,
    pub cache_used: usize,
    pub dropped_packets: u64,
}

impl CacheStats {
    /// Fraction of the byte capacity in use, in percent
    pub fn utilisation(&self) -> f64 {
        if self.cache_capacity == 0 {
            0.0
        } else {
            self.cache_used as f64 / self.cache_capacity as f64 * 100.0
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    PacketCeiling,
    ByteCapacity,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppendOutcome {
    Stored,
    Dropped(DropReason),
}

/// Everything a cache held when it was drained
#[derive(Debug, Default)]
pub struct CacheSnapshot {
    pub data: Vec<u8>,
    pub lengths: Vec<u32>,
    pub dropped_packets: u64,
}

impl CacheSnapshot {
    pub fn total_packets(&self) -> usize {
        self.lengths.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    /// Iterate over the stored frames in capture order
    pub fn packets(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let mut offset = 0usize;
        self.lengths.iter().map(move |&len| {
            let start = offset;
            offset += len as usize;
            &self.data[start..offset]
        })
    }
}

/// How many frames a cache of `capacity_bytes` admits
///
/// Small caches still get at least `floor` entries so tiny frames are not
/// refused just because the average-size estimate says so.
pub fn packet_ceiling(capacity_bytes: usize, nominal_frame_bytes: usize, floor: usize) -> usize {
    (capacity_bytes / nominal_frame_bytes.max(1)).max(floor)
}

#[derive(Debug)]
pub struct CaptureCache {
    buffer: Vec<u8>,
    lengths: Vec<u32>,
    capacity: usize,
    max_packets: usize,
    dropped: u64,
    lifetime_bytes: u64,
}

impl CaptureCache {
    /// Allocate a cache with the default packet ceiling
    pub fn with_capacity(capacity_bytes: usize) -> Result<Self, CaptureError> {
        Self::new(
            capacity_bytes,
            packet_ceiling(capacity_bytes, NOMINAL_FRAME_BYTES, PACKET_FLOOR),
        )
    }

    /// Allocate a cache holding at most `capacity_bytes` bytes in `max_packets` frames
    pub fn new(capacity_bytes: usize, max_packets: usize) -> Result<Self, CaptureError> {
        let alloc_failed = |_| CaptureError::CacheAllocation {
            capacity: capacity_bytes,
        };
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(capacity_bytes)
            .map_err(alloc_failed)?;
        let mut lengths = Vec::new();
        lengths.try_reserve_exact(max_packets).map_err(alloc_failed)?;
        Ok(Self {
            buffer,
            lengths,
            capacity: capacity_bytes,
            max_packets,
            dropped: 0,
            lifetime_bytes: 0,
        })
    }

    pub fn append(&mut self, frame: &[u8]) -> AppendOutcome {
        if self.lengths.len() >= self.max_packets {
            self.dropped += 1;
            return AppendOutcome::Dropped(DropReason::PacketCeiling);
        }
        let len = match u32::try_from(frame.len()) {
            Ok(len) if self.buffer.len() + frame.len() <= self.capacity => len,
            _ => {
                self.dropped += 1;
                return AppendOutcome::Dropped(DropReason::ByteCapacity);
            }
        };
        self.buffer.extend_from_slice(frame);
        self.lengths.push(len);
        self.lifetime_bytes += frame.len() as u64;
        AppendOutcome::Stored
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            total_packets: self.lengths.len(),
            total_bytes: self.buffer.len() as u64,
            cache_capacity: self.capacity,
            cache_used: self.buffer.len(),
            dropped_packets: self.dropped,
        }
    }

    /// Forget all stored frames and counters, keeping the allocation
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.lengths.clear();
        self.dropped = 0;
    }

    /// Move the contents out, leaving the cache empty and unallocated
    pub fn drain(&mut self) -> CacheSnapshot {
        CacheSnapshot {
            data: mem::take(&mut self.buffer),
            lengths: mem::take(&mut self.lengths),
            dropped_packets: mem::replace(&mut self.dropped, 0),
        }
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_packets(&self) -> usize {
        self.max_packets
    }

    /// Bytes accepted since creation, unaffected by [`clear`](Self::clear)
    pub fn lifetime_bytes(&self) -> u64 {
        self.lifetime_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn thousand_byte_cache_takes_ten_hundred_byte_frames() {
        let mut cache = CaptureCache::with_capacity(1000).unwrap();
        let frame = [0xabu8; 100];
        for _ in 0..10 {
            assert_eq!(cache.append(&frame), AppendOutcome::Stored);
        }
        let stats = cache.stats();
        assert_eq!(stats.total_packets, 10);
        assert_eq!(stats.cache_used, 1000);
        assert_eq!(stats.dropped_packets, 0);

        assert_eq!(
            cache.append(&frame),
            AppendOutcome::Dropped(DropReason::ByteCapacity)
        );
        let stats = cache.stats();
        assert_eq!(stats.total_packets, 10);
        assert_eq!(stats.dropped_packets, 1);
    }

    #[test]
    fn kilobyte_cache_drops_eleventh_frame() {
        let mut cache = CaptureCache::with_capacity(1024).unwrap();
        for _ in 0..10 {
            cache.append(&[1u8; 100]);
        }
        assert_eq!(cache.stats().cache_used, 1000);
        cache.append(&[1u8; 100]);
        assert_eq!(cache.stats().dropped_packets, 1);
        assert_eq!(cache.len(), 10);
    }

    #[test]
    fn packet_ceiling_has_a_floor() {
        assert_eq!(packet_ceiling(0, 1066, 1024), 1024);
        assert_eq!(packet_ceiling(10 * 1066 * 1024, 1066, 1024), 10 * 1024);
        assert_eq!(packet_ceiling(100, 0, 4), 100);

        let cache = CaptureCache::with_capacity(2048).unwrap();
        assert_eq!(cache.capacity(), 2048);
        assert_eq!(cache.max_packets(), PACKET_FLOOR);
    }

    #[test]
    fn ceiling_drops_before_bytes_run_out() {
        let mut cache = CaptureCache::new(1000, 3).unwrap();
        assert_eq!((cache.capacity(), cache.max_packets()), (1000, 3));
        for _ in 0..3 {
            assert_eq!(cache.append(&[0u8; 10]), AppendOutcome::Stored);
        }
        assert_eq!(
            cache.append(&[0u8; 10]),
            AppendOutcome::Dropped(DropReason::PacketCeiling)
        );
        assert_eq!(cache.stats().cache_used, 30);
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut cache = CaptureCache::with_capacity(0).unwrap();
        assert!(matches!(cache.append(&[0u8; 1]), AppendOutcome::Dropped(_)));
        assert!(cache.is_empty());
        assert_eq!(cache.stats().dropped_packets, 1);
    }

    #[test]
    fn random_traffic_keeps_index_consistent() {
        let mut rng = StdRng::seed_from_u64(0x5bea);
        for capacity in [0usize, 1, 64, 1500, 9000, 65536] {
            let mut cache = CaptureCache::new(capacity, 37).unwrap();
            let mut offered = 0u64;
            for _ in 0..200 {
                let len = rng.gen_range(1..1600);
                let frame = vec![rng.gen::<u8>(); len];
                cache.append(&frame);
                offered += 1;
                let stats = cache.stats();
                assert!(stats.cache_used <= capacity);
                assert!(stats.total_packets <= 37);
            }
            let stats = cache.stats();
            assert_eq!(stats.total_packets as u64 + stats.dropped_packets, offered);

            let snapshot = cache.drain();
            let summed: u64 = snapshot.lengths.iter().map(|&l| l as u64).sum();
            assert_eq!(summed, snapshot.total_bytes());
            assert_eq!(snapshot.lengths.len(), stats.total_packets);
            assert_eq!(snapshot.packets().count(), stats.total_packets);
        }
    }

    #[test]
    fn snapshot_preserves_frame_order() {
        let mut cache = CaptureCache::with_capacity(64).unwrap();
        cache.append(b"first");
        cache.append(b"second!");
        cache.append(b"3");
        let snapshot = cache.drain();
        let frames: Vec<&[u8]> = snapshot.packets().collect();
        assert_eq!(frames, vec![&b"first"[..], &b"second!"[..], &b"3"[..]]);
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_keeps_allocation_and_lifetime_total() {
        let mut cache = CaptureCache::with_capacity(256).unwrap();
        cache.append(&[7u8; 200]);
        cache.append(&[7u8; 200]);
        cache.clear();
        let stats = cache.stats();
        assert_eq!(stats, CacheStats {
            total_packets: 0,
            total_bytes: 0,
            cache_capacity: 256,
            cache_used: 0,
            dropped_packets: 0,
        });
        assert_eq!(cache.lifetime_bytes(), 200);
        assert_eq!(cache.append(&[7u8; 200]), AppendOutcome::Stored);
    }

    #[test]
    fn utilisation_is_a_percentage() {
        let mut cache = CaptureCache::with_capacity(400).unwrap();
        cache.append(&[0u8; 100]);
        assert!((cache.stats().utilisation() - 25.0).abs() < 1e-9);
        assert_eq!(CacheStats::default().utilisation(), 0.0);
    }
}
