//! Defines the content synthesizer: produces the bytes for a
//! `(path, offset, length)` read window, either from a constant fill byte
//! or from the deterministic block cache.

use std::sync::Arc;

use md5::{Digest, Md5};
use moka::sync::Cache;

use crate::block_cache::BlockCache;

/// Upper bound on the buffer materialized per fill length, and on the
/// number of distinct lengths memoized.
const FILL_BUFFER_CAP: usize = 1_048_576;
const FILL_LRU_CAPACITY: u64 = 1000;

/// Fills reads with `L` copies of a single configured byte.
pub struct FillSynth {
    fill_byte: u8,
    buffers: Cache<usize, Arc<[u8]>>,
}

impl FillSynth {
    pub fn new(fill_byte: u8) -> Self {
        Self { fill_byte, buffers: Cache::new(FILL_LRU_CAPACITY) }
    }

    fn buffer_for(&self, capped_len: usize) -> Arc<[u8]> {
        if let Some(buf) = self.buffers.get(&capped_len) {
            return buf;
        }
        let buf: Arc<[u8]> = vec![self.fill_byte; capped_len].into();
        self.buffers.insert(capped_len, buf.clone());
        buf
    }

    /// Produces exactly `len` fill bytes, never allocating an internal
    /// buffer larger than [`FILL_BUFFER_CAP`].
    pub fn fill(&self, len: u64) -> Vec<u8> {
        let len = len as usize;
        let capped = len.min(FILL_BUFFER_CAP);
        let buf = self.buffer_for(capped);

        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            let take = (len - out.len()).min(buf.len());
            out.extend_from_slice(&buf[..take]);
        }
        out
    }
}

/// Draws reads from the deterministic block cache, keyed by MD5 of the
/// path and block number.
pub struct SemiRandomSynth {
    cache: Arc<BlockCache>,
}

impl SemiRandomSynth {
    pub fn new(cache: Arc<BlockCache>) -> Self {
        Self { cache }
    }

    /// Maps `(path, block number)` to a block index in `0..N`, per
    /// `MD5(path || "\0" || decimal(k)) mod N`.
    fn block_index_for(&self, path: &str, block_number: u64) -> u64 {
        let mut hasher = Md5::new();
        hasher.update(path.as_bytes());
        hasher.update(b"\0");
        hasher.update(block_number.to_string().as_bytes());
        let digest = hasher.finalize();

        let mut high_bytes = [0u8; 8];
        high_bytes.copy_from_slice(&digest[0..8]);
        u64::from_be_bytes(high_bytes) % self.cache.block_count() as u64
    }

    /// Reads `len` bytes starting at `offset` within the virtual file at
    /// `path`, walking the tail of the starting block, whole blocks, and
    /// the head of the ending block.
    pub fn read(&self, path: &str, offset: u64, len: u64) -> Vec<u8> {
        let block_len = self.cache.block_len() as u64;
        let mut out = Vec::with_capacity(len as usize);
        let mut pos = offset;
        let mut remaining = len;

        while remaining > 0 {
            let block_number = pos / block_len;
            let within_block = (pos % block_len) as usize;
            let block = self.cache.block(self.block_index_for(path, block_number));

            let take = ((block.len() - within_block) as u64).min(remaining) as usize;
            out.extend_from_slice(&block[within_block..within_block + take]);

            pos += take as u64;
            remaining -= take as u64;
        }
        out
    }
}

/// Selects between the two content-synthesis strategies.
pub enum ContentSynthesizer {
    Fill(FillSynth),
    SemiRandom(SemiRandomSynth),
}

impl ContentSynthesizer {
    /// Produces exactly `min(len, file_size - offset)` bytes for `path`,
    /// or zero bytes if `offset >= file_size`.
    pub fn read(&self, path: &str, file_size: u64, offset: u64, len: u64) -> Vec<u8> {
        if offset >= file_size {
            return Vec::new();
        }
        let clamped = len.min(file_size - offset);
        match self {
            ContentSynthesizer::Fill(f) => f.fill(clamped),
            ContentSynthesizer::SemiRandom(s) => s.read(path, offset, clamped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_mode_repeats_the_configured_byte() {
        let synth = ContentSynthesizer::Fill(FillSynth::new(0xAB));
        let data = synth.read("/whatever", 100, 0, 10);
        assert_eq!(data, vec![0xAB; 10]);
    }

    #[test]
    fn fill_mode_handles_lengths_above_buffer_cap() {
        let f = FillSynth::new(0x00);
        let data = f.fill((FILL_BUFFER_CAP as u64) + 123);
        assert_eq!(data.len(), FILL_BUFFER_CAP + 123);
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn clamps_to_remaining_file_size() {
        let synth = ContentSynthesizer::Fill(FillSynth::new(1));
        assert_eq!(synth.read("/f", 5, 0, 10).len(), 5);
        assert_eq!(synth.read("/f", 5, 5, 10).len(), 0);
        assert_eq!(synth.read("/f", 5, 8, 10).len(), 0);
        assert_eq!(synth.read("/f", 5, 3, 10).len(), 2);
    }

    fn semi_random() -> ContentSynthesizer {
        let cache = Arc::new(BlockCache::generate(4, 100, 131_072));
        ContentSynthesizer::SemiRandom(SemiRandomSynth::new(cache))
    }

    #[test]
    fn semi_random_is_deterministic_across_calls() {
        let synth = semi_random();
        let a = synth.read("/big/file", 5_000_000_000, 4_294_967_000, 4096);
        let b = synth.read("/big/file", 5_000_000_000, 4_294_967_000, 4096);
        assert_eq!(a, b);
        assert_eq!(a.len(), 4096);
    }

    #[test]
    fn semi_random_differs_across_paths() {
        let synth = semi_random();
        let a = synth.read("/a", 1_000_000, 0, 256);
        let b = synth.read("/b", 1_000_000, 0, 256);
        assert_ne!(a, b);
    }

    #[test]
    fn semi_random_read_is_prefix_consistent() {
        let synth = semi_random();
        let long = synth.read("/p", 1_000_000, 0, 500);
        let short = synth.read("/p", 1_000_000, 0, 200);
        assert_eq!(&long[..200], short.as_slice());
    }

    #[test]
    fn semi_random_read_is_offset_composable() {
        let synth = semi_random();
        let whole = synth.read("/p", 1_000_000, 100, 500);
        let tail = synth.read("/p", 1_000_000, 300, 300);
        assert_eq!(&whole[200..], tail.as_slice());
    }

    #[test]
    fn semi_random_crosses_block_boundaries() {
        let cache = Arc::new(BlockCache::generate(4, 4, 16));
        let synth = ContentSynthesizer::SemiRandom(SemiRandomSynth::new(cache));
        // offset 10, len 20 spans block 0 (bytes 10..16) and block 1 (bytes 0..14)
        let data = synth.read("/p", 1_000_000, 10, 20);
        assert_eq!(data.len(), 20);
    }
}
