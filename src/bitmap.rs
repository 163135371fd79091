/*
    PartFox
    https://github.com/dbalsom/partfox

    Copyright 2025 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    src/bitmap.rs

    The block allocation bitmap of a partclone or partimage image, and the
    sparse cumulative popcount index built over it.

    The bitmap is kept in the producers' bit order: bit i of the partition
    lives in byte i/8 at bit position i%8, LSB first. Packing those bytes
    little-endian into u64 words preserves that order, so whole-word
    popcounts can be used for both index construction and window queries.

*/

/// A `total_blocks`-bit allocation bitmap. A set bit means the block's data
/// is present in the image.
#[derive(Clone, Debug)]
pub struct Bitmap {
    words: Vec<u64>,
    len: u64,
}

impl Bitmap {
    /// Build from BIT-mode bytes: one bit per block, LSB-first per byte.
    /// Stray bits past `len` in the final byte are cleared.
    pub fn from_bit_bytes(bytes: &[u8], len: u64) -> Bitmap {
        let mut words = Vec::with_capacity(bytes.len().div_ceil(8));
        for chunk in bytes.chunks(8) {
            let mut word = [0u8; 8];
            word[..chunk.len()].copy_from_slice(chunk);
            words.push(u64::from_le_bytes(word));
        }
        words.resize(len.div_ceil(64) as usize, 0);
        let mut bitmap = Bitmap { words, len };
        bitmap.mask_tail();
        bitmap
    }

    /// Build from BYTE-mode bytes: one byte per block, nonzero = present.
    pub fn from_byte_bytes(bytes: &[u8]) -> Bitmap {
        let len = bytes.len() as u64;
        let mut words = vec![0u64; bytes.len().div_ceil(64)];
        for (i, &b) in bytes.iter().enumerate() {
            if b != 0 {
                words[i / 64] |= 1u64 << (i % 64);
            }
        }
        Bitmap { words, len }
    }

    fn mask_tail(&mut self) {
        let tail_bits = (self.len % 64) as u32;
        let full_words = (self.len / 64) as usize;
        if tail_bits != 0 {
            if let Some(word) = self.words.get_mut(full_words) {
                *word &= (1u64 << tail_bits) - 1;
            }
        }
        self.words.truncate(self.len.div_ceil(64) as usize);
    }

    /// Number of bits (logical blocks) in the bitmap.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// State of bit `i`. Out-of-range indices read as clear.
    pub fn get(&self, i: u64) -> bool {
        if i >= self.len {
            return false;
        }
        self.words[(i / 64) as usize] & (1u64 << (i % 64)) != 0
    }

    /// Total number of set bits.
    pub fn count_ones(&self) -> u64 {
        self.words.iter().map(|w| w.count_ones() as u64).sum()
    }

    /// Number of set bits in `[start, end)`.
    pub(crate) fn popcount_range(&self, start: u64, end: u64) -> u64 {
        debug_assert!(start <= end && end <= self.len);
        if start >= end {
            return 0;
        }
        let first_word = (start / 64) as usize;
        let last_word = ((end - 1) / 64) as usize;
        let start_bit = (start % 64) as u32;
        let end_bit = ((end - 1) % 64 + 1) as u32;

        if first_word == last_word {
            let mask = if end_bit == 64 { u64::MAX } else { (1u64 << end_bit) - 1 };
            return ((self.words[first_word] & mask) >> start_bit).count_ones() as u64;
        }

        let mut count = (self.words[first_word] >> start_bit).count_ones() as u64;
        for word in &self.words[first_word + 1..last_word] {
            count += word.count_ones() as u64;
        }
        let mask = if end_bit == 64 { u64::MAX } else { (1u64 << end_bit) - 1 };
        count + (self.words[last_word] & mask).count_ones() as u64
    }
}

/// Sparse cumulative popcount table over a [`Bitmap`], with window `W` bits:
/// `cum[k]` holds the number of set bits before bit `k * W`. A rank query
/// then only has to count bits inside one window, at most `W / 8` bytes.
///
/// Memory is roughly `8 * total_blocks / W` bytes; doubling the window
/// halves the table and at most doubles the per-query bit counting.
#[derive(Clone, Debug)]
pub struct PopcountIndex {
    window: usize,
    cum: Vec<u64>,
}

impl PopcountIndex {
    /// `window` is in bits and must be a nonzero multiple of 8.
    pub fn new(bitmap: &Bitmap, window: usize) -> PopcountIndex {
        debug_assert!(window > 0 && window % 8 == 0);
        let w = window as u64;
        let windows = bitmap.len().div_ceil(w) as usize;
        let mut cum = Vec::with_capacity(windows + 1);
        cum.push(0u64);
        let mut total = 0u64;
        for k in 0..windows {
            let start = k as u64 * w;
            let end = (start + w).min(bitmap.len());
            total += bitmap.popcount_range(start, end);
            cum.push(total);
        }
        log::debug!(
            "PopcountIndex::new(): {} windows of {} bits, {} set bits",
            windows,
            window,
            total
        );
        PopcountIndex { window, cum }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Total set bits covered by the index.
    pub fn total_set(&self) -> u64 {
        *self.cum.last().unwrap_or(&0)
    }

    /// Position of `block` within the image's used-block sequence, or `None`
    /// if the block is not present in the image.
    pub fn used_index(&self, bitmap: &Bitmap, block: u64) -> Option<u64> {
        if !bitmap.get(block) {
            return None;
        }
        let k = block / self.window as u64;
        let base = self.cum[k as usize];
        let within = bitmap.popcount_range(k * self.window as u64, block);
        Some(base + within)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force_rank(bitmap: &Bitmap, block: u64) -> u64 {
        (0..block).filter(|&i| bitmap.get(i)).count() as u64
    }

    #[test]
    fn test_bit_bytes_lsb_first() {
        // 0x8D = 0b1000_1101: bits 0, 2, 3 and 7 set.
        let bitmap = Bitmap::from_bit_bytes(&[0x8D], 8);
        let set: Vec<u64> = (0..8).filter(|&i| bitmap.get(i)).collect();
        assert_eq!(set, vec![0, 2, 3, 7]);
        assert_eq!(bitmap.count_ones(), 4);
    }

    #[test]
    fn test_byte_mode_normalization() {
        let bitmap = Bitmap::from_byte_bytes(&[0, 1, 0xFF, 0, 2]);
        assert!(!bitmap.get(0));
        assert!(bitmap.get(1));
        assert!(bitmap.get(2));
        assert!(!bitmap.get(3));
        assert!(bitmap.get(4));
        assert_eq!(bitmap.len(), 5);
        assert_eq!(bitmap.count_ones(), 3);
    }

    #[test]
    fn test_tail_masking() {
        // 10 bits from two bytes of all-ones: stray bits must not count.
        let bitmap = Bitmap::from_bit_bytes(&[0xFF, 0xFF], 10);
        assert_eq!(bitmap.count_ones(), 10);
        assert!(!bitmap.get(10));
        assert!(!bitmap.get(63));
    }

    #[test]
    fn test_popcount_range_word_boundaries() {
        let bytes: Vec<u8> = (0..32).map(|i| (i * 37 + 11) as u8).collect();
        let bitmap = Bitmap::from_bit_bytes(&bytes, 256);
        for &(start, end) in &[(0, 256), (0, 64), (63, 65), (64, 128), (1, 255), (100, 100), (120, 200)] {
            let expected = (start..end).filter(|&i| bitmap.get(i)).count() as u64;
            assert_eq!(bitmap.popcount_range(start, end), expected, "range {}..{}", start, end);
        }
    }

    #[test]
    fn test_used_index_matches_brute_force() {
        let bytes: Vec<u8> = (0..64).map(|i| (i * 73 + 29) as u8).collect();
        let bitmap = Bitmap::from_bit_bytes(&bytes, 512);
        for window in [8, 64, 128, 1024] {
            let index = PopcountIndex::new(&bitmap, window);
            assert_eq!(index.total_set(), bitmap.count_ones());
            for block in 0..512 {
                let expected = bitmap.get(block).then(|| brute_force_rank(&bitmap, block));
                assert_eq!(index.used_index(&bitmap, block), expected, "block {} window {}", block, window);
            }
        }
    }
}
