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

    src/block_io.rs

    Random-access reads over the logical partition, backed by a fixed-size
    LRU cache of decoded blocks.

    The seekable image handle and the cache form one shared resource: a
    single mutex is held for the duration of each read_at() call, so
    concurrent callers observe results consistent with a serial ordering
    and the image handle's file position is never seen mid-update.

*/
use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use crate::{
    containers::ByteSource,
    image::ImageHeader,
    io::Read,
    resolver::{BlockResolver, Resolved},
    ImageError,
};

struct CacheEntry {
    data: Vec<u8>,
    stamp: u64,
}

/// Fixed-capacity block cache with least-recently-used eviction, keyed by
/// logical block index. Capacity 0 disables caching entirely.
pub(crate) struct PageCache {
    capacity: usize,
    clock: u64,
    map: HashMap<u64, CacheEntry>,
}

impl PageCache {
    pub(crate) fn new(capacity: usize) -> PageCache {
        PageCache { capacity, clock: 0, map: HashMap::with_capacity(capacity) }
    }

    /// Look up a block, marking it most recently used.
    fn get(&mut self, block: u64) -> Option<&[u8]> {
        self.clock += 1;
        let clock = self.clock;
        self.map.get_mut(&block).map(|entry| {
            entry.stamp = clock;
            entry.data.as_slice()
        })
    }

    fn insert(&mut self, block: u64, data: Vec<u8>) {
        if self.capacity == 0 {
            return;
        }
        if self.map.len() >= self.capacity && !self.map.contains_key(&block) {
            if let Some(&oldest) = self.map.iter().min_by_key(|(_, e)| e.stamp).map(|(k, _)| k) {
                log::trace!("PageCache::insert(): evicting block {}", oldest);
                self.map.remove(&oldest);
            }
        }
        self.clock += 1;
        self.map.insert(block, CacheEntry { data, stamp: self.clock });
    }

    fn clear(&mut self) {
        self.map.clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.map.len()
    }
}

struct IoState {
    /// Dropped on close(); a None here fails reads with `Closed`.
    source: Option<ByteSource>,
    cache: PageCache,
}

/// Serves arbitrary `(offset, size)` reads over the logical partition,
/// issuing at most one image read per required block.
///
/// `read_at` may be called concurrently from multiple threads.
pub struct BlockIo {
    header: ImageHeader,
    resolver: BlockResolver,
    state: Mutex<IoState>,
}

impl BlockIo {
    pub(crate) fn new(
        header: ImageHeader,
        resolver: BlockResolver,
        source: ByteSource,
        cache_blocks: usize,
    ) -> BlockIo {
        BlockIo {
            header,
            resolver,
            state: Mutex::new(IoState {
                source: Some(source),
                cache: PageCache::new(cache_blocks),
            }),
        }
    }

    pub fn header(&self) -> &ImageHeader {
        &self.header
    }

    /// Read `size` bytes at partition byte `offset`. Blocks absent from the
    /// image read as zeros. A range extending past the end of the
    /// partition is rejected with `OutOfRange`.
    pub fn read_at(&self, offset: u64, size: usize) -> Result<Vec<u8>, ImageError> {
        let end = offset
            .checked_add(size as u64)
            .filter(|&end| end <= self.header.partition_size())
            .ok_or(ImageError::OutOfRange)?;
        if size == 0 {
            return Ok(Vec::new());
        }

        let block_size = self.header.block_size as u64;
        let first_block = offset / block_size;
        let last_block = (end - 1) / block_size;

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let IoState { source, cache } = &mut *state;
        let source = source.as_mut().ok_or(ImageError::Closed)?;

        let mut out = Vec::with_capacity(size);
        for block in first_block..=last_block {
            let block_start = block * block_size;
            let from = (offset.max(block_start) - block_start) as usize;
            let to = (end.min(block_start + block_size) - block_start) as usize;

            if let Some(data) = cache.get(block) {
                out.extend_from_slice(&data[from..to]);
                continue;
            }

            let data = match self.resolver.resolve(block) {
                Resolved::Absent => vec![0u8; block_size as usize],
                Resolved::Present(image_offset) => {
                    let mut data = vec![0u8; block_size as usize];
                    source.seek_to(image_offset)?;
                    source.read_exact(&mut data)?;
                    data
                }
            };
            out.extend_from_slice(&data[from..to]);
            cache.insert(block, data);
        }

        Ok(out)
    }

    /// Release the image handle. Subsequent reads fail with `Closed`.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.source = None;
        state.cache.clear();
    }
}
