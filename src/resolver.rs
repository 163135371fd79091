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

    src/resolver.rs

    Maps a logical block index to the image byte offset holding its data,
    or reports the block absent from the image.

*/
use crate::{
    bitmap::{Bitmap, PopcountIndex},
    image::{ImageHeader, ImageIndex},
    runs::{Located, RunTable},
};

/// Outcome of resolving a logical block index.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Resolved {
    /// The block's data begins at this byte offset in the image stream.
    Present(u64),
    /// The block is not stored; its logical content reads as zeros.
    Absent,
}

/// Unified resolver over the two index shapes.
pub(crate) enum BlockResolver {
    Bitmap {
        bitmap: Bitmap,
        index: PopcountIndex,
        blocks_section_offset: u64,
        block_size: u32,
        checksum: crate::image::ChecksumSpec,
    },
    Runs(RunTable),
}

impl BlockResolver {
    /// Build from the index constructed at open time. The ntfsclone run
    /// table must already exist; a deferred index is a logic error here.
    pub(crate) fn new(header: &ImageHeader, index: ImageIndex) -> BlockResolver {
        match index {
            ImageIndex::Bitmap { bitmap, index } => BlockResolver::Bitmap {
                bitmap,
                index,
                blocks_section_offset: header.blocks_section_offset,
                block_size: header.block_size,
                checksum: header.checksum,
            },
            ImageIndex::Runs(table) => BlockResolver::Runs(table),
            ImageIndex::DeferredRuns => {
                unreachable!("run index must be built before constructing a resolver")
            }
        }
    }

    pub(crate) fn resolve(&self, block: u64) -> Resolved {
        match self {
            BlockResolver::Bitmap { bitmap, index, blocks_section_offset, block_size, checksum } => {
                match index.used_index(bitmap, block) {
                    Some(n) => Resolved::Present(blocks_section_offset + checksum.block_offset(n, *block_size)),
                    None => Resolved::Absent,
                }
            }
            BlockResolver::Runs(table) => match table.locate(block * table.block_size() as u64) {
                Some(Located::Data { image_offset }) => Resolved::Present(image_offset),
                _ => Resolved::Absent,
            },
        }
    }
}
