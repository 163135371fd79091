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

    src/image.rs

    The common image description shared by all three format parsers, and the
    PartitionImage handle produced by opening an image file.

*/
use std::fmt::{self, Display, Formatter};

use crate::{
    bitmap::{Bitmap, PopcountIndex},
    block_io::BlockIo,
    checksum,
    containers::ByteSource,
    resolver::BlockResolver,
    runs::RunTable,
    ImageError,
    ImageFormat,
    Progress,
};

/// Checksum algorithm applied to the blocks section of an image.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    #[default]
    None,
    Crc32,
}

/// Describes how the producing tool interleaved checksums with block data.
///
/// A checksum trailer of `size` bytes follows every `blocks_per_sum` blocks
/// of the used-block sequence (and the final partial group, if any). When
/// `reseed` is set, the running CRC register is reinitialized at each
/// trailer boundary; otherwise it is carried through the whole section.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ChecksumSpec {
    pub algorithm: ChecksumAlgorithm,
    pub size: u32,
    pub blocks_per_sum: u32,
    pub reseed: bool,
}

impl ChecksumSpec {
    /// A spec describing an image with no block checksums.
    pub fn none() -> ChecksumSpec {
        ChecksumSpec::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.algorithm == ChecksumAlgorithm::Crc32 && self.size > 0 && self.blocks_per_sum > 0
    }

    /// Byte offset of used block `n` within the blocks section, accounting
    /// for any checksum trailers that precede it.
    pub fn block_offset(&self, n: u64, block_size: u32) -> u64 {
        let mut offset = n * block_size as u64;
        if self.is_enabled() {
            offset += (n / self.blocks_per_sum as u64) * self.size as u64;
        }
        offset
    }
}

/// Geometry and layout of a partition image, normalized across the three
/// source formats.
#[derive(Clone, Debug)]
pub struct ImageHeader {
    pub(crate) format: ImageFormat,
    pub(crate) block_size: u32,
    pub(crate) total_blocks: u64,
    pub(crate) used_blocks: u64,
    pub(crate) fs_label: String,
    pub(crate) blocks_section_offset: u64,
    pub(crate) checksum: ChecksumSpec,
}

impl ImageHeader {
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    /// Count of blocks whose data is present in the image. For ntfsclone
    /// this is the header's in-use count until the run index has been built,
    /// after which it is the count derived from the index.
    pub fn used_blocks(&self) -> u64 {
        self.used_blocks
    }

    pub fn fs_label(&self) -> &str {
        &self.fs_label
    }

    /// Size in bytes of the logical partition the image was taken from.
    pub fn partition_size(&self) -> u64 {
        self.total_blocks * self.block_size as u64
    }

    /// Byte offset within the (decoded) image stream at which the block
    /// payload begins.
    pub fn blocks_section_offset(&self) -> u64 {
        self.blocks_section_offset
    }

    pub fn checksum(&self) -> ChecksumSpec {
        self.checksum
    }
}

impl Display for ImageHeader {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} image: {} blocks of {} bytes ({} bytes), {} in use",
            self.format,
            self.fs_label,
            self.total_blocks,
            self.block_size,
            self.partition_size(),
            self.used_blocks,
        )
    }
}

/// The block index built at open time, or a marker that the ntfsclone run
/// scan has been deferred until random access is first required.
pub(crate) enum ImageIndex {
    Bitmap { bitmap: Bitmap, index: PopcountIndex },
    Runs(RunTable),
    DeferredRuns,
}

/// An opened partition image: header, index and the underlying byte source.
///
/// A `PartitionImage` can be queried for its header, verified against its
/// embedded block checksums, and converted into a [`BlockIo`] for random
/// access. The ntfsclone run index is built lazily, at conversion time,
/// since it requires a full pass over the image's command stream.
pub struct PartitionImage {
    pub(crate) header: ImageHeader,
    pub(crate) index: ImageIndex,
    pub(crate) source: ByteSource,
    pub(crate) cache_blocks: usize,
    pub(crate) progress: Box<dyn Progress>,
    pub(crate) verify_failure: Option<u64>,
}

impl PartitionImage {
    pub fn header(&self) -> &ImageHeader {
        &self.header
    }

    pub fn format(&self) -> ImageFormat {
        self.header.format
    }

    /// The used block at which open-time checksum verification failed, if
    /// verification was requested and found a mismatch. The image remains
    /// usable; whether to proceed is the caller's call.
    pub fn verify_failure(&self) -> Option<u64> {
        self.verify_failure
    }

    /// Run the sequential checksum pass over the blocks section, comparing
    /// each group checksum against the recorded trailer. Returns
    /// `VerifyFailed` naming the first used block of the first mismatching
    /// group. Images without block checksums verify trivially.
    ///
    /// The pass seeks over the whole blocks section and therefore requires
    /// a seekable source.
    pub fn verify(&mut self) -> Result<(), ImageError> {
        if !self.header.checksum.is_enabled() {
            log::debug!("verify(): image carries no block checksums, nothing to do");
            return Ok(());
        }
        if !self.source.is_seekable() {
            return Err(ImageError::UnseekableCompressed);
        }
        self.source.seek_to(self.header.blocks_section_offset)?;
        let result = checksum::verify_blocks(&mut self.source, &self.header, self.progress.as_mut());
        self.verify_failure = match &result {
            Err(ImageError::VerifyFailed(block)) => Some(*block),
            _ => None,
        };
        result
    }

    /// Consume the image and return a [`BlockIo`] serving random-access
    /// reads over the logical partition. Fails with `UnseekableCompressed`
    /// when the source cannot seek.
    pub fn into_block_io(mut self) -> Result<BlockIo, ImageError> {
        if !self.source.is_seekable() {
            return Err(ImageError::UnseekableCompressed);
        }

        if matches!(self.index, ImageIndex::DeferredRuns) {
            self.build_run_index()?;
        }

        let resolver = BlockResolver::new(&self.header, self.index);
        Ok(BlockIo::new(self.header, resolver, self.source, self.cache_blocks))
    }

    /// Scan the ntfsclone command stream and build the run table. Updates
    /// the header's used-block count with the value derived from the scan.
    fn build_run_index(&mut self) -> Result<(), ImageError> {
        self.source.seek_to(self.header.blocks_section_offset)?;
        let table = RunTable::scan(&mut self.source, &self.header, self.progress.as_mut())?;

        if table.data_blocks() != self.header.used_blocks {
            log::warn!(
                "build_run_index(): header reports {} blocks in use, stream contains {}",
                self.header.used_blocks,
                table.data_blocks()
            );
            self.header.used_blocks = table.data_blocks();
        }

        self.index = ImageIndex::Runs(table);
        Ok(())
    }
}
