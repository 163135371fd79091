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
*/

//! # partfox
//!
//! partfox is a Rust library for reading the disk-image backups produced by
//! partclone, partimage and ntfsclone, and exposing each backed-up partition
//! as a read-only virtual block device addressed by the original partition's
//! byte range.
//!
//! The backup tools store only the used blocks of a partition, preceded by a
//! header and (for partclone and partimage) a block allocation bitmap.
//! partfox parses the header, builds a small index over the bitmap or over
//! the image's run structure, and then serves arbitrary `(offset, size)`
//! reads against the logical partition without ever materializing the unused
//! blocks. A FUSE adapter or loop-mount helper can surface the result as a
//! regular file that `fsck` and friends will treat as the restored partition.
//!
//! Compressed (gzip, bzip2, xz/lzma, zstd, lz4) and split (`.aa`, `.ab`, ...)
//! images are decoded transparently; random access requires an uncompressed
//! source.
//!
//! The main interface to partfox is the [`ImageBuilder`], which opens an
//! image file and yields a [`PartitionImage`]; converting that into a
//! [`BlockIo`] enables random access via [`BlockIo::read_at`]:
//!
//! ```no_run
//! use partfox::ImageBuilder;
//!
//! let image = ImageBuilder::new().open("/backups/sda1.img")?;
//! println!("{}", image.header());
//! let io = image.into_block_io()?;
//! let boot_sector = io.read_at(0, 512)?;
//! # Ok::<(), partfox::ImageError>(())
//! ```

mod bitmap;
mod block_io;
mod checksum;
mod containers;
mod detect;
mod file_parsers;
mod image;
mod image_builder;
mod io;
mod resolver;
mod runs;

use std::fmt::{self, Display, Formatter};

use thiserror::Error;

/// Default popcount index window, in bits. Must be a multiple of 8.
pub const DEFAULT_INDEX_WINDOW: usize = 1024;
/// Default page cache capacity, in blocks.
pub const DEFAULT_CACHE_BLOCKS: usize = 128;
/// Largest block size any of the supported tools will produce.
pub const MAXIMUM_BLOCK_SIZE: u32 = 1 << 20;
/// Block-count bound past which a header is treated as corrupt. Keeps
/// `total_blocks * block_size` comfortably inside u64.
pub const MAXIMUM_TOTAL_BLOCKS: u64 = 1 << 40;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Unknown image format")]
    UnknownFormat,
    #[error("Unsupported {0} image: {1}")]
    UnsupportedVersion(ImageFormat, String),
    #[error("Image header is corrupt: {0}")]
    CorruptHeader(String),
    #[error("Image bitmap is corrupt: {0}")]
    CorruptBitmap(String),
    #[error("Image block stream is corrupt: {0}")]
    CorruptStream(String),
    #[error("Random access requested on a compressed image")]
    UnseekableCompressed,
    #[error("Read beyond the end of the partition")]
    OutOfRange,
    #[error("An IO error occurred reading the image: {0}")]
    IoError(String),
    #[error("The image handle was closed")]
    Closed,
    #[error("Block checksum verification failed at used block {0}")]
    VerifyFailed(u64),
}

// Manually implement `From<io::Error>` for `ImageError`
impl From<io::Error> for ImageError {
    fn from(err: io::Error) -> Self {
        ImageError::IoError(err.to_string())
    }
}

// Manually implement `From<binrw::Error>` for `ImageError`
impl From<binrw::Error> for ImageError {
    fn from(err: binrw::Error) -> Self {
        ImageError::IoError(err.to_string())
    }
}

/// Progress reporting for long sequential passes (run index construction,
/// checksum verification). Injected by the caller; the library never
/// installs a global reporter.
pub trait Progress: Send {
    /// A pass over `total` units is beginning.
    fn start(&mut self, total: u64);
    /// `delta` more units have been processed.
    fn advance(&mut self, delta: u64);
    /// The pass is complete.
    fn finish(&mut self);
}

/// A `Progress` implementation that discards all reports.
#[derive(Debug, Default)]
pub struct NullProgress;

impl Progress for NullProgress {
    fn start(&mut self, _total: u64) {}
    fn advance(&mut self, _delta: u64) {}
    fn finish(&mut self) {}
}

/// The source tool of a partition image.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum ImageFormat {
    Partclone,
    Partimage,
    Ntfsclone,
}

impl Display for ImageFormat {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            ImageFormat::Partclone => write!(f, "partclone"),
            ImageFormat::Partimage => write!(f, "partimage"),
            ImageFormat::Ntfsclone => write!(f, "ntfsclone"),
        }
    }
}

pub use crate::{
    bitmap::{Bitmap, PopcountIndex},
    block_io::BlockIo,
    containers::{ByteSource, CompressionFormat},
    detect::detect_image_format,
    file_parsers::supported_extensions,
    image::{ChecksumAlgorithm, ChecksumSpec, ImageHeader, PartitionImage},
    image_builder::{open_image, probe_format, ImageBuilder},
    runs::{Located, Run, RunKind, RunTable},
};
