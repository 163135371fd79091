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

    src/image_builder.rs

    Builder interface for opening a partition image: input layer, format
    detection, header parsing, index construction and optional checksum
    verification, in that order.

*/
use std::path::Path;

use crate::{
    bitmap::PopcountIndex,
    block_io::BlockIo,
    checksum,
    containers::ByteSource,
    detect::detect_image_format,
    file_parsers,
    image::{ImageHeader, ImageIndex, PartitionImage},
    ImageError,
    ImageFormat,
    NullProgress,
    Progress,
    DEFAULT_CACHE_BLOCKS,
    DEFAULT_INDEX_WINDOW,
};

/// Fluent configuration for opening a partition image.
///
/// ```no_run
/// use partfox::ImageBuilder;
///
/// let image = ImageBuilder::new()
///     .with_index_window(4096)
///     .with_checksum_verification(true)
///     .open("/backups/sda1.img")?;
/// # Ok::<(), partfox::ImageError>(())
/// ```
pub struct ImageBuilder {
    index_window: usize,
    cache_blocks: usize,
    verify_checksums: bool,
    require_seek: bool,
    progress: Option<Box<dyn Progress>>,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        ImageBuilder::new()
    }
}

impl ImageBuilder {
    pub fn new() -> ImageBuilder {
        ImageBuilder {
            index_window: DEFAULT_INDEX_WINDOW,
            cache_blocks: DEFAULT_CACHE_BLOCKS,
            verify_checksums: false,
            require_seek: false,
            progress: None,
        }
    }

    /// Popcount index window in bits. Values that are not a multiple of 8
    /// are rounded up; larger windows trade per-query bit counting for a
    /// smaller index.
    pub fn with_index_window(mut self, bits: usize) -> Self {
        self.index_window = bits;
        self
    }

    /// Page cache capacity in blocks. Zero disables caching.
    pub fn with_cache_blocks(mut self, blocks: usize) -> Self {
        self.cache_blocks = blocks;
        self
    }

    /// Verify the blocks section's embedded checksums while opening. The
    /// verification is a full sequential pass over the image. A checksum
    /// mismatch is advisory: the image is still returned, with the failing
    /// block recorded in [`PartitionImage::verify_failure`], and the caller
    /// decides whether to proceed.
    pub fn with_checksum_verification(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Fail immediately with `UnseekableCompressed` if the input cannot
    /// support random access, instead of deferring the error until a
    /// [`BlockIo`] is requested.
    pub fn with_require_seek(mut self, require: bool) -> Self {
        self.require_seek = require;
        self
    }

    /// Report long scans (run index construction, checksum verification)
    /// through the given reporter.
    pub fn with_progress(mut self, progress: Box<dyn Progress>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Open and parse the image at `path`.
    pub fn open<P: AsRef<Path>>(self, path: P) -> Result<PartitionImage, ImageError> {
        let path = path.as_ref();
        let mut source = ByteSource::open(path, self.require_seek)?;
        let format = detect_image_format(&mut source)?;
        let parsed = file_parsers::parse_image(&mut source, format)?;
        let mut progress = self.progress.unwrap_or_else(|| Box::new(NullProgress));

        let window = normalized_window(self.index_window);
        let index = match parsed.bitmap {
            Some(bitmap) => {
                let index = PopcountIndex::new(&bitmap, window);
                ImageIndex::Bitmap { bitmap, index }
            }
            None => ImageIndex::DeferredRuns,
        };

        log::debug!("open(): {} ({})", parsed.header, source.compression());

        let mut verify_failure = None;
        if self.verify_checksums && parsed.header.checksum.is_enabled() {
            // The source sits at the start of the blocks section here, so
            // the pass works on sequential and seekable inputs alike.
            match checksum::verify_blocks(&mut source, &parsed.header, progress.as_mut()) {
                Ok(()) => {}
                Err(ImageError::VerifyFailed(block)) => {
                    log::warn!("open(): checksum verification failed at used block {}", block);
                    verify_failure = Some(block);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(PartitionImage {
            header: parsed.header,
            index,
            source,
            cache_blocks: self.cache_blocks,
            progress,
            verify_failure,
        })
    }
}

fn normalized_window(bits: usize) -> usize {
    let window = bits.max(8).next_multiple_of(8);
    if window != bits {
        log::warn!("normalized_window(): index window {} rounded up to {} bits", bits, window);
    }
    window
}

/// Open an image with default options and return its header together with
/// a [`BlockIo`] over the logical partition. The image must support random
/// access; a compressed source is rejected with `UnseekableCompressed`.
pub fn open_image<P: AsRef<Path>>(path: P) -> Result<(ImageHeader, BlockIo), ImageError> {
    let image = ImageBuilder::new().open(path)?;
    let io = image.into_block_io()?;
    let header = io.header().clone();
    Ok((header, io))
}

/// Convenience probe: the detected format of the image at `path`, without
/// parsing past the magic.
pub fn probe_format<P: AsRef<Path>>(path: P) -> Result<ImageFormat, ImageError> {
    let mut source = ByteSource::open(path, false)?;
    detect_image_format(&mut source)
}
