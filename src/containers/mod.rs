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

    src/containers/mod.rs

    The input layer: a ByteSource opens an image path, transparently
    expanding split file sets and decoding compression containers, and
    exposes a sequential byte stream that is seekable whenever the
    underlying storage permits it.

    Split detection runs before compression detection, against the
    concatenated stream, so a split-then-compressed image decodes the same
    as its unsplit original.

*/
use std::path::Path;

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use lz4_flex::frame::FrameDecoder;
use xz2::read::XzDecoder;

use crate::{
    io::{BufReader, Read, Seek, SeekFrom},
    ImageError,
};

pub mod compression;
pub mod split;

pub use compression::CompressionFormat;

use split::SplitReader;

enum SourceInner {
    Plain(SplitReader),
    Gzip(Box<GzDecoder<SplitReader>>),
    Bzip2(Box<BzDecoder<SplitReader>>),
    Xz(Box<XzDecoder<SplitReader>>),
    Zstd(Box<zstd::stream::read::Decoder<'static, BufReader<SplitReader>>>),
    Lz4(Box<FrameDecoder<SplitReader>>),
}

impl Read for SourceInner {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            SourceInner::Plain(r) => r.read(buf),
            SourceInner::Gzip(r) => r.read(buf),
            SourceInner::Bzip2(r) => r.read(buf),
            SourceInner::Xz(r) => r.read(buf),
            SourceInner::Zstd(r) => r.read(buf),
            SourceInner::Lz4(r) => r.read(buf),
        }
    }
}

/// A byte stream over an image file, with split segments concatenated and
/// any compression container decoded. Tracks its own logical position and
/// supports a small lookahead for magic sniffing.
pub struct ByteSource {
    inner: SourceInner,
    compression: CompressionFormat,
    /// Logical (decoded) stream position of the next byte to be consumed.
    pos: u64,
    /// Bytes read ahead of `pos` by `peek()`, not yet consumed.
    peek_buf: Vec<u8>,
    /// Total decoded length, known only for uncompressed sources.
    len: Option<u64>,
}

impl ByteSource {
    /// Open `path`, expanding a split set and sniffing the compression
    /// container. With `require_seek`, a compressed container is rejected
    /// with `UnseekableCompressed` up front; seeking through
    /// block-compressed formats is prohibitively slow.
    pub fn open<P: AsRef<Path>>(path: P, require_seek: bool) -> Result<ByteSource, ImageError> {
        let path = path.as_ref();
        let segments = split::expand_split_set(path);
        let mut reader = SplitReader::new(segments)?;

        let mut sniff_buf = [0u8; compression::SNIFF_LEN];
        let sniffed = read_up_to(&mut reader, &mut sniff_buf)?;
        let compression = compression::sniff(&sniff_buf[..sniffed]);
        reader.seek(SeekFrom::Start(0))?;

        log::debug!(
            "ByteSource::open(): {} ({}), require_seek={}",
            path.display(),
            compression,
            require_seek
        );

        if compression.is_compressed() && require_seek {
            return Err(ImageError::UnseekableCompressed);
        }

        let len = (!compression.is_compressed()).then(|| reader.total_len());
        let inner = match compression {
            CompressionFormat::None => SourceInner::Plain(reader),
            CompressionFormat::Gzip => SourceInner::Gzip(Box::new(GzDecoder::new(reader))),
            CompressionFormat::Bzip2 => SourceInner::Bzip2(Box::new(BzDecoder::new(reader))),
            CompressionFormat::Xz => SourceInner::Xz(Box::new(XzDecoder::new(reader))),
            CompressionFormat::Lzma => {
                let stream = xz2::stream::Stream::new_lzma_decoder(u64::MAX)
                    .map_err(|e| ImageError::IoError(e.to_string()))?;
                SourceInner::Xz(Box::new(XzDecoder::new_stream(reader, stream)))
            }
            CompressionFormat::Zstd => {
                SourceInner::Zstd(Box::new(zstd::stream::read::Decoder::new(reader)?))
            }
            CompressionFormat::Lz4 => SourceInner::Lz4(Box::new(FrameDecoder::new(reader))),
        };

        Ok(ByteSource { inner, compression, pos: 0, peek_buf: Vec::new(), len })
    }

    pub fn compression(&self) -> CompressionFormat {
        self.compression
    }

    /// True when absolute seeking is supported: plain and split-plain
    /// sources only.
    pub fn is_seekable(&self) -> bool {
        matches!(self.inner, SourceInner::Plain(_))
    }

    /// Total stream length, when known (uncompressed sources).
    pub fn size(&self) -> Option<u64> {
        self.len
    }

    /// Logical position of the next byte to be consumed.
    pub fn stream_position(&self) -> u64 {
        self.pos
    }

    /// Seek to an absolute logical offset. Fails with
    /// `UnseekableCompressed` on compressed sources.
    pub fn seek_to(&mut self, offset: u64) -> Result<(), ImageError> {
        match &mut self.inner {
            SourceInner::Plain(reader) => {
                reader.seek(SeekFrom::Start(offset))?;
                self.peek_buf.clear();
                self.pos = offset;
                Ok(())
            }
            _ => Err(ImageError::UnseekableCompressed),
        }
    }

    /// Advance the stream by `n` bytes, seeking when possible and reading
    /// to a scratch buffer otherwise.
    pub fn skip(&mut self, n: u64) -> Result<(), ImageError> {
        if self.is_seekable() {
            return self.seek_to(self.pos + n);
        }
        let mut remaining = n;
        let mut scratch = [0u8; 8192];
        while remaining > 0 {
            let want = scratch.len().min(remaining as usize);
            self.read_exact(&mut scratch[..want])?;
            remaining -= want as u64;
        }
        Ok(())
    }

    /// Look at up to `n` upcoming bytes without consuming them. Returns
    /// fewer than `n` bytes only at end of stream.
    pub fn peek(&mut self, n: usize) -> Result<&[u8], ImageError> {
        while self.peek_buf.len() < n {
            let mut chunk = vec![0u8; n - self.peek_buf.len()];
            let read = self.inner.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            self.peek_buf.extend_from_slice(&chunk[..read]);
        }
        Ok(&self.peek_buf[..n.min(self.peek_buf.len())])
    }

    /// True when no bytes remain.
    pub fn eof(&mut self) -> Result<bool, ImageError> {
        Ok(self.peek(1)?.is_empty())
    }
}

impl Read for ByteSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if !self.peek_buf.is_empty() {
            let take = buf.len().min(self.peek_buf.len());
            buf[..take].copy_from_slice(&self.peek_buf[..take]);
            self.peek_buf.drain(..take);
            self.pos += take as u64;
            return Ok(take);
        }
        let read = self.inner.read(buf)?;
        self.pos += read as u64;
        Ok(read)
    }
}

fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..])? {
            0 => break,
            n => total += n,
        }
    }
    Ok(total)
}
