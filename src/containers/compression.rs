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

    src/containers/compression.rs

    Magic sniffing for the compression containers an image may be wrapped
    in. Detection looks at the first bytes of the (possibly concatenated)
    stream; first match wins, in decreasing order of magic specificity.

*/
use std::fmt::{self, Display, Formatter};

const ZSTD_MAGIC: &[u8] = &[0x28, 0xB5, 0x2F, 0xFD];
const XZ_MAGIC: &[u8] = &[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];
const LZMA_MAGIC: &[u8] = &[0x5D, 0x00, 0x00];
const BZIP2_MAGIC: &[u8] = &[0x42, 0x5A, 0x68];
const GZIP_MAGIC: &[u8] = &[0x1F, 0x8B];
const LZ4_MAGIC: &[u8] = &[0x04, 0x22, 0x4D, 0x18];

/// Number of leading bytes the sniffer inspects.
pub(crate) const SNIFF_LEN: usize = 16;

/// Compression container wrapped around an image stream.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CompressionFormat {
    #[default]
    None,
    Zstd,
    Xz,
    Lzma,
    Bzip2,
    Gzip,
    Lz4,
}

impl CompressionFormat {
    pub fn is_compressed(&self) -> bool {
        *self != CompressionFormat::None
    }
}

impl Display for CompressionFormat {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            CompressionFormat::None => write!(f, "uncompressed"),
            CompressionFormat::Zstd => write!(f, "zstd"),
            CompressionFormat::Xz => write!(f, "xz"),
            CompressionFormat::Lzma => write!(f, "lzma"),
            CompressionFormat::Bzip2 => write!(f, "bzip2"),
            CompressionFormat::Gzip => write!(f, "gzip"),
            CompressionFormat::Lz4 => write!(f, "lz4"),
        }
    }
}

/// Identify the compression container from the stream's first bytes.
pub(crate) fn sniff(buf: &[u8]) -> CompressionFormat {
    if buf.starts_with(ZSTD_MAGIC) {
        CompressionFormat::Zstd
    }
    else if buf.starts_with(XZ_MAGIC) {
        CompressionFormat::Xz
    }
    else if buf.starts_with(LZMA_MAGIC) {
        CompressionFormat::Lzma
    }
    else if buf.starts_with(BZIP2_MAGIC) {
        CompressionFormat::Bzip2
    }
    else if buf.starts_with(GZIP_MAGIC) {
        CompressionFormat::Gzip
    }
    else if buf.starts_with(LZ4_MAGIC) {
        CompressionFormat::Lz4
    }
    else {
        CompressionFormat::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_magics() {
        assert_eq!(sniff(&[0x28, 0xB5, 0x2F, 0xFD, 0, 0]), CompressionFormat::Zstd);
        assert_eq!(sniff(&[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00]), CompressionFormat::Xz);
        assert_eq!(sniff(&[0x5D, 0x00, 0x00, 0x80]), CompressionFormat::Lzma);
        assert_eq!(sniff(b"BZh91AY"), CompressionFormat::Bzip2);
        assert_eq!(sniff(&[0x1F, 0x8B, 0x08]), CompressionFormat::Gzip);
        assert_eq!(sniff(&[0x04, 0x22, 0x4D, 0x18]), CompressionFormat::Lz4);
        assert_eq!(sniff(b"partclone-image"), CompressionFormat::None);
        assert_eq!(sniff(&[]), CompressionFormat::None);
    }
}
