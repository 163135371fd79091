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

    src/file_parsers/mod.rs

    One parser per supported backup tool, dispatched over ImageFormat.
    Each parser decodes its header from the byte source, verifies the
    embedded header and bitmap checksums, and leaves the source positioned
    at the start of the blocks section.

*/
use strum::IntoEnumIterator;

use crate::{bitmap::Bitmap, containers::ByteSource, image::ImageHeader, ImageError, ImageFormat};

pub mod ntfsclone;
pub mod partclone;
pub mod partimage;

/// The result of parsing an image header: the normalized description plus,
/// for the bitmap formats, the normalized BIT-mode allocation bitmap.
pub(crate) struct ParsedImage {
    pub header: ImageHeader,
    pub bitmap: Option<Bitmap>,
}

impl ImageFormat {
    /// Return true if `buf` begins with this format's magic.
    pub(crate) fn detect(&self, buf: &[u8]) -> bool {
        match self {
            ImageFormat::Partclone => partclone::PartcloneFormat::detect(buf),
            ImageFormat::Partimage => partimage::PartimageFormat::detect(buf),
            ImageFormat::Ntfsclone => ntfsclone::NtfscloneFormat::detect(buf),
        }
    }

    /// File extensions commonly seen on images of this format. Detection is
    /// content-based; this list exists for file dialogs.
    pub(crate) fn extensions(&self) -> Vec<&'static str> {
        match self {
            ImageFormat::Partclone => partclone::PartcloneFormat::extensions(),
            ImageFormat::Partimage => partimage::PartimageFormat::extensions(),
            ImageFormat::Ntfsclone => ntfsclone::NtfscloneFormat::extensions(),
        }
    }
}

/// Returns a list of advertised file extensions across all image format
/// parsers. This is a convenience function for use in file dialogs -
/// internal image detection is not based on file extension, but by image
/// file content.
pub fn supported_extensions() -> Vec<&'static str> {
    ImageFormat::iter().flat_map(|f| f.extensions()).collect()
}

/// Parse the image of the given (already detected) format.
pub(crate) fn parse_image(source: &mut ByteSource, format: ImageFormat) -> Result<ParsedImage, ImageError> {
    match format {
        ImageFormat::Partclone => partclone::PartcloneFormat::parse(source),
        ImageFormat::Partimage => partimage::PartimageFormat::parse(source),
        ImageFormat::Ntfsclone => ntfsclone::NtfscloneFormat::parse(source),
    }
}

/// Decode a fixed-length, NUL-padded string field.
pub(crate) fn cstr_field(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
