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
use strum::IntoEnumIterator;

use crate::{containers::ByteSource, ImageError, ImageFormat};

/// Number of leading bytes inspected by format detection.
pub(crate) const DETECT_PEEK_LEN: usize = 64;

/// Attempt to detect the format of a partition image by its magic bytes.
/// Detection is content-based; file extensions are never consulted. If no
/// parser recognizes the stream, `UnknownFormat` is returned.
pub fn detect_image_format(source: &mut ByteSource) -> Result<ImageFormat, ImageError> {
    let buf = source.peek(DETECT_PEEK_LEN)?;
    for format in ImageFormat::iter() {
        if format.detect(buf) {
            log::debug!("detect_image_format(): detected {} image", format);
            return Ok(format);
        }
    }
    Err(ImageError::UnknownFormat)
}
