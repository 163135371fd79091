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

    src/file_parsers/ntfsclone.rs

    A parser for ntfsclone special images.

    The fixed header names the cluster geometry and the offset at which the
    image data begins. There is no bitmap and there are no checksums: the
    image data is a command stream of used clusters and unused-run counts,
    which the run index decodes in a single pass (deferred until random
    access is requested).

*/
use binrw::{binrw, BinRead};

use crate::{
    containers::ByteSource,
    file_parsers::ParsedImage,
    image::{ChecksumSpec, ImageHeader},
    io::{Cursor, Read},
    ImageError,
    ImageFormat,
    MAXIMUM_BLOCK_SIZE,
};

pub const NTFSCLONE_MAGIC: &[u8] = b"\0ntfsclone-image";

const HEADER_SIZE: usize = 50;
const SUPPORTED_MAJOR: u8 = 10;

#[derive(Debug)]
#[binrw]
#[brw(little)]
pub struct NtfscloneHeader {
    pub magic: [u8; 16],
    pub major_ver: u8,
    pub minor_ver: u8,
    pub cluster_size: u32,
    pub device_size: i64,
    pub nr_clusters: i64,
    pub inuse: i64,
    pub offset_to_image_data: u32,
}

pub struct NtfscloneFormat;

impl NtfscloneFormat {
    #[allow(dead_code)]
    fn format() -> ImageFormat {
        ImageFormat::Ntfsclone
    }

    pub(crate) fn extensions() -> Vec<&'static str> {
        vec!["img", "ntfs"]
    }

    pub(crate) fn detect(buf: &[u8]) -> bool {
        buf.starts_with(NTFSCLONE_MAGIC)
    }

    pub(crate) fn parse(source: &mut ByteSource) -> Result<ParsedImage, ImageError> {
        let mut raw = [0u8; HEADER_SIZE];
        source.read_exact(&mut raw)?;
        let header = NtfscloneHeader::read(&mut Cursor::new(&raw[..]))?;

        if !header.magic.starts_with(NTFSCLONE_MAGIC) {
            return Err(ImageError::UnknownFormat);
        }
        if header.major_ver != SUPPORTED_MAJOR {
            return Err(ImageError::UnsupportedVersion(
                ImageFormat::Ntfsclone,
                format!("version {}.{}", header.major_ver, header.minor_ver),
            ));
        }

        if header.cluster_size == 0
            || !header.cluster_size.is_power_of_two()
            || header.cluster_size > MAXIMUM_BLOCK_SIZE
        {
            return Err(ImageError::CorruptHeader(format!("bad cluster size {}", header.cluster_size)));
        }
        if header.nr_clusters <= 0 || header.device_size < 0 || header.inuse < 0 {
            return Err(ImageError::CorruptHeader("negative geometry field".to_string()));
        }
        if header.nr_clusters as u64 > crate::MAXIMUM_TOTAL_BLOCKS {
            return Err(ImageError::CorruptHeader(format!("implausible cluster count {}", header.nr_clusters)));
        }
        if header.inuse > header.nr_clusters {
            return Err(ImageError::CorruptHeader(format!(
                "{} clusters in use of {} total",
                header.inuse, header.nr_clusters
            )));
        }
        if (header.offset_to_image_data as usize) < HEADER_SIZE {
            return Err(ImageError::CorruptHeader(format!(
                "image data offset {} overlaps the header",
                header.offset_to_image_data
            )));
        }

        log::debug!(
            "parse(): ntfsclone v{}.{} image, {} clusters of {} bytes, {} in use",
            header.major_ver,
            header.minor_ver,
            header.nr_clusters,
            header.cluster_size,
            header.inuse
        );

        // Header padding up to the recorded image data offset.
        source.skip(header.offset_to_image_data as u64 - HEADER_SIZE as u64)?;

        let header = ImageHeader {
            format: ImageFormat::Ntfsclone,
            block_size: header.cluster_size,
            total_blocks: header.nr_clusters as u64,
            used_blocks: header.inuse as u64,
            fs_label: "NTFS".to_string(),
            blocks_section_offset: header.offset_to_image_data as u64,
            checksum: ChecksumSpec::none(),
        };

        Ok(ParsedImage { header, bitmap: None })
    }
}
