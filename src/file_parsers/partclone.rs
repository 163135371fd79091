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

    src/file_parsers/partclone.rs

    A parser for partclone images (image format 0002).

    The v2 header is a fixed 110-byte little-endian structure: a magic and
    version block, the filesystem geometry, the image options, and a CRC32
    over everything before it. The allocation bitmap follows immediately,
    in BIT mode (one bit per block, LSB first) or BYTE mode (one byte per
    block), trailed by its own CRC32. partclone stores the raw CRC
    register, seeded with 0xFFFFFFFF and never inverted.

*/
use binrw::{binrw, BinRead};

use crate::{
    bitmap::Bitmap,
    checksum::{crc32, CRC_SEED},
    containers::ByteSource,
    file_parsers::{cstr_field, ParsedImage},
    image::{ChecksumAlgorithm, ChecksumSpec, ImageHeader},
    io::{Cursor, Read},
    ImageError,
    ImageFormat,
    MAXIMUM_BLOCK_SIZE,
};

pub const PARTCLONE_MAGIC: &[u8] = b"partclone-image";

const HEADER_SIZE: usize = 110;
/// The header CRC covers everything before the CRC field itself.
const HEADER_CRC_OFFSET: usize = HEADER_SIZE - 4;

const IMAGE_VERSION_0002: &[u8; 4] = b"0002";
const ENDIAN_MAGIC_LE: u16 = 0xC0DE;
const ENDIAN_MAGIC_BE: u16 = 0xDEC0;

const CHECKSUM_MODE_NONE: u16 = 0;
const CHECKSUM_MODE_CRC32: u16 = 32;

const BITMAP_MODE_NONE: u8 = 0;
const BITMAP_MODE_BIT: u8 = 1;
const BITMAP_MODE_BYTE: u8 = 8;

#[derive(Debug)]
#[binrw]
#[brw(little)]
pub struct PartcloneHeader {
    pub magic: [u8; 16],
    pub tool_version: [u8; 14],
    pub image_version_txt: [u8; 4],
    pub endianess: u16,
    pub fs: [u8; 16],
    pub device_size: u64,
    pub total_blocks: u64,
    pub used_blocks_super: u64,
    pub used_blocks_bitmap: u64,
    pub block_size: u32,
    pub feature_size: u32,
    pub image_version: u16,
    pub cpu_bits: u16,
    pub checksum_mode: u16,
    pub checksum_size: u16,
    pub blocks_per_checksum: u32,
    pub reseed_checksum: u8,
    pub bitmap_mode: u8,
    pub crc32: u32,
}

pub struct PartcloneFormat;

impl PartcloneFormat {
    #[allow(dead_code)]
    fn format() -> ImageFormat {
        ImageFormat::Partclone
    }

    pub(crate) fn extensions() -> Vec<&'static str> {
        vec!["img", "pcl"]
    }

    pub(crate) fn detect(buf: &[u8]) -> bool {
        buf.starts_with(PARTCLONE_MAGIC)
    }

    pub(crate) fn parse(source: &mut ByteSource) -> Result<ParsedImage, ImageError> {
        let mut raw = [0u8; HEADER_SIZE];
        source.read_exact(&mut raw)?;
        let header = PartcloneHeader::read(&mut Cursor::new(&raw[..]))?;

        if !header.magic.starts_with(PARTCLONE_MAGIC) {
            return Err(ImageError::UnknownFormat);
        }

        let computed = crc32(CRC_SEED, &raw[..HEADER_CRC_OFFSET]);
        if computed != header.crc32 {
            return Err(ImageError::CorruptHeader(format!(
                "header CRC mismatch: recorded {:08X}, computed {:08X}",
                header.crc32, computed
            )));
        }

        match header.endianess {
            ENDIAN_MAGIC_LE => {}
            ENDIAN_MAGIC_BE => {
                return Err(ImageError::UnsupportedVersion(
                    ImageFormat::Partclone,
                    "big-endian image".to_string(),
                ));
            }
            other => {
                return Err(ImageError::CorruptHeader(format!("bad endianness marker {:#06X}", other)));
            }
        }

        if &header.image_version_txt != IMAGE_VERSION_0002 {
            return Err(ImageError::UnsupportedVersion(
                ImageFormat::Partclone,
                format!("image version {:?}", cstr_field(&header.image_version_txt)),
            ));
        }

        if header.block_size == 0
            || !header.block_size.is_power_of_two()
            || header.block_size > MAXIMUM_BLOCK_SIZE
        {
            return Err(ImageError::CorruptHeader(format!("bad block size {}", header.block_size)));
        }
        if header.total_blocks == 0 || header.total_blocks > crate::MAXIMUM_TOTAL_BLOCKS {
            return Err(ImageError::CorruptHeader(format!("implausible block count {}", header.total_blocks)));
        }

        let checksum = match header.checksum_mode {
            CHECKSUM_MODE_NONE => ChecksumSpec::none(),
            CHECKSUM_MODE_CRC32 => {
                if header.checksum_size != 4 {
                    return Err(ImageError::CorruptHeader(format!(
                        "CRC32 checksum with size {}",
                        header.checksum_size
                    )));
                }
                if header.blocks_per_checksum == 0 {
                    return Err(ImageError::CorruptHeader("zero blocks per checksum".to_string()));
                }
                ChecksumSpec {
                    algorithm: ChecksumAlgorithm::Crc32,
                    size: header.checksum_size as u32,
                    blocks_per_sum: header.blocks_per_checksum,
                    reseed: header.reseed_checksum != 0,
                }
            }
            other => {
                return Err(ImageError::UnsupportedVersion(
                    ImageFormat::Partclone,
                    format!("checksum mode {}", other),
                ));
            }
        };

        log::debug!(
            "parse(): partclone {} image of {}, {} blocks of {} bytes",
            cstr_field(&header.tool_version),
            cstr_field(&header.fs),
            header.total_blocks,
            header.block_size
        );

        let bitmap = Self::read_bitmap(source, &header)?;

        let used = bitmap.count_ones();
        if header.used_blocks_bitmap != 0 && used != header.used_blocks_bitmap {
            return Err(ImageError::CorruptBitmap(format!(
                "bitmap population {} disagrees with recorded count {}",
                used, header.used_blocks_bitmap
            )));
        }
        if header.used_blocks_super != 0 && used != header.used_blocks_super {
            // Some filesystems over-report in the superblock; the bitmap wins.
            log::warn!(
                "parse(): superblock reports {} used blocks, bitmap has {}",
                header.used_blocks_super,
                used
            );
        }

        let header = ImageHeader {
            format: ImageFormat::Partclone,
            block_size: header.block_size,
            total_blocks: header.total_blocks,
            used_blocks: used,
            fs_label: cstr_field(&header.fs),
            blocks_section_offset: source.stream_position(),
            checksum,
        };

        Ok(ParsedImage { header, bitmap: Some(bitmap) })
    }

    fn read_bitmap(source: &mut ByteSource, header: &PartcloneHeader) -> Result<Bitmap, ImageError> {
        let total = header.total_blocks;
        let raw_len = match header.bitmap_mode {
            BITMAP_MODE_BIT => total.div_ceil(8),
            BITMAP_MODE_BYTE => total,
            BITMAP_MODE_NONE => {
                return Err(ImageError::UnsupportedVersion(
                    ImageFormat::Partclone,
                    "image without a bitmap".to_string(),
                ));
            }
            other => {
                return Err(ImageError::CorruptHeader(format!("bad bitmap mode {}", other)));
            }
        };

        let raw_len = usize::try_from(raw_len)
            .map_err(|_| ImageError::CorruptHeader(format!("implausible bitmap of {} bytes", raw_len)))?;
        let mut raw = vec![0u8; raw_len];
        source.read_exact(&mut raw)?;

        let mut crc_buf = [0u8; 4];
        source.read_exact(&mut crc_buf)?;
        let recorded = u32::from_le_bytes(crc_buf);
        let computed = crc32(CRC_SEED, &raw);
        if recorded != computed {
            return Err(ImageError::CorruptBitmap(format!(
                "bitmap CRC mismatch: recorded {:08X}, computed {:08X}",
                recorded, computed
            )));
        }

        Ok(match header.bitmap_mode {
            BITMAP_MODE_BIT => Bitmap::from_bit_bytes(&raw, total),
            _ => Bitmap::from_byte_bytes(&raw),
        })
    }
}
