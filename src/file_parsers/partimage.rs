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

    src/file_parsers/partimage.rs

    A parser for partimage (0.6) images.

    A partimage file opens with four sequential parts, each carrying its
    own CRC32: the 512-byte volume header, the 16 KiB main header, the MBR
    backup section, and the local header describing the partition's block
    geometry. Section boundaries past the main header are marked with
    MAGIC-BEGIN-* strings. The allocation bitmap is always packed BIT
    mode; the data blocks that follow each carry a CRC32 trailer.

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

pub const PARTIMAGE_MAGIC: &[u8] = b"PaRtImAgE-VoLuMe";

const VOLUME_HEADER_SIZE: usize = 512;
const MAIN_HEADER_SIZE: usize = 16384;
const LOCAL_HEADER_SIZE: usize = 1024;

const MAGIC_BEGIN_MBRBACKUP: &[u8] = b"MAGIC-BEGIN-MBRBACKUP";
const MAGIC_BEGIN_LOCALHEADER: &[u8] = b"MAGIC-BEGIN-LOCALHEADER";
const MAGIC_BEGIN_BITMAP: &[u8] = b"MAGIC-BEGIN-BITMAP";
const MAGIC_BEGIN_DATABLOCKS: &[u8] = b"MAGIC-BEGIN-DATABLOCKS";

/// The one wire format partimage ever shipped.
const SUPPORTED_VERSION_PREFIX: &str = "0.6";

#[derive(Debug)]
#[binrw]
#[brw(little)]
pub struct VolumeHeader {
    pub magic: [u8; 32],
    pub version: [u8; 64],
    pub volume_number: u32,
    pub identifier: u64,
    pub reserved: [u8; 400],
    pub crc32: u32,
}

#[derive(Debug)]
#[binrw]
#[brw(little)]
pub struct MainHeader {
    pub filesystem: [u8; 512],
    pub description: [u8; 4096],
    pub original_device: [u8; 512],
    pub first_image_path: [u8; 4096],
    pub partimage_version: [u8; 64],
    pub mbr_count: u32,
    pub mbr_size: u32,
    pub reserved: [u8; 7092],
    pub crc32: u32,
}

#[derive(Debug)]
#[binrw]
#[brw(little)]
pub struct LocalHeader {
    pub block_size: u64,
    pub used_blocks: u64,
    pub total_blocks: u64,
    pub bitmap_size: u64,
    pub bad_blocks: u64,
    pub label: [u8; 64],
    pub reserved: [u8; 916],
    pub crc32: u32,
}

pub struct PartimageFormat;

impl PartimageFormat {
    #[allow(dead_code)]
    fn format() -> ImageFormat {
        ImageFormat::Partimage
    }

    pub(crate) fn extensions() -> Vec<&'static str> {
        vec!["partimg", "000"]
    }

    pub(crate) fn detect(buf: &[u8]) -> bool {
        buf.starts_with(PARTIMAGE_MAGIC)
    }

    pub(crate) fn parse(source: &mut ByteSource) -> Result<ParsedImage, ImageError> {
        let volume_raw = read_part(source, VOLUME_HEADER_SIZE, "volume header")?;
        let volume = VolumeHeader::read(&mut Cursor::new(&volume_raw[..]))?;

        if !volume.magic.starts_with(PARTIMAGE_MAGIC) {
            return Err(ImageError::UnknownFormat);
        }
        if volume.volume_number != 0 {
            return Err(ImageError::CorruptHeader(format!(
                "expected the first volume, found volume {}",
                volume.volume_number
            )));
        }
        let version = cstr_field(&volume.version);
        if !version.starts_with(SUPPORTED_VERSION_PREFIX) {
            return Err(ImageError::UnsupportedVersion(ImageFormat::Partimage, version));
        }

        let main_raw = read_part(source, MAIN_HEADER_SIZE, "main header")?;
        let main = MainHeader::read(&mut Cursor::new(&main_raw[..]))?;

        log::debug!(
            "parse(): partimage {} image of {} from {}",
            version,
            cstr_field(&main.filesystem),
            cstr_field(&main.original_device)
        );

        // MBR backup section: marker plus mbr_count saved boot records we
        // have no use for.
        expect_marker(source, MAGIC_BEGIN_MBRBACKUP, "MBR backup")?;
        let mbr_bytes = main.mbr_count as u64 * main.mbr_size as u64;
        source.skip(mbr_bytes)?;

        expect_marker(source, MAGIC_BEGIN_LOCALHEADER, "local header")?;
        let local_raw = read_part(source, LOCAL_HEADER_SIZE, "local header")?;
        let local = LocalHeader::read(&mut Cursor::new(&local_raw[..]))?;

        if local.block_size == 0
            || local.block_size > MAXIMUM_BLOCK_SIZE as u64
            || !local.block_size.is_power_of_two()
        {
            return Err(ImageError::CorruptHeader(format!("bad block size {}", local.block_size)));
        }
        if local.total_blocks == 0 || local.total_blocks > crate::MAXIMUM_TOTAL_BLOCKS {
            return Err(ImageError::CorruptHeader(format!("implausible block count {}", local.total_blocks)));
        }

        let packed_len = local.total_blocks.div_ceil(8);
        if local.bitmap_size < packed_len {
            return Err(ImageError::CorruptHeader(format!(
                "bitmap of {} bytes cannot cover {} blocks",
                local.bitmap_size, local.total_blocks
            )));
        }

        expect_marker(source, MAGIC_BEGIN_BITMAP, "bitmap")?;
        let bitmap_len = usize::try_from(local.bitmap_size).map_err(|_| {
            ImageError::CorruptHeader(format!("implausible bitmap of {} bytes", local.bitmap_size))
        })?;
        let mut bitmap_raw = vec![0u8; bitmap_len];
        source.read_exact(&mut bitmap_raw)?;

        let mut crc_buf = [0u8; 4];
        source.read_exact(&mut crc_buf)?;
        let recorded = u32::from_le_bytes(crc_buf);
        let computed = crc32(CRC_SEED, &bitmap_raw);
        if recorded != computed {
            return Err(ImageError::CorruptBitmap(format!(
                "bitmap CRC mismatch: recorded {:08X}, computed {:08X}",
                recorded, computed
            )));
        }

        let bitmap = Bitmap::from_bit_bytes(&bitmap_raw[..packed_len as usize], local.total_blocks);
        let used = bitmap.count_ones();
        if local.used_blocks != 0 && used != local.used_blocks {
            return Err(ImageError::CorruptBitmap(format!(
                "bitmap population {} disagrees with recorded count {}",
                used, local.used_blocks
            )));
        }

        expect_marker(source, MAGIC_BEGIN_DATABLOCKS, "data blocks")?;

        let header = ImageHeader {
            format: ImageFormat::Partimage,
            block_size: local.block_size as u32,
            total_blocks: local.total_blocks,
            used_blocks: used,
            fs_label: cstr_field(&main.filesystem),
            blocks_section_offset: source.stream_position(),
            checksum: ChecksumSpec {
                algorithm: ChecksumAlgorithm::Crc32,
                size: 4,
                blocks_per_sum: 1,
                reseed: true,
            },
        };

        Ok(ParsedImage { header, bitmap: Some(bitmap) })
    }
}

/// Read a fixed-size header part and verify its trailing CRC32.
fn read_part(source: &mut ByteSource, size: usize, what: &str) -> Result<Vec<u8>, ImageError> {
    let mut raw = vec![0u8; size];
    source.read_exact(&mut raw)?;
    let recorded = u32::from_le_bytes([raw[size - 4], raw[size - 3], raw[size - 2], raw[size - 1]]);
    let computed = crc32(CRC_SEED, &raw[..size - 4]);
    if recorded != computed {
        return Err(ImageError::CorruptHeader(format!(
            "{} CRC mismatch: recorded {:08X}, computed {:08X}",
            what, recorded, computed
        )));
    }
    Ok(raw)
}

/// Consume and check one MAGIC-BEGIN-* section marker.
fn expect_marker(source: &mut ByteSource, marker: &[u8], what: &str) -> Result<(), ImageError> {
    let mut buf = vec![0u8; marker.len()];
    source.read_exact(&mut buf)?;
    if buf != marker {
        return Err(ImageError::CorruptHeader(format!("missing {} section marker", what)));
    }
    Ok(())
}
