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

    tests/common/mod.rs

    Common support routines for tests: synthetic partclone, partimage and
    ntfsclone images, plus split and compression fixtures.

*/
#![allow(dead_code)]

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub const CRC_SEED: u32 = 0xFFFF_FFFF;

/// The raw CRC32 register convention the backup tools write: seeded with
/// 0xFFFFFFFF and stored without the final inversion.
pub fn crc32(seed: u32, data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(!seed);
    hasher.update(data);
    !hasher.finalize()
}

/// NUL-pad `text` to a fixed-size field.
fn field(text: &[u8], len: usize) -> Vec<u8> {
    assert!(text.len() <= len);
    let mut out = vec![0u8; len];
    out[..text.len()].copy_from_slice(text);
    out
}

/// Pack a bit-per-block bitmap LSB-first, the way partclone and partimage
/// store it.
pub fn pack_bitmap(bits: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; bits.len().div_ceil(8)];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            out[i / 8] |= 1 << (i % 8);
        }
    }
    out
}

// ----------------------------------------------------------------------------
// partclone
// ----------------------------------------------------------------------------

pub struct PartcloneSpec {
    pub block_size: u32,
    pub bitmap: Vec<bool>,
    /// Write the bitmap BYTE mode (one byte per block) instead of BIT mode.
    pub byte_mode: bool,
    /// `Some((blocks_per_sum, reseed))` enables CRC32 block checksums.
    pub checksum: Option<(u32, bool)>,
    /// One payload per set bitmap bit, each `block_size` bytes.
    pub blocks: Vec<Vec<u8>>,
    pub version_txt: [u8; 4],
    pub fs_label: &'static [u8],
}

impl PartcloneSpec {
    pub fn new(block_size: u32, bitmap: Vec<bool>, blocks: Vec<Vec<u8>>) -> PartcloneSpec {
        PartcloneSpec {
            block_size,
            bitmap,
            byte_mode: false,
            checksum: None,
            blocks,
            version_txt: *b"0002",
            fs_label: b"NTFS",
        }
    }
}

pub fn build_partclone(spec: &PartcloneSpec) -> Vec<u8> {
    let total = spec.bitmap.len() as u64;
    let used = spec.bitmap.iter().filter(|&&b| b).count() as u64;
    assert_eq!(spec.blocks.len() as u64, used, "one payload per set bit");
    for block in &spec.blocks {
        assert_eq!(block.len(), spec.block_size as usize);
    }

    let (checksum_mode, checksum_size, blocks_per_sum, reseed): (u16, u16, u32, u8) = match spec.checksum {
        Some((bps, reseed)) => (32, 4, bps, reseed as u8),
        None => (0, 0, 0, 0),
    };

    let mut header = Vec::with_capacity(110);
    header.extend_from_slice(&field(b"partclone-image", 16));
    header.extend_from_slice(&field(b"0.3.13", 14));
    header.extend_from_slice(&spec.version_txt);
    header.extend_from_slice(&0xC0DEu16.to_le_bytes());
    header.extend_from_slice(&field(spec.fs_label, 16));
    header.extend_from_slice(&(total * spec.block_size as u64).to_le_bytes());
    header.extend_from_slice(&total.to_le_bytes());
    header.extend_from_slice(&used.to_le_bytes());
    header.extend_from_slice(&used.to_le_bytes());
    header.extend_from_slice(&spec.block_size.to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes()); // feature section size
    header.extend_from_slice(&2u16.to_le_bytes()); // image version
    header.extend_from_slice(&64u16.to_le_bytes()); // cpu bits
    header.extend_from_slice(&checksum_mode.to_le_bytes());
    header.extend_from_slice(&checksum_size.to_le_bytes());
    header.extend_from_slice(&blocks_per_sum.to_le_bytes());
    header.push(reseed);
    header.push(if spec.byte_mode { 8 } else { 1 });
    assert_eq!(header.len(), 106);
    let header_crc = crc32(CRC_SEED, &header);
    header.extend_from_slice(&header_crc.to_le_bytes());

    let bitmap_bytes = if spec.byte_mode {
        spec.bitmap.iter().map(|&b| b as u8).collect::<Vec<u8>>()
    }
    else {
        pack_bitmap(&spec.bitmap)
    };

    let mut image = header;
    image.extend_from_slice(&bitmap_bytes);
    image.extend_from_slice(&crc32(CRC_SEED, &bitmap_bytes).to_le_bytes());
    image.extend_from_slice(&build_blocks_section(&spec.blocks, spec.checksum));
    image
}

/// Lay out the used blocks with checksum trailers per the given grouping.
pub fn build_blocks_section(blocks: &[Vec<u8>], checksum: Option<(u32, bool)>) -> Vec<u8> {
    let mut out = Vec::new();
    match checksum {
        None => {
            for block in blocks {
                out.extend_from_slice(block);
            }
        }
        Some((blocks_per_sum, reseed)) => {
            let mut register = CRC_SEED;
            for (i, block) in blocks.iter().enumerate() {
                if reseed && i as u32 % blocks_per_sum == 0 {
                    register = CRC_SEED;
                }
                out.extend_from_slice(block);
                register = crc32(register, block);
                let group_end = (i as u32 + 1) % blocks_per_sum == 0 || i + 1 == blocks.len();
                if group_end {
                    out.extend_from_slice(&register.to_le_bytes());
                }
            }
        }
    }
    out
}

// ----------------------------------------------------------------------------
// partimage
// ----------------------------------------------------------------------------

pub struct PartimageSpec {
    pub block_size: u64,
    pub bitmap: Vec<bool>,
    pub blocks: Vec<Vec<u8>>,
    pub mbr_count: u32,
    pub mbr_size: u32,
    pub version: &'static [u8],
    pub fs_label: &'static [u8],
}

impl PartimageSpec {
    pub fn new(block_size: u64, bitmap: Vec<bool>, blocks: Vec<Vec<u8>>) -> PartimageSpec {
        PartimageSpec {
            block_size,
            bitmap,
            blocks,
            mbr_count: 1,
            mbr_size: 512,
            version: b"0.6.1",
            fs_label: b"ext4",
        }
    }
}

/// Append a header part: the payload fields, reserved padding up to
/// `size - 4`, and the part CRC.
fn push_part(image: &mut Vec<u8>, payload: Vec<u8>, size: usize) {
    assert!(payload.len() <= size - 4);
    let mut part = payload;
    part.resize(size - 4, 0);
    let crc = crc32(CRC_SEED, &part);
    part.extend_from_slice(&crc.to_le_bytes());
    image.extend_from_slice(&part);
}

pub fn build_partimage(spec: &PartimageSpec) -> Vec<u8> {
    let total = spec.bitmap.len() as u64;
    let used = spec.bitmap.iter().filter(|&&b| b).count() as u64;
    assert_eq!(spec.blocks.len() as u64, used, "one payload per set bit");

    let mut image = Vec::new();

    let mut volume = Vec::new();
    volume.extend_from_slice(&field(b"PaRtImAgE-VoLuMe", 32));
    volume.extend_from_slice(&field(spec.version, 64));
    volume.extend_from_slice(&0u32.to_le_bytes()); // volume number
    volume.extend_from_slice(&0x1DE5_CAFEu64.to_le_bytes()); // identifier
    push_part(&mut image, volume, 512);

    let mut main = Vec::new();
    main.extend_from_slice(&field(spec.fs_label, 512));
    main.extend_from_slice(&field(b"test partition", 4096));
    main.extend_from_slice(&field(b"/dev/sda1", 512));
    main.extend_from_slice(&field(b"sda1.partimg.000", 4096));
    main.extend_from_slice(&field(spec.version, 64));
    main.extend_from_slice(&spec.mbr_count.to_le_bytes());
    main.extend_from_slice(&spec.mbr_size.to_le_bytes());
    push_part(&mut image, main, 16384);

    image.extend_from_slice(b"MAGIC-BEGIN-MBRBACKUP");
    image.extend_from_slice(&vec![0u8; (spec.mbr_count * spec.mbr_size) as usize]);

    image.extend_from_slice(b"MAGIC-BEGIN-LOCALHEADER");
    let bitmap_bytes = pack_bitmap(&spec.bitmap);
    let mut local = Vec::new();
    local.extend_from_slice(&spec.block_size.to_le_bytes());
    local.extend_from_slice(&used.to_le_bytes());
    local.extend_from_slice(&total.to_le_bytes());
    local.extend_from_slice(&(bitmap_bytes.len() as u64).to_le_bytes());
    local.extend_from_slice(&0u64.to_le_bytes()); // bad blocks
    local.extend_from_slice(&field(b"root", 64));
    push_part(&mut image, local, 1024);

    image.extend_from_slice(b"MAGIC-BEGIN-BITMAP");
    image.extend_from_slice(&bitmap_bytes);
    image.extend_from_slice(&crc32(CRC_SEED, &bitmap_bytes).to_le_bytes());

    image.extend_from_slice(b"MAGIC-BEGIN-DATABLOCKS");
    image.extend_from_slice(&build_blocks_section(&spec.blocks, Some((1, true))));
    image
}

// ----------------------------------------------------------------------------
// ntfsclone
// ----------------------------------------------------------------------------

pub enum NcCmd {
    /// A run of unused clusters.
    Gap(u64),
    /// One used cluster of data.
    Block(Vec<u8>),
}

pub fn build_ntfsclone(cluster_size: u32, cmds: &[NcCmd]) -> Vec<u8> {
    let nr_clusters: u64 = cmds
        .iter()
        .map(|c| match c {
            NcCmd::Gap(n) => *n,
            NcCmd::Block(_) => 1,
        })
        .sum();
    let inuse = cmds.iter().filter(|c| matches!(c, NcCmd::Block(_))).count() as u64;

    let mut image = Vec::new();
    image.extend_from_slice(b"\0ntfsclone-image");
    image.push(10); // major
    image.push(1); // minor
    image.extend_from_slice(&cluster_size.to_le_bytes());
    image.extend_from_slice(&(nr_clusters as i64 * cluster_size as i64).to_le_bytes());
    image.extend_from_slice(&(nr_clusters as i64).to_le_bytes());
    image.extend_from_slice(&(inuse as i64).to_le_bytes());
    image.extend_from_slice(&56u32.to_le_bytes()); // offset to image data
    assert_eq!(image.len(), 50);
    image.resize(56, 0);

    for cmd in cmds {
        match cmd {
            NcCmd::Gap(n) => {
                image.push(0x00);
                image.extend_from_slice(&n.to_le_bytes());
            }
            NcCmd::Block(data) => {
                assert_eq!(data.len(), cluster_size as usize);
                image.push(0x01);
                image.extend_from_slice(data);
            }
        }
    }
    image
}

// ----------------------------------------------------------------------------
// fixtures on disk
// ----------------------------------------------------------------------------

pub fn write_image(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, data).unwrap();
    path
}

/// Write `data` as split segments `stem.aa`, `stem.ab`, ... of at most
/// `segment_size` bytes each. Returns the path of the first segment.
pub fn write_split(dir: &Path, stem: &str, data: &[u8], segment_size: usize) -> PathBuf {
    assert!(segment_size > 0);
    let suffixes = ["aa", "ab", "ac", "ad", "ae", "af", "ag", "ah"];
    let mut first = None;
    for (i, chunk) in data.chunks(segment_size).enumerate() {
        let path = dir.join(format!("{}.{}", stem, suffixes[i]));
        fs::write(&path, chunk).unwrap();
        if first.is_none() {
            first = Some(path);
        }
    }
    first.expect("at least one segment")
}

pub fn gzip_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn bzip2_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn xz_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn zstd_compress(data: &[u8]) -> Vec<u8> {
    zstd::stream::encode_all(data, 0).unwrap()
}

pub fn lz4_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = lz4_flex::frame::FrameEncoder::new(Vec::new());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}
