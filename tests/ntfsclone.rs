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
mod common;

use common::{build_ntfsclone, init, write_image, NcCmd};
use partfox::{ImageBuilder, ImageError, ImageFormat};

#[test]
fn test_command_stream_decode() {
    init();
    let dir = tempfile::tempdir().unwrap();
    // Gap of 3, one used cluster, gap of 1, one used cluster.
    let image_bytes = build_ntfsclone(
        8,
        &[
            NcCmd::Gap(3),
            NcCmd::Block(b"block1..".to_vec()),
            NcCmd::Gap(1),
            NcCmd::Block(b"block2..".to_vec()),
        ],
    );
    let path = write_image(dir.path(), "nc.img", &image_bytes);

    let image = ImageBuilder::new().open(&path).unwrap();
    let header = image.header();
    assert_eq!(header.format(), ImageFormat::Ntfsclone);
    assert_eq!(header.block_size(), 8);
    assert_eq!(header.total_blocks(), 6);
    assert_eq!(header.partition_size(), 48);
    assert_eq!(header.fs_label(), "NTFS");

    let io = image.into_block_io().unwrap();
    // The used count is re-derived from the run scan.
    assert_eq!(io.header().used_blocks(), 2);

    assert_eq!(io.read_at(24, 8).unwrap(), b"block1..");
    assert_eq!(io.read_at(40, 8).unwrap(), b"block2..");
    assert_eq!(io.read_at(0, 24).unwrap(), vec![0u8; 24]);
    assert_eq!(io.read_at(32, 8).unwrap(), vec![0u8; 8]);
    assert_eq!(
        io.read_at(0, 48).unwrap(),
        [&[0u8; 24][..], b"block1..", &[0u8; 8], b"block2.."].concat()
    );
}

#[test]
fn test_consecutive_data_clusters() {
    init();
    let dir = tempfile::tempdir().unwrap();
    // Adjacent used clusters coalesce into one run; each payload is still
    // preceded by its own command byte in the image.
    let image_bytes = build_ntfsclone(
        4,
        &[
            NcCmd::Block(b"AAAA".to_vec()),
            NcCmd::Block(b"BBBB".to_vec()),
            NcCmd::Block(b"CCCC".to_vec()),
            NcCmd::Gap(1),
            NcCmd::Block(b"DDDD".to_vec()),
        ],
    );
    let path = write_image(dir.path(), "runs.img", &image_bytes);

    let (_, io) = partfox::open_image(&path).unwrap();
    assert_eq!(io.read_at(0, 12).unwrap(), b"AAAABBBBCCCC");
    assert_eq!(io.read_at(2, 8).unwrap(), b"AABBBBCC");
    assert_eq!(io.read_at(12, 4).unwrap(), vec![0u8; 4]);
    assert_eq!(io.read_at(16, 4).unwrap(), b"DDDD");
}

#[test]
fn test_gap_only_image_reads_zero() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let image_bytes = build_ntfsclone(16, &[NcCmd::Gap(8)]);
    let path = write_image(dir.path(), "empty.img", &image_bytes);

    let (header, io) = partfox::open_image(&path).unwrap();
    assert_eq!(header.used_blocks(), 0);
    assert_eq!(io.read_at(0, 128).unwrap(), vec![0u8; 128]);
}

#[test]
fn test_bad_command_byte() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let mut image_bytes = build_ntfsclone(8, &[NcCmd::Gap(3), NcCmd::Block(b"block1..".to_vec())]);
    // Overwrite the data command byte with garbage.
    image_bytes[56 + 9] = 0x77;
    let path = write_image(dir.path(), "badcmd.img", &image_bytes);

    let image = ImageBuilder::new().open(&path).unwrap();
    match image.into_block_io() {
        Err(ImageError::CorruptStream(_)) => {}
        other => panic!("expected CorruptStream, got {:?}", other.err()),
    }
}

#[test]
fn test_truncated_stream() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let image_bytes = build_ntfsclone(8, &[NcCmd::Gap(3), NcCmd::Block(b"block1..".to_vec())]);
    // Drop the last data command entirely: the stream no longer covers the
    // partition.
    let truncated = &image_bytes[..56 + 9];
    let path = write_image(dir.path(), "short.img", truncated);

    let image = ImageBuilder::new().open(&path).unwrap();
    match image.into_block_io() {
        Err(ImageError::CorruptStream(_)) => {}
        other => panic!("expected CorruptStream, got {:?}", other.err()),
    }
}

#[test]
fn test_overrunning_gap() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let mut image_bytes = build_ntfsclone(8, &[NcCmd::Gap(4)]);
    // Inflate the gap count beyond the cluster count.
    image_bytes[57..65].copy_from_slice(&100u64.to_le_bytes());
    let path = write_image(dir.path(), "overrun.img", &image_bytes);

    let image = ImageBuilder::new().open(&path).unwrap();
    match image.into_block_io() {
        Err(ImageError::CorruptStream(_)) => {}
        other => panic!("expected CorruptStream, got {:?}", other.err()),
    }
}

#[test]
fn test_unsupported_major_version() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let mut image_bytes = build_ntfsclone(8, &[NcCmd::Gap(1)]);
    image_bytes[16] = 9; // major version
    let path = write_image(dir.path(), "old.img", &image_bytes);

    match ImageBuilder::new().open(&path) {
        Err(ImageError::UnsupportedVersion(ImageFormat::Ntfsclone, _)) => {}
        other => panic!("expected UnsupportedVersion, got {:?}", other.err()),
    }
}
