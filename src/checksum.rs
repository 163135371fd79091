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

    src/checksum.rs

    CRC32 in the convention the backup tools use, plus the sequential
    verification pass over an image's blocks section.

    partclone and partimage write the raw CRC32 register: seeded with
    0xFFFFFFFF, updated with the reflected 0xEDB88320 polynomial, and stored
    without the final inversion that the standard CRC-32 applies. crc32fast
    exposes only the standard form, so the register is recovered by
    inverting on the way in and out.

*/
use crate::{containers::ByteSource, image::ImageHeader, io::Read, ImageError, Progress};

pub(crate) const CRC_SEED: u32 = 0xFFFF_FFFF;

/// Continue a raw CRC32 register over `data`. Pass [`CRC_SEED`] to start a
/// fresh sum.
pub(crate) fn crc32(seed: u32, data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(!seed);
    hasher.update(data);
    !hasher.finalize()
}

/// Sequentially verify the checksum trailers of the blocks section.
///
/// `source` must be positioned at the start of the blocks section. Groups of
/// `blocks_per_sum` blocks (and the final partial group) are summed and
/// compared against their trailers; the first mismatch is reported as
/// `VerifyFailed` carrying the used-block index of the first block in the
/// failing group.
pub(crate) fn verify_blocks(
    source: &mut ByteSource,
    header: &ImageHeader,
    progress: &mut dyn Progress,
) -> Result<(), ImageError> {
    let spec = header.checksum;
    if !spec.is_enabled() {
        return Ok(());
    }

    let block_size = header.block_size as usize;
    let used = header.used_blocks;
    let blocks_per_sum = spec.blocks_per_sum as u64;

    log::debug!(
        "verify_blocks(): verifying {} used blocks, one sum per {} blocks, reseed={}",
        used,
        blocks_per_sum,
        spec.reseed
    );

    progress.start(used);

    let mut block_buf = vec![0u8; block_size];
    let mut trailer = vec![0u8; spec.size as usize];
    let mut register = CRC_SEED;
    let mut block = 0u64;

    while block < used {
        let group_start = block;
        let group_len = blocks_per_sum.min(used - block);
        if spec.reseed {
            register = CRC_SEED;
        }
        for _ in 0..group_len {
            source.read_exact(&mut block_buf)?;
            register = crc32(register, &block_buf);
        }
        source.read_exact(&mut trailer)?;
        let recorded = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        if recorded != register {
            log::warn!(
                "verify_blocks(): checksum mismatch in group starting at used block {}: recorded {:08X}, computed {:08X}",
                group_start,
                recorded,
                register
            );
            progress.finish();
            return Err(ImageError::VerifyFailed(group_start));
        }
        block += group_len;
        progress.advance(group_len);
    }

    progress.finish();
    log::debug!("verify_blocks(): all {} blocks verified", used);
    Ok(())
}
