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

    src/runs.rs

    The run index of an ntfsclone image.

    After its header, an ntfsclone image is a stream of commands: 0x00
    followed by a little-endian count of consecutive unused clusters, or
    0x01 followed by exactly one cluster of data. A single sequential scan
    folds that stream into a table of maximal same-kind runs over the
    logical partition; a binary search then answers any byte offset.

    Within a coalesced data run each cluster's payload is preceded by its
    one command byte, so image offsets advance by cluster_size + 1 per
    cluster. locate() accounts for that stride.

*/
use crate::{containers::ByteSource, image::ImageHeader, io::Read, ImageError, Progress};

const CMD_GAP: u8 = 0x00;
const CMD_DATA: u8 = 0x01;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunKind {
    Data,
    Gap,
}

/// A maximal span of same-kind blocks. `p_off` is the run's byte offset in
/// the logical partition; `i_off` is the image offset of the first payload
/// byte (data runs only).
#[derive(Copy, Clone, Debug)]
pub struct Run {
    pub p_off: u64,
    pub i_off: u64,
    pub len: u64,
    pub kind: RunKind,
}

/// Result of locating a partition byte offset in the run table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Located {
    /// The offset falls in a gap; `remaining` bytes of zeros extend to the
    /// end of the run.
    Zero { remaining: u64 },
    /// The offset maps to `image_offset` in the image stream.
    Data { image_offset: u64 },
}

/// Ordered, coalesced run table over the whole logical partition.
pub struct RunTable {
    runs: Vec<Run>,
    block_size: u32,
    data_blocks: u64,
}

impl RunTable {
    /// Build the table with one sequential pass over the command stream.
    /// `source` must be positioned at the header's image-data offset.
    pub(crate) fn scan(
        source: &mut ByteSource,
        header: &ImageHeader,
        progress: &mut dyn Progress,
    ) -> Result<RunTable, ImageError> {
        let block_size = header.block_size as u64;
        let partition_size = header.partition_size();

        let mut runs: Vec<Run> = Vec::new();
        let mut p_off = 0u64;
        let mut data_blocks = 0u64;
        let mut cmd = [0u8; 1];
        let mut count_buf = [0u8; 8];

        progress.start(partition_size);

        while p_off < partition_size {
            if let Err(e) = source.read_exact(&mut cmd) {
                log::warn!("scan(): command stream ended at {} of {} bytes", p_off, partition_size);
                return Err(ImageError::CorruptStream(format!(
                    "truncated command stream at partition offset {}: {}",
                    p_off, e
                )));
            }
            match cmd[0] {
                CMD_GAP => {
                    source.read_exact(&mut count_buf)?;
                    let count = u64::from_le_bytes(count_buf);
                    let len = count.checked_mul(block_size).ok_or_else(|| {
                        ImageError::CorruptStream(format!("implausible gap count {}", count))
                    })?;
                    if count == 0 {
                        continue;
                    }
                    if len > partition_size - p_off {
                        return Err(ImageError::CorruptStream(format!(
                            "gap of {} blocks at partition offset {} overruns the partition",
                            count, p_off
                        )));
                    }
                    match runs.last_mut() {
                        Some(run) if run.kind == RunKind::Gap => run.len += len,
                        _ => runs.push(Run { p_off, i_off: 0, len, kind: RunKind::Gap }),
                    }
                    p_off += len;
                    progress.advance(len);
                }
                CMD_DATA => {
                    if p_off + block_size > partition_size {
                        return Err(ImageError::CorruptStream(format!(
                            "data block at partition offset {} overruns the partition",
                            p_off
                        )));
                    }
                    let payload_off = source.stream_position();
                    source.skip(block_size)?;
                    match runs.last_mut() {
                        Some(run) if run.kind == RunKind::Data => run.len += block_size,
                        _ => runs.push(Run { p_off, i_off: payload_off, len: block_size, kind: RunKind::Data }),
                    }
                    p_off += block_size;
                    data_blocks += 1;
                    progress.advance(block_size);
                }
                other => {
                    return Err(ImageError::CorruptStream(format!(
                        "unexpected command byte {:#04x} at partition offset {}",
                        other, p_off
                    )));
                }
            }
        }

        progress.finish();
        log::debug!(
            "scan(): {} runs covering {} bytes, {} data blocks",
            runs.len(),
            p_off,
            data_blocks
        );

        Ok(RunTable { runs, block_size: header.block_size, data_blocks })
    }

    /// Number of runs in the table.
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Count of data blocks discovered by the scan.
    pub fn data_blocks(&self) -> u64 {
        self.data_blocks
    }

    pub(crate) fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    /// Locate the run containing partition byte `offset`.
    pub fn locate(&self, offset: u64) -> Option<Located> {
        let idx = self.runs.partition_point(|r| r.p_off <= offset);
        if idx == 0 {
            return None;
        }
        let run = &self.runs[idx - 1];
        let delta = offset - run.p_off;
        if delta >= run.len {
            return None;
        }
        match run.kind {
            RunKind::Gap => Some(Located::Zero { remaining: run.len - delta }),
            RunKind::Data => {
                // One command byte precedes each cluster's payload.
                let cmd_bytes = delta / self.block_size as u64;
                Some(Located::Data { image_offset: run.i_off + delta + cmd_bytes })
            }
        }
    }
}
