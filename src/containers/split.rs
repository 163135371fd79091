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

    src/containers/split.rs

    Support for split image sets.

    Backup tools commonly pipe their output through split(1), producing
    segments named image.aa, image.ab, image.ac and so on. A path whose
    extension is exactly two lowercase letters is probed for lexical
    successors, and the existing segments are exposed as one logically
    concatenated, seekable stream.

*/
use std::{
    fs::File,
    io::{BufReader, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    sync::OnceLock,
};

use regex::Regex;

fn split_suffix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z]{2}$").expect("split suffix pattern is valid"))
}

/// Lexical successor of a two-letter suffix: "aa" -> "ab", "az" -> "ba".
/// Returns `None` after "zz".
fn next_suffix(suffix: &str) -> Option<String> {
    let bytes = suffix.as_bytes();
    let (hi, lo) = (bytes[0], bytes[1]);
    match (hi, lo) {
        (b'z', b'z') => None,
        (_, b'z') => Some(format!("{}{}", (hi + 1) as char, 'a')),
        _ => Some(format!("{}{}", hi as char, (lo + 1) as char)),
    }
}

/// Expand `path` into the ordered list of split segments beginning at it.
/// A path without a two-letter lowercase extension, or with no successor
/// segment on disk, expands to itself alone.
pub(crate) fn expand_split_set(path: &Path) -> Vec<PathBuf> {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return vec![path.to_path_buf()];
    };
    if !split_suffix_regex().is_match(ext) {
        return vec![path.to_path_buf()];
    }

    let mut segments = vec![path.to_path_buf()];
    let mut suffix = ext.to_string();
    while let Some(next) = next_suffix(&suffix) {
        let sibling = path.with_extension(&next);
        if !sibling.is_file() {
            break;
        }
        segments.push(sibling);
        suffix = next;
    }

    if segments.len() > 1 {
        log::debug!("expand_split_set(): {} segments starting at {}", segments.len(), path.display());
    }
    segments
}

struct Segment {
    path: PathBuf,
    start: u64,
    len: u64,
}

struct Active {
    idx: usize,
    reader: BufReader<File>,
    /// Absolute stream position the reader is currently at.
    pos: u64,
}

/// A read-only, seekable view over the logical concatenation of one or
/// more files. Only the active segment's file handle is held open.
pub(crate) struct SplitReader {
    segments: Vec<Segment>,
    total_len: u64,
    pos: u64,
    active: Option<Active>,
}

impl SplitReader {
    pub(crate) fn new(paths: Vec<PathBuf>) -> std::io::Result<SplitReader> {
        let mut segments = Vec::with_capacity(paths.len());
        let mut start = 0u64;
        for path in paths {
            let len = std::fs::metadata(&path)?.len();
            segments.push(Segment { path, start, len });
            start += len;
        }
        Ok(SplitReader { segments, total_len: start, pos: 0, active: None })
    }

    pub(crate) fn total_len(&self) -> u64 {
        self.total_len
    }

    /// Index of the segment containing `pos`.
    fn segment_for(&self, pos: u64) -> usize {
        self.segments.partition_point(|s| s.start <= pos).saturating_sub(1)
    }

    fn activate(&mut self, idx: usize) -> std::io::Result<&mut Active> {
        let needs_open = !matches!(self.active, Some(Active { idx: active_idx, .. }) if active_idx == idx);
        if needs_open {
            let file = File::open(&self.segments[idx].path)?;
            self.active = Some(Active {
                idx,
                reader: BufReader::new(file),
                pos: self.segments[idx].start,
            });
        }
        let pos = self.pos;
        let start = self.segments[idx].start;
        let active = self.active.as_mut().expect("segment was just activated");
        if active.pos != pos {
            active.reader.seek(SeekFrom::Start(pos - start))?;
            active.pos = pos;
        }
        Ok(active)
    }
}

impl Read for SplitReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() || self.pos >= self.total_len {
            return Ok(0);
        }
        let idx = self.segment_for(self.pos);
        let seg_end = self.segments[idx].start + self.segments[idx].len;
        debug_assert!(self.pos < seg_end);
        let want = buf.len().min((seg_end - self.pos) as usize);
        let read = {
            let active = self.activate(idx)?;
            let read = active.reader.read(&mut buf[..want])?;
            active.pos += read as u64;
            read
        };
        if read == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("split segment {} shorter than its recorded size", self.segments[idx].path.display()),
            ));
        }
        self.pos += read as u64;
        Ok(read)
    }
}

impl Seek for SplitReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.total_len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(offset) => {
                self.pos = offset;
                Ok(offset)
            }
            None => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek before start of split stream",
            )),
        }
    }
}
