//! Log file I/O shared by gap-fill and the tailer.
//!
//! Only newline-terminated lines are ever handed out. A trailing fragment
//! without its `\n` stays unread until the writer finishes it.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use loglens_core::models::LogLine;

const BLOCK_SIZE: u64 = 64 * 1024;

/// Create the log file (and its parent directory) if it does not exist.
pub fn ensure_log_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
        }
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to create log file: {}", path.display()))?;
    Ok(())
}

/// Split `bytes` into complete lines.
///
/// `base_offset` is the file offset of `bytes[0]`. Returns the lines and the
/// number of bytes they span; anything after the last `\n` is left over.
/// The terminator (`\n` or `\r\n`) is not part of a line's bytes.
pub fn split_complete_lines(bytes: &[u8], base_offset: u64) -> (Vec<LogLine>, usize) {
    let mut lines = Vec::new();
    let mut start = 0usize;
    while let Some(rel) = bytes[start..].iter().position(|&b| b == b'\n') {
        let end = start + rel;
        let raw = &bytes[start..end];
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        lines.push(LogLine::from_bytes(raw, base_offset + start as u64));
        start = end + 1;
    }
    (lines, start)
}

/// The last complete lines of a file.
#[derive(Debug, Default)]
pub struct TailSnapshot {
    pub lines: Vec<LogLine>,
    /// Offset just past the last `\n`; where live tailing should resume.
    pub end_offset: u64,
}

/// Read the last `n` complete lines of `path`, scanning backward in blocks.
pub fn read_tail_lines(path: &Path, n: usize) -> Result<TailSnapshot> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open log file: {}", path.display()))?;
    let len = file.metadata()?.len();

    // buf holds the file bytes [pos, len).
    let mut buf: Vec<u8> = Vec::new();
    let mut pos = len;
    while pos > 0 && newline_count(&buf) <= n {
        let start = pos.saturating_sub(BLOCK_SIZE);
        let mut block = vec![0u8; (pos - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut block)
            .with_context(|| format!("Failed to read log file: {}", path.display()))?;
        block.extend_from_slice(&buf);
        buf = block;
        pos = start;
    }

    let Some(last_nl) = buf.iter().rposition(|&b| b == b'\n') else {
        return Ok(TailSnapshot {
            lines: Vec::new(),
            end_offset: pos,
        });
    };

    // When the scan stopped mid-file, the first segment is a partial line.
    let skip = if pos > 0 {
        buf.iter().position(|&b| b == b'\n').map_or(0, |i| i + 1)
    } else {
        0
    };

    let (mut lines, _) = split_complete_lines(&buf[skip..=last_nl], pos + skip as u64);
    if lines.len() > n {
        lines.drain(..lines.len() - n);
    }

    Ok(TailSnapshot {
        lines,
        end_offset: pos + last_nl as u64 + 1,
    })
}

fn newline_count(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| b == b'\n').count()
}
