//! Output verification.
//!
//! Compares captured streams and produced files against their references
//! byte by byte. Stream mismatches render escaped previews of both sides and
//! a context window around the first differing byte; file mismatches only
//! report the offset.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use thiserror::Error;

/// Maximum number of bytes of each stream shown in a mismatch report.
pub const PREVIEW_LIMIT: usize = 1000;

/// Bytes shown on each side of the first mismatch.
pub const CONTEXT_RADIUS: usize = 30;

const FILE_CHUNK: usize = 8 * 1024;

/// Index of the first byte where `actual` and `expected` differ, or `None`
/// if they are identical. When one is a prefix of the other the mismatch
/// lies at the length of the shorter one.
pub fn first_mismatch(actual: &[u8], expected: &[u8]) -> Option<usize> {
    actual
        .iter()
        .zip(expected)
        .position(|(a, e)| a != e)
        .or_else(|| (actual.len() != expected.len()).then(|| actual.len().min(expected.len())))
}

/// Escape control characters so that they show up in a report.
pub fn escape_invisibles(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + text.len() / 200);
    for c in text.chars() {
        push_escaped(&mut escaped, c);
    }
    escaped
}

fn push_escaped(out: &mut String, c: char) {
    match c {
        '\u{8}' => out.push_str("\\b"),
        '\u{c}' => out.push_str("\\f"),
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        c if u32::from(c) < 0x20 => out.push_str(&format!("\\0x{:02x}", u32::from(c))),
        c => out.push(c),
    }
}

/// Render raw bytes: valid UTF-8 is escaped, any other byte shows as `\0xHH`.
/// Cutting a buffer in the middle of a character is therefore harmless.
pub fn render(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(&escape_invisibles(chunk.valid()));
        for b in chunk.invalid() {
            out.push_str(&format!("\\0x{b:02x}"));
        }
    }
    out
}

fn preview(bytes: &[u8]) -> String {
    render(&bytes[..bytes.len().min(PREVIEW_LIMIT)])
}

/// Bytes around a position, with markers telling whether the window was cut
/// short (`...`) or reaches the edge of the buffer (`|`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextWindow {
    pub before: String,
    pub at: String,
    pub after: String,
    pub clipped_before: bool,
    pub clipped_after: bool,
}

impl ContextWindow {
    /// Window around `pos`, which must be inside `bytes`.
    pub fn around(bytes: &[u8], pos: usize) -> Self {
        let start = pos.saturating_sub(CONTEXT_RADIUS);
        let end = (pos + 1 + CONTEXT_RADIUS).min(bytes.len());
        Self {
            before: render(&bytes[start..pos]),
            at: render(&bytes[pos..pos + 1]),
            after: render(&bytes[pos + 1..end]),
            clipped_before: start > 0,
            clipped_after: end < bytes.len(),
        }
    }
}

impl fmt::Display for ContextWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = |clipped| if clipped { "..." } else { "|" };
        write!(
            f,
            "{} {} <> {} <> {} {}",
            marker(self.clipped_before),
            self.before,
            self.at,
            self.after,
            marker(self.clipped_after)
        )
    }
}

/// Where the first mismatch of a stream lies relative to the actual output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MismatchDetail {
    /// Nothing was written at all.
    EmptyResult,
    /// The output is a single wrong character.
    OnlyCharacter(String),
    /// The output is a strict prefix of the reference.
    PastEnd,
    /// Context of both sides around the mismatch.
    Context {
        actual: ContextWindow,
        expected: Option<ContextWindow>,
    },
}

/// A stream that did not match its reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMismatch {
    /// No reference exists, so the stream had to be empty.
    UnexpectedOutput {
        channel: &'static str,
        preview: String,
    },
    Differs {
        channel: &'static str,
        offset: usize,
        actual: String,
        expected: String,
        detail: MismatchDetail,
    },
}

impl StreamMismatch {
    /// Offset of the first differing byte, if a reference existed.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn offset(&self) -> Option<usize> {
        match self {
            StreamMismatch::UnexpectedOutput { .. } => None,
            StreamMismatch::Differs { offset, .. } => Some(*offset),
        }
    }
}

impl fmt::Display for StreamMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamMismatch::UnexpectedOutput { channel, preview } => {
                write!(f, "Result {channel} should be empty:\n{preview}")
            }
            StreamMismatch::Differs {
                channel,
                offset,
                actual,
                expected,
                detail,
            } => {
                let shown = if actual.is_empty() { "<empty>" } else { actual };
                writeln!(f, "Result {channel}:\n{shown}")?;
                write!(f, "Expected {channel}:\n{expected}")?;
                match detail {
                    MismatchDetail::EmptyResult => Ok(()),
                    MismatchDetail::OnlyCharacter(c) => {
                        write!(f, "\nMismatch in only character of result {channel}:\n| {c} |")
                    }
                    MismatchDetail::PastEnd => {
                        write!(f, "\nMismatch after end of result {channel} at {offset}")
                    }
                    MismatchDetail::Context {
                        actual,
                        expected: expected_window,
                    } => {
                        write!(f, "\nMismatch at {offset} of result {channel}:\n{actual}")?;
                        if let Some(window) = expected_window {
                            write!(f, "\nExpected at {offset}:\n{window}")?;
                        }
                        Ok(())
                    }
                }
            }
        }
    }
}

/// Compare a captured stream with its reference. Without a reference the
/// stream must be empty.
pub fn compare_stream(
    channel: &'static str,
    actual: &[u8],
    expected: Option<&[u8]>,
) -> Result<(), StreamMismatch> {
    let Some(expected) = expected else {
        if actual.is_empty() {
            return Ok(());
        }
        return Err(StreamMismatch::UnexpectedOutput {
            channel,
            preview: preview(actual),
        });
    };

    let Some(offset) = first_mismatch(actual, expected) else {
        return Ok(());
    };

    let detail = if actual.is_empty() {
        MismatchDetail::EmptyResult
    } else if offset == 0 && actual.len() == 1 {
        MismatchDetail::OnlyCharacter(render(actual))
    } else if offset >= actual.len() {
        MismatchDetail::PastEnd
    } else {
        MismatchDetail::Context {
            actual: ContextWindow::around(actual, offset),
            expected: (offset < expected.len()).then(|| ContextWindow::around(expected, offset)),
        }
    };

    Err(StreamMismatch::Differs {
        channel,
        offset,
        actual: preview(actual),
        expected: preview(expected),
        detail,
    })
}

/// An output file that did not match its reference.
#[derive(Debug, Error)]
pub enum FileMismatch {
    #[error("Missing user output file of name: \"{name}\" at: {}", path.display())]
    MissingUserFile { name: String, path: PathBuf },

    #[error("Missing reference output file of name: \"{name}\" at: {}", path.display())]
    MissingReferenceFile { name: String, path: PathBuf },

    #[error("Failed to read output file {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "Your output file with name \"{name}\" does not match reference, position of first wrong byte: {offset}"
    )]
    Differs { name: String, offset: u64 },
}

/// Compare a produced file with its reference without loading either into
/// memory at once.
pub fn compare_files(user: &Path, reference: &Path) -> Result<(), FileMismatch> {
    let name = user
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !user.is_file() {
        return Err(FileMismatch::MissingUserFile {
            name,
            path: user.to_path_buf(),
        });
    }
    if !reference.is_file() {
        return Err(FileMismatch::MissingReferenceFile {
            name,
            path: reference.to_path_buf(),
        });
    }

    match file_mismatch(user, reference) {
        Ok(None) => Ok(()),
        Ok(Some(offset)) => Err(FileMismatch::Differs { name, offset }),
        Err((path, source)) => Err(FileMismatch::Unreadable { path, source }),
    }
}

/// Offset of the first differing byte of two files.
fn file_mismatch(a: &Path, b: &Path) -> Result<Option<u64>, (PathBuf, io::Error)> {
    let open = |path: &Path| {
        File::open(path)
            .map(BufReader::new)
            .map_err(|e| (path.to_path_buf(), e))
    };
    let (mut reader_a, mut reader_b) = (open(a)?, open(b)?);
    let mut buf_a = vec![0u8; FILE_CHUNK];
    let mut buf_b = vec![0u8; FILE_CHUNK];
    let mut offset = 0u64;

    loop {
        let len_a = read_full(&mut reader_a, &mut buf_a).map_err(|e| (a.to_path_buf(), e))?;
        let len_b = read_full(&mut reader_b, &mut buf_b).map_err(|e| (b.to_path_buf(), e))?;
        if let Some(pos) = first_mismatch(&buf_a[..len_a], &buf_b[..len_b]) {
            return Ok(Some(offset + pos as u64));
        }
        if len_a == 0 {
            return Ok(None);
        }
        offset += len_a as u64;
    }
}

/// Fill `buf` as far as the reader allows; a short count means end of file.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Check a process's exit status. Without an expected code, zero is required.
pub fn check_exit_code(expected: Option<i32>, status: &ExitStatus) -> Result<(), String> {
    let expected_exit = expected.unwrap_or(0);
    match status.code() {
        Some(actual_exit) if actual_exit == expected_exit => Ok(()),
        Some(actual_exit) => Err(format!(
            "Exit code: expected {expected_exit}, got {actual_exit}"
        )),
        None => {
            // Killed by a signal
            #[cfg(unix)]
            let signal_info = {
                use std::os::unix::process::ExitStatusExt;
                status
                    .signal()
                    .map(|s| format!("signal {s}"))
                    .unwrap_or_else(|| "unknown cause".to_string())
            };
            #[cfg(not(unix))]
            let signal_info = "unknown cause".to_string();
            Err(format!(
                "Exit code: expected {expected_exit}, but process was terminated by {signal_info}"
            ))
        }
    }
}
