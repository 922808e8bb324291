//! Placeholder expansion in command lines and environment values.
//!
//! Supported placeholders:
//!
//! - `$$TEST_FOLDER$$`: absolute path of the fixture folder
//! - `$$RUN_DIRECTORY$$`: the test's run directory
//! - `$$INPUT_FILES_n$$` / `$$OUTPUT_FILES_n$$`: the `n`-th declared file
//! - `$$INPUT_FILES_d$$` / `$$OUTPUT_FILES_d$$`: every declared file, joined by `d`

use crate::error::SetupError;
use std::fmt;
use std::path::{Path, PathBuf};

const TEST_FOLDER: &str = "$$TEST_FOLDER$$";
const RUN_DIRECTORY: &str = "$$RUN_DIRECTORY$$";
const PLACEHOLDER_END: &str = "$$";

/// Join delimiters longer than this are most likely a typo in an index.
const SUSPICIOUS_DELIMITER_LEN: usize = 5;

/// Which declared file list a placeholder refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileListKind {
    Input,
    Output,
}

impl FileListKind {
    /// Opening text of placeholders of this kind.
    pub fn prefix(self) -> &'static str {
        match self {
            FileListKind::Input => "$$INPUT_FILES_",
            FileListKind::Output => "$$OUTPUT_FILES_",
        }
    }
}

impl fmt::Display for FileListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileListKind::Input => f.write_str("input files"),
            FileListKind::Output => f.write_str("output files"),
        }
    }
}

/// Resolves placeholders for one test.
#[derive(Debug, Clone)]
pub struct Expander {
    test_folder: String,
    run_directory: String,
    input_files: Vec<String>,
    output_files: Vec<String>,
}

impl Expander {
    pub fn new(
        test_folder: &Path,
        run_directory: &Path,
        input_files: &[PathBuf],
        output_files: &[PathBuf],
    ) -> Self {
        let to_strings =
            |files: &[PathBuf]| files.iter().map(|f| f.display().to_string()).collect();
        Self {
            test_folder: test_folder.display().to_string(),
            run_directory: run_directory.display().to_string(),
            input_files: to_strings(input_files),
            output_files: to_strings(output_files),
        }
    }

    fn files(&self, kind: FileListKind) -> &[String] {
        match kind {
            FileListKind::Input => &self.input_files,
            FileListKind::Output => &self.output_files,
        }
    }

    /// Expand every token of a command line.
    pub fn expand_all(&self, tokens: &[String]) -> Result<Vec<String>, SetupError> {
        tokens.iter().map(|token| self.expand(token)).collect()
    }

    /// Expand a single string.
    pub fn expand(&self, s: &str) -> Result<String, SetupError> {
        let mut out = s
            .replace(TEST_FOLDER, &self.test_folder)
            .replace(RUN_DIRECTORY, &self.run_directory);

        if self.input_files.is_empty() && self.output_files.is_empty() {
            log_expansion(s, &out);
            return Ok(out);
        }

        let mut index = 0;
        while let Some((start, kind)) = self.next_placeholder(&out, index) {
            let selector_start = start + kind.prefix().len();
            let Some(selector_len) = out[selector_start..].find(PLACEHOLDER_END) else {
                break;
            };
            let end = selector_start + selector_len + PLACEHOLDER_END.len();
            let selector = &out[selector_start..selector_start + selector_len];
            let files = self.files(kind);

            let replacement = match selector.parse::<usize>() {
                Ok(i) => files
                    .get(i)
                    .cloned()
                    .ok_or_else(|| SetupError::IndexOutOfRange {
                        placeholder: out[start..end].to_string(),
                        kind,
                        index: i,
                        len: files.len(),
                    })?,
                Err(_) => {
                    if selector.chars().count() > SUSPICIOUS_DELIMITER_LEN {
                        tracing::warn!(
                            placeholder = &out[start..end],
                            "probably wrong delimiter for file list"
                        );
                    }
                    files.join(selector)
                }
            };

            out.replace_range(start..end, &replacement);
            index = start + replacement.len();
        }

        log_expansion(s, &out);
        Ok(out)
    }

    /// Earliest file-list placeholder at or after `from`. Kinds whose list is
    /// empty are not searched.
    fn next_placeholder(&self, s: &str, from: usize) -> Option<(usize, FileListKind)> {
        let find = |kind: FileListKind| {
            if self.files(kind).is_empty() {
                None
            } else {
                s[from..].find(kind.prefix()).map(|pos| (from + pos, kind))
            }
        };

        match (find(FileListKind::Input), find(FileListKind::Output)) {
            (Some(input), Some(output)) if output.0 < input.0 => Some(output),
            (Some(input), _) => Some(input),
            (None, output) => output,
        }
    }
}

fn log_expansion(before: &str, after: &str) {
    if before != after {
        tracing::debug!(before, after, "expanded placeholders");
    }
}
