//! Error types for the harness.
//!
//! Configuration errors are fatal and stop the run before any test executes.
//! Setup and phase errors only end the test they belong to.

use crate::expand::FileListKind;
use crate::loader::LoadError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal problems with the invocation or the fixture folder as a whole.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("expected {expected} extensions ({roles}) but got a list of length {got}")]
    ExtensionArity {
        expected: usize,
        got: usize,
        roles: String,
    },

    #[error("extension {0:?} is assigned to more than one role")]
    AmbiguousExtension(String),

    #[error("empty extension for role '{0}'")]
    EmptyExtension(&'static str),

    #[error("non-directory path for the test folder: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("failed to read test folder {}: {source}", path.display())]
    ReadFolder {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("missing main command; pass it after `--` or set `main` in the config file")]
    MissingMainCommand,

    #[error("invalid default timeout {0}: expected -1 or a non-negative number of seconds")]
    InvalidTimeout(i64),

    #[error("invalid filter pattern: {0}")]
    Filter(#[from] regex::Error),

    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Problems preparing a single test. The test is skipped, the run continues.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("fixture {} is empty", .0.display())]
    EmptyFixture(PathBuf),

    #[error(
        "invalid timeout {value:?} in {}: expected -1 or a non-negative number of seconds",
        path.display()
    )]
    InvalidTimeout { path: PathBuf, value: String },

    #[error("invalid exit code {value:?} in {}", path.display())]
    InvalidExitCode { path: PathBuf, value: String },

    #[error("run directory {} does not exist or is not a directory", .0.display())]
    RunDirectory(PathBuf),

    #[error("empty environment key on line {line} of {}", path.display())]
    BlankEnvironmentKey { path: PathBuf, line: usize },

    #[error("environment key {key:?} on line {line} of {} has no value", path.display())]
    DanglingEnvironmentKey {
        path: PathBuf,
        key: String,
        line: usize,
    },

    #[error("placeholder {placeholder}: index {index} out of range for {len} {kind}")]
    IndexOutOfRange {
        placeholder: String,
        kind: FileListKind,
        index: usize,
        len: usize,
    },

    #[error("failed to copy input file {} to {}: {source}", from.display(), to.display())]
    CopyInput {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to move reference file {} to {}: {source}", from.display(), to.display())]
    MoveReference {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove stale output file {}: {source}", path.display())]
    RemoveStaleOutput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Problems starting or supervising a subprocess.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("empty command line")]
    EmptyCommand,

    #[error("failed to open {}: {source}", path.display())]
    Redirect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create capture file: {0}")]
    CaptureFile(#[source] io::Error),

    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to wait for `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read captured {channel}: {source}")]
    Capture {
        channel: &'static str,
        #[source]
        source: io::Error,
    },
}
