//! Fixture catalog.
//!
//! Scans a fixture folder, groups files by basename and attaches each file to
//! the test of that name according to the role its extension selects.

use crate::error::ConfigError;
use crate::testcase::TestCaseBuilder;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// The part a fixture file plays for its test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileRole {
    Stdin,
    Stdout,
    Stderr,
    Arguments,
    ExitCode,
    InputGenerator,
    ReferenceSolver,
    Timeout,
    RunDirectory,
    InputFiles,
    OutputFiles,
    Environment,
    Description,
}

/// Number of fixture roles.
pub const ROLE_COUNT: usize = 13;

impl FileRole {
    /// Every role, in the order custom extension lists are given.
    pub const ALL: [FileRole; ROLE_COUNT] = [
        FileRole::Stdin,
        FileRole::Stdout,
        FileRole::Stderr,
        FileRole::Arguments,
        FileRole::ExitCode,
        FileRole::InputGenerator,
        FileRole::ReferenceSolver,
        FileRole::Timeout,
        FileRole::RunDirectory,
        FileRole::InputFiles,
        FileRole::OutputFiles,
        FileRole::Environment,
        FileRole::Description,
    ];

    pub fn default_extension(self) -> &'static str {
        match self {
            FileRole::Stdin => "in",
            FileRole::Stdout => "out",
            FileRole::Stderr => "err",
            FileRole::Arguments => "args",
            FileRole::ExitCode => "exit",
            FileRole::InputGenerator => "genin",
            FileRole::ReferenceSolver => "gen",
            FileRole::Timeout => "timeout",
            FileRole::RunDirectory => "rundir",
            FileRole::InputFiles => "infiles",
            FileRole::OutputFiles => "outfiles",
            FileRole::Environment => "envmap",
            FileRole::Description => "desc",
        }
    }

    /// Human-readable role name.
    pub fn label(self) -> &'static str {
        match self {
            FileRole::Stdin => "stdin",
            FileRole::Stdout => "stdout",
            FileRole::Stderr => "stderr",
            FileRole::Arguments => "arguments",
            FileRole::ExitCode => "exit code",
            FileRole::InputGenerator => "stdin generator",
            FileRole::ReferenceSolver => "reference solver",
            FileRole::Timeout => "timeout",
            FileRole::RunDirectory => "run directory",
            FileRole::InputFiles => "input files",
            FileRole::OutputFiles => "output files",
            FileRole::Environment => "environment",
            FileRole::Description => "description",
        }
    }
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Extension assigned to each role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extensions {
    by_role: [String; ROLE_COUNT],
}

impl Default for Extensions {
    fn default() -> Self {
        Self {
            by_role: FileRole::ALL.map(|role| role.default_extension().to_string()),
        }
    }
}

impl Extensions {
    /// Build from a custom list holding exactly one extension per role, in
    /// the order of [`FileRole::ALL`].
    pub fn from_list<S: AsRef<str>>(list: &[S]) -> Result<Self, ConfigError> {
        if list.len() != ROLE_COUNT {
            return Err(ConfigError::ExtensionArity {
                expected: ROLE_COUNT,
                got: list.len(),
                roles: FileRole::ALL
                    .iter()
                    .map(|role| role.label())
                    .collect::<Vec<_>>()
                    .join("/"),
            });
        }

        let mut by_role = FileRole::ALL.map(|_| String::new());
        for (role, ext) in FileRole::ALL.iter().zip(list) {
            let ext = ext.as_ref().trim();
            if ext.is_empty() {
                return Err(ConfigError::EmptyExtension(role.label()));
            }
            if by_role.iter().any(|taken| taken == ext) {
                return Err(ConfigError::AmbiguousExtension(ext.to_string()));
            }
            by_role[*role as usize] = ext.to_string();
        }

        Ok(Self { by_role })
    }

    pub fn get(&self, role: FileRole) -> &str {
        &self.by_role[role as usize]
    }

    /// The role a file extension selects, if any.
    pub fn role_of(&self, ext: &str) -> Option<FileRole> {
        FileRole::ALL
            .into_iter()
            .find(|role| self.by_role[*role as usize] == ext)
    }
}

/// Tests of one fixture folder, keyed (and therefore ordered) by name.
#[derive(Debug)]
pub struct Catalog {
    folder: PathBuf,
    tests: BTreeMap<String, TestCaseBuilder>,
}

impl Catalog {
    /// Scan a fixture folder.
    ///
    /// Files whose extension selects no role are ignored, as are directories
    /// and files without a basename.
    pub fn scan(folder: &Path, extensions: &Extensions) -> Result<Self, ConfigError> {
        let folder = normalize_path(folder).map_err(|source| ConfigError::ReadFolder {
            path: folder.to_path_buf(),
            source,
        })?;
        if !folder.is_dir() {
            return Err(ConfigError::NotADirectory(folder));
        }

        let read_error = |source| ConfigError::ReadFolder {
            path: folder.clone(),
            source,
        };
        let mut tests = BTreeMap::new();
        for entry in std::fs::read_dir(&folder).map_err(read_error)? {
            let path = entry.map_err(read_error)?.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some((name, ext)) = file_name.rsplit_once('.') else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            if let Some(role) = extensions.role_of(ext) {
                tests
                    .entry(name.to_string())
                    .or_insert_with(|| TestCaseBuilder::new(name))
                    .attach(role, path.clone());
            }
        }

        tracing::debug!(folder = %folder.display(), tests = tests.len(), "catalogued fixtures");
        Ok(Self { folder, tests })
    }

    /// Absolute, normalized path of the fixture folder.
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn get(&self, name: &str) -> Option<&TestCaseBuilder> {
        self.tests.get(name)
    }

    /// Tests in name order.
    pub fn tests(&self) -> impl Iterator<Item = &TestCaseBuilder> {
        self.tests.values()
    }
}

/// Make a path absolute against the current directory and resolve `.` and
/// `..` lexically, without touching symlinks.
pub fn normalize_path(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}
