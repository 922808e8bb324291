//! Test case assembly and preparation.
//!
//! The catalog attaches fixture files to a [`TestCaseBuilder`]. Right before a
//! test runs, [`TestCaseBuilder::prepare`] reads and resolves every fixture
//! into an immutable [`TestCase`]: timeout, run directory, file lists,
//! environment, expected exit code and fully expanded command lines.

use crate::catalog::{FileRole, normalize_path};
use crate::error::SetupError;
use crate::expand::{Expander, FileListKind};
use crate::loader::{read_first_line, read_fixture, read_lines};
use crate::process::Timeout;
use crate::runner::EffectiveConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Fixture files found for one test name.
#[derive(Debug, Clone, Default)]
pub struct TestCaseBuilder {
    name: String,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    error: Option<PathBuf>,
    args: Option<PathBuf>,
    exit_code: Option<PathBuf>,
    generate: Option<PathBuf>,
    ref_solution: Option<PathBuf>,
    timeout: Option<PathBuf>,
    run_dir: Option<PathBuf>,
    input_files_list: Option<PathBuf>,
    output_files_list: Option<PathBuf>,
    env_map: Option<PathBuf>,
    description: Option<PathBuf>,
}

impl TestCaseBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a fixture file in the given role, replacing any earlier one.
    pub fn attach(&mut self, role: FileRole, path: PathBuf) {
        let slot = match role {
            FileRole::Stdin => &mut self.input,
            FileRole::Stdout => &mut self.output,
            FileRole::Stderr => &mut self.error,
            FileRole::Arguments => &mut self.args,
            FileRole::ExitCode => &mut self.exit_code,
            FileRole::InputGenerator => &mut self.generate,
            FileRole::ReferenceSolver => &mut self.ref_solution,
            FileRole::Timeout => &mut self.timeout,
            FileRole::RunDirectory => &mut self.run_dir,
            FileRole::InputFiles => &mut self.input_files_list,
            FileRole::OutputFiles => &mut self.output_files_list,
            FileRole::Environment => &mut self.env_map,
            FileRole::Description => &mut self.description,
        };
        *slot = Some(path);
    }

    /// The fixture attached in the given role.
    pub fn fixture(&self, role: FileRole) -> Option<&Path> {
        let slot = match role {
            FileRole::Stdin => &self.input,
            FileRole::Stdout => &self.output,
            FileRole::Stderr => &self.error,
            FileRole::Arguments => &self.args,
            FileRole::ExitCode => &self.exit_code,
            FileRole::InputGenerator => &self.generate,
            FileRole::ReferenceSolver => &self.ref_solution,
            FileRole::Timeout => &self.timeout,
            FileRole::RunDirectory => &self.run_dir,
            FileRole::InputFiles => &self.input_files_list,
            FileRole::OutputFiles => &self.output_files_list,
            FileRole::Environment => &self.env_map,
            FileRole::Description => &self.description,
        };
        slot.as_deref()
    }

    /// Roles that have a fixture attached, in role order.
    pub fn roles(&self) -> Vec<FileRole> {
        FileRole::ALL
            .into_iter()
            .filter(|role| self.fixture(*role).is_some())
            .collect()
    }

    /// Read the description fixture, if any.
    pub fn read_description(&self) -> Result<Option<String>, SetupError> {
        self.description.as_deref().map(read_fixture).transpose()
    }

    /// Resolve every fixture into a runnable test.
    pub fn prepare(&self, folder: &Path, config: &EffectiveConfig) -> Result<TestCase, SetupError> {
        let timeout = match &self.timeout {
            Some(path) => parse_timeout(path)?,
            None => config.default_timeout,
        };

        let (run_directory, custom_run_directory) = match &self.run_dir {
            Some(path) => {
                let line = read_first_line(path)?;
                let dir = normalize_path(Path::new(&line)).map_err(|source| SetupError::Read {
                    path: path.clone(),
                    source,
                })?;
                if !dir.is_dir() {
                    return Err(SetupError::RunDirectory(dir));
                }
                tracing::info!(test = %self.name, dir = %dir.display(), "running in directory");
                (dir, true)
            }
            None => {
                let cwd = normalize_path(Path::new(".")).map_err(|source| SetupError::Read {
                    path: PathBuf::from("."),
                    source,
                })?;
                (cwd, false)
            }
        };

        let input_files = match &self.input_files_list {
            Some(path) => resolve_file_list(path, folder, |line| !line.trim().is_empty())?,
            None => Vec::new(),
        };
        let output_files = match &self.output_files_list {
            Some(path) => resolve_file_list(path, &run_directory, |line| {
                !line.trim().is_empty() && !line.starts_with("//")
            })?,
            None => Vec::new(),
        };

        let expander = Expander::new(folder, &run_directory, &input_files, &output_files);

        let mut environment = config.env.clone();
        if let Some(path) = &self.env_map {
            let entries = parse_environment(path, &expander)?;
            for (key, value) in &entries {
                tracing::info!(test = %self.name, "environment: {key} = {value}");
            }
            environment.extend(entries);
        }

        let expected_exit = match &self.exit_code {
            Some(path) => {
                let value = read_first_line(path)?;
                Some(value.parse::<i32>().map_err(|_| SetupError::InvalidExitCode {
                    path: path.clone(),
                    value,
                })?)
            }
            None => None,
        };

        let mut main_tokens = config.main.clone();
        if let Some(path) = &self.args {
            main_tokens.extend(read_lines(path)?);
        }
        let main_references_input_files = main_tokens
            .iter()
            .any(|token| token.contains(FileListKind::Input.prefix()));
        let main_command = expander.expand_all(&main_tokens)?;

        let generated_path = |role: FileRole| {
            folder.join(format!("{}.{}", self.name, config.extensions.get(role)))
        };

        let input_generator = match &self.generate {
            Some(path) => Some(InputGenerator {
                command: expander.expand_all(&read_lines(path)?)?,
                target: generated_path(FileRole::Stdin),
            }),
            None => None,
        };
        let reference_solver = match &self.ref_solution {
            Some(path) => Some(ReferenceSolver {
                command: expander.expand_all(&read_lines(path)?)?,
                stdout: generated_path(FileRole::Stdout),
                stderr: generated_path(FileRole::Stderr),
            }),
            None => None,
        };

        let input = match &input_generator {
            Some(generator) => Some(generator.target.clone()),
            None => self.input.clone(),
        };
        let (expected_stdout, expected_stderr) = match &reference_solver {
            Some(solver) => (Some(solver.stdout.clone()), Some(solver.stderr.clone())),
            None => (self.output.clone(), self.error.clone()),
        };

        Ok(TestCase {
            name: self.name.clone(),
            folder: folder.to_path_buf(),
            input,
            expected_stdout,
            expected_stderr,
            expected_exit,
            main_command,
            main_references_input_files,
            input_generator,
            reference_solver,
            timeout,
            run_directory,
            custom_run_directory,
            input_files,
            output_files,
            environment,
        })
    }
}

fn parse_timeout(path: &Path) -> Result<Timeout, SetupError> {
    let value = read_fixture(path)?.trim().to_string();
    value
        .parse::<i64>()
        .ok()
        .and_then(Timeout::from_seconds)
        .ok_or_else(|| SetupError::InvalidTimeout {
            path: path.to_path_buf(),
            value,
        })
}

fn resolve_file_list(
    path: &Path,
    base: &Path,
    keep: impl Fn(&str) -> bool,
) -> Result<Vec<PathBuf>, SetupError> {
    read_lines(path)?
        .into_iter()
        .filter(|line| keep(line))
        .map(|line| {
            normalize_path(&base.join(&line)).map_err(|source| SetupError::Read {
                path: path.to_path_buf(),
                source,
            })
        })
        .collect()
}

/// Parse alternating key and value lines. Trailing blank lines are ignored;
/// a key without a value line is an error.
fn parse_environment(
    path: &Path,
    expander: &Expander,
) -> Result<Vec<(String, String)>, SetupError> {
    let mut lines = read_lines(path)?;
    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }

    let mut entries = Vec::with_capacity(lines.len() / 2);
    for (pair, chunk) in lines.chunks(2).enumerate() {
        let line = pair * 2 + 1;
        let key = &chunk[0];
        if key.trim().is_empty() {
            return Err(SetupError::BlankEnvironmentKey {
                path: path.to_path_buf(),
                line,
            });
        }
        let Some(value) = chunk.get(1) else {
            return Err(SetupError::DanglingEnvironmentKey {
                path: path.to_path_buf(),
                key: key.clone(),
                line,
            });
        };
        entries.push((key.clone(), expander.expand(value)?));
    }
    Ok(entries)
}

/// Command producing the test's stdin.
#[derive(Debug, Clone)]
pub struct InputGenerator {
    pub command: Vec<String>,
    /// Where the generated stdin is written.
    pub target: PathBuf,
}

/// Command producing the reference stdout, stderr and output files.
#[derive(Debug, Clone)]
pub struct ReferenceSolver {
    pub command: Vec<String>,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

/// A fully resolved test, ready for its phases to run.
#[derive(Debug, Clone)]
pub struct TestCase {
    name: String,
    folder: PathBuf,
    input: Option<PathBuf>,
    expected_stdout: Option<PathBuf>,
    expected_stderr: Option<PathBuf>,
    expected_exit: Option<i32>,
    main_command: Vec<String>,
    main_references_input_files: bool,
    input_generator: Option<InputGenerator>,
    reference_solver: Option<ReferenceSolver>,
    timeout: Timeout,
    run_directory: PathBuf,
    custom_run_directory: bool,
    input_files: Vec<PathBuf>,
    output_files: Vec<PathBuf>,
    environment: HashMap<String, String>,
}

impl TestCase {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File fed to stdin, if any. Points at the generator's target when the
    /// test generates its input.
    pub fn input(&self) -> Option<&Path> {
        self.input.as_deref()
    }

    pub fn expected_stdout(&self) -> Option<&Path> {
        self.expected_stdout.as_deref()
    }

    pub fn expected_stderr(&self) -> Option<&Path> {
        self.expected_stderr.as_deref()
    }

    pub fn expected_exit(&self) -> Option<i32> {
        self.expected_exit
    }

    /// Main executable, its fixed arguments and the test's arguments, expanded.
    pub fn main_command(&self) -> &[String] {
        &self.main_command
    }

    pub fn input_generator(&self) -> Option<&InputGenerator> {
        self.input_generator.as_ref()
    }

    pub fn reference_solver(&self) -> Option<&ReferenceSolver> {
        self.reference_solver.as_ref()
    }

    pub fn timeout(&self) -> Timeout {
        self.timeout
    }

    pub fn run_directory(&self) -> &Path {
        &self.run_directory
    }

    /// Whether a run-directory fixture chose the directory.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn has_custom_run_directory(&self) -> bool {
        self.custom_run_directory
    }

    pub fn input_files(&self) -> &[PathBuf] {
        &self.input_files
    }

    pub fn output_files(&self) -> &[PathBuf] {
        &self.output_files
    }

    pub fn environment(&self) -> &HashMap<String, String> {
        &self.environment
    }

    /// Whether input files are copied into the run directory. They are not
    /// when the main command line addresses them through placeholders.
    pub fn copies_input_files(&self) -> bool {
        !self.input_files.is_empty() && !self.main_references_input_files
    }

    /// Where the reference for a declared output file is kept:
    /// `<folder>/<test name>.<file name>`.
    pub fn reference_file(&self, output_file: &Path) -> PathBuf {
        let file_name = output_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.folder.join(format!("{}.{}", self.name, file_name))
    }
}
