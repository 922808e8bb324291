//! Test execution engine.
//!
//! Runs the tests of a fixture catalog one after another: prepare, generate
//! input, copy input files, generate the reference solution, run the program
//! under test and verify everything it produced.

use crate::catalog::{Catalog, Extensions, normalize_path};
use crate::compare::{check_exit_code, compare_files, compare_stream};
use crate::error::{ConfigError, SetupError};
use crate::process::{Outcome, PhaseSpec, RunningProcess, Timeout, run_with_timeout};
use crate::schema::HarnessConfig;
use crate::testcase::{TestCase, TestCaseBuilder};
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings shared by every test of a run, after merging the config file and
/// command-line flags.
#[derive(Debug, Clone, Default)]
pub struct EffectiveConfig {
    /// Executable of the program under test followed by its fixed arguments.
    pub main: Vec<String>,
    pub extensions: Extensions,
    /// Used by tests without a timeout fixture.
    pub default_timeout: Timeout,
    /// Applied to every phase; environment maps override it per test.
    pub env: HashMap<String, String>,
}

/// Values given on the command line. Each one that is set wins over the
/// config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub main: Vec<String>,
    pub timeout: Option<i64>,
    pub extensions: Option<Vec<String>>,
}

impl EffectiveConfig {
    /// Merge an optional config file with command-line overrides.
    pub fn resolve(file: Option<HarnessConfig>, overrides: Overrides) -> Result<Self, ConfigError> {
        let file = file.unwrap_or_default();

        let main = if overrides.main.is_empty() {
            file.main
        } else {
            overrides.main
        };

        let default_timeout = match overrides.timeout.or(file.timeout) {
            Some(seconds) => {
                Timeout::from_seconds(seconds).ok_or(ConfigError::InvalidTimeout(seconds))?
            }
            None => Timeout::default(),
        };

        let extensions = match overrides.extensions.or(file.extensions) {
            Some(list) => Extensions::from_list(&list)?,
            None => Extensions::default(),
        };

        Ok(Self {
            main,
            extensions,
            default_timeout,
            env: file.env,
        })
    }

    /// Fail unless a main command is configured.
    pub fn require_main(&self) -> Result<(), ConfigError> {
        if self.main.is_empty() {
            return Err(ConfigError::MissingMainCommand);
        }
        Ok(())
    }
}

/// Verdict of a single test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    /// The program under test exceeded its limit.
    TimedOut,
    /// Ended before the program under test ran: setup error, or a failed
    /// or timed out generation phase.
    Skipped,
}

/// Result of running a single test.
#[derive(Debug, serde::Serialize)]
pub struct TestResult {
    pub name: String,
    pub status: TestStatus,
    /// Time spent in the main phase.
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
    pub failures: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TestResult {
    pub fn passed(&self) -> bool {
        self.status == TestStatus::Passed
    }

    fn skipped(name: &str, description: Option<String>, failure: String) -> Self {
        Self {
            name: name.to_string(),
            status: TestStatus::Skipped,
            duration: Duration::ZERO,
            failures: vec![failure],
            description,
        }
    }
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Results of a whole run, in execution order.
#[derive(Debug, Default, serde::Serialize)]
pub struct SuiteResult {
    pub tests: Vec<TestResult>,
}

impl SuiteResult {
    pub fn correct(&self) -> usize {
        self.tests.iter().filter(|t| t.passed()).count()
    }

    pub fn total(&self) -> usize {
        self.tests.len()
    }

    pub fn all_passed(&self) -> bool {
        self.correct() == self.total()
    }

    /// Accumulated main-phase time.
    pub fn elapsed(&self) -> Duration {
        self.tests.iter().map(|t| t.duration).sum()
    }
}

/// Events reported while a suite runs.
#[derive(Debug)]
pub enum Progress<'a> {
    Started {
        name: &'a str,
        description: Option<&'a str>,
    },
    Finished(&'a TestResult),
}

/// Run every test of the catalog in name order. With a filter, only tests
/// whose name matches are run and counted.
pub fn run_suite(
    catalog: &Catalog,
    config: &EffectiveConfig,
    running: &RunningProcess,
    filter: Option<&Regex>,
    mut progress: impl FnMut(Progress<'_>),
) -> SuiteResult {
    let mut suite = SuiteResult::default();

    for builder in catalog.tests() {
        let name = builder.name();
        if filter.is_some_and(|re| !re.is_match(name)) {
            continue;
        }

        let result = match builder.read_description() {
            Ok(description) => {
                progress(Progress::Started {
                    name,
                    description: description.as_deref(),
                });
                run_test(builder, catalog.folder(), config, running, description)
            }
            Err(e) => {
                progress(Progress::Started {
                    name,
                    description: None,
                });
                TestResult::skipped(name, None, format!("Setup failed: {e}"))
            }
        };

        tracing::debug!(test = name, status = ?result.status, "test finished");
        progress(Progress::Finished(&result));
        suite.tests.push(result);
    }

    suite
}

fn run_test(
    builder: &TestCaseBuilder,
    folder: &Path,
    config: &EffectiveConfig,
    running: &RunningProcess,
    description: Option<String>,
) -> TestResult {
    let name = builder.name();
    let test = match builder.prepare(folder, config) {
        Ok(test) => test,
        Err(e) => return TestResult::skipped(name, description, format!("Setup failed: {e}")),
    };

    if let Some(spec) = PhaseSpec::input_generation(&test) {
        tracing::info!(test = name, "generating input");
        if let Err(failure) = run_generation_phase(&spec, &test, running) {
            return TestResult::skipped(name, description, failure);
        }
    }

    if test.copies_input_files()
        && let Err(e) = copy_input_files(&test)
    {
        return TestResult::skipped(name, description, format!("Setup failed: {e}"));
    }

    if let Some(spec) = PhaseSpec::reference_solution(&test) {
        tracing::info!(test = name, "generating reference solution");
        if let Err(failure) = run_generation_phase(&spec, &test, running) {
            return TestResult::skipped(name, description, failure);
        }
        if let Err(e) = move_reference_files(&test) {
            return TestResult::skipped(name, description, format!("Setup failed: {e}"));
        }
    }

    if let Err(e) = remove_stale_outputs(&test) {
        return TestResult::skipped(name, description, format!("Setup failed: {e}"));
    }

    let spec = PhaseSpec::main(&test);
    let output = match run_with_timeout(&spec, test.timeout(), running) {
        Ok(output) => output,
        Err(e) => {
            return TestResult {
                name: name.to_string(),
                status: TestStatus::Failed,
                duration: Duration::ZERO,
                failures: vec![format!("Main execution failed: {e}")],
                description,
            };
        }
    };

    let (status, failures) = match output.outcome {
        Outcome::Exited(exit_status) => {
            let failures = verify(&test, &exit_status, &output.stdout, &output.stderr);
            let status = if failures.is_empty() {
                TestStatus::Passed
            } else {
                TestStatus::Failed
            };
            (status, failures)
        }
        Outcome::TimedOut(limit) => (
            TestStatus::TimedOut,
            vec![format!("Main execution timed out after {}s", limit.as_secs())],
        ),
        Outcome::Interrupted => (
            TestStatus::Skipped,
            vec!["Main execution was interrupted".to_string()],
        ),
    };

    TestResult {
        name: name.to_string(),
        status,
        duration: output.elapsed,
        failures,
        description,
    }
}

/// Run the input generator or reference solver. Any outcome other than an
/// exit ends the test.
fn run_generation_phase(
    spec: &PhaseSpec,
    test: &TestCase,
    running: &RunningProcess,
) -> Result<(), String> {
    let phase = spec.phase;
    let output = run_with_timeout(spec, test.timeout(), running)
        .map_err(|e| format!("{} failed: {e}", capitalize(&phase.to_string())))?;
    match output.outcome {
        Outcome::Exited(status) => {
            if !status.success() {
                tracing::warn!(test = test.name(), %phase, %status, "phase exited unsuccessfully");
            }
            Ok(())
        }
        Outcome::TimedOut(limit) => Err(format!(
            "{} timed out after {}s, skipping",
            capitalize(&phase.to_string()),
            limit.as_secs()
        )),
        Outcome::Interrupted => Err(format!("{} was interrupted", capitalize(&phase.to_string()))),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Where a declared file lives in the run directory.
fn in_run_directory(test: &TestCase, file: &Path) -> PathBuf {
    match file.file_name() {
        Some(file_name) => test.run_directory().join(file_name),
        None => test.run_directory().to_path_buf(),
    }
}

/// Copy declared input files into the run directory. Files that do not
/// exist yet and files that already are in place are left alone.
fn copy_input_files(test: &TestCase) -> Result<(), SetupError> {
    for source in test.input_files() {
        if !source.is_file() {
            tracing::debug!(test = test.name(), file = %source.display(), "input file not present, not copying");
            continue;
        }
        let target = in_run_directory(test, source);
        if normalize_path(&target).is_ok_and(|t| t == *source) {
            continue;
        }
        tracing::info!(test = test.name(), file = %source.display(), "copying input file to run directory");
        std::fs::copy(source, &target).map_err(|e| SetupError::CopyInput {
            from: source.clone(),
            to: target.clone(),
            source: e,
        })?;
    }
    Ok(())
}

/// Move output files written by the reference solver out of the run
/// directory, so the program under test cannot see them.
fn move_reference_files(test: &TestCase) -> Result<(), SetupError> {
    for declared in test.output_files() {
        let produced = in_run_directory(test, declared);
        if !produced.is_file() {
            continue;
        }
        let target = test.reference_file(declared);
        tracing::info!(
            test = test.name(),
            from = %produced.display(),
            to = %target.display(),
            "moving reference file to test folder"
        );
        move_file(&produced, &target).map_err(|source| SetupError::MoveReference {
            from: produced.clone(),
            to: target.clone(),
            source,
        })?;
    }
    Ok(())
}

/// Delete declared output files left in the run directory by an earlier
/// run, so only what the program under test writes gets compared.
fn remove_stale_outputs(test: &TestCase) -> Result<(), SetupError> {
    for declared in test.output_files() {
        let stale = in_run_directory(test, declared);
        if !stale.is_file() {
            continue;
        }
        tracing::debug!(test = test.name(), file = %stale.display(), "removing stale output file");
        std::fs::remove_file(&stale).map_err(|source| SetupError::RemoveStaleOutput {
            path: stale.clone(),
            source,
        })?;
    }
    Ok(())
}

/// Rename, falling back to copy and remove across file systems.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to)?;
    std::fs::remove_file(from)
}

/// Check exit code, both streams and every declared output file. Returns one
/// message per mismatch.
fn verify(
    test: &TestCase,
    exit_status: &std::process::ExitStatus,
    stdout: &[u8],
    stderr: &[u8],
) -> Vec<String> {
    let mut failures = Vec::new();

    if let Err(e) = check_exit_code(test.expected_exit(), exit_status) {
        failures.push(e);
    }

    for (channel, actual, reference) in [
        ("stdout", stdout, test.expected_stdout()),
        ("stderr", stderr, test.expected_stderr()),
    ] {
        let expected = match reference.map(std::fs::read).transpose() {
            Ok(expected) => expected,
            Err(e) => {
                failures.push(format!("Failed to read expected {channel}: {e}"));
                continue;
            }
        };
        if let Err(mismatch) = compare_stream(channel, actual, expected.as_deref()) {
            failures.push(mismatch.to_string());
        }
    }

    for declared in test.output_files() {
        let user = in_run_directory(test, declared);
        if let Err(mismatch) = compare_files(&user, &test.reference_file(declared)) {
            failures.push(mismatch.to_string());
        }
    }

    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{TempDir, tempdir};

    const SQUARE: &str = "read n; echo $((n * n))";

    fn shell_config(script: &str) -> EffectiveConfig {
        EffectiveConfig {
            main: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            ..EffectiveConfig::default()
        }
    }

    fn write(dir: &TempDir, name: &str, contents: &str) {
        std::fs::write(dir.path().join(name), contents).unwrap();
    }

    fn run(dir: &TempDir, config: &EffectiveConfig) -> SuiteResult {
        let catalog = Catalog::scan(dir.path(), &config.extensions).unwrap();
        run_suite(&catalog, config, &RunningProcess::new(), None, |_| {})
    }

    fn only(suite: &SuiteResult) -> &TestResult {
        assert_eq!(suite.total(), 1);
        &suite.tests[0]
    }

    // ==================== Configuration ====================

    #[test]
    fn resolve_defaults() {
        let config = EffectiveConfig::resolve(None, Overrides::default()).unwrap();
        assert!(config.main.is_empty());
        assert_eq!(config.default_timeout, Timeout::default());
        assert_eq!(config.extensions, Extensions::default());
        assert!(matches!(
            config.require_main(),
            Err(ConfigError::MissingMainCommand)
        ));
    }

    #[test]
    fn command_line_wins_over_file() {
        let file = HarnessConfig {
            main: vec!["./from-file".to_string()],
            timeout: Some(3),
            extensions: None,
            env: HashMap::from([("LANG".to_string(), "C".to_string())]),
        };
        let overrides = Overrides {
            main: vec!["./from-cli".to_string()],
            timeout: Some(-1),
            extensions: None,
        };

        let config = EffectiveConfig::resolve(Some(file), overrides).unwrap();
        assert_eq!(config.main, vec!["./from-cli"]);
        assert_eq!(config.default_timeout, Timeout::Unbounded);
        assert_eq!(config.env.get("LANG"), Some(&"C".to_string()));
        assert!(config.require_main().is_ok());
    }

    #[test]
    fn file_values_apply_without_overrides() {
        let file = HarnessConfig {
            main: vec!["./prog".to_string()],
            timeout: Some(3),
            ..HarnessConfig::default()
        };
        let config = EffectiveConfig::resolve(Some(file), Overrides::default()).unwrap();
        assert_eq!(config.main, vec!["./prog"]);
        assert_eq!(
            config.default_timeout,
            Timeout::Limited(Duration::from_secs(3))
        );
    }

    #[test]
    fn invalid_default_timeout() {
        let overrides = Overrides {
            timeout: Some(-4),
            ..Overrides::default()
        };
        assert!(matches!(
            EffectiveConfig::resolve(None, overrides),
            Err(ConfigError::InvalidTimeout(-4))
        ));
    }

    #[test]
    fn extension_list_arity_is_checked() {
        let overrides = Overrides {
            extensions: Some(vec!["in".to_string(), "out".to_string()]),
            ..Overrides::default()
        };
        assert!(matches!(
            EffectiveConfig::resolve(None, overrides),
            Err(ConfigError::ExtensionArity { got: 2, .. })
        ));
    }

    // ==================== Streams and exit codes ====================

    #[test]
    fn square_passes() {
        let dir = tempdir().unwrap();
        write(&dir, "t1.in", "5\n");
        write(&dir, "t1.out", "25\n");

        let suite = run(&dir, &shell_config(SQUARE));
        let result = only(&suite);
        assert!(result.passed(), "failures: {:?}", result.failures);
        assert_eq!(suite.correct(), 1);
        assert!(suite.all_passed());
    }

    #[test]
    fn stdout_mismatch_reports_offset() {
        let dir = tempdir().unwrap();
        write(&dir, "t1.in", "5\n");
        write(&dir, "t1.out", "24\n");

        let suite = run(&dir, &shell_config(SQUARE));
        let result = only(&suite);
        assert_eq!(result.status, TestStatus::Failed);
        assert_eq!(result.failures.len(), 1);
        assert!(result.failures[0].contains("Mismatch at 1 of result stdout"));
        assert!(result.failures[0].contains("| 2 <> 5 <> \\n |"));
        assert!(result.failures[0].contains("| 2 <> 4 <> \\n |"));
        assert_eq!(suite.correct(), 0);
    }

    #[test]
    fn unexpected_stderr_fails() {
        let dir = tempdir().unwrap();
        write(&dir, "t.in", "");

        let suite = run(&dir, &shell_config("echo oops >&2"));
        let result = only(&suite);
        assert_eq!(result.status, TestStatus::Failed);
        assert!(result.failures[0].starts_with("Result stderr should be empty"));
    }

    #[test]
    fn expected_exit_code() {
        let dir = tempdir().unwrap();
        write(&dir, "three.exit", "3\n");
        write(&dir, "zero.exit", "0\n");

        let suite = run(&dir, &shell_config("exit 3"));
        let results: HashMap<_, _> = suite.tests.iter().map(|t| (t.name.as_str(), t)).collect();
        assert!(results["three"].passed());
        assert_eq!(results["zero"].failures, vec!["Exit code: expected 0, got 3"]);
    }

    #[test]
    fn nonzero_exit_without_fixture_fails() {
        let dir = tempdir().unwrap();
        write(&dir, "t.in", "");

        let suite = run(&dir, &shell_config("exit 1"));
        assert_eq!(only(&suite).failures, vec!["Exit code: expected 0, got 1"]);
    }

    // ==================== Timeouts and setup errors ====================

    #[test]
    fn main_timeout_skips_verification() {
        let dir = tempdir().unwrap();
        write(&dir, "t.timeout", "1\n");
        write(&dir, "t.out", "never\n");

        let suite = run(&dir, &shell_config("sleep 5"));
        let result = only(&suite);
        assert_eq!(result.status, TestStatus::TimedOut);
        assert_eq!(result.failures, vec!["Main execution timed out after 1s"]);
        assert!(result.duration >= Duration::from_secs(1));
        assert!(result.duration < Duration::from_secs(4));
        assert!(suite.elapsed() >= Duration::from_secs(1));
    }

    #[test]
    fn unbounded_timeout_lets_program_finish() {
        let dir = tempdir().unwrap();
        write(&dir, "t.timeout", "-1\n");
        write(&dir, "t.out", "done\n");

        let suite = run(&dir, &shell_config("sleep 1.2; echo done"));
        assert!(only(&suite).passed());
    }

    #[test]
    fn setup_error_skips_test_and_run_continues() {
        let dir = tempdir().unwrap();
        write(&dir, "a.envmap", " \nvalue\n");
        write(&dir, "b.in", "3\n");
        write(&dir, "b.out", "9\n");

        let suite = run(&dir, &shell_config(SQUARE));
        assert_eq!(suite.total(), 2);
        assert_eq!(suite.tests[0].status, TestStatus::Skipped);
        assert!(suite.tests[0].failures[0].starts_with("Setup failed: empty environment key"));
        assert!(suite.tests[1].passed());
        assert_eq!(suite.correct(), 1);
    }

    #[test]
    fn generator_timeout_skips_test() {
        let dir = tempdir().unwrap();
        write(&dir, "t.genin", "sleep\n5\n");
        write(&dir, "t.timeout", "1\n");

        let suite = run(&dir, &shell_config("true"));
        let result = only(&suite);
        assert_eq!(result.status, TestStatus::Skipped);
        assert_eq!(
            result.failures,
            vec!["Input generation timed out after 1s, skipping"]
        );
        assert_eq!(result.duration, Duration::ZERO);
    }

    #[test]
    fn environment_reaches_the_program() {
        let dir = tempdir().unwrap();
        write(&dir, "t.envmap", "GREETING\nhello\n");
        write(&dir, "t.out", "hello\n");

        let suite = run(&dir, &shell_config("echo $GREETING"));
        assert!(only(&suite).passed(), "{:?}", only(&suite).failures);
    }

    // ==================== Generation phases ====================

    #[test]
    fn generated_input_and_reference() {
        let dir = tempdir().unwrap();
        write(&dir, "t.genin", "echo\n7\n");
        write(&dir, "t.gen", format!("sh\n-c\n{SQUARE}\n").as_str());

        let suite = run(&dir, &shell_config(SQUARE));
        let result = only(&suite);
        assert!(result.passed(), "failures: {:?}", result.failures);
        assert_eq!(std::fs::read_to_string(dir.path().join("t.in")).unwrap(), "7\n");
        assert_eq!(std::fs::read_to_string(dir.path().join("t.out")).unwrap(), "49\n");
        assert_eq!(std::fs::read_to_string(dir.path().join("t.err")).unwrap(), "");
    }

    #[test]
    fn reference_output_files_are_moved_and_compared() {
        let dir = tempdir().unwrap();
        let run_dir = tempdir().unwrap();
        write(&dir, "t.rundir", &format!("{}\n", run_dir.path().display()));
        write(&dir, "t.outfiles", "// written by the program\nresult.dat\n");
        write(&dir, "t.gen", "sh\n-c\necho 42 > result.dat\n");

        let suite = run(&dir, &shell_config("echo 42 > result.dat"));
        let result = only(&suite);
        assert!(result.passed(), "failures: {:?}", result.failures);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("t.result.dat")).unwrap(),
            "42\n"
        );
    }

    #[test]
    fn differing_output_file() {
        let dir = tempdir().unwrap();
        let run_dir = tempdir().unwrap();
        write(&dir, "t.rundir", &format!("{}\n", run_dir.path().display()));
        write(&dir, "t.outfiles", "result.dat\n");
        write(&dir, "t.gen", "sh\n-c\necho 42 > result.dat\n");

        let suite = run(&dir, &shell_config("echo 41 > result.dat"));
        let result = only(&suite);
        assert_eq!(
            result.failures,
            vec![
                "Your output file with name \"result.dat\" does not match reference, \
                 position of first wrong byte: 1"
            ]
        );
    }

    #[test]
    fn missing_user_output_file() {
        let dir = tempdir().unwrap();
        let run_dir = tempdir().unwrap();
        write(&dir, "t1.rundir", &format!("{}\n", run_dir.path().display()));
        write(&dir, "t1.outfiles", "result.dat\n");

        let suite = run(&dir, &shell_config("true"));
        let result = only(&suite);
        assert_eq!(result.status, TestStatus::Failed);
        assert_eq!(result.failures.len(), 1);
        assert!(
            result.failures[0].starts_with("Missing user output file of name: \"result.dat\"")
        );
    }

    #[test]
    fn stale_output_file_does_not_count() {
        let dir = tempdir().unwrap();
        let run_dir = tempdir().unwrap();
        std::fs::write(run_dir.path().join("result.dat"), "42\n").unwrap();
        write(&dir, "t.rundir", &format!("{}\n", run_dir.path().display()));
        write(&dir, "t.outfiles", "result.dat\n");
        write(&dir, "t.result.dat", "42\n");

        let suite = run(&dir, &shell_config("true"));
        let result = only(&suite);
        assert_eq!(result.status, TestStatus::Failed);
        assert!(
            result.failures[0].starts_with("Missing user output file of name: \"result.dat\"")
        );
        assert!(!run_dir.path().join("result.dat").exists());
    }

    #[test]
    fn run_directory_is_the_fixture_folder() {
        let dir = tempdir().unwrap();
        write(&dir, "t.rundir", &format!("{}\n", dir.path().display()));
        write(&dir, "t.infiles", "data.txt\n");
        write(&dir, "data.txt", "hello\n");
        write(&dir, "t.out", "hello\n");

        let suite = run(&dir, &shell_config("cat data.txt"));
        assert!(only(&suite).passed(), "{:?}", only(&suite).failures);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("data.txt")).unwrap(),
            "hello\n"
        );
    }

    #[test]
    fn input_files_are_copied_to_run_directory() {
        let dir = tempdir().unwrap();
        let run_dir = tempdir().unwrap();
        write(&dir, "t.rundir", &format!("{}\n", run_dir.path().display()));
        write(&dir, "t.infiles", "data.txt\n\nlater.txt\n");
        write(&dir, "data.txt", "hello\n");
        write(&dir, "t.out", "hello\n");

        let suite = run(&dir, &shell_config("cat data.txt"));
        assert!(only(&suite).passed(), "{:?}", only(&suite).failures);
        assert!(run_dir.path().join("data.txt").is_file());
        assert!(!run_dir.path().join("later.txt").exists());
    }

    #[test]
    fn input_placeholders_prevent_copying() {
        let dir = tempdir().unwrap();
        let run_dir = tempdir().unwrap();
        write(&dir, "t.rundir", &format!("{}\n", run_dir.path().display()));
        write(&dir, "t.infiles", "data.txt\n");
        write(&dir, "t.args", "$$INPUT_FILES_0$$\n");
        write(&dir, "data.txt", "hello\n");
        write(&dir, "t.out", "hello\n");

        // `sh -c script arg0` binds the placeholder to $0.
        let suite = run(&dir, &shell_config("cat \"$0\""));
        assert!(only(&suite).passed(), "{:?}", only(&suite).failures);
        assert!(!run_dir.path().join("data.txt").exists());
    }

    // ==================== Suite behavior ====================

    #[test]
    fn tests_run_in_name_order_and_report_progress() {
        let dir = tempdir().unwrap();
        write(&dir, "b.in", "2\n");
        write(&dir, "b.out", "4\n");
        write(&dir, "a.in", "3\n");
        write(&dir, "a.out", "9\n");
        write(&dir, "a.desc", "three squared\n");

        let config = shell_config(SQUARE);
        let catalog = Catalog::scan(dir.path(), &config.extensions).unwrap();
        let mut events = Vec::new();
        let suite = run_suite(&catalog, &config, &RunningProcess::new(), None, |event| {
            events.push(match event {
                Progress::Started { name, description } => {
                    format!("start {name} {}", description.unwrap_or("-").trim())
                }
                Progress::Finished(result) => format!("end {} {:?}", result.name, result.status),
            })
        });

        assert_eq!(
            events,
            vec![
                "start a three squared",
                "end a Passed",
                "start b -",
                "end b Passed",
            ]
        );
        assert_eq!(
            suite.tests[0].description.as_deref(),
            Some("three squared\n")
        );
    }

    #[test]
    fn filter_selects_tests() {
        let dir = tempdir().unwrap();
        write(&dir, "alpha.in", "2\n");
        write(&dir, "alpha.out", "4\n");
        write(&dir, "beta.in", "3\n");
        write(&dir, "beta.out", "wrong\n");

        let config = shell_config(SQUARE);
        let catalog = Catalog::scan(dir.path(), &config.extensions).unwrap();
        let filter = Regex::new("^al").unwrap();
        let suite = run_suite(
            &catalog,
            &config,
            &RunningProcess::new(),
            Some(&filter),
            |_| {},
        );

        assert_eq!(suite.total(), 1);
        assert!(suite.all_passed());
    }

    #[test]
    fn result_serializes_to_json() {
        let result = TestResult {
            name: "t1".to_string(),
            status: TestStatus::TimedOut,
            duration: Duration::from_millis(1500),
            failures: vec!["slow".to_string()],
            description: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "timed_out");
        assert_eq!(json["duration"], 1.5);
        assert!(json.get("description").is_none());
    }
}
