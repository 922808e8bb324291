mod catalog;
mod compare;
mod error;
mod expand;
mod loader;
mod logging;
mod process;
mod runner;
mod schema;
mod testcase;

use crate::catalog::Catalog;
use crate::error::ConfigError;
use crate::process::RunningProcess;
use crate::runner::{EffectiveConfig, Overrides, Progress, SuiteResult, TestResult, TestStatus};
use clap::{Args, Parser, Subcommand, ValueEnum};
use regex::Regex;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable report, streamed test by test
    #[default]
    Human,
    /// Machine-readable JSON output
    Json,
    /// JUnit XML output for CI systems
    Junit,
}

#[derive(Parser)]
#[command(name = "iotest")]
#[command(about = "A fixture-folder test harness for executables")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Options shared by every command that reads a fixture folder.
#[derive(Args)]
struct HarnessArgs {
    /// Folder holding the fixture files
    path: PathBuf,
    /// Default timeout in seconds for tests without a timeout fixture (-1 waits forever)
    #[arg(short, long, allow_negative_numbers = true)]
    timeout: Option<i64>,
    /// Custom fixture extensions, one per role, comma-separated: stdin, stdout,
    /// stderr, arguments, exit code, stdin generator, reference solver, timeout,
    /// run directory, input files, output files, environment, description
    #[arg(short, long, value_delimiter = ',')]
    extensions: Option<Vec<String>>,
    /// Config file (defaults to iotest.yaml, iotest.yml or iotest.toml in the folder)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Program under test and its fixed arguments
    #[arg(last = true)]
    main: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Run every test of a fixture folder
    Run {
        #[command(flatten)]
        harness: HarnessArgs,
        /// Output format
        #[arg(short, long, default_value = "human")]
        output: OutputFormat,
        /// Only run tests whose name matches this regular expression
        #[arg(short, long)]
        filter: Option<String>,
        /// Show debug logging (placeholder expansion, phase commands)
        #[arg(short, long)]
        verbose: bool,
    },
    /// Check that every test of a fixture folder can be prepared, without running anything
    Validate {
        #[command(flatten)]
        harness: HarnessArgs,
    },
    /// Scaffold an example fixture folder
    Init {
        /// Folder to create the example in
        #[arg(default_value = "fixtures")]
        path: PathBuf,
    },
    /// Output the config file schema
    Schema,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            harness,
            output,
            filter,
            verbose,
        } => {
            logging::init(verbose);
            match run(&harness, output, filter.as_deref()) {
                Ok(true) => {}
                Ok(false) => std::process::exit(1),
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(2);
                }
            }
        }
        Command::Validate { harness } => {
            logging::init(false);
            match validate(&harness) {
                Ok(true) => {}
                Ok(false) => std::process::exit(1),
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(2);
                }
            }
        }
        Command::Init { path } => {
            if let Err(e) = init(&path) {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
        Command::Schema => {
            let schema = schema::generate_schema();
            print_json(&schema);
        }
    }
}

/// Merge the config file, if any, with the command-line flags.
fn effective_config(harness: &HarnessArgs) -> Result<EffectiveConfig, ConfigError> {
    let file = match &harness.config {
        Some(path) => Some(loader::load_config(path)?),
        None => loader::load_folder_config(&harness.path)?,
    };
    EffectiveConfig::resolve(
        file,
        Overrides {
            main: harness.main.clone(),
            timeout: harness.timeout,
            extensions: harness.extensions.clone(),
        },
    )
}

/// Run the suite and print the report. Returns whether every test passed.
fn run(
    harness: &HarnessArgs,
    output: OutputFormat,
    filter: Option<&str>,
) -> Result<bool, ConfigError> {
    let config = effective_config(harness)?;
    config.require_main()?;
    let filter = filter.map(Regex::new).transpose()?;
    let catalog = Catalog::scan(&harness.path, &config.extensions)?;
    tracing::debug!(main = ?config.main, timeout = %config.default_timeout, "configuration resolved");

    let running = RunningProcess::new();
    process::spawn_interrupt_listener(running.clone());

    let timestamp = chrono::Local::now();
    let suite = runner::run_suite(&catalog, &config, &running, filter.as_ref(), |event| {
        if output == OutputFormat::Human {
            print_progress(&event);
        }
    });

    match output {
        OutputFormat::Human => print_summary(&suite),
        OutputFormat::Json => {
            let report = serde_json::json!({
                "folder": catalog.folder().display().to_string(),
                "timestamp": timestamp.to_rfc3339(),
                "passed": suite.correct(),
                "failed": suite.total() - suite.correct(),
                "correct": suite.correct(),
                "total": suite.total(),
                "elapsed": suite.elapsed().as_secs_f64(),
                "tests": suite.tests,
            });
            print_json(&report);
        }
        OutputFormat::Junit => {
            print!(
                "{}",
                format_junit_xml(catalog.folder(), &suite, &timestamp.to_rfc3339())
            );
        }
    }

    Ok(suite.all_passed())
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error: failed to serialize output: {e}");
            std::process::exit(2);
        }
    }
}

fn print_progress(event: &Progress<'_>) {
    match event {
        Progress::Started { name, description } => {
            println!("===== TEST {name} =====");
            if let Some(description) = description {
                println!("{}", description.trim_end());
            }
        }
        Progress::Finished(result) => {
            for failure in &result.failures {
                println!("{failure}\n");
            }
            println!(
                "{}\ttime: \t{:.2}ms\n\n",
                verdict(result),
                millis(result.duration)
            );
        }
    }
}

fn verdict(result: &TestResult) -> &'static str {
    match result.status {
        TestStatus::Passed => "OK      ",
        TestStatus::Failed => "ERROR   ",
        TestStatus::TimedOut => "TIMEOUT ",
        TestStatus::Skipped => "SKIPPED ",
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

fn print_summary(suite: &SuiteResult) {
    println!(
        "CORRECT: {}/{}\n\t\ttime: \t{:.2}ms",
        suite.correct(),
        suite.total(),
        millis(suite.elapsed())
    );
    if suite.all_passed() {
        println!();
        println!("=====>>>>>     YOU ARE     <<<<<=====");
        println!("=====>>>>>     AWESOME     <<<<<=====");
        println!("=====>>>>>    WELL DONE    <<<<<=====");
        println!();
    }
}

/// Prepare every test without running it. Returns whether all of them could
/// be prepared.
fn validate(harness: &HarnessArgs) -> Result<bool, ConfigError> {
    let config = effective_config(harness)?;
    let catalog = Catalog::scan(&harness.path, &config.extensions)?;

    let mut errors = 0;
    for builder in catalog.tests() {
        match builder.prepare(catalog.folder(), &config) {
            Ok(_) => {
                let roles: Vec<_> = builder.roles().iter().map(|r| r.label()).collect();
                println!("✓ {} ({})", builder.name(), roles.join(", "));
            }
            Err(e) => {
                eprintln!("✗ {}: {e}", builder.name());
                errors += 1;
            }
        }
    }

    if errors > 0 {
        eprintln!("\n{errors} test(s) failed validation");
        return Ok(false);
    }
    println!("\nAll {} test(s) valid", catalog.len());
    Ok(true)
}

const EXAMPLE_CONFIG: &str = r#"# Program under test and its fixed arguments.
# Arguments after `--` on the command line replace this list.
main: ["sh", "-c", "read n; echo $((n * n))"]

# Default timeout in seconds for every test, -1 waits forever.
# A <name>.timeout fixture overrides it per test.
timeout: 10

# Environment variables for every phase of every test.
# env:
#   LANG: C
"#;

/// Write an example fixture folder. Nothing is written if any of the files
/// already exists.
fn init(folder: &Path) -> Result<(), String> {
    let files = [
        ("example.in", "5\n"),
        ("example.out", "25\n"),
        ("example.desc", "Squares the number read from stdin.\n"),
        ("iotest.yaml", EXAMPLE_CONFIG),
    ];

    if let Some((name, _)) = files.iter().find(|(name, _)| folder.join(name).exists()) {
        return Err(format!(
            "file already exists: {}",
            folder.join(name).display()
        ));
    }
    fs::create_dir_all(folder).map_err(|e| format!("failed to create directory: {e}"))?;
    for (name, contents) in files {
        let path = folder.join(name);
        fs::write(&path, contents)
            .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
        println!("Created: {}", path.display());
    }
    Ok(())
}

/// Format suite results as JUnit XML.
fn format_junit_xml(folder: &Path, suite: &SuiteResult, timestamp: &str) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");

    let tests = suite.total();
    let skipped = suite
        .tests
        .iter()
        .filter(|t| t.status == TestStatus::Skipped)
        .count();
    let failures = tests - suite.correct() - skipped;
    let time = suite.elapsed().as_secs_f64();

    let _ = writeln!(
        xml,
        "<testsuites tests=\"{tests}\" failures=\"{failures}\" skipped=\"{skipped}\" time=\"{time:.3}\">"
    );
    let _ = writeln!(
        xml,
        "  <testsuite name=\"{}\" tests=\"{tests}\" failures=\"{failures}\" skipped=\"{skipped}\" time=\"{time:.3}\" timestamp=\"{}\">",
        escape_xml(&folder.display().to_string()),
        escape_xml(timestamp)
    );

    for test in &suite.tests {
        let _ = writeln!(
            xml,
            "    <testcase name=\"{}\" time=\"{:.3}\">",
            escape_xml(&test.name),
            test.duration.as_secs_f64()
        );

        let message = test
            .failures
            .first()
            .map(|s| s.as_str())
            .unwrap_or("Test failed");
        match test.status {
            TestStatus::Passed => {}
            TestStatus::Skipped => {
                let _ = writeln!(xml, "      <skipped message=\"{}\"/>", escape_xml(message));
            }
            TestStatus::Failed | TestStatus::TimedOut => {
                let kind = if test.status == TestStatus::TimedOut {
                    "timeout"
                } else {
                    "mismatch"
                };
                let _ = writeln!(
                    xml,
                    "      <failure type=\"{kind}\" message=\"{}\">",
                    escape_xml(message)
                );
                for failure in &test.failures {
                    let _ = writeln!(xml, "{}", escape_xml(failure));
                }
                xml.push_str("      </failure>\n");
            }
        }

        if let Some(description) = &test.description {
            let _ = writeln!(
                xml,
                "      <system-out>{}</system-out>",
                escape_xml(description.trim_end())
            );
        }

        xml.push_str("    </testcase>\n");
    }

    xml.push_str("  </testsuite>\n");
    xml.push_str("</testsuites>\n");
    xml
}

/// Escape special XML characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
