//! End-to-end tests running the built binary against fixture folders.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use std::time::{Duration, Instant};
use tempfile::TempDir;

const SQUARE: &str = "read n\necho $((n * n))\n";

fn iotest_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_iotest"))
}

/// Fixture folder with a `square.sh` program next to the fixtures.
fn fixture_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("square.sh"), SQUARE).unwrap();
    dir
}

fn write(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).unwrap();
}

/// Run the harness on `dir` with the square program as main command.
fn run_square(dir: &Path, extra: &[&str]) -> Output {
    let script = dir.join("square.sh");
    iotest_cmd()
        .arg("run")
        .arg(dir)
        .args(extra)
        .arg("--")
        .arg("sh")
        .arg(&script)
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn debug(output: &Output) -> String {
    format!(
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

#[test]
fn passing_test_reports_all_correct() {
    let dir = fixture_dir();
    write(dir.path(), "t1.in", "5\n");
    write(dir.path(), "t1.out", "25\n");
    write(dir.path(), "t1.desc", "five squared\n");

    let output = run_square(dir.path(), &[]);
    assert!(output.status.success(), "{}", debug(&output));

    let report = stdout(&output);
    assert!(report.contains("===== TEST t1 ====="));
    assert!(report.contains("five squared"));
    assert!(report.contains("OK      \ttime:"));
    assert!(report.contains("CORRECT: 1/1"));
    assert!(report.contains("WELL DONE"));
}

#[test]
fn mismatch_cites_offset_and_context() {
    let dir = fixture_dir();
    write(dir.path(), "t1.in", "5\n");
    write(dir.path(), "t1.out", "24\n");

    let output = run_square(dir.path(), &[]);
    assert_eq!(output.status.code(), Some(1), "{}", debug(&output));

    let report = stdout(&output);
    assert!(report.contains("Mismatch at 1 of result stdout"));
    assert!(report.contains("| 2 <> 5 <> \\n |"));
    assert!(report.contains("| 2 <> 4 <> \\n |"));
    assert!(report.contains("ERROR   \ttime:"));
    assert!(report.contains("CORRECT: 0/1"));
    assert!(!report.contains("WELL DONE"));
}

#[test]
fn missing_output_file_fails_without_crashing() {
    let dir = fixture_dir();
    let run_dir = TempDir::new().unwrap();
    write(dir.path(), "t1.in", "5\n");
    write(dir.path(), "t1.out", "25\n");
    write(dir.path(), "t1.outfiles", "result.dat\n");
    write(
        dir.path(),
        "t1.rundir",
        &format!("{}\n", run_dir.path().display()),
    );
    write(dir.path(), "t2.in", "3\n");
    write(dir.path(), "t2.out", "9\n");

    let output = run_square(dir.path(), &[]);
    assert_eq!(output.status.code(), Some(1), "{}", debug(&output));

    let report = stdout(&output);
    assert!(report.contains("Missing user output file of name: \"result.dat\""));
    assert!(report.contains("===== TEST t2 ====="));
    assert!(report.contains("CORRECT: 1/2"));
}

#[test]
fn timeout_terminates_program() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "slow.timeout", "1\n");

    let start = Instant::now();
    let output = iotest_cmd()
        .arg("run")
        .arg(dir.path())
        .args(["--", "sleep", "5"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1), "{}", debug(&output));
    assert!(start.elapsed() < Duration::from_secs(4));
    assert!(stdout(&output).contains("TIMEOUT \ttime:"));
}

#[test]
fn unbounded_timeout_from_command_line() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "wait.out", "done\n");

    let output = iotest_cmd()
        .arg("run")
        .arg(dir.path())
        .args(["--timeout", "-1", "--", "sh", "-c", "sleep 1.2; echo done"])
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", debug(&output));
}

#[test]
fn generated_input_and_reference_solution() {
    let dir = fixture_dir();
    let script = dir.path().join("square.sh");
    write(dir.path(), "gen.genin", "echo\n12\n");
    write(dir.path(), "gen.gen", "sh\n$$TEST_FOLDER$$/square.sh\n");

    let output = iotest_cmd()
        .arg("run")
        .arg(dir.path())
        .arg("--")
        .arg("sh")
        .arg(&script)
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", debug(&output));
    assert_eq!(
        fs::read_to_string(dir.path().join("gen.in")).unwrap(),
        "12\n"
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("gen.out")).unwrap(),
        "144\n"
    );
}

#[test]
fn environment_map_and_arguments() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "env.envmap", "WHO\nworld\nWHERE\n$$TEST_FOLDER$$\n");
    // `sh -c script arg0 arg1`: the first argument after the script is $0.
    write(dir.path(), "env.args", "echo \"$WHO\" \"$1\"\nenv\nhello\n");
    write(dir.path(), "env.out", "world hello\n");

    let output = iotest_cmd()
        .arg("run")
        .arg(dir.path())
        .args(["--", "sh", "-c"])
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", debug(&output));
}

#[test]
fn wrong_extension_count_is_fatal() {
    let dir = fixture_dir();
    write(dir.path(), "t1.in", "5\n");

    let output = run_square(dir.path(), &["--extensions", "in,out,err"]);
    assert_eq!(output.status.code(), Some(2), "{}", debug(&output));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error: expected 13 extensions"));
    assert!(!stdout(&output).contains("===== TEST"));
}

#[test]
fn custom_extensions() {
    let dir = fixture_dir();
    write(dir.path(), "t1.stdin", "4\n");
    write(dir.path(), "t1.expected", "16\n");

    let output = run_square(
        dir.path(),
        &[
            "-e",
            "stdin,expected,err,args,exit,genin,gen,timeout,rundir,infiles,outfiles,envmap,desc",
        ],
    );
    assert!(output.status.success(), "{}", debug(&output));
    assert!(stdout(&output).contains("CORRECT: 1/1"));
}

#[test]
fn folder_must_be_a_directory() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("t1.in");
    fs::write(&file, "5\n").unwrap();

    let output = iotest_cmd()
        .arg("run")
        .arg(&file)
        .args(["--", "cat"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2), "{}", debug(&output));
}

#[test]
fn missing_main_command_is_fatal() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "t1.in", "5\n");

    let output = iotest_cmd().arg("run").arg(dir.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "{}", debug(&output));
    assert!(String::from_utf8_lossy(&output.stderr).contains("missing main command"));
}

#[test]
fn config_file_supplies_main_command() {
    let dir = fixture_dir();
    write(dir.path(), "t1.in", "6\n");
    write(dir.path(), "t1.out", "36\n");
    write(
        dir.path(),
        "iotest.toml",
        &format!(
            "main = [\"sh\", \"{}\"]\ntimeout = 5\n",
            dir.path().join("square.sh").display()
        ),
    );

    let output = iotest_cmd().arg("run").arg(dir.path()).output().unwrap();
    assert!(output.status.success(), "{}", debug(&output));
}

#[test]
fn filter_restricts_selection() {
    let dir = fixture_dir();
    write(dir.path(), "keep.in", "2\n");
    write(dir.path(), "keep.out", "4\n");
    write(dir.path(), "drop.in", "2\n");
    write(dir.path(), "drop.out", "5\n");

    let output = run_square(dir.path(), &["--filter", "^ke"]);
    assert!(output.status.success(), "{}", debug(&output));
    assert!(stdout(&output).contains("CORRECT: 1/1"));
    assert!(!stdout(&output).contains("TEST drop"));
}

#[test]
fn json_output() {
    let dir = fixture_dir();
    write(dir.path(), "a.in", "5\n");
    write(dir.path(), "a.out", "25\n");
    write(dir.path(), "b.in", "5\n");
    write(dir.path(), "b.out", "24\n");

    let output = run_square(dir.path(), &["--output", "json"]);
    assert_eq!(output.status.code(), Some(1), "{}", debug(&output));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["correct"], 1);
    assert_eq!(json["total"], 2);
    assert_eq!(json["failed"], 1);
    assert!(json["timestamp"].is_string());
    assert_eq!(json["tests"][0]["name"], "a");
    assert_eq!(json["tests"][0]["status"], "passed");
    assert_eq!(json["tests"][1]["status"], "failed");
}

#[test]
fn junit_output() {
    let dir = fixture_dir();
    write(dir.path(), "a.in", "5\n");
    write(dir.path(), "a.out", "25\n");
    write(dir.path(), "b.exit", "oops\n");

    let output = run_square(dir.path(), &["-o", "junit"]);
    let xml = stdout(&output);
    assert!(xml.starts_with("<?xml"));
    assert!(xml.contains("tests=\"2\" failures=\"0\" skipped=\"1\""));
    assert!(xml.contains("<skipped message=\"Setup failed: invalid exit code"));
}

#[test]
fn validate_reports_setup_errors() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "good.in", "1\n");
    write(dir.path(), "good.out", "1\n");
    write(dir.path(), "bad.timeout", "-7\n");

    let output = iotest_cmd()
        .arg("validate")
        .arg(dir.path())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1), "{}", debug(&output));
    assert!(stdout(&output).contains("✓ good (stdin, stdout)"));
    assert!(String::from_utf8_lossy(&output.stderr).contains("✗ bad: invalid timeout"));
}

#[test]
fn init_then_run() {
    let dir = TempDir::new().unwrap();
    let folder = dir.path().join("fixtures");

    let output = iotest_cmd().arg("init").arg(&folder).output().unwrap();
    assert!(output.status.success(), "{}", debug(&output));
    assert!(folder.join("example.in").is_file());

    let output = iotest_cmd().arg("run").arg(&folder).output().unwrap();
    assert!(output.status.success(), "{}", debug(&output));
    assert!(stdout(&output).contains("CORRECT: 1/1"));

    let output = iotest_cmd().arg("init").arg(&folder).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn schema_is_json() {
    let output = iotest_cmd().arg("schema").output().unwrap();
    assert!(output.status.success());
    let schema: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(schema["properties"]["main"].is_object());
}
