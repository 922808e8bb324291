//! Subprocess orchestration.
//!
//! Each phase of a test (input generation, reference solution, main
//! execution) is described by a [`PhaseSpec`] and executed with
//! [`run_with_timeout`]. While a child runs it is parked in a shared
//! [`RunningProcess`] slot so that an interrupt can kill it before the
//! harness exits.

use crate::error::PhaseError;
use crate::testcase::TestCase;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Default timeout per phase in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// How often a running child is polled.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Time limit for a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    Limited(Duration),
    Unbounded,
}

impl Default for Timeout {
    fn default() -> Self {
        Timeout::Limited(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}

impl Timeout {
    /// Interpret a number of seconds, where `-1` means no limit.
    /// Other negative values are rejected.
    pub fn from_seconds(seconds: i64) -> Option<Self> {
        match seconds {
            -1 => Some(Timeout::Unbounded),
            s => u64::try_from(s)
                .ok()
                .map(|s| Timeout::Limited(Duration::from_secs(s))),
        }
    }

    pub fn limit(self) -> Option<Duration> {
        match self {
            Timeout::Limited(limit) => Some(limit),
            Timeout::Unbounded => None,
        }
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeout::Limited(limit) => write!(f, "{}s", limit.as_secs()),
            Timeout::Unbounded => f.write_str("no limit"),
        }
    }
}

/// The phases a test may run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    InputGeneration,
    ReferenceSolution,
    Main,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::InputGeneration => f.write_str("input generation"),
            Phase::ReferenceSolution => f.write_str("reference solution generation"),
            Phase::Main => f.write_str("main execution"),
        }
    }
}

/// Where a child's stdin comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdinSource {
    File(PathBuf),
    /// Closed right away; the child reads end-of-file.
    Closed,
}

/// Where a child's stdout or stderr goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Created (or truncated) file.
    File(PathBuf),
    /// Captured and returned in [`PhaseOutput`].
    Capture,
    /// Shared with the harness.
    Inherit,
}

/// A ready-to-start subprocess.
#[derive(Debug, Clone)]
pub struct PhaseSpec {
    pub phase: Phase,
    pub command: Vec<String>,
    pub working_dir: PathBuf,
    pub env: HashMap<String, String>,
    pub stdin: StdinSource,
    pub stdout: OutputTarget,
    pub stderr: OutputTarget,
}

impl PhaseSpec {
    /// Generator writing the test's stdin file. `None` if the test has no
    /// input generator.
    pub fn input_generation(test: &TestCase) -> Option<Self> {
        let generator = test.input_generator()?;
        Some(Self {
            phase: Phase::InputGeneration,
            command: generator.command.clone(),
            working_dir: test.run_directory().to_path_buf(),
            env: test.environment().clone(),
            stdin: StdinSource::Closed,
            stdout: OutputTarget::File(generator.target.clone()),
            stderr: OutputTarget::Inherit,
        })
    }

    /// Reference solver writing the expected stdout and stderr files. `None`
    /// if the test has no reference solver.
    pub fn reference_solution(test: &TestCase) -> Option<Self> {
        let solver = test.reference_solver()?;
        Some(Self {
            phase: Phase::ReferenceSolution,
            command: solver.command.clone(),
            working_dir: test.run_directory().to_path_buf(),
            env: test.environment().clone(),
            stdin: stdin_for(test),
            stdout: OutputTarget::File(solver.stdout.clone()),
            stderr: OutputTarget::File(solver.stderr.clone()),
        })
    }

    /// The program under test, with stdout and stderr captured.
    pub fn main(test: &TestCase) -> Self {
        Self {
            phase: Phase::Main,
            command: test.main_command().to_vec(),
            working_dir: test.run_directory().to_path_buf(),
            env: test.environment().clone(),
            stdin: stdin_for(test),
            stdout: OutputTarget::Capture,
            stderr: OutputTarget::Capture,
        }
    }

    fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or_default()
    }
}

fn stdin_for(test: &TestCase) -> StdinSource {
    match test.input() {
        Some(path) => StdinSource::File(path.to_path_buf()),
        None => StdinSource::Closed,
    }
}

/// How a phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Exited(ExitStatus),
    /// Killed after exceeding its limit.
    TimedOut(Duration),
    /// Taken out of the running slot and killed by an interrupt.
    Interrupted,
}

/// Result of running a phase.
#[derive(Debug)]
pub struct PhaseOutput {
    pub outcome: Outcome,
    /// Captured stdout; empty unless the phase asked for [`OutputTarget::Capture`].
    pub stdout: Vec<u8>,
    /// Captured stderr; empty unless the phase asked for [`OutputTarget::Capture`].
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
}

/// Slot holding the child that is currently running, if any.
///
/// Clones share the slot. At most one child is held at a time: the
/// orchestrator fills it right after spawning and empties it once the wait
/// is over, and [`RunningProcess::terminate`] empties it from elsewhere.
#[derive(Debug, Clone, Default)]
pub struct RunningProcess {
    slot: Arc<Mutex<Option<Child>>>,
}

impl RunningProcess {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Child>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether no child is currently held.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn is_idle(&self) -> bool {
        self.lock().is_none()
    }

    /// Take the running child, if any, kill it and reap it.
    /// Returns whether there was a child to terminate.
    pub fn terminate(&self) -> bool {
        let taken = self.lock().take();
        match taken {
            Some(mut child) => {
                if let Err(e) = child.kill() {
                    tracing::debug!("failed to kill child: {e}");
                }
                if let Err(e) = child.wait() {
                    tracing::debug!("failed to reap child: {e}");
                }
                true
            }
            None => false,
        }
    }

    fn hold(&self, child: Child) -> Held<'_> {
        *self.lock() = Some(child);
        Held { owner: self }
    }
}

/// Scoped occupancy of the running slot. Dropping it kills and reaps a
/// child that is still held.
struct Held<'a> {
    owner: &'a RunningProcess,
}

enum Poll {
    Running,
    Exited(ExitStatus),
    Taken,
}

impl Held<'_> {
    fn poll(&self) -> std::io::Result<Poll> {
        let mut slot = self.owner.lock();
        let Some(child) = slot.as_mut() else {
            return Ok(Poll::Taken);
        };
        Ok(match child.try_wait()? {
            Some(status) => {
                slot.take();
                Poll::Exited(status)
            }
            None => Poll::Running,
        })
    }

    fn kill(&self) -> std::io::Result<()> {
        let taken = self.owner.lock().take();
        if let Some(mut child) = taken {
            child.kill()?;
            child.wait()?;
        }
        Ok(())
    }
}

impl Drop for Held<'_> {
    fn drop(&mut self) {
        self.owner.terminate();
    }
}

/// Start a phase and wait for it, killing it if it outlives `timeout`.
pub fn run_with_timeout(
    spec: &PhaseSpec,
    timeout: Timeout,
    running: &RunningProcess,
) -> Result<PhaseOutput, PhaseError> {
    let (program, args) = spec.command.split_first().ok_or(PhaseError::EmptyCommand)?;

    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.current_dir(&spec.working_dir);
    cmd.envs(&spec.env);

    match &spec.stdin {
        StdinSource::File(path) => {
            cmd.stdin(open_redirect(path, |p| File::open(p))?);
        }
        StdinSource::Closed => {
            cmd.stdin(Stdio::null());
        }
    }
    let (stdout, stdout_capture) = output_stdio(&spec.stdout)?;
    let (stderr, stderr_capture) = output_stdio(&spec.stderr)?;
    cmd.stdout(stdout);
    cmd.stderr(stderr);

    tracing::debug!(phase = %spec.phase, command = ?spec.command, dir = %spec.working_dir.display(), "starting");
    let child = cmd.spawn().map_err(|source| PhaseError::Spawn {
        program: program.clone(),
        source,
    })?;

    let wait_error = |source| PhaseError::Wait {
        program: spec.program().to_string(),
        source,
    };
    let start = Instant::now();
    let held = running.hold(child);
    let outcome = loop {
        match held.poll().map_err(wait_error)? {
            Poll::Exited(status) => break Outcome::Exited(status),
            Poll::Taken => break Outcome::Interrupted,
            Poll::Running => {
                if let Some(limit) = timeout.limit()
                    && start.elapsed() > limit
                {
                    held.kill().map_err(wait_error)?;
                    break Outcome::TimedOut(limit);
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    };
    let elapsed = start.elapsed();
    drop(held);
    tracing::debug!(phase = %spec.phase, ?outcome, ?elapsed, "finished");

    Ok(PhaseOutput {
        outcome,
        stdout: read_capture(stdout_capture, "stdout")?,
        stderr: read_capture(stderr_capture, "stderr")?,
        elapsed,
    })
}

fn open_redirect(
    path: &Path,
    open: impl FnOnce(&Path) -> std::io::Result<File>,
) -> Result<Stdio, PhaseError> {
    open(path)
        .map(Stdio::from)
        .map_err(|source| PhaseError::Redirect {
            path: path.to_path_buf(),
            source,
        })
}

fn output_stdio(target: &OutputTarget) -> Result<(Stdio, Option<File>), PhaseError> {
    match target {
        OutputTarget::File(path) => Ok((open_redirect(path, |p| File::create(p))?, None)),
        OutputTarget::Capture => {
            let file = tempfile::tempfile().map_err(PhaseError::CaptureFile)?;
            let child_end = file.try_clone().map_err(PhaseError::CaptureFile)?;
            Ok((Stdio::from(child_end), Some(file)))
        }
        OutputTarget::Inherit => Ok((Stdio::inherit(), None)),
    }
}

fn read_capture(file: Option<File>, channel: &'static str) -> Result<Vec<u8>, PhaseError> {
    let Some(mut file) = file else {
        return Ok(Vec::new());
    };
    let mut buf = Vec::new();
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.read_to_end(&mut buf))
        .map_err(|source| PhaseError::Capture { channel, source })?;
    Ok(buf)
}

/// Listen for Ctrl-C on a background thread. On interrupt the running child
/// is terminated and the harness exits with status 130.
pub fn spawn_interrupt_listener(running: RunningProcess) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::warn!("interrupt handling unavailable: {e}");
                return;
            }
        };
        match runtime.block_on(tokio::signal::ctrl_c()) {
            Ok(()) => {
                if running.terminate() {
                    tracing::warn!("interrupted, terminated running process");
                }
                std::process::exit(130);
            }
            Err(e) => tracing::warn!("failed to listen for interrupts: {e}"),
        }
    })
}
