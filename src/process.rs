//! External process execution with timeout and cooperative cancellation.
//!
//! Both collaborators (prober and muxer) are driven through here. The
//! runner polls the child at a fixed interval, streaming stdout lines to
//! a callback so the muxer adapter can parse progress, and enforces a
//! deadline. Cancellation kills the child and waits up to the grace
//! period for the OS to reap it; if the child still reports alive after
//! the grace window the outcome records the escalation.

use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

// Bound on waiting for pipe output after the child was killed. Forked
// descendants can keep the pipe write ends open long after the direct
// child is dead, so a killed run never waits for the pipes to close.
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Shared flag used to request termination of a running external call.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Takes effect at the next poll.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// How a child process run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Process exited on its own.
    Exited,
    /// Deadline elapsed; the process was killed.
    TimedOut,
    /// Cancellation was requested. `confirmed` is false when the child
    /// did not die within the grace period.
    Cancelled { confirmed: bool },
}

/// Result of one external process run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// Exit code when the process exited on its own.
    pub exit_code: Option<i32>,
    /// Complete stdout.
    pub stdout: String,
    /// Complete stderr, unredacted for diagnostics.
    pub stderr: String,
}

impl RunOutcome {
    /// Exited with code zero.
    pub fn success(&self) -> bool {
        self.status == RunStatus::Exited && self.exit_code == Some(0)
    }
}

/// Run a command to completion, capturing output.
///
/// `on_line` receives each stdout line as it arrives. Pass a no-op
/// closure when only the captured output matters.
pub fn run_command(
    program: &Path,
    args: &[String],
    timeout: Duration,
    grace: Duration,
    cancel: Option<&CancelToken>,
    mut on_line: impl FnMut(&str),
) -> io::Result<RunOutcome> {
    tracing::debug!(program = %program.display(), ?args, "spawning external process");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("child stdout not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("child stderr not captured"))?;

    let (line_tx, line_rx) = crossbeam_channel::unbounded::<String>();
    let stdout_thread = thread::spawn(move || {
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });
    let (stderr_tx, stderr_rx) = crossbeam_channel::bounded::<String>(1);
    let stderr_thread = thread::spawn(move || {
        let mut buf = String::new();
        let _ = BufReader::new(stderr).read_to_string(&mut buf);
        let _ = stderr_tx.send(buf);
    });

    let deadline = Instant::now() + timeout;
    let mut stdout_buf = String::new();
    let mut drain = |buf: &mut String, on_line: &mut dyn FnMut(&str)| {
        while let Ok(line) = line_rx.try_recv() {
            on_line(&line);
            buf.push_str(&line);
            buf.push('\n');
        }
    };

    let (status, exit_code) = loop {
        drain(&mut stdout_buf, &mut on_line);

        if let Some(exit) = child.try_wait()? {
            break (RunStatus::Exited, exit.code());
        }
        if cancel.is_some_and(|c| c.is_cancelled()) {
            let confirmed = kill_with_grace(&mut child, grace)?;
            break (RunStatus::Cancelled { confirmed }, None);
        }
        if Instant::now() >= deadline {
            tracing::warn!(program = %program.display(), "process deadline elapsed, killing");
            kill_with_grace(&mut child, grace)?;
            break (RunStatus::TimedOut, None);
        }
        thread::sleep(POLL_INTERVAL);
    };

    // A normal exit closes the pipes promptly, so the readers are joined
    // and all output is collected. After a kill the drain is
    // deadline-bounded and the reader threads are left to exit on their
    // own once the pipes finally close.
    let stderr_buf = if status == RunStatus::Exited {
        let _ = stdout_thread.join();
        let _ = stderr_thread.join();
        stderr_rx.try_recv().unwrap_or_default()
    } else {
        stderr_rx
            .recv_timeout(PIPE_DRAIN_TIMEOUT)
            .unwrap_or_default()
    };
    drain(&mut stdout_buf, &mut on_line);

    Ok(RunOutcome {
        status,
        exit_code,
        stdout: stdout_buf,
        stderr: stderr_buf,
    })
}

/// Kill the child and wait up to `grace` for it to be reaped.
///
/// Returns true when termination was confirmed within the window.
fn kill_with_grace(child: &mut Child, grace: Duration) -> io::Result<bool> {
    // Already exited between the poll and the kill request.
    if child.try_wait()?.is_some() {
        return Ok(true);
    }
    child.kill()?;

    let deadline = Instant::now() + grace;
    loop {
        if child.try_wait()?.is_some() {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            tracing::error!("child survived the termination grace period");
            return Ok(false);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Trim diagnostic output to its last `max_lines` lines.
pub fn tail_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
