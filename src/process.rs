//! External process pipelines without a shell.
//!
//! A [`Pipeline`] is the Rust equivalent of `cmd1 | cmd2 | ... | cmdN`.
//! Stages are spawned upstream-first. The parent relays each inter-stage
//! stream on its own thread, counting the bytes that cross it, and closes
//! the downstream stdin as soon as the upstream stdout reaches end-of-stream.
//! No other process holds a write end, so every stage sees end-of-stream
//! once its upstream has exited. A downstream stage that stops reading
//! closes the relay, and the upstream stage then gets a broken pipe, as it
//! would under a shell.
//!
//! Every stage gets its own stderr buffer, drained on a dedicated thread so
//! a chatty stage cannot block on a full stderr pipe. The last stage's stdout
//! is copied into a caller-supplied sink.

use std::fmt;
use std::io::{self, Read, Write};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::PipelineError;

/// How often a pipeline with a deadline polls its stages.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Chunk size for inter-stage relays.
const RELAY_BUF_SIZE: usize = 64 * 1024;

/// Process groups of pipelines currently running with a deadline.
static ACTIVE_GROUPS: Mutex<Vec<i32>> = Mutex::new(Vec::new());

/// SIGKILL every process group started by a pipeline that is still running.
///
/// Pipelines with a deadline run outside the terminal's foreground group,
/// so an interrupt delivered to this process does not reach their stages.
/// Signal handlers call this before exiting.
pub fn kill_active_groups() {
    let groups = ACTIVE_GROUPS.lock().unwrap_or_else(PoisonError::into_inner);
    for &pgid in groups.iter() {
        // SAFETY: killpg only sends a signal; a stale group yields ESRCH.
        unsafe { libc::killpg(pgid, libc::SIGKILL) };
    }
}

/// One pipeline stage: a program and its argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
}

impl Cmd {
    /// Create a new stage for `program`.
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// An ordered chain of stages connected stdout to stdin.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Cmd>,
    timeout: Option<Duration>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage downstream of the current last stage.
    pub fn stage(mut self, cmd: Cmd) -> Self {
        self.stages.push(cmd);
        self
    }

    /// Bound how long the pipeline may run.
    ///
    /// With a deadline set, all stages share one process group, which is
    /// killed as a whole when the deadline passes. That group is not the
    /// terminal's foreground group, so terminal signals do not reach it;
    /// see [`kill_active_groups`].
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn stages(&self) -> &[Cmd] {
        &self.stages
    }

    /// Run to completion, discarding the final output.
    pub fn run(self) -> Result<(), PipelineError> {
        self.run_into(&mut io::sink())
    }

    /// Run to completion and buffer the final output.
    pub fn output(self) -> Result<Vec<u8>, PipelineError> {
        let mut buf = Vec::new();
        self.run_into(&mut buf)?;
        Ok(buf)
    }

    /// Run to completion, streaming the last stage's stdout into `sink`.
    ///
    /// Output already written to `sink` must be discarded by the caller when
    /// this returns an error.
    pub fn run_into(self, sink: &mut (dyn Write + Send)) -> Result<(), PipelineError> {
        if self.stages.is_empty() {
            return Err(PipelineError::Wire("pipeline has no stages".to_string()));
        }

        let grouped = self.timeout.is_some();
        let last = self.stages.len() - 1;
        let mut running = Running {
            children: Vec::with_capacity(self.stages.len()),
            pgid: None,
        };
        let mut links: Vec<(ChildStdout, ChildStdin)> = Vec::with_capacity(last);
        let mut upstream: Option<ChildStdout> = None;

        for (index, stage) in self.stages.iter().enumerate() {
            let stdin = if index == 0 {
                Stdio::null()
            } else {
                Stdio::piped()
            };

            let mut command = stage.command();
            command
                .stdin(stdin)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
            if grouped {
                command.process_group(running.pgid.unwrap_or(0));
            }

            debug!(stage = index, command = %stage, "starting pipeline stage");
            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(source) => {
                    running.terminate();
                    return Err(PipelineError::Spawn {
                        program: stage.program.clone(),
                        source,
                    });
                }
            };

            if grouped && running.pgid.is_none() {
                running.join_group(child.id());
            }

            if let Some(out) = upstream.take() {
                match child.stdin.take() {
                    Some(input) => links.push((out, input)),
                    None => {
                        running.children.push(child);
                        running.terminate();
                        return Err(PipelineError::Wire(format!(
                            "stdin of '{}' was not captured",
                            stage.program
                        )));
                    }
                }
            }

            if index < last {
                match child.stdout.take() {
                    Some(out) => upstream = Some(out),
                    None => {
                        running.children.push(child);
                        running.terminate();
                        return Err(PipelineError::Wire(format!(
                            "stdout of '{}' was not captured",
                            stage.program
                        )));
                    }
                }
            }
            running.children.push(child);
        }

        let stderr_pipes: Vec<Option<ChildStderr>> = running
            .children
            .iter_mut()
            .map(|child| child.stderr.take())
            .collect();

        let last_stdout = match running.children.last_mut().and_then(|c| c.stdout.take()) {
            Some(out) => out,
            None => {
                running.terminate();
                return Err(PipelineError::Wire(
                    "stdout of the last stage was not captured".to_string(),
                ));
            }
        };

        let deadline = self.timeout.map(|t| (t, Instant::now() + t));

        let (waited, copied, relayed, stderrs) = thread::scope(|scope| {
            let readers: Vec<_> = stderr_pipes
                .into_iter()
                .map(|pipe| scope.spawn(move || drain_stderr(pipe)))
                .collect();

            let relays: Vec<_> = links
                .into_iter()
                .map(|(from, to)| scope.spawn(move || relay(from, to)))
                .collect();

            let copier = scope.spawn(move || {
                let mut out = last_stdout;
                io::copy(&mut out, sink)
            });

            let waited = running.wait_all(deadline);

            let copied = copier
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("stdout reader panicked")));
            let relayed: Vec<u64> = relays
                .into_iter()
                .map(|relay| relay.join().unwrap_or_default())
                .collect();
            let stderrs: Vec<String> = readers
                .into_iter()
                .map(|reader| reader.join().unwrap_or_default())
                .collect();

            (waited, copied, relayed, stderrs)
        });

        let statuses = waited?;

        let mut failed = self
            .stages
            .iter()
            .zip(statuses.iter())
            .zip(stderrs.iter())
            .enumerate()
            .filter(|(_, ((_, status), _))| !status.success());

        if let Some((index, ((stage, status), stderr))) = failed.next() {
            let mut detail = stderr.trim().to_string();
            for (_, (_, more)) in failed {
                let more = more.trim();
                if !more.is_empty() {
                    if !detail.is_empty() {
                        detail.push('\n');
                    }
                    detail.push_str(more);
                }
            }
            let received = index
                .checked_sub(1)
                .and_then(|link| relayed.get(link))
                .copied()
                .unwrap_or(0);
            return Err(PipelineError::Stage {
                stage: index,
                program: stage.program.clone(),
                status: *status,
                received,
                stderr: detail,
            });
        }

        let bytes = copied
            .map_err(|e| PipelineError::Wire(format!("reading pipeline output: {e}")))?;
        debug!(bytes, stages = self.stages.len(), "pipeline finished");
        Ok(())
    }
}

/// Stages that have been started and must be reaped.
struct Running {
    children: Vec<Child>,
    pgid: Option<i32>,
}

impl Running {
    /// Use the first stage's pid as the process group of the pipeline.
    fn join_group(&mut self, leader: u32) {
        self.pgid = i32::try_from(leader).ok();
        if let Some(pgid) = self.pgid {
            ACTIVE_GROUPS
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(pgid);
        }
    }

    /// Wait on every stage in pipeline order, honouring the deadline.
    fn wait_all(
        &mut self,
        deadline: Option<(Duration, Instant)>,
    ) -> Result<Vec<ExitStatus>, PipelineError> {
        let Some((timeout, deadline)) = deadline else {
            let mut statuses = Vec::with_capacity(self.children.len());
            for child in &mut self.children {
                let status = child
                    .wait()
                    .map_err(|e| PipelineError::Wire(format!("waiting for stage: {e}")))?;
                statuses.push(status);
            }
            return Ok(statuses);
        };

        let mut statuses: Vec<Option<ExitStatus>> = vec![None; self.children.len()];
        loop {
            let mut poll_error = None;
            for (child, slot) in self.children.iter_mut().zip(statuses.iter_mut()) {
                if slot.is_none() {
                    match child.try_wait() {
                        Ok(status) => *slot = status,
                        Err(e) => {
                            poll_error = Some(e);
                            break;
                        }
                    }
                }
            }

            if let Some(e) = poll_error {
                self.terminate();
                return Err(PipelineError::Wire(format!("waiting for stage: {e}")));
            }

            if statuses.iter().all(Option::is_some) {
                return Ok(statuses.into_iter().flatten().collect());
            }

            if Instant::now() >= deadline {
                warn!(?timeout, "pipeline deadline passed, killing process group");
                self.terminate();
                return Err(PipelineError::TimedOut(timeout));
            }

            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Kill and reap everything started so far.
    fn terminate(&mut self) {
        if let Some(pgid) = self.pgid {
            // SAFETY: killpg only sends a signal; a stale group yields ESRCH.
            unsafe { libc::killpg(pgid, libc::SIGKILL) };
        }
        for child in &mut self.children {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid {
            ACTIVE_GROUPS
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|&active| active != pgid);
        }
    }
}

/// Copy one inter-stage stream, returning the bytes read from upstream.
fn relay(mut from: ChildStdout, mut to: ChildStdin) -> u64 {
    let mut buf = vec![0u8; RELAY_BUF_SIZE];
    let mut total = 0u64;
    loop {
        let n = match from.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("failed to read stage output: {}", e);
                break;
            }
        };
        total += n as u64;
        if let Err(e) = to.write_all(&buf[..n]) {
            debug!("downstream stage closed its input: {}", e);
            break;
        }
    }
    total
}

fn drain_stderr(pipe: Option<ChildStderr>) -> String {
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut bytes = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut bytes) {
        warn!("failed to read stage stderr: {}", e);
    }
    String::from_utf8_lossy(&bytes).into_owned()
}
