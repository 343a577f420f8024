//! Engine process lifecycle.
//!
//! A session spawns the engine, streams its stdout through a
//! [`StreamParser`] on a reader thread, and polls the child for completion.
//! Polling is the only suspension point. A cancellation request or the first
//! undecodable record changes the loop's exit condition and starts a
//! graceful-then-forceful shutdown.
//!
//! ```text
//! RUNNING --cancel or decode failure--> STOPPING --grace elapsed--> KILLED
//!    |                                  |                           |
//!    +----------------------------------+----- exit observed -------+--> TERMINATED
//! ```

use std::io::{self, Read, Write};
use std::mem;
use std::path::PathBuf;
use std::process::{ChildStdin, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use semver::Version;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use kindly_results::{FrozenModel, ResultModel};

use crate::config::{parse_version, DriverConfig};
use crate::error::{CapturedOutput, DriverError, ParseError, Result};
use crate::parser::StreamParser;
use crate::transcript::Transcript;

/// Requests cooperative cancellation of the running session.
///
/// Cloned handles share one flag. The driver clears the flag when a session
/// ends, so a request made between sessions cancels the next one before it
/// starts.
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle(Arc<AtomicBool>);

impl CancellationHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// How the program text reaches the engine.
#[derive(Debug, Clone)]
pub enum ProgramInput {
    /// Written to a temporary `.lus` file whose path is passed last.
    Text(String),
    /// An existing file, passed by path.
    File(PathBuf),
    /// Written to the engine's input channel from a helper thread, which then
    /// closes it. No termination marker can follow, so cancelling a session
    /// in this mode ends with the forced stop once the grace period elapses.
    Stdin(String),
}

/// Exit codes that report a verdict rather than a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    SomeUnknown,
    SomeFalsified,
    AllValid,
}

impl ExitClass {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ExitClass::SomeUnknown),
            10 => Some(ExitClass::SomeFalsified),
            20 => Some(ExitClass::AllValid),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            ExitClass::SomeUnknown => 0,
            ExitClass::SomeFalsified => 10,
            ExitClass::AllValid => 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Completed(ExitClass),
    /// Stopped on request. The model may be incomplete.
    Cancelled,
}

/// Outcome reported to the completion callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Finished { exit_code: i32 },
    Cancelled,
    Failed { reason: String },
}

/// A finished or cancelled verification session.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub status: SessionStatus,
    pub model: ResultModel,
    pub transcript: Transcript,
    pub output: CapturedOutput,
}

impl Session {
    fn cancelled_before_start(id: Uuid) -> Self {
        Session {
            id,
            status: SessionStatus::Cancelled,
            model: ResultModel::new(),
            transcript: Transcript::default(),
            output: CapturedOutput::default(),
        }
    }

    /// Whether the model holds the engine's complete verdict.
    pub fn is_final(&self) -> bool {
        matches!(self.status, SessionStatus::Completed(_))
    }

    /// Freeze the model for suggestion synthesis. Cancelled sessions have no
    /// final model.
    pub fn into_final(self) -> Option<FrozenModel> {
        self.is_final().then(|| self.model.freeze())
    }
}

/// What the availability probe learned about the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInfo {
    /// First non-empty line of the probe's output.
    pub banner: String,
    pub version: Option<Version>,
}

/// Why the driver began shutting the engine down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Requested,
    DecodeFailure,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Running,
    Stopping { reason: StopReason, deadline: Instant },
    Killed { reason: StopReason },
}

impl Phase {
    fn stop_reason(self) -> Option<StopReason> {
        match self {
            Phase::Running => None,
            Phase::Stopping { reason, .. } | Phase::Killed { reason } => Some(reason),
        }
    }
}

/// Everything the stdout reader produced.
#[derive(Default)]
struct StdoutState {
    parser: StreamParser,
    error: Option<ParseError>,
    raw: Vec<u8>,
}

/// A reader thread whose accumulated state stays reachable if the thread
/// has to be abandoned.
struct Drain<T> {
    handle: JoinHandle<()>,
    state: Arc<Mutex<T>>,
}

/// Runs one engine session at a time.
#[derive(Debug)]
pub struct ProcessDriver {
    config: DriverConfig,
    cancel: CancellationHandle,
}

impl ProcessDriver {
    pub fn new(config: DriverConfig) -> Self {
        Self {
            config,
            cancel: CancellationHandle::default(),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// A handle that cancels this driver's sessions from another thread.
    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.cancel.clone()
    }

    /// Run the engine to completion or cancellation.
    ///
    /// `on_complete` is invoked exactly once on every path, including
    /// cancellation before the engine starts and spawn failures.
    pub fn execute<F>(
        &mut self,
        args: &[String],
        input: ProgramInput,
        on_complete: F,
    ) -> Result<Session>
    where
        F: FnOnce(&Completion),
    {
        let id = Uuid::new_v4();
        let span = info_span!("session", %id);
        let _enter = span.enter();

        let outcome = self.run(id, args, input);
        self.cancel.reset();

        let completion = match &outcome {
            Ok(session) => match session.status {
                SessionStatus::Completed(class) => Completion::Finished {
                    exit_code: class.code(),
                },
                SessionStatus::Cancelled => Completion::Cancelled,
            },
            Err(e) => Completion::Failed {
                reason: e.to_string(),
            },
        };
        debug!(?completion, "session complete");
        on_complete(&completion);
        outcome
    }

    fn run(&self, id: Uuid, args: &[String], input: ProgramInput) -> Result<Session> {
        if self.cancel.is_cancelled() {
            info!("cancelled before the engine started");
            return Ok(Session::cancelled_before_start(id));
        }

        let mut command = Command::new(&self.config.binary);
        command
            .args(&self.config.base_args)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Held until the engine exits.
        let mut _program_file = None;
        let mut stdin_program = None;
        match input {
            ProgramInput::Text(text) => {
                let mut file = tempfile::Builder::new()
                    .prefix("kindly-")
                    .suffix(".lus")
                    .tempfile()?;
                file.write_all(text.as_bytes())?;
                file.flush()?;
                command.arg(file.path());
                _program_file = Some(file);
            }
            ProgramInput::File(path) => {
                command.arg(path);
            }
            ProgramInput::Stdin(text) => stdin_program = Some(text),
        }

        let mut child = command.spawn().map_err(|e| {
            DriverError::configuration(format!(
                "cannot start '{}': {e}",
                self.config.binary.display()
            ))
        })?;
        info!(pid = child.id(), binary = %self.config.binary.display(), "engine started");

        let decode_failed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&decode_failed);
        let stdout = Drain::spawn(child.stdout.take(), move |state: &mut StdoutState, chunk| {
            let Some(bytes) = chunk else {
                if state.error.is_none() {
                    state.error = state.parser.finish().err();
                }
                return;
            };
            state.raw.extend_from_slice(bytes);
            // Keep draining after a failure so the engine never blocks on a
            // full pipe while it is being stopped.
            if state.error.is_none() {
                if let Err(e) = state.parser.feed(bytes) {
                    warn!(error = %e, "undecodable engine output, aborting session");
                    state.error = Some(e);
                    flag.store(true, Ordering::SeqCst);
                }
            }
        });
        let stderr = Drain::spawn(child.stderr.take(), |text: &mut Vec<u8>, chunk| {
            if let Some(bytes) = chunk {
                text.extend_from_slice(bytes);
            }
        });

        let mut stdin = child.stdin.take();
        if let Some(program) = stdin_program {
            if let Some(mut pipe) = stdin.take() {
                // Detached: the write ends with an error once the engine is gone.
                thread::spawn(move || {
                    if let Err(e) = pipe.write_all(program.as_bytes()) {
                        warn!(error = %e, "engine closed its input early");
                    }
                });
            }
        }

        let (status, phase) = match self.poll(&mut child, &mut stdin, &decode_failed) {
            Ok(done) => done,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };
        drop(stdin);

        // A killed engine's descendants may still hold its output open.
        let drain_deadline = matches!(phase, Phase::Killed { .. })
            .then(|| Instant::now() + self.config.grace_period);
        let StdoutState { parser, error, raw } =
            stdout.finish(drain_deadline, self.config.poll_interval)?;
        let stderr = stderr.finish(drain_deadline, self.config.poll_interval)?;
        let (model, transcript) = parser.into_parts();
        let output = CapturedOutput {
            stdout: String::from_utf8_lossy(&raw).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        };
        let code = status.code();
        let class = code.and_then(ExitClass::from_code);
        info!(?code, records = transcript.records, "engine terminated");

        match (phase.stop_reason(), class) {
            (Some(StopReason::Requested), _) => {
                return Ok(Session {
                    id,
                    status: SessionStatus::Cancelled,
                    model,
                    transcript,
                    output,
                })
            }
            (None, None) => {
                warn!(?code, "exit code outside the accepted set");
                return Err(abnormal(code, output, model));
            }
            // After a decode failure the exit status is the driver's own doing.
            (Some(StopReason::DecodeFailure), _) | (None, Some(_)) => {}
        }
        if let Some(source) = error {
            return Err(DriverError::Parse {
                source,
                output,
                partial: Box::new(model),
            });
        }
        let Some(class) = class else {
            return Err(abnormal(code, output, model));
        };
        debug!(?class, "exit classified");
        Ok(Session {
            id,
            status: SessionStatus::Completed(class),
            model,
            transcript,
            output,
        })
    }

    fn poll(
        &self,
        child: &mut std::process::Child,
        stdin: &mut Option<ChildStdin>,
        decode_failed: &AtomicBool,
    ) -> Result<(ExitStatus, Phase)> {
        let mut phase = Phase::Running;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok((status, phase));
            }
            match phase {
                Phase::Running => {
                    let reason = if self.cancel.is_cancelled() {
                        Some(StopReason::Requested)
                    } else if decode_failed.load(Ordering::SeqCst) {
                        Some(StopReason::DecodeFailure)
                    } else {
                        None
                    };
                    if let Some(reason) = reason {
                        info!(?reason, "stopping engine");
                        self.send_termination_marker(stdin);
                        phase = Phase::Stopping {
                            reason,
                            deadline: Instant::now() + self.config.grace_period,
                        };
                    }
                }
                Phase::Stopping { reason, deadline } if Instant::now() >= deadline => {
                    warn!("grace period elapsed, killing engine");
                    if let Err(e) = child.kill() {
                        debug!(error = %e, "kill failed, engine already gone");
                    }
                    phase = Phase::Killed { reason };
                }
                _ => {}
            }
            thread::sleep(self.config.poll_interval);
        }
    }

    fn send_termination_marker(&self, stdin: &mut Option<ChildStdin>) {
        let Some(marker) = &self.config.termination_marker else {
            return;
        };
        match stdin.take() {
            Some(mut pipe) => {
                let _ = pipe.write_all(marker.as_bytes()).and_then(|_| pipe.flush());
            }
            None => debug!("input channel already closed, no termination marker sent"),
        }
    }

    /// Run the version probe.
    ///
    /// A spawn failure, a nonzero exit, or a version below the configured
    /// minimum is a configuration error.
    pub fn check_availability(&self) -> Result<EngineInfo> {
        let binary = self.config.binary.display();
        let output = Command::new(&self.config.binary)
            .args(&self.config.base_args)
            .args(&self.config.version_args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| DriverError::configuration(format!("cannot run '{binary}': {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DriverError::configuration(format!(
                "'{binary}' version probe failed ({}): {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let banner = stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or_default()
            .to_string();
        let version = parse_version(&banner);
        debug!(%banner, ?version, "version probe");

        if let Some(minimum) = &self.config.minimum_version {
            match &version {
                Some(v) if v >= minimum => {}
                Some(v) => {
                    return Err(DriverError::configuration(format!(
                        "'{binary}' is version {v}, at least {minimum} is required"
                    )))
                }
                None => {
                    return Err(DriverError::configuration(format!(
                        "cannot determine the version of '{binary}' from '{banner}'"
                    )))
                }
            }
        }
        Ok(EngineInfo { banner, version })
    }
}

fn abnormal(code: Option<i32>, output: CapturedOutput, model: ResultModel) -> DriverError {
    DriverError::AbnormalTermination {
        code,
        output,
        partial: Box::new(model),
    }
}

impl<T: Default + Send + 'static> Drain<T> {
    /// Read `stream` to EOF on a new thread, handing each chunk to `consume`
    /// and finally `None` at EOF.
    fn spawn<R, F>(stream: Option<R>, mut consume: F) -> Self
    where
        R: Read + Send + 'static,
        F: FnMut(&mut T, Option<&[u8]>) + Send + 'static,
    {
        let state = Arc::new(Mutex::new(T::default()));
        let shared = Arc::clone(&state);
        let handle = thread::spawn(move || {
            let Some(mut stream) = stream else {
                return;
            };
            let mut buf = [0u8; 8192];
            loop {
                let n = match stream.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!(error = %e, "reading engine output failed");
                        break;
                    }
                };
                consume(&mut lock(&shared), Some(&buf[..n]));
            }
            consume(&mut lock(&shared), None);
        });
        Drain { handle, state }
    }

    /// Wait for EOF and take the accumulated state.
    ///
    /// With a deadline, a reader still blocked when it passes is abandoned
    /// and whatever it gathered so far is returned.
    fn finish(self, deadline: Option<Instant>, poll_interval: Duration) -> Result<T> {
        if let Some(deadline) = deadline {
            while !self.handle.is_finished() && Instant::now() < deadline {
                thread::sleep(poll_interval);
            }
            if !self.handle.is_finished() {
                warn!("engine output still open after kill, abandoning reader");
                return Ok(mem::take(&mut *lock(&self.state)));
            }
        }
        self.handle
            .join()
            .map_err(|_| DriverError::Io(io::Error::other("output reader thread panicked")))?;
        Ok(mem::take(&mut *lock(&self.state)))
    }
}

fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
