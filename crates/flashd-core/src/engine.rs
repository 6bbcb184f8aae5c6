//! Programmer process driver
//!
//! [`FlashEngine`] checks a job's preconditions, then hands it to a blocking
//! worker that owns the OpenOCD child process. The worker reads the merged
//! stdout/stderr pipe line by line (`\n`, `\r\n` and a bare `\r` all end a
//! line) and pushes [`FlashEvent`]s into a bounded
//! channel, so a slow consumer throttles the reader instead of buffering the
//! whole run. The channel always ends with exactly one outcome unless the
//! consumer hung up first.
//!
//! If the receiving side is dropped mid-run, the next send fails and the
//! worker kills and reaps the child. Any [`StagedImage`] handed to the engine
//! is dropped by the worker after the child is gone, on every path.

use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::FlashResult;
use crate::event::{FlashEvent, JobState, LogEvent, OutcomeEvent};
use crate::job::FlashJob;
use crate::staging::StagedImage;

/// Default bound on events buffered between worker and consumer
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Explicit programmer executable; `None` searches `PATH` for `openocd`
    pub programmer: Option<PathBuf>,
    /// Capacity of the per-job event channel
    pub channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            programmer: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Starts flash jobs
#[derive(Debug, Clone, Default)]
pub struct FlashEngine {
    config: EngineConfig,
}

impl FlashEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolve a job for `image` without running it
    pub fn prepare(&self, image: &Path) -> FlashResult<FlashJob> {
        FlashJob::new(image, self.config.programmer.as_deref()).inspect_err(|e| {
            tracing::debug!(state = %JobState::PreconditionFailed, error = %e, "Flash job rejected");
        })
    }

    /// Start flashing an image the caller keeps ownership of.
    ///
    /// Precondition failures are returned before any event is produced.
    /// Must be called from within a tokio runtime.
    pub fn start(&self, image: &Path) -> FlashResult<FlashRun> {
        let job = self.prepare(image)?;
        Ok(self.run(job, None))
    }

    /// Start flashing a staged image; the file is removed once the run ends.
    ///
    /// On a precondition failure the staged file is removed before returning.
    pub fn start_staged(&self, staged: StagedImage) -> FlashResult<FlashRun> {
        let job = self.prepare(staged.path())?;
        Ok(self.run(job, Some(staged)))
    }

    /// Spawn the worker for an already prepared job
    pub fn run(&self, job: FlashJob, staged: Option<StagedImage>) -> FlashRun {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));

        let handle = tokio::task::spawn_blocking(move || {
            let mut worker = Worker::new(job, tx);
            // Declared after the worker so it is dropped first on unwind too
            let staged = staged;
            let outcome = worker.run();
            // File is gone before the consumer can observe the outcome
            drop(staged);
            if let Some(outcome) = outcome {
                worker.finish(outcome);
            }
        });

        FlashRun { events: rx, handle }
    }
}

/// Handle to a running job's event stream
#[derive(Debug)]
pub struct FlashRun {
    events: mpsc::Receiver<FlashEvent>,
    handle: JoinHandle<()>,
}

impl FlashRun {
    /// Next event, or `None` once the worker has finished
    pub async fn next(&mut self) -> Option<FlashEvent> {
        self.events.recv().await
    }

    /// Consume the run as a `Stream` of events
    pub fn into_stream(self) -> ReceiverStream<FlashEvent> {
        ReceiverStream::new(self.events)
    }

    /// Drain the run, collecting every log line and the outcome.
    ///
    /// A worker that stops without reporting an outcome is treated as a
    /// failure.
    pub async fn wait(mut self) -> (Vec<LogEvent>, OutcomeEvent) {
        let mut logs = Vec::new();
        let mut outcome = None;

        while let Some(event) = self.events.recv().await {
            match event {
                FlashEvent::Log(log) => logs.push(log),
                FlashEvent::Outcome(o) => outcome = Some(o),
            }
        }

        if let Err(e) = (&mut self.handle).await {
            tracing::error!(error = %e, "Flash worker failed");
        }

        (logs, outcome.unwrap_or_else(missing_outcome))
    }
}

/// Outcome used when the event stream closes without a verdict
pub fn missing_outcome() -> OutcomeEvent {
    OutcomeEvent::failed("Flashing failed: worker stopped without reporting a result")
}

/// Consumer dropped the receiver
struct Disconnected;

enum Finish {
    Exited(ExitStatus),
    Disconnected,
}

struct Worker {
    job: FlashJob,
    tx: mpsc::Sender<FlashEvent>,
    state: JobState,
}

impl Worker {
    fn new(job: FlashJob, tx: mpsc::Sender<FlashEvent>) -> Self {
        Self {
            job,
            tx,
            state: JobState::NotStarted,
        }
    }

    fn advance(&mut self, next: JobState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(from = %self.state, to = %next, "Flash job state");
        self.state = next;
    }

    fn emit(&self, event: impl Into<FlashEvent>) -> Result<(), Disconnected> {
        self.tx.blocking_send(event.into()).map_err(|_| Disconnected)
    }

    /// Drive the job up to its verdict; `None` when the consumer hung up
    fn run(&mut self) -> Option<OutcomeEvent> {
        self.advance(JobState::CommandBuilt);

        let command_line = self.job.command_line();
        tracing::info!(command = %command_line, "Starting programmer");
        self.emit(LogEvent::engine(format!("RUN: {}", command_line)))
            .ok()?;

        match self.execute() {
            Ok(Finish::Exited(status)) => {
                let outcome = match status.code() {
                    Some(code) => OutcomeEvent::from_exit_code(code),
                    None => OutcomeEvent::terminated(),
                };
                // Verdict also closes the log transcript
                self.emit(LogEvent::engine(outcome.message.clone())).ok()?;
                self.advance(if outcome.success {
                    JobState::Succeeded
                } else {
                    JobState::Failed
                });
                Some(outcome)
            }
            Ok(Finish::Disconnected) => {
                tracing::warn!(image = %self.job.image(), "Caller disconnected, programmer stopped");
                None
            }
            Err(e) => {
                self.advance(JobState::LaunchFailed);
                tracing::error!(error = %e, "Error occurred while running OpenOCD");
                self.emit(LogEvent::engine(format!(
                    "Error occurred while running OpenOCD: {}",
                    e
                )))
                .ok()?;
                self.advance(JobState::Failed);
                Some(OutcomeEvent::failed(format!("Flashing failed: {}", e)))
            }
        }
    }

    fn finish(self, outcome: OutcomeEvent) {
        debug_assert!(self.state.is_terminal(), "outcome sent in state {}", self.state);
        tracing::info!(
            success = outcome.success,
            exit_code = ?outcome.exit_code,
            "Flash job finished"
        );
        if self.emit(outcome).is_err() {
            tracing::debug!("Outcome dropped, caller already gone");
        }
    }

    /// Spawn the programmer and drain its output until it exits
    fn execute(&mut self) -> io::Result<Finish> {
        let (reader, writer) = io::pipe()?;

        let mut child = {
            let mut command = Command::new(self.job.programmer());
            command
                .args(self.job.args())
                .stdin(Stdio::null())
                .stdout(writer.try_clone()?)
                .stderr(writer);
            command.spawn()?
            // `command` drops here, closing our write ends so EOF follows exit
        };
        self.advance(JobState::Spawned);
        tracing::debug!(pid = child.id(), "Programmer spawned");

        self.advance(JobState::Streaming);
        let mut reader = LineReader::new(BufReader::new(reader));
        let mut buf = Vec::new();

        loop {
            match reader.read_line(&mut buf) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    stop(&mut child);
                    return Err(e);
                }
            }

            let text = String::from_utf8_lossy(&buf);
            let line = text.trim();
            if line.is_empty() {
                continue;
            }

            tracing::debug!(line, "OpenOCD");
            if self.emit(LogEvent::programmer(line)).is_err() {
                stop(&mut child);
                return Ok(Finish::Disconnected);
            }
        }

        let status = child.wait()?;
        self.advance(JobState::Exited);
        Ok(Finish::Exited(status))
    }
}

/// Splits output into lines at `\n`, `\r\n` or a lone `\r`
///
/// A line ending in `\r` is returned as soon as the `\r` arrives, so progress
/// redrawn in place is not held back waiting for a `\n`.
struct LineReader<R> {
    inner: R,
    /// Previous line ended in `\r`; a `\n` right after it is part of that break
    after_cr: bool,
}

impl<R: BufRead> LineReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            after_cr: false,
        }
    }

    /// Read the next line into `buf`, without its terminator.
    /// Returns `Ok(false)` at end of input.
    fn read_line(&mut self, buf: &mut Vec<u8>) -> io::Result<bool> {
        buf.clear();
        let mut read_any = false;

        loop {
            let available = match self.inner.fill_buf() {
                Ok(available) => available,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                return Ok(read_any);
            }

            if self.after_cr {
                self.after_cr = false;
                if available[0] == b'\n' {
                    self.inner.consume(1);
                    continue;
                }
            }

            match available.iter().position(|&b| b == b'\n' || b == b'\r') {
                Some(pos) => {
                    buf.extend_from_slice(&available[..pos]);
                    self.after_cr = available[pos] == b'\r';
                    self.inner.consume(pos + 1);
                    return Ok(true);
                }
                None => {
                    let len = available.len();
                    buf.extend_from_slice(available);
                    self.inner.consume(len);
                    read_any = true;
                }
            }
        }
    }
}

/// Kill and reap the child so it is never orphaned
fn stop(child: &mut Child) {
    if let Err(e) = child.kill() {
        tracing::debug!(error = %e, "Programmer already exited");
    }
    if let Err(e) = child.wait() {
        tracing::warn!(error = %e, "Failed to reap programmer");
    }
}
