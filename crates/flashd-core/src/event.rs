//! Events produced by a running flash job
//!
//! A job narrates itself as zero or more [`LogEvent`]s followed by exactly one
//! [`OutcomeEvent`]. Both travel over the same channel as [`FlashEvent`] so the
//! consumer sees them in production order.

use std::fmt;

/// Prefix for lines read from the programmer process
pub const PROGRAMMER_PREFIX: &str = "OpenOCD";

/// Summary for a zero exit status
pub const SUCCESS_MESSAGE: &str = "Flashing completed successfully!";

/// Where a log line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOrigin {
    /// Diagnostics emitted by the engine itself (command line, launch errors)
    Engine,
    /// A line of merged stdout/stderr from the programmer
    Programmer,
}

/// One informational line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    origin: LogOrigin,
    line: String,
}

impl LogEvent {
    /// Line produced by the engine
    pub fn engine(line: impl Into<String>) -> Self {
        Self {
            origin: LogOrigin::Engine,
            line: line.into(),
        }
    }

    /// Line read from the programmer output
    pub fn programmer(line: impl Into<String>) -> Self {
        Self {
            origin: LogOrigin::Programmer,
            line: line.into(),
        }
    }

    pub fn origin(&self) -> LogOrigin {
        self.origin
    }

    /// The raw line, without the origin prefix
    pub fn line(&self) -> &str {
        &self.line
    }

    /// The line as shown to callers, prefixed with its origin when it came
    /// from the programmer
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin {
            LogOrigin::Engine => f.write_str(&self.line),
            LogOrigin::Programmer => write!(f, "{}: {}", PROGRAMMER_PREFIX, self.line),
        }
    }
}

/// Final verdict of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeEvent {
    pub success: bool,
    pub message: String,
    /// Exit code of the programmer, if it exited normally
    pub exit_code: Option<i32>,
}

impl OutcomeEvent {
    /// Map a process exit code to an outcome (0 is success)
    pub fn from_exit_code(code: i32) -> Self {
        if code == 0 {
            Self {
                success: true,
                message: SUCCESS_MESSAGE.to_string(),
                exit_code: Some(code),
            }
        } else {
            Self {
                success: false,
                message: format!("Flashing failed with return code: {}", code),
                exit_code: Some(code),
            }
        }
    }

    /// Programmer was killed by a signal and reported no code
    pub fn terminated() -> Self {
        Self::failed("Flashing failed: programmer terminated by signal")
    }

    /// Failure not tied to an exit code (launch or I/O error)
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            exit_code: None,
        }
    }
}

/// Item of a job's event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashEvent {
    Log(LogEvent),
    Outcome(OutcomeEvent),
}

impl FlashEvent {
    pub fn is_outcome(&self) -> bool {
        matches!(self, FlashEvent::Outcome(_))
    }
}

impl From<LogEvent> for FlashEvent {
    fn from(event: LogEvent) -> Self {
        FlashEvent::Log(event)
    }
}

impl From<OutcomeEvent> for FlashEvent {
    fn from(event: OutcomeEvent) -> Self {
        FlashEvent::Outcome(event)
    }
}

/// Lifecycle of a single flash job
///
/// ```text
/// NotStarted -> CommandBuilt -> Spawned -> Streaming -> Exited -> Succeeded | Failed
/// NotStarted -> PreconditionFailed
/// Spawned -> LaunchFailed -> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    NotStarted,
    PreconditionFailed,
    CommandBuilt,
    Spawned,
    LaunchFailed,
    Streaming,
    Exited,
    /// Terminal
    Succeeded,
    /// Terminal
    Failed,
}

impl JobState {
    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (NotStarted, CommandBuilt)
                | (NotStarted, PreconditionFailed)
                | (CommandBuilt, Spawned)
                | (CommandBuilt, LaunchFailed)
                | (Spawned, Streaming)
                | (Spawned, LaunchFailed)
                | (Streaming, Exited)
                | (Streaming, LaunchFailed)
                | (Exited, Succeeded)
                | (Exited, Failed)
                | (Exited, LaunchFailed)
                | (LaunchFailed, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::PreconditionFailed
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::NotStarted => "not_started",
            JobState::PreconditionFailed => "precondition_failed",
            JobState::CommandBuilt => "command_built",
            JobState::Spawned => "spawned",
            JobState::LaunchFailed => "launch_failed",
            JobState::Streaming => "streaming",
            JobState::Exited => "exited",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_programmer_lines_are_prefixed() {
        let event = LogEvent::programmer("Info : clock speed 2000 kHz");
        assert_eq!(event.message(), "OpenOCD: Info : clock speed 2000 kHz");
        assert_eq!(event.line(), "Info : clock speed 2000 kHz");

        let event = LogEvent::engine("RUN: openocd -f a.cfg");
        assert_eq!(event.message(), "RUN: openocd -f a.cfg");
    }

    #[test]
    fn test_exit_code_mapping() {
        let ok = OutcomeEvent::from_exit_code(0);
        assert!(ok.success);
        assert_eq!(ok.message, SUCCESS_MESSAGE);

        let failed = OutcomeEvent::from_exit_code(3);
        assert!(!failed.success);
        assert!(failed.message.contains('3'));
        assert_eq!(failed.exit_code, Some(3));

        let negative = OutcomeEvent::from_exit_code(-1);
        assert!(!negative.success);
        assert!(negative.message.contains("-1"));
    }

    #[test]
    fn test_state_transitions() {
        assert!(JobState::NotStarted.can_transition_to(JobState::CommandBuilt));
        assert!(JobState::NotStarted.can_transition_to(JobState::PreconditionFailed));
        assert!(JobState::Spawned.can_transition_to(JobState::LaunchFailed));
        assert!(JobState::LaunchFailed.can_transition_to(JobState::Failed));
        assert!(!JobState::Spawned.can_transition_to(JobState::Exited));
        assert!(!JobState::Succeeded.can_transition_to(JobState::Failed));
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Streaming.is_terminal());
        assert_eq!(JobState::CommandBuilt.to_string(), "command_built");
    }
}
