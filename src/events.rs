//! Event and state vocabulary published by the process supervisor.

/// Lifecycle state of the helper child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessState {
    #[default]
    NotRunning,
    Starting,
    Running,
}

/// Error kinds recorded by the supervisor.
///
/// Stays [`ProcessError::Unknown`] until an event reclassifies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessError {
    /// The helper or interpreter path does not exist, is not executable,
    /// or the spawn itself failed.
    FailedToStart,
    /// The child terminated abnormally (killed or signalled).
    Crashed,
    /// A `wait_started`/`wait_finished` budget expired.
    TimedOut,
    /// I/O failure reading from the child's pipes.
    ReadError,
    /// I/O failure writing to the child's stdin.
    WriteError,
    #[default]
    Unknown,
}

/// How the child process exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitStatus {
    #[default]
    Normal,
    Crash,
}

/// Events delivered on the supervisor's subscription channel.
#[derive(Debug, Clone)]
pub enum ExifToolEvent {
    /// The child process has been spawned.
    Started,
    /// The child's lifecycle state changed.
    StateChanged(ProcessState),
    /// An error was recorded; details via `error()` / `error_string()`.
    ErrorOccurred(ProcessError),
    /// The child exited.
    Finished {
        exit_code: i32,
        exit_status: ExitStatus,
    },
    /// Both output channels of one command have been fully framed and
    /// correlated.
    CommandCompleted {
        id: u32,
        elapsed_ms: u64,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },
}
