//! Supervisor for a persistent ExifTool child process.
//!
//! The child is launched once with `-stay_open true -@ -` and then fed
//! newline-delimited argument scripts on stdin, one command at a time.
//! Responses come back interleaved on stdout and stderr, framed by
//! `{await<id>}` / `{ready}` sentinel lines; a reader thread per channel
//! feeds the [`ChannelFrame`] state machines and a completion event is
//! published once both channels agree on the command id.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, warn};

use crate::command::{build_script, next_command_id, Command};
use crate::events::{ExifToolEvent, ExitStatus, ProcessError, ProcessState};
use crate::framing::ChannelFrame;

const CHAN_OUT: usize = 0;
const CHAN_ERR: usize = 1;

const REAP_INTERVAL: Duration = Duration::from_millis(15);

/// Drives one `exiftool -stay_open true -@ -` child process.
///
/// Commands are queued FIFO and dispatched in lock-step: the next script
/// is only written once both output channels of the current command have
/// produced their `{ready}` marker. Lifecycle and completion are
/// reported through the channel returned by [`ExifToolProcess::events`];
/// the synchronous surface only ever returns booleans or the reserved
/// command id `0`.
///
/// Known limitation: with `-binary` the payload itself may contain a
/// line ending in `{ready}`, which would truncate the frame early. The
/// stay-open protocol offers no way to escape the sentinel.
///
/// # Examples
///
/// ```no_run
/// use exiftool_process::{ExifToolEvent, ExifToolProcess};
///
/// let process = ExifToolProcess::new();
/// process.set_program("/usr/bin/exiftool", None);
/// let events = process.events();
///
/// process.start();
/// assert!(process.wait_started(500));
///
/// let id = process.command(&["-json", "-n", "image.jpg"]);
/// assert_ne!(id, 0);
///
/// for event in events {
///     if let ExifToolEvent::CommandCompleted { id: done, stdout, .. } = event {
///         if done == id {
///             println!("{}", String::from_utf8_lossy(&stdout));
///             break;
///         }
///     }
/// }
/// ```
pub struct ExifToolProcess {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<ProcState>,
    cond: Condvar,
    subscribers: Mutex<Vec<Sender<ExifToolEvent>>>,
}

struct ProcState {
    et_path: PathBuf,
    interpreter_path: Option<PathBuf>,

    state: ProcessState,
    // Bumped on every spawn; service threads of older incarnations
    // check it and bow out instead of touching fresh state.
    generation: u64,
    start_failed: bool,
    write_closed: bool,

    stdin: Option<ChildStdin>,
    child: Option<Child>,
    pid: Option<u32>,

    queue: VecDeque<Command>,
    running_id: u32,
    exec_start: Option<Instant>,
    frames: [ChannelFrame; 2],

    error: ProcessError,
    error_string: String,
    exit_code: i32,
    exit_status: ExitStatus,
}

impl ProcState {
    fn new() -> Self {
        Self {
            et_path: PathBuf::new(),
            interpreter_path: None,
            state: ProcessState::NotRunning,
            generation: 0,
            start_failed: false,
            write_closed: true,
            stdin: None,
            child: None,
            pid: None,
            queue: VecDeque::new(),
            running_id: 0,
            exec_start: None,
            frames: [ChannelFrame::default(), ChannelFrame::default()],
            error: ProcessError::Unknown,
            error_string: String::new(),
            exit_code: 0,
            exit_status: ExitStatus::Normal,
        }
    }
}

impl ExifToolProcess {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ProcState::new()),
                cond: Condvar::new(),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Sets the helper executable, and optionally an interpreter to run
    /// it through (for script helpers). Refused while the child runs.
    pub fn set_program(&self, helper: impl AsRef<Path>, interpreter: Option<&Path>) {
        let mut st = self.shared.lock_state();
        if st.state != ProcessState::NotRunning {
            warn!("set_program(): ExifTool is already running");
            return;
        }
        st.et_path = helper.as_ref().to_path_buf();
        st.interpreter_path = interpreter.map(Path::to_path_buf);
    }

    pub fn program(&self) -> PathBuf {
        self.shared.lock_state().et_path.clone()
    }

    /// Subscribes to the event stream. Every subscriber receives every
    /// event published after this call.
    pub fn events(&self) -> Receiver<ExifToolEvent> {
        let (tx, rx) = mpsc::channel();
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Spawns the helper in stay-open mode.
    ///
    /// Verifies that the helper (and interpreter, if set) exists and is
    /// executable first; a failed check records *FailedToStart* and
    /// publishes an error event without spawning anything. On success
    /// the queue and any prior error are cleared and the write channel
    /// reopens.
    pub fn start(&self) {
        let mut st = self.shared.lock_state();

        if st.state != ProcessState::NotRunning {
            warn!("start(): ExifTool is already running");
            return;
        }
        st.start_failed = false;

        if !is_executable(&st.et_path) {
            let message = format!(
                "ExifTool does not exist or exec permission is missing ({})",
                st.et_path.display()
            );
            self.shared.fail_start(&mut st, message);
            return;
        }

        let mut program = st.et_path.clone();
        let mut args: Vec<OsString> = Vec::new();

        if let Some(interpreter) = st.interpreter_path.clone() {
            if !is_executable(&interpreter) {
                let message = format!(
                    "Interpreter does not exist or exec permission is missing ({})",
                    interpreter.display()
                );
                self.shared.fail_start(&mut st, message);
                return;
            }
            args.push(program.into_os_string());
            program = interpreter;
        }

        args.extend(["-stay_open", "true", "-@", "-"].map(OsString::from));

        // Fresh session: drop leftovers from the previous one.
        st.queue.clear();
        st.running_id = 0;
        st.error = ProcessError::Unknown;
        st.error_string.clear();

        self.shared.set_state(&mut st, ProcessState::Starting);

        let spawned = std::process::Command::new(&program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                self.shared.set_state(&mut st, ProcessState::NotRunning);
                let message = format!("Failed to start {}: {e}", program.display());
                self.shared.fail_start(&mut st, message);
                return;
            }
        };

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.kill();
            self.shared.set_state(&mut st, ProcessState::NotRunning);
            self.shared
                .fail_start(&mut st, "Failed to capture ExifTool stdio pipes".to_string());
            return;
        };

        st.generation += 1;
        let generation = st.generation;
        st.pid = Some(child.id());
        st.stdin = Some(stdin);
        st.child = Some(child);
        st.write_closed = false;

        debug!("ExifTool process started (pid {:?})", st.pid);
        self.shared.set_state(&mut st, ProcessState::Running);
        self.shared.emit(ExifToolEvent::Started);
        drop(st);

        let shared = Arc::clone(&self.shared);
        thread::spawn(move || reader_loop(shared, generation, stdout, CHAN_OUT));
        let shared = Arc::clone(&self.shared);
        thread::spawn(move || reader_loop(shared, generation, stderr, CHAN_ERR));
        let shared = Arc::clone(&self.shared);
        thread::spawn(move || waiter_loop(shared, generation));
    }

    /// Shuts the helper down gracefully: drops queued commands, writes
    /// `-stay_open false` and closes the write channel. If no child is
    /// running, falls back to OS-level termination.
    pub fn terminate(&self) {
        let mut st = self.shared.lock_state();

        if st.state == ProcessState::Running {
            st.queue.clear();
            if let Some(mut stdin) = st.stdin.take() {
                if let Err(e) = stdin.write_all(b"-stay_open\nfalse\n") {
                    warn!("terminate(): failed to write stay_open false: {e}");
                }
                // Dropping the handle closes the write channel.
            }
            st.write_closed = true;
        } else if let Some(child) = st.child.as_mut() {
            terminate_child(child);
        }
    }

    /// Destroys the child unconditionally (SIGKILL or equivalent).
    /// Queued commands are dropped without events.
    pub fn kill(&self) {
        let mut st = self.shared.lock_state();
        st.queue.clear();
        if let Some(child) = st.child.as_mut() {
            if let Err(e) = child.kill() {
                warn!("kill(): failed to kill ExifTool process: {e}");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock_state().state == ProcessState::Running
    }

    /// True while a command is in flight.
    pub fn is_busy(&self) -> bool {
        self.shared.lock_state().running_id != 0
    }

    pub fn process_id(&self) -> Option<u32> {
        self.shared.lock_state().pid
    }

    pub fn state(&self) -> ProcessState {
        self.shared.lock_state().state
    }

    pub fn error(&self) -> ProcessError {
        self.shared.lock_state().error
    }

    pub fn error_string(&self) -> String {
        self.shared.lock_state().error_string.clone()
    }

    pub fn exit_code(&self) -> i32 {
        self.shared.lock_state().exit_code
    }

    pub fn exit_status(&self) -> ExitStatus {
        self.shared.lock_state().exit_status
    }

    /// Blocks until the child has started, the pending start is known to
    /// have failed, or `msecs` elapsed. An expired budget records the
    /// *TimedOut* error kind; no event is published for it.
    pub fn wait_started(&self, msecs: u64) -> bool {
        let st = self.shared.lock_state();
        let (mut st, _) = self
            .shared
            .cond
            .wait_timeout_while(st, Duration::from_millis(msecs), |s| {
                s.state != ProcessState::Running && !s.start_failed
            })
            .unwrap_or_else(PoisonError::into_inner);

        if st.state == ProcessState::Running {
            return true;
        }
        if !st.start_failed {
            st.error = ProcessError::TimedOut;
            st.error_string = "timed out waiting for ExifTool to start".to_string();
        }
        false
    }

    /// Blocks until the child has exited or `msecs` elapsed. Returns
    /// false immediately when nothing is running.
    pub fn wait_finished(&self, msecs: u64) -> bool {
        let st = self.shared.lock_state();
        if st.state == ProcessState::NotRunning {
            return false;
        }
        let (mut st, _) = self
            .shared
            .cond
            .wait_timeout_while(st, Duration::from_millis(msecs), |s| {
                s.state != ProcessState::NotRunning
            })
            .unwrap_or_else(PoisonError::into_inner);

        if st.state == ProcessState::NotRunning {
            return true;
        }
        st.error = ProcessError::TimedOut;
        st.error_string = "timed out waiting for ExifTool to finish".to_string();
        false
    }

    /// Queues a command for the running helper and returns its id, or
    /// `0` when the helper is not running, the write channel is closed,
    /// or `args` is empty.
    pub fn command(&self, args: &[&str]) -> u32 {
        let mut st = self.shared.lock_state();

        if st.state != ProcessState::Running || st.write_closed || args.is_empty() {
            warn!("command(): cannot process command with ExifTool {args:?}");
            return 0;
        }

        let id = next_command_id();
        let script = build_script(id, args);
        st.queue.push_back(Command { id, script });

        self.shared.exec_next_cmd(&mut st);
        id
    }
}

impl Default for ExifToolProcess {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ExifToolProcess {
    fn drop(&mut self) {
        let mut st = self.shared.lock_state();
        if let Some(mut stdin) = st.stdin.take() {
            let _ = stdin.write_all(b"-stay_open\nfalse\n");
        }
        st.write_closed = true;
        if let Some(mut child) = st.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        st.pid = None;
        st.state = ProcessState::NotRunning;
        self.shared.cond.notify_all();
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, ProcState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ExifToolEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn set_state(&self, st: &mut ProcState, new_state: ProcessState) {
        if st.state == new_state {
            return;
        }
        st.state = new_state;
        self.cond.notify_all();
        self.emit(ExifToolEvent::StateChanged(new_state));
    }

    fn record_error(&self, st: &mut ProcState, kind: ProcessError, message: String) {
        st.error = kind;
        st.error_string = message;
        self.cond.notify_all();
        self.emit(ExifToolEvent::ErrorOccurred(kind));
    }

    fn fail_start(&self, st: &mut ProcState, message: String) {
        st.start_failed = true;
        self.record_error(st, ProcessError::FailedToStart, message);
    }

    /// Writes the queue head to the child if no command is in flight.
    fn exec_next_cmd(&self, st: &mut ProcState) {
        if st.state != ProcessState::Running || st.write_closed {
            warn!("exec_next_cmd(): ExifTool is not running");
            return;
        }
        if st.running_id != 0 || st.queue.is_empty() {
            return;
        }

        // New frame: whatever still trickles in for the old one is
        // dropped by the reset state machines.
        st.frames[CHAN_OUT].reset();
        st.frames[CHAN_ERR].reset();

        let Some(command) = st.queue.pop_front() else {
            return;
        };
        st.exec_start = Some(Instant::now());
        st.running_id = command.id;

        if let Some(stdin) = st.stdin.as_mut() {
            if let Err(e) = stdin.write_all(&command.script).and_then(|()| stdin.flush()) {
                warn!("exec_next_cmd(): write to ExifTool failed: {e}");
                st.running_id = 0;
                self.record_error(
                    st,
                    ProcessError::WriteError,
                    format!("write to ExifTool stdin failed: {e}"),
                );
            }
        }
    }

    /// Runs one channel's framing step and fires completion once both
    /// channels are ready.
    fn handle_line(&self, st: &mut ProcState, channel: usize, line: &mut Vec<u8>) {
        if st.frames[channel].push_line(line) {
            self.try_complete(st);
        }
    }

    fn try_complete(&self, st: &mut ProcState) {
        if !(st.frames[CHAN_OUT].is_ready() && st.frames[CHAN_ERR].is_ready()) {
            return;
        }

        let out_awaited = st.frames[CHAN_OUT].awaited();
        let err_awaited = st.frames[CHAN_ERR].awaited();

        if out_awaited != Some(st.running_id) || err_awaited != Some(st.running_id) {
            error!(
                "sync error between command id {}, stdout channel {:?} and stderr channel {:?}",
                st.running_id, out_awaited, err_awaited
            );
        } else {
            let elapsed_ms = st
                .exec_start
                .map(|start| start.elapsed().as_millis() as u64)
                .unwrap_or(0);
            debug!(
                "ExifTool command {} completed in {} ms",
                st.running_id, elapsed_ms
            );
            let stdout = st.frames[CHAN_OUT].take_buffer();
            let stderr = st.frames[CHAN_ERR].take_buffer();
            self.emit(ExifToolEvent::CommandCompleted {
                id: st.running_id,
                elapsed_ms,
                stdout,
                stderr,
            });
        }

        st.running_id = 0;
        self.exec_next_cmd(st);
    }

    fn handle_exit(&self, st: &mut ProcState, status: std::process::ExitStatus) {
        st.running_id = 0;
        st.queue.clear();
        st.stdin = None;
        st.child = None;
        st.pid = None;
        st.write_closed = true;

        st.exit_code = status.code().unwrap_or(-1);
        st.exit_status = if status.code().is_some() {
            ExitStatus::Normal
        } else {
            ExitStatus::Crash
        };

        debug!(
            "ExifTool process finished: code {} status {:?}",
            st.exit_code, st.exit_status
        );

        self.set_state(st, ProcessState::NotRunning);
        self.emit(ExifToolEvent::Finished {
            exit_code: st.exit_code,
            exit_status: st.exit_status,
        });

        if st.exit_status == ExitStatus::Crash {
            self.record_error(
                st,
                ProcessError::Crashed,
                "ExifTool process crashed".to_string(),
            );
        }
    }
}

fn reader_loop<R: std::io::Read>(shared: Arc<Shared>, generation: u64, pipe: R, channel: usize) {
    let channel_name = if channel == CHAN_OUT { "stdout" } else { "stderr" };
    let mut reader = BufReader::new(pipe);
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            // EOF: the waiter reaps the child and reports the exit.
            Ok(0) => break,
            Ok(_) => {
                let mut st = shared.lock_state();
                if st.generation != generation {
                    break;
                }
                shared.handle_line(&mut st, channel, &mut line);
            }
            Err(e) => {
                let mut st = shared.lock_state();
                if st.generation == generation {
                    shared.record_error(
                        &mut st,
                        ProcessError::ReadError,
                        format!("read error on ExifTool {channel_name}: {e}"),
                    );
                }
                break;
            }
        }
    }
}

fn waiter_loop(shared: Arc<Shared>, generation: u64) {
    loop {
        {
            let mut st = shared.lock_state();
            if st.generation != generation {
                return;
            }
            let Some(child) = st.child.as_mut() else {
                return;
            };
            match child.try_wait() {
                Ok(Some(status)) => {
                    shared.handle_exit(&mut st, status);
                    return;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("failed to poll ExifTool child: {e}");
                    return;
                }
            }
        }
        thread::sleep(REAP_INTERVAL);
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(unix)]
fn terminate_child(child: &mut Child) {
    let _ = unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGTERM) };
}

#[cfg(not(unix))]
fn terminate_child(child: &mut Child) {
    let _ = child.kill();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_helpers::{stub_helper, StubOptions};
    use std::sync::mpsc::RecvTimeoutError;
    use tempfile::TempDir;

    const EVENT_BUDGET: Duration = Duration::from_secs(5);

    fn wait_for_completion(events: &Receiver<ExifToolEvent>, id: u32) -> (Vec<u8>, Vec<u8>) {
        let deadline = Instant::now() + EVENT_BUDGET;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match events.recv_timeout(remaining) {
                Ok(ExifToolEvent::CommandCompleted {
                    id: done,
                    stdout,
                    stderr,
                    ..
                }) if done == id => return (stdout, stderr),
                Ok(_) => {}
                Err(e) => panic!("no completion for command {id}: {e}"),
            }
        }
    }

    fn drain_completions(events: &Receiver<ExifToolEvent>, window: Duration) -> Vec<u32> {
        let deadline = Instant::now() + window;
        let mut completed = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match events.recv_timeout(remaining) {
                Ok(ExifToolEvent::CommandCompleted { id, .. }) => completed.push(id),
                Ok(_) => {}
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return completed
                }
            }
        }
    }

    #[test]
    fn test_command_refused_when_not_running() {
        let process = ExifToolProcess::new();
        let events = process.events();

        assert_eq!(process.command(&["-json", "-n", "a.jpg"]), 0);
        assert_eq!(process.state(), ProcessState::NotRunning);
        assert!(events.try_recv().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_refused_for_empty_args() {
        let dir = TempDir::new().expect("tempdir");
        let stub = stub_helper(&dir, &StubOptions::default());

        let process = ExifToolProcess::new();
        process.set_program(&stub, None);
        process.start();
        assert!(process.wait_started(2000));
        assert_eq!(process.command(&[]), 0);
    }

    #[test]
    fn test_start_failure_for_missing_helper() {
        let process = ExifToolProcess::new();
        process.set_program("/nonexistent/exiftool", None);
        let events = process.events();

        process.start();

        assert!(!process.is_running());
        assert_eq!(process.error(), ProcessError::FailedToStart);
        assert!(!process.error_string().is_empty());
        assert!(!process.wait_started(100));
        assert!(matches!(
            events.try_recv(),
            Ok(ExifToolEvent::ErrorOccurred(ProcessError::FailedToStart))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_single_command_completes() {
        let dir = TempDir::new().expect("tempdir");
        let stub = stub_helper(
            &dir,
            &StubOptions {
                body: r#"[{"SourceFile":"a.jpg"}]"#.to_string(),
                ..StubOptions::default()
            },
        );

        let process = ExifToolProcess::new();
        process.set_program(&stub, None);
        let events = process.events();

        process.start();
        assert!(process.wait_started(2000));
        assert!(process.is_running());
        assert!(process.process_id().is_some());

        let id = process.command(&["-json", "-n", "a.jpg"]);
        assert_ne!(id, 0);

        let (stdout, stderr) = wait_for_completion(&events, id);
        assert_eq!(stdout, b"[{\"SourceFile\":\"a.jpg\"}]\n");
        assert_eq!(stderr, b"");
        assert!(!process.is_busy());
    }

    #[cfg(unix)]
    #[test]
    fn test_queued_commands_complete_in_order() {
        let dir = TempDir::new().expect("tempdir");
        let stub = stub_helper(
            &dir,
            &StubOptions {
                body: "{}".to_string(),
                delay: "0.3".to_string(),
                ..StubOptions::default()
            },
        );

        let process = ExifToolProcess::new();
        process.set_program(&stub, None);
        let events = process.events();

        process.start();
        assert!(process.wait_started(2000));

        let first = process.command(&["-json", "a.jpg"]);
        let second = process.command(&["-json", "b.jpg"]);
        assert_ne!(first, 0);
        assert_ne!(second, 0);
        assert!(process.is_busy());

        let (_, _) = wait_for_completion(&events, first);
        let (_, _) = wait_for_completion(&events, second);
    }

    #[cfg(unix)]
    #[test]
    fn test_channel_desync_drops_completion() {
        let dir = TempDir::new().expect("tempdir");
        let stub = stub_helper(
            &dir,
            &StubOptions {
                body: "{}".to_string(),
                desync_first: true,
                ..StubOptions::default()
            },
        );

        let process = ExifToolProcess::new();
        process.set_program(&stub, None);
        let events = process.events();

        process.start();
        assert!(process.wait_started(2000));

        let first = process.command(&["-json", "a.jpg"]);
        assert_ne!(first, 0);

        // The mismatched await id drops the command without completion.
        let completed = drain_completions(&events, Duration::from_millis(1500));
        assert!(completed.is_empty(), "unexpected completions: {completed:?}");
        assert!(!process.is_busy());

        // The supervisor went back to idle and serves the next command.
        let second = process.command(&["-json", "b.jpg"]);
        assert_ne!(second, 0);
        let (stdout, _) = wait_for_completion(&events, second);
        assert_eq!(stdout, b"{}\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_drops_queued_command() {
        let dir = TempDir::new().expect("tempdir");
        let stub = stub_helper(
            &dir,
            &StubOptions {
                body: "{}".to_string(),
                delay: "0.5".to_string(),
                ..StubOptions::default()
            },
        );

        let process = ExifToolProcess::new();
        process.set_program(&stub, None);
        let events = process.events();

        process.start();
        assert!(process.wait_started(2000));

        let in_flight = process.command(&["-json", "a.jpg"]);
        let queued = process.command(&["-json", "b.jpg"]);
        assert_ne!(in_flight, 0);
        assert_ne!(queued, 0);

        thread::sleep(Duration::from_millis(100));
        process.terminate();

        assert!(process.wait_finished(5000));
        assert_eq!(process.exit_status(), ExitStatus::Normal);

        // The queued command was dropped without an event; submissions
        // after the shutdown are refused.
        let completed = drain_completions(&events, Duration::from_millis(500));
        assert!(!completed.contains(&queued));
        assert_eq!(process.command(&["-json", "c.jpg"]), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_kill_drops_queued_command() {
        let dir = TempDir::new().expect("tempdir");
        let stub = stub_helper(
            &dir,
            &StubOptions {
                body: "{}".to_string(),
                delay: "0.5".to_string(),
                ..StubOptions::default()
            },
        );

        let process = ExifToolProcess::new();
        process.set_program(&stub, None);
        let events = process.events();

        process.start();
        assert!(process.wait_started(2000));

        let in_flight = process.command(&["-json", "a.jpg"]);
        let queued = process.command(&["-json", "b.jpg"]);
        assert_ne!(in_flight, 0);
        assert_ne!(queued, 0);

        thread::sleep(Duration::from_millis(100));
        process.kill();

        assert!(process.wait_finished(5000));
        assert_eq!(process.exit_status(), ExitStatus::Crash);

        // Both the in-flight and the queued command are dropped without
        // completion events; submissions after the kill are refused.
        let completed = drain_completions(&events, Duration::from_millis(500));
        assert!(completed.is_empty(), "unexpected completions: {completed:?}");
        assert_eq!(process.command(&["-json", "c.jpg"]), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_kill_reports_crash() {
        let dir = TempDir::new().expect("tempdir");
        let stub = stub_helper(&dir, &StubOptions::default());

        let process = ExifToolProcess::new();
        process.set_program(&stub, None);
        let events = process.events();

        process.start();
        assert!(process.wait_started(2000));

        process.kill();
        assert!(process.wait_finished(5000));
        assert_eq!(process.exit_status(), ExitStatus::Crash);
        assert_eq!(process.error(), ProcessError::Crashed);

        let saw_crash = events.try_iter().any(|event| {
            matches!(event, ExifToolEvent::ErrorOccurred(ProcessError::Crashed))
        });
        assert!(saw_crash);
    }

    #[cfg(unix)]
    #[test]
    fn test_interpreter_launch() {
        let dir = TempDir::new().expect("tempdir");
        let stub = stub_helper(
            &dir,
            &StubOptions {
                body: "interpreted".to_string(),
                ..StubOptions::default()
            },
        );

        let process = ExifToolProcess::new();
        process.set_program(&stub, Some(Path::new("/bin/sh")));
        let events = process.events();

        process.start();
        assert!(process.wait_started(2000));

        let id = process.command(&["-json", "a.jpg"]);
        let (stdout, _) = wait_for_completion(&events, id);
        assert_eq!(stdout, b"interpreted\n");
    }

    #[test]
    fn test_wait_finished_idle_returns_false() {
        let process = ExifToolProcess::new();
        assert!(!process.wait_finished(50));
    }

    #[test]
    fn test_wait_started_timeout_records_error() {
        let process = ExifToolProcess::new();
        assert!(!process.wait_started(50));
        assert_eq!(process.error(), ProcessError::TimedOut);
    }
}
