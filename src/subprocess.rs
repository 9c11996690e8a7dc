//! Subprocess monitor
//!
//! Children are started with piped stdout and stderr. Once entrusted to the
//! [`SubprocessMonitor`], their output is collected (and logged when the
//! pipe hangs up), their windows are correlated by client pid, and they are
//! reaped when SIGCHLD arrives. The caller may [`cede`](SubprocessMonitor::cede)
//! its interest at any time; the monitor keeps watching the child until it
//! terminates.
//!
//! Callbacks run synchronously on the event-loop thread and must not call
//! back into the monitor.

use calloop::generic::Generic;
use calloop::{Interest, LoopHandle, Mode, PostAction};
use log::{debug, info, warn};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::rc::Rc;
use thiserror::Error;

use crate::action::{split_command_line, CommandLineError};
use crate::toolkit::root::WindowInfo;
use crate::toolkit::WindowId;

pub type Pid = libc::pid_t;

/// Caller-provided sink for a child's output.
pub type OutputBuffer = Rc<RefCell<Vec<u8>>>;

pub type WindowCallback = Box<dyn FnMut(&WindowInfo)>;
pub type TerminationCallback = Box<dyn FnMut(Pid, Termination)>;

#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("cannot start \"{command}\": {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    CommandLine(#[from] CommandLineError),

    #[error("cannot watch child output: {0}")]
    EventLoop(String),
}

/// How a child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(i32),
    Signaled(i32),
}

impl From<ExitStatus> for Termination {
    fn from(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => Termination::Exited(code),
            (None, Some(signal)) => Termination::Signaled(signal),
            (None, None) => Termination::Exited(-1),
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Exited(code) => write!(f, "exited with status {}", code),
            Termination::Signaled(signal) => write!(f, "killed by signal {}", signal),
        }
    }
}

#[derive(Default)]
pub struct SubprocessCallbacks {
    pub window_created: Option<WindowCallback>,
    pub window_mapped: Option<WindowCallback>,
    pub window_unmapped: Option<WindowCallback>,
    pub window_destroyed: Option<WindowCallback>,
    pub terminated: Option<TerminationCallback>,
}

impl fmt::Debug for SubprocessCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubprocessCallbacks")
            .field("window_created", &self.window_created.is_some())
            .field("window_mapped", &self.window_mapped.is_some())
            .field("window_unmapped", &self.window_unmapped.is_some())
            .field("window_destroyed", &self.window_destroyed.is_some())
            .field("terminated", &self.terminated.is_some())
            .finish()
    }
}

fn fire(callback: &mut Option<WindowCallback>, info: &WindowInfo) {
    if let Some(callback) = callback.as_mut() {
        callback(info);
    }
}

/// Which pipe of a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Whether a pipe still has a writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    Open,
    Closed,
}

/// Identifies an entrusted subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubprocessId(u64);

impl fmt::Display for SubprocessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subprocess#{}", self.0)
    }
}

/// `/bin/sh -c <line>`.
pub fn shell_command(line: &str) -> Command {
    let mut command = Command::new("/bin/sh");
    command.arg("-c").arg(line);
    command
}

/// The command line split into words and run directly.
pub fn exec_command(line: &str) -> Result<Command, SubprocessError> {
    let words = split_command_line(line)?;
    let mut command = Command::new(&words[0]);
    command.args(&words[1..]);
    Ok(command)
}

fn set_nonblocking(file: &File) -> std::io::Result<()> {
    let fd = file.as_raw_fd();
    // SAFETY: `fd` is owned by `file` and stays open for the duration of
    // both calls.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

#[derive(Debug)]
struct Pipe {
    file: File,
    pending: Vec<u8>,
}

/// A started child, not yet watched.
#[derive(Debug)]
pub struct Subprocess {
    child: Child,
    command: String,
    stdout: Option<Pipe>,
    stderr: Option<Pipe>,
    buffer: Option<OutputBuffer>,
}

impl Subprocess {
    /// Starts `command` with stdin closed and stdout/stderr piped.
    pub fn spawn(mut command: Command) -> Result<Self, SubprocessError> {
        let description = format!("{:?}", command);
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SubprocessError::Spawn {
                command: description.clone(),
                source,
            })?;
        let stdout = child.stdout.take().map(|out| File::from(OwnedFd::from(out)));
        let stderr = child.stderr.take().map(|err| File::from(OwnedFd::from(err)));
        let pipe = |file: Option<File>| -> Option<Pipe> {
            let file = file?;
            if let Err(err) = set_nonblocking(&file) {
                warn!("{}: cannot make pipe non-blocking: {}", description, err);
            }
            Some(Pipe {
                file,
                pending: Vec::new(),
            })
        };
        let (stdout, stderr) = (pipe(stdout), pipe(stderr));
        info!("🚀 Started {} (pid {})", description, child.id());
        Ok(Self {
            child,
            command: description,
            stdout,
            stderr,
            buffer: None,
        })
    }

    pub fn pid(&self) -> Pid {
        self.child.id() as Pid
    }

    /// Sends output to `buffer` instead of the log.
    pub fn with_buffer(mut self, buffer: OutputBuffer) -> Self {
        self.buffer = Some(buffer);
        self
    }

    fn pipe_mut(&mut self, stream: Stream) -> &mut Option<Pipe> {
        match stream {
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        }
    }

    /// Reads what is available without blocking.
    fn read(&mut self, stream: Stream) -> ReadStatus {
        let pid = self.pid();
        let Some(pipe) = self.pipe_mut(stream).as_mut() else {
            return ReadStatus::Closed;
        };
        let mut chunk = [0u8; 4096];
        let status = loop {
            match pipe.file.read(&mut chunk) {
                Ok(0) => break ReadStatus::Closed,
                Ok(n) => pipe.pending.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::WouldBlock => break ReadStatus::Open,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    debug!("pid {}: reading {:?}: {}", pid, stream, err);
                    break ReadStatus::Closed;
                }
            }
        };
        if status == ReadStatus::Closed {
            if let Some(pipe) = self.pipe_mut(stream).take() {
                self.flush(stream, pipe.pending);
            }
        }
        status
    }

    fn flush(&self, stream: Stream, bytes: Vec<u8>) {
        if bytes.is_empty() {
            return;
        }
        if let Some(buffer) = &self.buffer {
            buffer.borrow_mut().extend_from_slice(&bytes);
            return;
        }
        let tag = match stream {
            Stream::Stdout => "out",
            Stream::Stderr => "err",
        };
        for line in String::from_utf8_lossy(&bytes).lines() {
            info!("[{} {}] {}", self.pid(), tag, line);
        }
    }

    /// Reads what is left and closes both pipes. A pipe still open after
    /// the child exited is held by a grandchild; it is not waited for.
    fn drain(&mut self) {
        for stream in [Stream::Stdout, Stream::Stderr] {
            if self.read(stream) == ReadStatus::Open {
                if let Some(pipe) = self.pipe_mut(stream).take() {
                    self.flush(stream, pipe.pending);
                }
            }
        }
    }
}

#[derive(Debug)]
struct TrackedWindow {
    info: WindowInfo,
    mapped: bool,
}

#[derive(Debug)]
struct Monitored {
    process: Subprocess,
    callbacks: SubprocessCallbacks,
    windows: Vec<TrackedWindow>,
    ceded: bool,
}

#[derive(Debug, Default)]
pub struct SubprocessMonitor {
    processes: HashMap<SubprocessId, Monitored>,
    by_window: HashMap<WindowId, SubprocessId>,
    next_id: u64,
}

impl SubprocessMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn pid(&self, id: SubprocessId) -> Option<Pid> {
        self.processes.get(&id).map(|m| m.process.pid())
    }

    pub fn is_ceded(&self, id: SubprocessId) -> bool {
        self.processes.get(&id).map_or(false, |m| m.ceded)
    }

    /// Windows correlated with the subprocess.
    pub fn windows(&self, id: SubprocessId) -> Vec<WindowId> {
        self.processes
            .get(&id)
            .map(|m| m.windows.iter().map(|w| w.info.id).collect())
            .unwrap_or_default()
    }

    /// Takes ownership of a started child.
    pub fn entrust(&mut self, process: Subprocess, callbacks: SubprocessCallbacks) -> SubprocessId {
        self.next_id += 1;
        let id = SubprocessId(self.next_id);
        debug!("{} is pid {}", id, process.pid());
        self.processes.insert(
            id,
            Monitored {
                process,
                callbacks,
                windows: Vec::new(),
                ceded: false,
            },
        );
        id
    }

    /// Spawns and entrusts in one go, for fire-and-forget launches.
    pub fn launch(&mut self, command: Command) -> Result<SubprocessId, SubprocessError> {
        let process = Subprocess::spawn(command)?;
        let id = self.entrust(process, SubprocessCallbacks::default());
        self.cede(id);
        Ok(id)
    }

    /// Releases the caller's interest. Windows still mapped or alive get
    /// their unmapped and destroyed callbacks now; the child stays watched
    /// until it terminates.
    pub fn cede(&mut self, id: SubprocessId) {
        let Some(monitored) = self.processes.get_mut(&id) else {
            return;
        };
        if monitored.ceded {
            return;
        }
        for window in monitored.windows.drain(..) {
            if window.mapped {
                fire(&mut monitored.callbacks.window_unmapped, &window.info);
            }
            fire(&mut monitored.callbacks.window_destroyed, &window.info);
            self.by_window.remove(&window.info.id);
        }
        monitored.callbacks = SubprocessCallbacks::default();
        monitored.ceded = true;
        debug!("{} ceded", id);
    }

    fn tracked(&mut self, window: WindowId) -> Option<(&mut Monitored, usize)> {
        let id = self.by_window.get(&window)?;
        let monitored = self.processes.get_mut(id)?;
        let index = monitored.windows.iter().position(|w| w.info.id == window)?;
        Some((monitored, index))
    }

    pub fn window_created(&mut self, info: &WindowInfo) {
        let found = self
            .processes
            .iter_mut()
            .find(|(_, m)| !m.ceded && m.process.pid() == info.client.pid);
        let Some((id, monitored)) = found else {
            return;
        };
        debug!("{} belongs to {}", info.id, id);
        monitored.windows.push(TrackedWindow {
            info: info.clone(),
            mapped: false,
        });
        self.by_window.insert(info.id, *id);
        fire(&mut monitored.callbacks.window_created, info);
    }

    pub fn window_mapped(&mut self, info: &WindowInfo) {
        if let Some((monitored, index)) = self.tracked(info.id) {
            monitored.windows[index].mapped = true;
            fire(&mut monitored.callbacks.window_mapped, info);
        }
    }

    pub fn window_unmapped(&mut self, info: &WindowInfo) {
        if let Some((monitored, index)) = self.tracked(info.id) {
            monitored.windows[index].mapped = false;
            fire(&mut monitored.callbacks.window_unmapped, info);
        }
    }

    pub fn window_destroyed(&mut self, info: &WindowInfo) {
        if let Some((monitored, index)) = self.tracked(info.id) {
            monitored.windows.remove(index);
            fire(&mut monitored.callbacks.window_destroyed, info);
        }
        self.by_window.remove(&info.id);
    }

    /// Reads available output of one pipe.
    pub fn read_output(&mut self, id: SubprocessId, stream: Stream) -> ReadStatus {
        match self.processes.get_mut(&id) {
            Some(monitored) => monitored.process.read(stream),
            None => ReadStatus::Closed,
        }
    }

    /// Reads every open pipe without blocking.
    pub fn poll_output(&mut self) {
        for monitored in self.processes.values_mut() {
            for stream in [Stream::Stdout, Stream::Stderr] {
                monitored.process.read(stream);
            }
        }
    }

    /// Collects every child that terminated, drains its output and runs
    /// its termination callback.
    pub fn reap(&mut self) -> Vec<(SubprocessId, Termination)> {
        let mut finished = Vec::new();
        for (id, monitored) in self.processes.iter_mut() {
            match monitored.process.child.try_wait() {
                Ok(Some(status)) => finished.push((*id, Termination::from(status))),
                Ok(None) => {}
                Err(err) => warn!("{}: waiting failed: {}", id, err),
            }
        }
        for (id, termination) in &finished {
            let Some(mut monitored) = self.processes.remove(id) else {
                continue;
            };
            monitored.process.drain();
            let pid = monitored.process.pid();
            info!("🏁 {} (pid {}) {}", monitored.process.command, pid, termination);
            for window in &monitored.windows {
                self.by_window.remove(&window.info.id);
            }
            if let Some(callback) = monitored.callbacks.terminated.as_mut() {
                callback(pid, *termination);
            }
        }
        finished
    }

    fn pipe_clone(&self, id: SubprocessId, stream: Stream) -> Option<File> {
        let monitored = self.processes.get(&id)?;
        let pipe = match stream {
            Stream::Stdout => monitored.process.stdout.as_ref()?,
            Stream::Stderr => monitored.process.stderr.as_ref()?,
        };
        pipe.file.try_clone().ok()
    }
}

/// Registers readiness sources for a child's pipes with the event loop.
/// Each source reads through the monitor and removes itself on hangup.
pub fn watch_output<D: 'static>(
    monitor: &Rc<RefCell<SubprocessMonitor>>,
    handle: &LoopHandle<'static, D>,
    id: SubprocessId,
) -> Result<(), SubprocessError> {
    for stream in [Stream::Stdout, Stream::Stderr] {
        let Some(file) = monitor.borrow().pipe_clone(id, stream) else {
            continue;
        };
        let monitor = Rc::clone(monitor);
        handle
            .insert_source(
                Generic::new(file, Interest::READ, Mode::Level),
                move |_, _, _: &mut D| match monitor.borrow_mut().read_output(id, stream) {
                    ReadStatus::Open => Ok(PostAction::Continue),
                    ReadStatus::Closed => Ok(PostAction::Remove),
                },
            )
            .map_err(|err| SubprocessError::EventLoop(err.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkit::window::ClientIdentity;
    use std::time::{Duration, Instant};

    fn info(id: u64, pid: Pid) -> WindowInfo {
        WindowInfo {
            id: WindowId::from_raw(id),
            client: ClientIdentity {
                pid,
                ..Default::default()
            },
            title: String::new(),
            app_id: "test".to_string(),
        }
    }

    fn reap_until_done(monitor: &mut SubprocessMonitor) -> Vec<(SubprocessId, Termination)> {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let reaped = monitor.reap();
            if !reaped.is_empty() || Instant::now() > deadline {
                return reaped;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    fn recording_callbacks(log: &Rc<RefCell<Vec<String>>>) -> SubprocessCallbacks {
        let event = |name: &'static str| -> Option<WindowCallback> {
            let log = Rc::clone(log);
            Some(Box::new(move |info: &WindowInfo| {
                log.borrow_mut().push(format!("{} {}", name, info.id))
            }))
        };
        let terminated_log = Rc::clone(log);
        SubprocessCallbacks {
            window_created: event("created"),
            window_mapped: event("mapped"),
            window_unmapped: event("unmapped"),
            window_destroyed: event("destroyed"),
            terminated: Some(Box::new(move |_, termination| {
                terminated_log.borrow_mut().push(termination.to_string())
            })),
        }
    }

    #[test]
    fn test_window_correlation_and_exit_status() {
        let mut monitor = SubprocessMonitor::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let process = Subprocess::spawn(shell_command("exit 0")).unwrap();
        let pid = process.pid();
        let id = monitor.entrust(process, recording_callbacks(&log));

        monitor.window_created(&info(7, pid + 100_000));
        let window = info(1, pid);
        monitor.window_created(&window);
        monitor.window_mapped(&window);
        monitor.window_unmapped(&window);
        monitor.window_destroyed(&window);
        assert!(monitor.windows(id).is_empty());

        let reaped = reap_until_done(&mut monitor);
        assert_eq!(reaped, vec![(id, Termination::Exited(0))]);
        assert!(monitor.is_empty());
        assert_eq!(
            *log.borrow(),
            vec![
                "created window#1",
                "mapped window#1",
                "unmapped window#1",
                "destroyed window#1",
                "exited with status 0",
            ]
        );
    }

    #[test]
    fn test_cede_gives_final_accounting() {
        let mut monitor = SubprocessMonitor::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let process = Subprocess::spawn(shell_command("exit 3")).unwrap();
        let pid = process.pid();
        let id = monitor.entrust(process, recording_callbacks(&log));

        let mapped = info(1, pid);
        let unmapped = info(2, pid);
        monitor.window_created(&mapped);
        monitor.window_mapped(&mapped);
        monitor.window_created(&unmapped);
        monitor.cede(id);
        assert!(monitor.is_ceded(id));

        // Late events and the exit are no longer reported.
        monitor.window_mapped(&unmapped);
        let reaped = reap_until_done(&mut monitor);
        assert_eq!(reaped, vec![(id, Termination::Exited(3))]);
        assert_eq!(
            *log.borrow(),
            vec![
                "created window#1",
                "mapped window#1",
                "created window#2",
                "unmapped window#1",
                "destroyed window#1",
                "destroyed window#2",
            ]
        );
    }

    #[test]
    fn test_output_goes_to_caller_buffer() {
        let mut monitor = SubprocessMonitor::new();
        let buffer: OutputBuffer = Rc::new(RefCell::new(Vec::new()));
        let process = Subprocess::spawn(shell_command("echo hello; echo oops >&2"))
            .unwrap()
            .with_buffer(Rc::clone(&buffer));
        monitor.entrust(process, SubprocessCallbacks::default());
        reap_until_done(&mut monitor);

        let text = String::from_utf8(buffer.borrow().clone()).unwrap();
        assert!(text.contains("hello\n"));
        assert!(text.contains("oops\n"));
    }

    #[test]
    fn test_signaled_child() {
        let mut monitor = SubprocessMonitor::new();
        let id = monitor.launch(shell_command("kill -TERM $$")).unwrap();
        assert_eq!(
            reap_until_done(&mut monitor),
            vec![(id, Termination::Signaled(libc::SIGTERM))]
        );
    }

    #[test]
    fn test_exec_command_splits_words() {
        let command = exec_command("printf '%s' 'a b'").unwrap();
        assert_eq!(command.get_program(), "printf");
        assert_eq!(command.get_args().collect::<Vec<_>>(), vec!["%s", "a b"]);
        assert!(matches!(exec_command("  "), Err(SubprocessError::CommandLine(_))));
        assert!(matches!(
            Subprocess::spawn(Command::new("/nonexistent/binary")),
            Err(SubprocessError::Spawn { .. })
        ));
    }
}
