/// Process session: one live child, its pipes and its capture buffers
///
/// The child runs in its own process group so a kill reaches everything it
/// spawned. The session reaps the child on every exit path; `Drop` kills and
/// reaps a child that was never waited for.
use crate::config::types::{GradeError, HarnessConfig, OutputIntegrity, Result};
use crate::harness::output::{
    combine_integrity, spawn_reader, BoundedBuffer, StreamEvent, StreamKind,
};
use crate::harness::Invocation;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::os::unix::io::{AsRawFd, FromRawFd};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

/// What one bounded wait on the output channel produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    Output,
    StreamClosed,
    Quiet,
}

/// Forced termination summary
#[derive(Debug, Clone, Default)]
pub struct KillReport {
    pub group_kill: bool,
    pub kill_sent: bool,
    pub notes: Vec<String>,
}

fn to_pipe_error(prefix: &str, err: impl std::fmt::Display) -> GradeError {
    GradeError::Pipe(format!("{prefix}: {err}"))
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn cloexec_pipe() -> Result<(File, File)> {
    use nix::fcntl::OFlag;
    let (read_fd, write_fd) =
        nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| to_pipe_error("pipe2(output)", e))?;
    // SAFETY: both descriptors were just returned by pipe2(2) and are owned here only.
    Ok(unsafe { (File::from_raw_fd(read_fd), File::from_raw_fd(write_fd)) })
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn cloexec_pipe() -> Result<(File, File)> {
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};
    let (read_fd, write_fd) = nix::unistd::pipe().map_err(|e| to_pipe_error("pipe(output)", e))?;
    // SAFETY: both descriptors were just returned by pipe(2) and are owned here only.
    let ends = unsafe { (File::from_raw_fd(read_fd), File::from_raw_fd(write_fd)) };
    for fd in [read_fd, write_fd] {
        fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))
            .map_err(|e| to_pipe_error("fcntl(FD_CLOEXEC)", e))?;
    }
    Ok(ends)
}

/// One pipe whose write end serves as both stdout and stderr of the child
fn merged_output_pipe() -> Result<(File, Stdio, Stdio)> {
    let (reader, writer) = cloexec_pipe()?;
    let writer_dup = writer
        .try_clone()
        .map_err(|e| to_pipe_error("dup(output)", e))?;
    Ok((reader, Stdio::from(writer), Stdio::from(writer_dup)))
}

fn pipe_inode(pipe: &ChildStdin) -> Option<u64> {
    match nix::sys::stat::fstat(pipe.as_raw_fd()) {
        Ok(stat) => Some(stat.st_ino as u64),
        Err(e) => {
            log::debug!("fstat(stdin pipe): {}", e);
            None
        }
    }
}

pub struct ProcessSession {
    child: Child,
    pid: u32,
    stdin: Option<ChildStdin>,
    stdin_inode: Option<u64>,
    events: Receiver<StreamEvent>,
    open_streams: usize,
    stdout: BoundedBuffer,
    stderr: BoundedBuffer,
    status: Option<ExitStatus>,
    started: Instant,
}

impl ProcessSession {
    /// Launch the child with piped stdio and start one reader per output pipe
    pub fn spawn(invocation: &Invocation, config: &HarnessConfig) -> Result<Self> {
        if invocation.program.is_empty() {
            return Err(GradeError::Usage("empty program".to_string()));
        }

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::piped())
            .process_group(0);
        for (key, value) in &config.environment {
            command.env(key, value);
        }
        if let Some(ref workdir) = config.workdir {
            command.current_dir(workdir);
        }

        let merged_reader = if config.merge_stderr {
            let (reader, stdout, stderr) = merged_output_pipe()?;
            command.stdout(stdout).stderr(stderr);
            Some(reader)
        } else {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
            None
        };

        let spawned = command.spawn();
        // The command holds our copies of the shared write end; EOF needs them closed.
        drop(command);
        let mut child = spawned
            .map_err(|e| GradeError::Spawn(format!("{}: {}", invocation.program, e)))?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let stdin_inode = stdin.as_ref().and_then(|pipe| pipe_inode(pipe));
        let (tx, rx) = crossbeam_channel::unbounded();

        let mut session = ProcessSession {
            child,
            pid,
            stdin,
            stdin_inode,
            events: rx,
            open_streams: 0,
            stdout: BoundedBuffer::new(config.output_limits.stdout_limit),
            stderr: BoundedBuffer::new(config.output_limits.stderr_limit),
            status: None,
            started: Instant::now(),
        };

        match merged_reader {
            Some(reader) => session.attach(StreamKind::Stdout, reader, &tx)?,
            None => {
                if let Some(stdout) = session.child.stdout.take() {
                    session.attach(StreamKind::Stdout, stdout, &tx)?;
                }
                if let Some(stderr) = session.child.stderr.take() {
                    session.attach(StreamKind::Stderr, stderr, &tx)?;
                }
            }
        }

        log::debug!(
            "spawned {} (pid {}) with {} captured stream(s)",
            invocation.program,
            pid,
            session.open_streams
        );
        Ok(session)
    }

    fn attach<R: Read + Send + 'static>(
        &mut self,
        kind: StreamKind,
        stream: R,
        tx: &Sender<StreamEvent>,
    ) -> Result<()> {
        spawn_reader(kind, stream, tx.clone())
            .map_err(|e| GradeError::Internal(format!("reader thread: {}", e)))?;
        self.open_streams += 1;
        Ok(())
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Inode of the pipe behind the child's stdin
    pub fn stdin_inode(&self) -> Option<u64> {
        self.stdin_inode
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn streams_open(&self) -> bool {
        self.open_streams > 0
    }

    fn buffer(&mut self, kind: StreamKind) -> &mut BoundedBuffer {
        match kind {
            StreamKind::Stdout => &mut self.stdout,
            StreamKind::Stderr => &mut self.stderr,
        }
    }

    /// Wait up to `timeout` for one reader event and buffer it
    pub fn poll(&mut self, timeout: Duration) -> Poll {
        match self.events.recv_timeout(timeout) {
            Ok(StreamEvent::Data(kind, bytes)) => {
                self.buffer(kind).push(&bytes);
                Poll::Output
            }
            Ok(StreamEvent::Closed(kind, error)) => {
                if let Some(error) = error {
                    log::warn!("{:?} of pid {} closed with error: {}", kind, self.pid, error);
                }
                self.open_streams = self.open_streams.saturating_sub(1);
                Poll::StreamClosed
            }
            Err(RecvTimeoutError::Timeout) => Poll::Quiet,
            Err(RecvTimeoutError::Disconnected) => {
                self.open_streams = 0;
                Poll::StreamClosed
            }
        }
    }

    /// Buffer whatever arrives within `timeout`, stopping early once every stream closed
    pub fn drain(&mut self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while self.streams_open() {
            let now = Instant::now();
            if now >= deadline {
                log::debug!("drain timeout with {} stream(s) open", self.open_streams);
                break;
            }
            if self.poll(deadline - now) == Poll::Quiet {
                break;
            }
        }
    }

    /// Write `line` plus a newline to the child's stdin.
    ///
    /// Returns false once the child has closed its end.
    pub fn deliver(&mut self, line: &str) -> bool {
        let Some(stdin) = self.stdin.as_mut() else {
            return false;
        };

        let mut payload = String::with_capacity(line.len() + 1);
        payload.push_str(line);
        payload.push('\n');

        match stdin.write_all(payload.as_bytes()).and_then(|_| stdin.flush()) {
            Ok(()) => true,
            Err(e) => {
                if e.kind() == ErrorKind::BrokenPipe {
                    log::debug!("pid {} closed stdin", self.pid);
                } else {
                    log::warn!("write to stdin of pid {} failed: {}", self.pid, e);
                }
                self.stdin = None;
                false
            }
        }
    }

    /// Append a delivered input to the observed transcript
    pub fn record_echo(&mut self, line: &str) {
        self.stdout.push(line.as_bytes());
        self.stdout.push(b"\n");
    }

    /// Non-blocking exit check; reaps the child when it has exited
    pub fn has_exited(&mut self) -> Result<bool> {
        if self.status.is_some() {
            return Ok(true);
        }
        match self.child.try_wait()? {
            Some(status) => {
                self.status = Some(status);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Poll for exit until `deadline`; `None` if the child is still alive then
    pub fn wait_until(&mut self, deadline: Instant) -> Result<Option<ExitStatus>> {
        loop {
            if self.has_exited()? {
                return Ok(self.status);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep(Duration::from_millis(10).min(deadline - now));
        }
    }

    /// SIGKILL the whole process group, falling back to the child alone
    pub fn kill(&mut self) -> KillReport {
        let mut report = KillReport::default();
        match killpg(Pid::from_raw(self.pid as i32), Signal::SIGKILL) {
            Ok(()) => {
                report.group_kill = true;
                report.kill_sent = true;
            }
            Err(e) => {
                report.notes.push(format!("group SIGKILL failed: {}", e));
                match self.child.kill() {
                    Ok(()) => report.kill_sent = true,
                    Err(e) => report.notes.push(format!("SIGKILL fallback failed: {}", e)),
                }
            }
        }
        report
    }

    /// Block until the child is reaped
    pub fn reap(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let status = self.child.wait()?;
        self.status = Some(status);
        Ok(status)
    }

    /// Kill descendants left in the group after the leader exited
    pub fn kill_stragglers(&self) {
        match killpg(Pid::from_raw(self.pid as i32), Signal::SIGKILL) {
            Ok(()) => log::debug!("killed leftover processes in group {}", self.pid),
            Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => log::debug!("group {} cleanup: {}", self.pid, e),
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }

    pub fn signal(&self) -> Option<i32> {
        self.status.and_then(|s| s.signal())
    }

    pub fn stdout_text(&self) -> String {
        self.stdout.to_text()
    }

    pub fn stderr_text(&self) -> String {
        self.stderr.to_text()
    }

    pub fn integrity(&self) -> OutputIntegrity {
        combine_integrity(self.stdout.integrity(), self.stderr.integrity())
    }
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        if self.status.is_none() {
            let _ = self.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Invocation {
        Invocation::new("/bin/sh").with_args(["-c", script])
    }

    #[test]
    fn merged_streams_keep_order() {
        let config = HarnessConfig::default();
        let mut session =
            ProcessSession::spawn(&sh("echo out; echo err 1>&2; echo out2"), &config).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while session.streams_open() && Instant::now() < deadline {
            session.poll(Duration::from_millis(100));
        }
        assert!(session.reap().unwrap().success());
        assert_eq!(session.stdout_text(), "out\nerr\nout2\n");
        assert_eq!(session.stderr_text(), "");
    }

    #[test]
    fn separate_stderr_is_captured_apart() {
        let config = HarnessConfig {
            merge_stderr: false,
            ..HarnessConfig::default()
        };
        let mut session = ProcessSession::spawn(&sh("echo out; echo err 1>&2"), &config).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while session.streams_open() && Instant::now() < deadline {
            session.poll(Duration::from_millis(100));
        }
        session.reap().unwrap();
        assert_eq!(session.stdout_text(), "out\n");
        assert_eq!(session.stderr_text(), "err\n");
    }

    #[test]
    fn kill_terminates_group() {
        let config = HarnessConfig::default();
        let mut session = ProcessSession::spawn(&sh("sleep 30"), &config).unwrap();
        let report = session.kill();
        assert!(report.kill_sent);
        let status = session.reap().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGKILL));
    }

    #[test]
    fn stdin_pipe_inode_is_recorded() {
        let mut session = ProcessSession::spawn(&sh("read x"), &HarnessConfig::default()).unwrap();
        assert!(session.stdin_inode().is_some());
        session.kill();
        session.reap().unwrap();
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let err = ProcessSession::spawn(
            &Invocation::new("/nonexistent/gradebox-test-program"),
            &HarnessConfig::default(),
        )
        .err()
        .expect("spawn must fail");
        assert!(matches!(err, GradeError::Spawn(_)));
    }

    #[test]
    fn empty_program_is_usage_error() {
        let err = ProcessSession::spawn(&Invocation::default(), &HarnessConfig::default())
            .err()
            .expect("spawn must fail");
        assert!(err.is_usage());
    }
}
