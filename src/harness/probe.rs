//! Input demand probe
//!
//! Answers "is anything in the child's process group blocked reading the
//! harness's stdin pipe right now?" from procfs. Every thread of every
//! process in the group is inspected, so readers in subprocesses and on
//! worker threads count as well as the group leader.

use crate::config::types::InputProbe;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDemand {
    /// Some thread is blocked reading the stdin pipe
    Blocked,
    NotBlocked,
    /// Probe disabled or procfs unavailable
    Unknown,
}

/// Probe the process group `pgid` for a blocked read on the pipe with inode `stdin_inode`.
///
/// Without an inode, a blocked read on fd 0 counts.
pub fn input_demand(pgid: u32, stdin_inode: Option<u64>, probe: InputProbe) -> InputDemand {
    match probe {
        InputProbe::Disabled => InputDemand::Unknown,
        InputProbe::ProcSyscall => proc_input_demand(pgid, stdin_inode),
    }
}

#[cfg(target_os = "linux")]
fn proc_input_demand(pgid: u32, stdin_inode: Option<u64>) -> InputDemand {
    ProcFs::system().demand(pgid as i32, stdin_inode)
}

#[cfg(not(target_os = "linux"))]
fn proc_input_demand(_pgid: u32, _stdin_inode: Option<u64>) -> InputDemand {
    InputDemand::Unknown
}

/// What one `/proc/.../syscall` line says
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SyscallState {
    /// Executing in user space, or the kernel gave no syscall number
    Running,
    InSyscall { nr: i64, arg0: i64 },
}

/// What one thread is doing, as far as input demand goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThreadState {
    Reading { fd: i32 },
    Other,
    Unknown,
}

/// Parse `/proc/<pid>/syscall`: `running`, `-1 sp pc`, or `nr arg0 .. sp pc`
pub(crate) fn parse_syscall(text: &str) -> Option<SyscallState> {
    let mut fields = text.split_whitespace();
    let first = fields.next()?;
    if first == "running" {
        return Some(SyscallState::Running);
    }

    let nr: i64 = first.parse().ok()?;
    if nr < 0 {
        return Some(SyscallState::Running);
    }

    let arg0 = fields
        .next()
        .and_then(|arg| i64::from_str_radix(arg.trim_start_matches("0x"), 16).ok())?;
    Some(SyscallState::InSyscall { nr, arg0 })
}

#[cfg(target_os = "linux")]
fn is_read_syscall(nr: i64) -> bool {
    nr == libc::SYS_read as i64 || nr == libc::SYS_readv as i64
}

#[cfg(not(target_os = "linux"))]
fn is_read_syscall(_nr: i64) -> bool {
    false
}

/// `pipe_read`/`pipe_wait` in wchan means a blocked pipe read on an unknown fd
fn parse_wchan(text: &str) -> ThreadState {
    match text.trim() {
        "pipe_read" | "pipe_wait" => ThreadState::Reading { fd: 0 },
        "" | "0" => ThreadState::Unknown,
        _ => ThreadState::Other,
    }
}

/// Process group from `/proc/<pid>/stat`; the command name may hold spaces and parens
pub(crate) fn parse_stat_pgrp(text: &str) -> Option<i32> {
    let rest = &text[text.rfind(')')? + 1..];
    // state ppid pgrp ...
    rest.split_whitespace().nth(2)?.parse().ok()
}

/// Inode from an fd link target such as `pipe:[12345]`
pub(crate) fn parse_pipe_inode(link: &str) -> Option<u64> {
    link.strip_prefix("pipe:[")?.strip_suffix(']')?.parse().ok()
}

/// A procfs tree
pub(crate) struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[cfg(target_os = "linux")]
    fn system() -> Self {
        Self::new("/proc")
    }

    /// Pids whose process group is `pgid`
    fn group_members(&self, pgid: i32) -> std::io::Result<Vec<i32>> {
        let mut members = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let Ok(entry) = entry else { continue };
            let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<i32>().ok()) else {
                continue;
            };
            // Processes vanish between listing and reading.
            let Ok(stat) = std::fs::read_to_string(entry.path().join("stat")) else {
                continue;
            };
            if parse_stat_pgrp(&stat) == Some(pgid) {
                members.push(pid);
            }
        }
        members.sort_unstable();
        Ok(members)
    }

    /// Per-thread directories of `pid`, the process directory itself when `task/` is unreadable
    fn threads(&self, pid: i32) -> Vec<PathBuf> {
        let process = self.root.join(pid.to_string());
        match std::fs::read_dir(process.join("task")) {
            Ok(entries) => entries.flatten().map(|e| e.path()).collect(),
            Err(_) => vec![process],
        }
    }

    fn thread_state(&self, thread: &Path) -> ThreadState {
        if let Ok(text) = std::fs::read_to_string(thread.join("syscall")) {
            match parse_syscall(&text) {
                Some(SyscallState::InSyscall { nr, arg0 }) if is_read_syscall(nr) => {
                    return ThreadState::Reading { fd: arg0 as i32 };
                }
                Some(_) => return ThreadState::Other,
                None => {}
            }
        }
        match std::fs::read_to_string(thread.join("wchan")) {
            Ok(text) => parse_wchan(&text),
            Err(_) => ThreadState::Unknown,
        }
    }

    /// True when fd `fd` of `pid` is the stdin pipe
    fn is_stdin_pipe(&self, pid: i32, fd: i32, stdin_inode: Option<u64>) -> bool {
        let Some(inode) = stdin_inode else {
            return fd == 0;
        };
        let link = self.root.join(pid.to_string()).join("fd").join(fd.to_string());
        match std::fs::read_link(&link) {
            Ok(target) => target.to_str().and_then(parse_pipe_inode) == Some(inode),
            Err(_) => false,
        }
    }

    pub(crate) fn demand(&self, pgid: i32, stdin_inode: Option<u64>) -> InputDemand {
        let members = match self.group_members(pgid) {
            Ok(members) => members,
            Err(e) => {
                log::debug!("cannot list {:?}: {}", self.root, e);
                return InputDemand::Unknown;
            }
        };

        let mut answered = false;
        for pid in members {
            for thread in self.threads(pid) {
                match self.thread_state(&thread) {
                    ThreadState::Reading { fd } => {
                        answered = true;
                        if self.is_stdin_pipe(pid, fd, stdin_inode) {
                            log::debug!("{:?} blocked reading stdin (fd {})", thread, fd);
                            return InputDemand::Blocked;
                        }
                    }
                    ThreadState::Other => answered = true,
                    ThreadState::Unknown => {}
                }
            }
        }

        if answered {
            InputDemand::NotBlocked
        } else {
            InputDemand::Unknown
        }
    }
}
