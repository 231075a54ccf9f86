//! Turns an `ExecutionPlan` into a running child process.
//!
//! Redirections are opened in the child, after `fork` and before `exec`, so
//! the parent never holds half-wired descriptors. The child reports a failed
//! open back to the parent through a close-on-exec status pipe: if the pipe
//! reaches end of file without data, the program image was replaced (or the
//! program could not be executed, which the child reports itself).

use std::ffi::CString;
use std::fs::File;
use std::io::Read;
use std::iter;
use std::os::raw::c_char;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::process::ExitStatus;
use std::ptr;

use failure::{Fail, ResultExt};
use log::{debug, info, warn};
use nix::{
    errno::Errno,
    fcntl::{self, OFlag},
    libc,
    sys::{
        stat::Mode,
        wait::{self, WaitPidFlag, WaitStatus},
    },
    unistd::{self, ForkResult, Pid},
};

use crate::{
    core::plan::ExecutionPlan,
    errors::{Error, ErrorKind, Result},
    util::MyshExitStatusExt,
};

/// Status of a child whose program could not be found.
pub const COMMAND_NOT_FOUND_EXIT_STATUS: i32 = 127;
/// Status of a child whose program was found but could not be executed.
pub const COMMAND_NOT_EXECUTABLE_EXIT_STATUS: i32 = 126;

const REDIRECTION_FAILED_EXIT_STATUS: i32 = 1;
/// One stream tag byte followed by a little-endian errno.
const STATUS_RECORD_LEN: usize = 5;

/// Outcome of a successful launch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Launch {
    /// The child ran to completion while the shell waited.
    Foreground(ExitStatus),
    /// The child is still running; the caller owns reaping it.
    Background(Pid),
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Redirect {
    Input = 0,
    Output = 1,
}

impl Redirect {
    fn from_tag(tag: u8) -> Redirect {
        if tag == Redirect::Input as u8 {
            Redirect::Input
        } else {
            Redirect::Output
        }
    }
}

/// Everything the child needs, allocated before `fork` so the child itself
/// never touches the allocator.
#[derive(Debug)]
struct PreparedCommand {
    program: CString,
    // Owns the strings `argv_ptrs` points into.
    argv: Vec<CString>,
    /// NULL-terminated, as `execvp(3)` expects.
    argv_ptrs: Vec<*const c_char>,
    input: Option<CString>,
    output: Option<CString>,
    exec_failed_prefix: Vec<u8>,
}

impl PreparedCommand {
    fn new(plan: &ExecutionPlan) -> Result<Self> {
        let argv = plan
            .argv()
            .into_iter()
            .map(to_cstring)
            .collect::<Result<Vec<_>>>()?;
        let argv_ptrs = argv
            .iter()
            .map(|arg| arg.as_ptr())
            .chain(iter::once(ptr::null()))
            .collect();
        Ok(Self {
            program: to_cstring(&plan.program)?,
            argv,
            argv_ptrs,
            input: plan.input_path.as_ref().map(to_cstring).transpose()?,
            output: plan.output_path.as_ref().map(to_cstring).transpose()?,
            exec_failed_prefix: format!(
                "mysh: {}: ",
                ErrorKind::ExecFailed(plan.program.clone())
            )
            .into_bytes(),
        })
    }

    fn path(&self, redirect: Redirect) -> String {
        let path = match redirect {
            Redirect::Input => &self.input,
            Redirect::Output => &self.output,
        };
        path.as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn to_cstring<S: AsRef<str>>(word: S) -> Result<CString> {
    CString::new(word.as_ref())
        .map_err(|_| Error::syntax(word.as_ref().escape_default().to_string()))
}

/// Launches `plan` as a child process.
///
/// Foreground plans block until the child terminates. Background plans
/// return the child's pid right away; the caller becomes responsible for
/// reaping it.
pub fn launch(plan: &ExecutionPlan) -> Result<Launch> {
    debug!("launching {:?}", plan);
    let command = PreparedCommand::new(plan)?;
    let (mut status_reader, status_writer) = create_status_pipe()?;

    // Only async-signal-safe work happens in the child: the parent may be
    // multi-threaded.
    let child = match unsafe { unistd::fork() }.context(ErrorKind::SpawnFailed)? {
        ForkResult::Child => exec_child(&command, status_writer.as_raw_fd()),
        ForkResult::Parent { child } => child,
    };
    drop(status_writer);

    let mut record = Vec::with_capacity(STATUS_RECORD_LEN);
    if let Err(e) = status_reader.read_to_end(&mut record) {
        let temp_result = wait_for(child);
        log_if_err!(temp_result, "failed to reap child ({})", child);
        return Err(e.context(ErrorKind::Io).into());
    }

    if record.len() >= STATUS_RECORD_LEN {
        let redirect = Redirect::from_tag(record[0]);
        let errno = Errno::from_i32(i32::from_le_bytes([
            record[1], record[2], record[3], record[4],
        ]));
        let temp_result = wait_for(child);
        log_if_err!(temp_result, "failed to reap child ({})", child);

        let path = command.path(redirect);
        warn!("child ({}) failed to open {:?} ({}): {}", child, redirect, path, errno);
        return Err(Error::redirection_open_failed(path, errno.desc()));
    }

    info!("spawned {} for '{}'", child, plan.argv().join(" "));
    if plan.background {
        Ok(Launch::Background(child))
    } else {
        let exit_status = wait_for(child)?;
        debug!("{} exited with {}", child, exit_status);
        Ok(Launch::Foreground(exit_status))
    }
}

/// Blocks until `pid` terminates and reaps it.
pub fn wait_for(pid: Pid) -> Result<ExitStatus> {
    loop {
        match wait::waitpid(pid, None) {
            Ok(status) => {
                if let Some(exit_status) = get_exit_status(status) {
                    return Ok(exit_status);
                }
            }
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.context(ErrorKind::Nix).into()),
        }
    }
}

/// Reaps `pid` if it has terminated, without blocking.
pub fn try_wait(pid: Pid) -> Result<Option<ExitStatus>> {
    loop {
        match wait::waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(status) => return Ok(get_exit_status(status)),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.context(ErrorKind::Nix).into()),
        }
    }
}

fn get_exit_status(status: WaitStatus) -> Option<ExitStatus> {
    match status {
        WaitStatus::Exited(_, code) => Some(ExitStatus::from_status(code)),
        WaitStatus::Signaled(_, signal, _) => Some(ExitStatus::from_status(128 + signal as i32)),
        _ => None,
    }
}

/// Wraps `unistd::pipe2()` to return RAII structs instead of raw, owning file descriptors
/// Returns (`read_end_pipe`, `write_end_pipe`)
fn create_status_pipe() -> Result<(File, File)> {
    // Immediately hand the RawFds to File so an early return cannot leak them.
    let (read_end_pipe, write_end_pipe) =
        unistd::pipe2(OFlag::O_CLOEXEC).context(ErrorKind::SpawnFailed)?;
    unsafe {
        Ok((
            File::from_raw_fd(read_end_pipe),
            File::from_raw_fd(write_end_pipe),
        ))
    }
}

/// Runs in the forked child. Never returns into shell code.
fn exec_child(command: &PreparedCommand, status_pipe: RawFd) -> ! {
    if let Err((redirect, errno)) = redirect_stdio(command) {
        let mut record = [0u8; STATUS_RECORD_LEN];
        record[0] = redirect as u8;
        record[1..].copy_from_slice(&(errno as i32).to_le_bytes());
        write_all(status_pipe, &record);
        unsafe { libc::_exit(REDIRECTION_FAILED_EXIT_STATUS) };
    }

    // nix's execvp collects a fresh pointer array, so call libc directly.
    unsafe { libc::execvp(command.program.as_ptr(), command.argv_ptrs.as_ptr()) };
    let errno = Errno::last();

    write_all(libc::STDERR_FILENO, &command.exec_failed_prefix);
    write_all(libc::STDERR_FILENO, errno.desc().as_bytes());
    write_all(libc::STDERR_FILENO, b"\n");
    if errno == Errno::ENOENT {
        unsafe { libc::_exit(COMMAND_NOT_FOUND_EXIT_STATUS) }
    } else {
        unsafe { libc::_exit(COMMAND_NOT_EXECUTABLE_EXIT_STATUS) }
    }
}

/// Opens both redirections before touching fd 0 or 1, so a failure leaves the
/// child's streams as they were.
fn redirect_stdio(command: &PreparedCommand) -> ::std::result::Result<(), (Redirect, Errno)> {
    let input = match command.input {
        Some(ref path) => Some(
            fcntl::open(path.as_c_str(), OFlag::O_RDONLY, Mode::empty())
                .map_err(|e| (Redirect::Input, e))?,
        ),
        None => None,
    };
    let output = match command.output {
        Some(ref path) => Some(
            fcntl::open(
                path.as_c_str(),
                OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
                output_mode(),
            )
            .map_err(|e| (Redirect::Output, e))?,
        ),
        None => None,
    };

    if let Some(fd) = input {
        replace_fd(fd, libc::STDIN_FILENO).map_err(|e| (Redirect::Input, e))?;
    }
    if let Some(fd) = output {
        replace_fd(fd, libc::STDOUT_FILENO).map_err(|e| (Redirect::Output, e))?;
    }
    Ok(())
}

/// rw-r--r--
fn output_mode() -> Mode {
    Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IROTH
}

fn replace_fd(fd: RawFd, target: RawFd) -> nix::Result<()> {
    if fd != target {
        unistd::dup2(fd, target)?;
        unistd::close(fd)?;
    }
    Ok(())
}

fn write_all(fd: RawFd, mut buf: &[u8]) {
    while !buf.is_empty() {
        match unistd::write(fd, buf) {
            Ok(0) => break,
            Ok(n) => buf = &buf[n..],
            Err(Errno::EINTR) => continue,
            Err(_) => break,
        }
    }
}
