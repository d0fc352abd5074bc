use std::ffi::CString;
use std::os::unix::io::{AsRawFd, OwnedFd};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::{self, ForkResult, Pid};

use crate::error::{report_in_child, ShellError, ShellResult};
use crate::job::{syscall, JobStatus, WaitStatusExt};

/// Exit status of a stage whose program could not be found.
pub const EXIT_NOT_FOUND: i32 = 127;
/// Exit status of a stage whose program was found but could not be run.
pub const EXIT_NOT_EXECUTABLE: i32 = 126;
pub const EXIT_FAILURE: i32 = 1;

type Pipe = (OwnedFd, OwnedFd);

fn exit_now(status: i32) -> ! {
	unsafe { libc::_exit(status) }
}

/// Replaces the current process image with `argv`. On failure the program
/// name is reported and the process exits; control never returns.
fn exec_stage(argv: &[CString]) -> ! {
	let err = match unistd::execvp(&argv[0], argv) {
		Err(e) => e,
		Ok(never) => match never {},
	};
	let program = argv[0].to_string_lossy().into_owned();
	report_in_child(&ShellError::Exec { program: program, source: err });
	exit_now(match err {
		Errno::ENOENT => EXIT_NOT_FOUND,
		_ => EXIT_NOT_EXECUTABLE,
	})
}

fn open_pipes(n: usize) -> ShellResult<Vec<Pipe>> {
	(0 .. n).map(|_| unistd::pipe2(OFlag::O_CLOEXEC).map_err(ShellError::Pipe)).collect()
}

/// Binds stage `i` to its neighbours: stdin from pipe `i - 1`, stdout to
/// pipe `i`. Every original pipe descriptor is closed before returning.
fn wire_stage(i: usize, last: usize, pipes: Vec<Pipe>) -> ShellResult<()> {
	if i > 0 {
		unistd::dup2(pipes[i - 1].0.as_raw_fd(), libc::STDIN_FILENO)?;
	}
	if i < last {
		unistd::dup2(pipes[i].1.as_raw_fd(), libc::STDOUT_FILENO)?;
	}
	drop(pipes);
	Ok(())
}

/// Forks every stage, last one first, so stage `i + 1` exists before stage
/// `i` can start writing. Forked pids are pushed to `children` as they are
/// created; the pipes are closed on this side when the function returns.
fn spawn_stages(argvs: &[Vec<CString>], pipes: Vec<Pipe>, children: &mut Vec<Pid>) -> ShellResult<()> {
	let last = argvs.len() - 1;
	for i in (0 .. argvs.len()).rev() {
		match unsafe { unistd::fork() }.map_err(ShellError::Fork)? {
			ForkResult::Parent { child } => {
				children.push(child);
			},
			ForkResult::Child => {
				crate::signal::reset_in_child();
				if let Err(e) = wire_stage(i, last, pipes) {
					report_in_child(&e);
					exit_now(EXIT_FAILURE);
				}
				exec_stage(&argvs[i]);
			},
		}
	}
	Ok(())
}

/// Waits for one stage from the leader. Nothing is logged here: the leader
/// was forked from a threaded process and must not touch shared locks.
fn wait_stage(pid: Pid) -> JobStatus {
	match syscall(|| waitpid(pid, None)) {
		Ok(status) => status.job_status(),
		Err(_) => JobStatus::Unknown,
	}
}

/// Supervises a multi-stage chain from the leader process and returns the
/// terminal stage's exit code.
fn supervise(argvs: &[Vec<CString>]) -> ShellResult<i32> {
	// the leader outlives an interrupt so that its stages are still reaped;
	// each stage puts the default back right after its fork
	let _ = unsafe { signal::signal(Signal::SIGINT, SigHandler::SigIgn) };

	let pipes = open_pipes(argvs.len() - 1)?;
	let mut children = Vec::with_capacity(argvs.len());
	let spawned = spawn_stages(argvs, pipes, &mut children);

	let statuses: Vec<JobStatus> = children.iter().map(|&pid| wait_stage(pid)).collect();
	spawned?;

	// the terminal stage is forked first
	Ok(statuses.first().map_or(EXIT_FAILURE, |s| s.code()))
}

/// Realizes the pipeline inside the leader process. Never returns.
///
/// A single stage replaces the leader itself. Longer chains get all their
/// pipes up front; the leader then forks every stage, closes its copies of
/// the pipes, waits for every stage and exits with the terminal stage's
/// status. Pipe or fork failures are reported and end the leader with
/// `EXIT_FAILURE` after the stages already running have been waited for.
pub fn run_pipeline(argvs: &[Vec<CString>]) -> ! {
	if argvs.len() == 1 {
		exec_stage(&argvs[0]);
	}
	let status = match supervise(argvs) {
		Ok(status) => status,
		Err(e) => {
			report_in_child(&e);
			EXIT_FAILURE
		},
	};
	exit_now(status)
}
