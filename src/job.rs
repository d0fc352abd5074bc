use std::ffi::CString;
use std::fmt;
use std::io::{self, Write};

use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};

use crate::error::{report, ShellError, ShellResult};
use crate::exec;
use crate::global;
use crate::signal;
use crate::types::{Invocation, Pipeline};

/// How a waited-for process ended. `Unknown` records a failed wait or a wait
/// that came back for a different process.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum JobStatus {
	Exited(i32),
	Signaled(Signal),
	Unknown,
}

impl JobStatus {
	/// Shell-style exit code: the exit status, or 128 + signal number.
	pub fn code(self) -> i32 {
		match self {
			JobStatus::Exited(c) => c,
			JobStatus::Signaled(sig) => 128 + sig as i32,
			JobStatus::Unknown => exec::EXIT_FAILURE,
		}
	}
}

impl fmt::Display for JobStatus {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			JobStatus::Exited(c) => write!(f, "exited with status {}", c),
			JobStatus::Signaled(sig) => write!(f, "killed by {}", sig),
			JobStatus::Unknown => write!(f, "unknown status"),
		}
	}
}

pub trait WaitStatusExt {
	fn get_pid(self) -> Option<Pid>;
	fn job_status(self) -> JobStatus;
}

impl WaitStatusExt for WaitStatus {
	fn get_pid(self) -> Option<Pid> {
		self.pid()
	}
	fn job_status(self) -> JobStatus {
		match self {
			WaitStatus::Exited(_, code) => JobStatus::Exited(code),
			WaitStatus::Signaled(_, sig, _) => JobStatus::Signaled(sig),
			_ => JobStatus::Unknown,
		}
	}
}

/// Retries a system call interrupted by a signal.
pub fn syscall<F, T>(f: F) -> nix::Result<T> where F: Fn() -> nix::Result<T> {
	loop {
		match f() {
			Err(Errno::EINTR) => (),
			result => return result,
		}
	}
}

/// Blocks until `pid` terminates.
pub fn wait_for(pid: Pid) -> JobStatus {
	match syscall(|| waitpid(pid, None)) {
		Ok(status) if status.get_pid() == Some(pid) => status.job_status(),
		Ok(status) => {
			warn!("waited for {} but got {:?}", pid, status);
			JobStatus::Unknown
		},
		Err(e) => {
			report(&ShellError::Wait(e));
			JobStatus::Unknown
		},
	}
}

#[derive(Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
	/// Foreground pipeline ran to completion.
	Done(JobStatus),
	/// Background pipeline left to the reaper.
	Detached(Pid),
	/// Nothing was spawned.
	NotStarted,
}

/// Forks the pipeline leader. A background leader is moved into its own
/// process group by both sides of the fork so the group exists before
/// either of them moves on.
fn fork_leader(is_background: bool, argvs: &[Vec<CString>]) -> ShellResult<Pid> {
	let _ = io::stdout().flush();
	match unsafe { unistd::fork() }.map_err(ShellError::Fork)? {
		ForkResult::Parent { child } => {
			if is_background {
				// EACCES once the child has already exec'd, by which point it set the group itself
				if let Err(e) = unistd::setpgid(child, child) {
					debug!("setpgid({}) from parent: {}", child, e);
				}
			}
			debug!("forked leader {} (background: {})", child, is_background);
			Ok(child)
		},
		ForkResult::Child => {
			if is_background {
				let _ = unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0));
			}
			signal::reset_in_child();
			exec::run_pipeline(argvs)
		},
	}
}

/// Runs one pipeline: redirect, fork the leader, then either wait for it or
/// hand it to the reaper. The shell's streams are restored on every path.
pub fn dispatch(state: &mut global::State, pipeline: &Pipeline) -> DispatchOutcome {
	let argvs: Result<Vec<Vec<CString>>, _> = pipeline.stages().iter().map(Invocation::to_argv).collect();
	let argvs = match argvs {
		Ok(argvs) => argvs,
		Err(e) => {
			report(&ShellError::from(e));
			return DispatchOutcome::NotStarted;
		},
	};

	debug!("dispatching {} stage(s) ending in {:?}", pipeline.len(), pipeline.terminal().program());
	for e in state.streams.apply(pipeline) {
		report(&e);
	}

	let outcome = match fork_leader(pipeline.is_background, &argvs) {
		Ok(leader) if pipeline.is_background => {
			state.signals.track(leader);
			DispatchOutcome::Detached(leader)
		},
		Ok(leader) => {
			let status = wait_for(leader);
			debug!("leader {} {}", leader, status);
			DispatchOutcome::Done(status)
		},
		Err(e) => {
			report(&e);
			DispatchOutcome::NotStarted
		},
	};

	if let Err(e) = state.streams.restore() {
		report(&e);
	}
	if let DispatchOutcome::Detached(leader) = outcome {
		println!("Spawned process {} in background", leader);
	}
	outcome
}
