use std::fs;
use std::io::{self, Write};
use std::os::unix::io::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::path::Path;

use log::debug;
use nix::unistd;

use crate::error::{ShellError, ShellResult};
use crate::types::Pipeline;

/// The shell's original stdin and stdout, kept for the whole session so they
/// can be put back after a pipeline rebinds fd 0 or fd 1.
#[derive(Debug)]
pub struct SavedStreams {
	stdin: OwnedFd,
	stdout: OwnedFd,
}

fn bind(path: &Path, oopt: &fs::OpenOptions, target: RawFd) -> ShellResult<()> {
	let file = oopt.open(path).map_err(|e| ShellError::Redirect { path: path.to_owned(), source: e })?;
	unistd::dup2(file.as_raw_fd(), target)?;
	debug!("bound fd {} to {}", target, path.display());
	Ok(())
}

impl SavedStreams {
	pub fn save() -> io::Result<SavedStreams> {
		// try_clone_to_owned duplicates with FD_CLOEXEC, so children never see these
		let stdin = io::stdin().as_fd().try_clone_to_owned()?;
		let stdout = io::stdout().as_fd().try_clone_to_owned()?;
		Ok(SavedStreams { stdin: stdin, stdout: stdout })
	}

	/// Rebinds fd 0 and fd 1 to the pipeline's redirect targets. Failures are
	/// returned for reporting; whatever could be bound stays bound.
	pub fn apply(&self, pipeline: &Pipeline) -> Vec<ShellError> {
		let mut errors = vec![];
		if let Some(ref path) = pipeline.stdin {
			if let Err(e) = bind(path, fs::OpenOptions::new().read(true), libc::STDIN_FILENO) {
				errors.push(e);
			}
		}
		if let Some(ref path) = pipeline.stdout {
			let _ = io::stdout().flush();
			let mut oopt = fs::OpenOptions::new();
			oopt.write(true).create(true).truncate(true);
			if let Err(e) = bind(path, &oopt, libc::STDOUT_FILENO) {
				errors.push(e);
			}
		}
		errors
	}

	pub fn restore(&self) -> ShellResult<()> {
		let _ = io::stdout().flush();
		unistd::dup2(self.stdin.as_raw_fd(), libc::STDIN_FILENO)?;
		unistd::dup2(self.stdout.as_raw_fd(), libc::STDOUT_FILENO)?;
		Ok(())
	}
}
