use std::ffi::NulError;
use std::io;
use std::path::PathBuf;

use rustyline::error::ReadlineError;
use thiserror::Error;

use crate::parser::ParseError;

#[derive(Debug, Error)]
pub enum ShellError {
	#[error("parse error: {0}")]
	Parse(#[from] ParseError),

	#[error("{}: {source}", .path.display())]
	Redirect { path: PathBuf, source: io::Error },

	#[error("cd: {}: {source}", .path.display())]
	ChangeDir { path: PathBuf, source: nix::Error },

	#[error("cd: HOME not set")]
	NoHome,

	#[error("pipe failed: {0}")]
	Pipe(nix::Error),

	#[error("fork failed: {0}")]
	Fork(nix::Error),

	#[error("wait failed: {0}")]
	Wait(nix::Error),

	#[error("{program}: {source}")]
	Exec { program: String, source: nix::Error },

	#[error("argument contains a nul byte: {0}")]
	Nul(#[from] NulError),

	#[error("input error: {0}")]
	Input(#[from] ReadlineError),

	#[error("IO error: {0}")]
	Io(#[from] io::Error),

	#[error("{0}")]
	Nix(#[from] nix::Error),
}

pub type ShellResult<T> = Result<T, ShellError>;

/// Reports a non-fatal failure to the user.
pub fn report(e: &ShellError) {
	eprintln!("lsh: {}", e);
}

/// Reports from a process forked off the threaded shell. Writes straight to
/// fd 2 so no stderr lock held by another thread at fork time is needed.
pub fn report_in_child(e: &ShellError) {
	let msg = format!("lsh: {}\n", e);
	let _ = nix::unistd::write(io::stderr(), msg.as_bytes());
}
