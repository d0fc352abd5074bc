use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use nix::unistd;

use crate::error::{ShellError, ShellResult};
use crate::types::Invocation;

#[derive(Debug, PartialEq, Eq)]
pub enum Builtin {
	Exit,
	Cd,
}

pub fn match_builtin(invocation: &Invocation) -> Option<Builtin> {
	match invocation.program().to_str() {
		Some("exit") => Some(Builtin::Exit),
		Some("cd") => Some(Builtin::Cd),
		_ => None,
	}
}

fn cd_target(args: &[OsString], home: Option<OsString>) -> ShellResult<PathBuf> {
	match args.first() {
		Some(path) => Ok(PathBuf::from(path)),
		None => home.map(PathBuf::from).ok_or(ShellError::NoHome),
	}
}

/// Changes the working directory to the first argument, or to `$HOME`.
pub fn builtin_cd(args: &[OsString]) -> ShellResult<()> {
	let target = cd_target(args, env::var_os("HOME"))?;
	unistd::chdir(&target).map_err(|e| ShellError::ChangeDir { path: target, source: e })
}
