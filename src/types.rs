use std::ffi::{CString, NulError, OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

/// One program invocation: argv with the program name first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
	argv: Vec<OsString>,
}

impl Invocation {
	/// Returns `None` for an empty argv.
	pub fn new(argv: Vec<OsString>) -> Option<Invocation> {
		if argv.is_empty() {
			None
		} else {
			Some(Invocation { argv: argv })
		}
	}

	pub fn program(&self) -> &OsStr {
		&self.argv[0]
	}

	pub fn args(&self) -> &[OsString] {
		&self.argv[1..]
	}

	pub fn to_argv(&self) -> Result<Vec<CString>, NulError> {
		self.argv.iter().map(|a| CString::new(a.as_bytes())).collect()
	}
}

/// A parsed command line. Stages are kept in execution order: the output of
/// `stages[i]` is the input of `stages[i + 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
	stages: Vec<Invocation>,
	pub stdin: Option<PathBuf>,
	pub stdout: Option<PathBuf>,
	pub is_background: bool,
}

impl Pipeline {
	pub fn new(stages: Vec<Invocation>) -> Option<Pipeline> {
		if stages.is_empty() {
			return None;
		}
		Some(Pipeline { stages: stages, stdin: None, stdout: None, is_background: false })
	}

	pub fn stages(&self) -> &[Invocation] {
		&self.stages
	}

	pub fn first(&self) -> &Invocation {
		&self.stages[0]
	}

	pub fn terminal(&self) -> &Invocation {
		&self.stages[self.stages.len() - 1]
	}

	pub fn len(&self) -> usize {
		self.stages.len()
	}
}
