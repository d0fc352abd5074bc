use std::io::BufRead;
use std::path::PathBuf;

use log::debug;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::error::{report, ShellError, ShellResult};

/// Where command lines come from, as raw bytes. `Ok(None)` is end of input.
pub trait LineSource {
	fn read_line(&mut self) -> ShellResult<Option<Vec<u8>>>;

	fn add_history(&mut self, _line: &[u8]) {}

	/// Called once when the shell is about to leave.
	fn finish(&mut self) {}
}

/// Line editing on a terminal, with optional persistent history.
pub struct Interactive {
	editor: DefaultEditor,
	prompt: String,
	history: Option<PathBuf>,
}

impl Interactive {
	pub fn new(prompt: String, history: Option<PathBuf>) -> ShellResult<Interactive> {
		let mut editor = DefaultEditor::new()?;
		if let Some(ref path) = history {
			// a missing history file is normal on first start
			if let Err(e) = editor.load_history(path) {
				debug!("history {} not loaded: {}", path.display(), e);
			}
		}
		Ok(Interactive { editor: editor, prompt: prompt, history: history })
	}
}

impl LineSource for Interactive {
	fn read_line(&mut self) -> ShellResult<Option<Vec<u8>>> {
		loop {
			match self.editor.readline(&self.prompt) {
				Ok(line) => return Ok(Some(line.into_bytes())),
				// ^C drops the line being edited
				Err(ReadlineError::Interrupted) => continue,
				Err(ReadlineError::Eof) => return Ok(None),
				Err(e) => return Err(e.into()),
			}
		}
	}

	fn add_history(&mut self, line: &[u8]) {
		let _ = self.editor.add_history_entry(String::from_utf8_lossy(line));
	}

	fn finish(&mut self) {
		if let Some(ref path) = self.history {
			if let Err(e) = self.editor.save_history(path) {
				report(&ShellError::from(e));
			}
		}
	}
}

/// Plain lines from a non-terminal reader. No prompt is printed.
pub struct Script<R> {
	reader: R,
}

impl<R: BufRead> Script<R> {
	pub fn new(reader: R) -> Script<R> {
		Script { reader: reader }
	}
}

impl<R: BufRead> LineSource for Script<R> {
	fn read_line(&mut self) -> ShellResult<Option<Vec<u8>>> {
		let mut line: Vec<u8> = vec![];
		if self.reader.read_until(b'\n', &mut line)? == 0 {
			return Ok(None);
		}
		Ok(Some(line))
	}
}

/// The single line given with `-c`.
pub struct Once {
	line: Option<Vec<u8>>,
}

impl Once {
	pub fn new(line: Vec<u8>) -> Once {
		Once { line: Some(line) }
	}
}

impl LineSource for Once {
	fn read_line(&mut self) -> ShellResult<Option<Vec<u8>>> {
		Ok(self.line.take())
	}
}
