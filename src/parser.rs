use std::ffi::OsString;
use std::os::unix::ffi::OsStringExt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::{Invocation, Pipeline};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
	#[error("empty command")]
	EmptyCommand,
	#[error("missing file name after '{0}'")]
	EmptyRedirect(char),
	#[error("input redirection is only allowed on the first command")]
	MisplacedInput,
	#[error("output redirection is only allowed on the last command")]
	MisplacedOutput,
	#[error("character after '&': '{0}'")]
	TrailingAfterBackground(char),
}

type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, Default)]
struct Command {
	words: Vec<OsString>,
	stdin: Option<PathBuf>,
	stdout: Option<PathBuf>,
}

struct Parser<'a> {
	line: &'a [u8],
	i: usize,
}

impl<'a> Parser<'a> {
	fn proceed_while<F>(&mut self, f: F) where F: Fn(u8) -> bool {
		while let Some(c) = self.line.get(self.i) {
			if !f(*c) { break; }
			self.i += 1;
		}
	}

	fn is_whitespace(c: u8) -> bool {
		matches!(c, b' ' | b'\t' | b'\n' | b'\r')
	}

	fn is_letter(c: u8) -> bool {
		match c {
			b'>' | b'<' | b'&' | b'|' => false,
			_ => !Parser::is_whitespace(c),
		}
	}

	fn skip_whitespaces(&mut self) {
		self.proceed_while(Parser::is_whitespace);
	}

	fn read_word(&mut self) -> &'a [u8] {
		let orig = self.i;
		self.proceed_while(Parser::is_letter);
		&self.line[orig .. self.i]
	}

	/// Consumes one `< file` or `> file` if present. Returns false when the
	/// next character is not a redirect operator.
	fn parse_redirect(&mut self, command: &mut Command) -> ParseResult<bool> {
		let op = match self.line.get(self.i) {
			Some(&b'<') => '<',
			Some(&b'>') => '>',
			_ => { return Ok(false); },
		};
		self.i += 1;
		self.skip_whitespaces();
		let target = self.read_word();
		if target.is_empty() {
			return Err(ParseError::EmptyRedirect(op));
		}
		let target = PathBuf::from(OsString::from_vec(target.to_vec()));
		if op == '<' {
			command.stdin = Some(target);
		} else {
			command.stdout = Some(target);
		}
		Ok(true)
	}

	fn parse_command(&mut self) -> ParseResult<Command> {
		let mut command = Command::default();
		loop {
			self.skip_whitespaces();
			if self.parse_redirect(&mut command)? {
				continue;
			}
			let word = self.read_word();
			if word.is_empty() {
				break;
			}
			command.words.push(OsString::from_vec(word.to_vec()));
		}
		if command.words.is_empty() {
			return Err(ParseError::EmptyCommand);
		}
		Ok(command)
	}

	fn parse_pipeline(&mut self) -> ParseResult<Pipeline> {
		let mut commands: Vec<Command> = vec![];
		let mut is_background = false;

		loop {
			commands.push(self.parse_command()?);
			match self.line.get(self.i) {
				Some(&b'|') => { self.i += 1; },
				Some(&b'&') => {
					self.i += 1;
					is_background = true;
					self.skip_whitespaces();
					if let Some(&c) = self.line.get(self.i) {
						return Err(ParseError::TrailingAfterBackground(c as char));
					}
					break;
				},
				// parse_command stops only at an operator or the end of line
				_ => { break; },
			}
		}

		let last = commands.len() - 1;
		let mut stdin = None;
		let mut stdout = None;
		let mut stages = Vec::with_capacity(commands.len());
		for (i, command) in commands.into_iter().enumerate() {
			if command.stdin.is_some() {
				if i != 0 {
					return Err(ParseError::MisplacedInput);
				}
				stdin = command.stdin;
			}
			if command.stdout.is_some() {
				if i != last {
					return Err(ParseError::MisplacedOutput);
				}
				stdout = command.stdout;
			}
			stages.push(Invocation::new(command.words).ok_or(ParseError::EmptyCommand)?);
		}

		let mut pipeline = Pipeline::new(stages).ok_or(ParseError::EmptyCommand)?;
		pipeline.stdin = stdin;
		pipeline.stdout = stdout;
		pipeline.is_background = is_background;
		Ok(pipeline)
	}
}

/// Parses one stripped, non-empty line into a pipeline descriptor.
pub fn parse(line: &[u8]) -> ParseResult<Pipeline> {
	let mut parser = Parser { line: line, i: 0 };
	parser.parse_pipeline()
}
