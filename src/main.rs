mod builtin;
mod error;
mod exec;
mod global;
mod input;
mod job;
mod parser;
mod redirect;
mod signal;
mod types;

use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::os::unix::ffi::OsStringExt;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::debug;

use builtin::Builtin;
use error::{report, ShellError, ShellResult};
use input::{Interactive, LineSource, Once, Script};
use job::{DispatchOutcome, JobStatus};

#[derive(Parser, Debug)]
#[command(name = "lsh", version, about = "A small shell that runs pipelines of programs")]
struct Cli {
	/// Run a single command line, then exit
	#[arg(short = 'c', value_name = "COMMAND")]
	command: Option<OsString>,

	/// Prompt shown on a terminal
	#[arg(long, default_value = "> ")]
	prompt: String,

	/// Load and save interactive history in this file
	#[arg(long, value_name = "FILE")]
	history: Option<PathBuf>,
}

enum Flow {
	Continue,
	Exit,
}

fn eval_line(state: &mut global::State, line: &[u8]) -> Flow {
	let pipeline = match parser::parse(line) {
		Ok(pipeline) => pipeline,
		Err(e) => {
			report(&ShellError::from(e));
			return Flow::Continue;
		},
	};
	debug!("parsed {:?}", pipeline);

	match builtin::match_builtin(pipeline.first()) {
		Some(Builtin::Exit) => { return Flow::Exit; },
		Some(Builtin::Cd) => {
			if let Err(e) = builtin::builtin_cd(pipeline.first().args()) {
				report(&e);
			}
		},
		None => match job::dispatch(state, &pipeline) {
			DispatchOutcome::Done(status) => { state.last_status = status; },
			DispatchOutcome::Detached(leader) => debug!("{} left running", leader),
			DispatchOutcome::NotStarted => { state.last_status = JobStatus::Unknown; },
		},
	}
	Flow::Continue
}

fn repl(state: &mut global::State, source: &mut dyn LineSource) -> ShellResult<()> {
	while let Some(line) = source.read_line()? {
		let line = line.trim_ascii();
		if line.is_empty() {
			continue;
		}
		source.add_history(line);
		if let Flow::Exit = eval_line(state, line) {
			break;
		}
	}
	Ok(())
}

fn run(cli: Cli) -> ShellResult<()> {
	let mut state = global::State::new()?;
	let mut source: Box<dyn LineSource> = match cli.command {
		Some(command) => Box::new(Once::new(command.into_vec())),
		None if io::stdin().is_terminal() => Box::new(Interactive::new(cli.prompt, cli.history)?),
		None => Box::new(Script::new(io::stdin().lock())),
	};
	let r = repl(&mut state, source.as_mut());
	debug!("leaving, last pipeline {}", state.last_status);
	source.finish();
	r
}

fn main() {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

	let cli = Cli::parse();
	if let Err(e) = run(cli) {
		report(&e);
		process::exit(1);
	}
}
