use std::io;

use crate::job::JobStatus;
use crate::redirect::SavedStreams;
use crate::signal::SignalLayer;

/// Everything the main loop carries from one line to the next.
pub struct State {
	pub streams: SavedStreams,
	pub signals: SignalLayer,
	pub last_status: JobStatus,
}

impl State {
	pub fn new() -> io::Result<State> {
		let streams = SavedStreams::save()?;
		let signals = SignalLayer::install()?;
		Ok(State { streams: streams, signals: signals, last_status: JobStatus::Exited(0) })
	}
}
