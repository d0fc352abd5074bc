use std::collections::HashSet;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use log::{debug, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use signal_hook::consts::{SIGCHLD, SIGINT};
use signal_hook::iterator::{Handle, Signals};

use crate::job::{syscall, JobStatus, WaitStatusExt};

#[derive(Debug)]
pub enum Event {
	/// A background leader to reap once it terminates.
	Track(Pid),
	ChildStateChanged,
	Interrupt,
}

/// Background leaders that have not been reaped yet. Only tracked pids are
/// ever waited on, so a foreground wait is never stolen.
#[derive(Debug, Default)]
pub struct Reaper {
	tracked: HashSet<Pid>,
}

impl Reaper {
	pub fn track(&mut self, pid: Pid) {
		self.tracked.insert(pid);
	}

	pub fn is_tracking(&self, pid: Pid) -> bool {
		self.tracked.contains(&pid)
	}

	/// Reaps every tracked process that has terminated, without blocking.
	pub fn reap(&mut self) -> Vec<(Pid, JobStatus)> {
		let mut reaped = vec![];
		self.tracked.retain(|&pid| {
			match syscall(|| waitpid(pid, Some(WaitPidFlag::WNOHANG))) {
				Ok(WaitStatus::StillAlive) => true,
				Ok(status) => {
					reaped.push((pid, status.job_status()));
					false
				},
				Err(Errno::ECHILD) => {
					warn!("{} is not a child any more", pid);
					false
				},
				Err(e) => {
					warn!("reaping {} failed: {}", pid, e);
					true
				},
			}
		});
		reaped
	}
}

fn run_reaper(rx: Receiver<Event>) {
	let mut reaper = Reaper::default();
	for event in rx.iter() {
		match event {
			Event::Track(pid) if reaper.is_tracking(pid) => warn!("{} is already tracked", pid),
			Event::Track(pid) => reaper.track(pid),
			Event::ChildStateChanged => (),
			Event::Interrupt => {
				debug!("interrupt received");
				continue;
			},
		}
		// a registration may arrive after its SIGCHLD, so reap on both
		for (pid, status) in reaper.reap() {
			info!("background process {} {}", pid, status);
		}
	}
}

/// Receives SIGCHLD and SIGINT on a dedicated thread and forwards them to
/// the reaper thread. Holding this keeps the shell alive across interrupts.
pub struct SignalLayer {
	tx: Sender<Event>,
	handle: Handle,
}

impl SignalLayer {
	pub fn install() -> io::Result<SignalLayer> {
		let (tx, rx) = mpsc::channel();
		let mut signals = Signals::new([SIGCHLD, SIGINT])?;
		let handle = signals.handle();

		let sig_tx = tx.clone();
		thread::Builder::new().name("signals".to_string()).spawn(move || {
			for sig in signals.forever() {
				let event = match sig {
					SIGCHLD => Event::ChildStateChanged,
					SIGINT => Event::Interrupt,
					_ => continue,
				};
				if sig_tx.send(event).is_err() {
					break;
				}
			}
		})?;
		thread::Builder::new().name("reaper".to_string()).spawn(move || run_reaper(rx))?;

		Ok(SignalLayer { tx: tx, handle: handle })
	}

	pub fn track(&self, pid: Pid) {
		if self.tx.send(Event::Track(pid)).is_err() {
			warn!("reaper thread is gone, {} will not be reaped", pid);
		}
	}
}

impl Drop for SignalLayer {
	fn drop(&mut self) {
		self.handle.close();
	}
}

/// Puts back default dispositions in a freshly forked child.
pub fn reset_in_child() {
	unsafe {
		let _ = signal::signal(Signal::SIGINT, SigHandler::SigDfl);
		let _ = signal::signal(Signal::SIGCHLD, SigHandler::SigDfl);
	}
}
