use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{self, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use assert_cmd::Command;
use nix::sys::signal::{kill, Signal};
use nix::unistd::{getpgid, Pid};
use predicates::prelude::*;

fn lsh() -> Command {
	let mut cmd = Command::cargo_bin("lsh").unwrap();
	cmd.env_remove("RUST_LOG");
	cmd
}

#[test]
fn pipes_echo_into_cat() {
	lsh().write_stdin("echo hi | cat\n").assert().success().stdout("hi\n");
}

#[test]
fn single_command_matches_direct_run() {
	lsh().write_stdin("echo a b  c\n").assert().success().stdout("a b c\n");
}

#[test]
fn three_stage_pipeline() {
	lsh().write_stdin("echo hello | tr a-z A-Z | cat\n").assert().success().stdout("HELLO\n");
}

#[test]
fn payload_larger_than_pipe_buffer() {
	lsh().write_stdin("head -c 300000 /dev/zero | cat | wc -c\n")
		.assert().success()
		.stdout(predicate::str::contains("300000"));
}

#[test]
fn blank_lines_are_ignored() {
	lsh().write_stdin("\n   \n\techo x  \n").assert().success().stdout("x\n");
}

#[test]
fn end_of_input_exits_cleanly() {
	lsh().write_stdin("").assert().success().stdout("");
}

#[test]
fn non_utf8_arguments_pass_through() {
	lsh().write_stdin(&b"echo \xe9t\xe9\n"[..])
		.assert().success()
		.stdout(&b"\xe9t\xe9\n"[..]);
}

#[test]
fn last_status_follows_foreground_pipeline() {
	lsh().env("RUST_LOG", "debug").write_stdin("false\n")
		.assert().success()
		.stderr(predicate::str::contains("last pipeline exited with status 1"));
}

#[test]
fn single_command_flag() {
	lsh().arg("-c").arg("echo hi | cat").assert().success().stdout("hi\n");
}

#[test]
fn output_redirect_restores_stdout() {
	let dir = tempfile::tempdir().unwrap();
	let out = dir.path().join("out.txt");
	lsh().write_stdin(format!("echo first > {}\necho second\n", out.display()))
		.assert().success().stdout("second\n");
	assert_eq!(fs::read_to_string(&out).unwrap(), "first\n");
}

#[test]
fn output_redirect_truncates() {
	let dir = tempfile::tempdir().unwrap();
	let out = dir.path().join("out.txt");
	fs::write(&out, "a much longer line that should disappear\n").unwrap();
	lsh().write_stdin(format!("echo hi | cat > {}\n", out.display())).assert().success().stdout("");
	assert_eq!(fs::read_to_string(&out).unwrap(), "hi\n");
}

#[test]
fn input_redirect_feeds_first_stage() {
	let dir = tempfile::tempdir().unwrap();
	let input = dir.path().join("in.txt");
	fs::write(&input, "b\na\nc\n").unwrap();
	lsh().write_stdin(format!("sort < {} | head -n 1\necho done\n", input.display()))
		.assert().success().stdout("a\ndone\n");
}

#[test]
fn missing_input_file_is_reported_and_pipeline_still_runs() {
	lsh().write_stdin("echo still < /nonexistent/lsh-input\n")
		.assert().success()
		.stdout("still\n")
		.stderr(predicate::str::contains("/nonexistent/lsh-input"));
}

#[test]
fn unknown_program_is_reported_and_shell_continues() {
	lsh().write_stdin("no-such-program-lsh arg\necho ok\n")
		.assert().success()
		.stdout("ok\n")
		.stderr(predicate::str::contains("no-such-program-lsh"));
}

#[test]
fn unknown_program_mid_pipeline() {
	lsh().write_stdin("echo hi | no-such-program-lsh | cat\necho ok\n")
		.assert().success()
		.stdout("ok\n")
		.stderr(predicate::str::contains("no-such-program-lsh"));
}

#[test]
fn unknown_program_exit_status_is_distinguished() {
	lsh().env("RUST_LOG", "debug").arg("-c").arg("no-such-program-lsh")
		.assert().success()
		.stderr(predicate::str::contains("exited with status 127"));
}

#[test]
fn parse_error_is_reported() {
	lsh().write_stdin("| cat\necho ok\n")
		.assert().success()
		.stdout("ok\n")
		.stderr(predicate::str::contains("parse error"));
}

#[test]
fn exit_stops_the_shell() {
	lsh().write_stdin("exit\necho after\n").assert().success().stdout("");
}

#[test]
fn exit_ignores_rest_of_pipeline() {
	lsh().write_stdin("exit | echo hi\necho after\n").assert().success().stdout("");
}

#[test]
fn cd_changes_directory() {
	lsh().write_stdin("cd /\npwd\n").assert().success().stdout("/\n");
}

#[test]
fn cd_without_argument_goes_home() {
	let home = tempfile::tempdir().unwrap();
	let expected = fs::canonicalize(home.path()).unwrap();
	lsh().env("HOME", home.path()).write_stdin("cd\npwd\n")
		.assert().success()
		.stdout(format!("{}\n", expected.display()));
}

#[test]
fn cd_to_missing_directory_keeps_cwd() {
	let dir = tempfile::tempdir().unwrap();
	let expected = fs::canonicalize(dir.path()).unwrap();
	lsh().current_dir(dir.path()).write_stdin("cd /nonexistent/lsh-dir\npwd\n")
		.assert().success()
		.stdout(format!("{}\n", expected.display()))
		.stderr(predicate::str::contains("cd: /nonexistent/lsh-dir"));
}

struct Session {
	child: process::Child,
	stdout: BufReader<process::ChildStdout>,
}

fn lsh_command() -> process::Command {
	let mut cmd = process::Command::new(assert_cmd::cargo::cargo_bin("lsh"));
	cmd.env_remove("RUST_LOG");
	cmd
}

impl Session {
	fn start() -> Session {
		Session::spawn(lsh_command())
	}

	fn spawn(mut cmd: process::Command) -> Session {
		let mut child = cmd
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::null())
			.spawn()
			.unwrap();
		let stdout = BufReader::new(child.stdout.take().unwrap());
		Session { child: child, stdout: stdout }
	}

	fn send(&mut self, line: &str) {
		let stdin = self.child.stdin.as_mut().unwrap();
		stdin.write_all(line.as_bytes()).unwrap();
		stdin.write_all(b"\n").unwrap();
		stdin.flush().unwrap();
	}

	fn read_line(&mut self) -> String {
		let mut line = String::new();
		self.stdout.read_line(&mut line).unwrap();
		line
	}

	fn background(&mut self, line: &str) -> Pid {
		self.send(line);
		let report = self.read_line();
		assert!(report.starts_with("Spawned process "), "unexpected report {:?}", report);
		Pid::from_raw(report.split_whitespace().nth(2).unwrap().parse().unwrap())
	}

	fn finish(mut self) -> process::ExitStatus {
		self.send("exit");
		self.child.wait().unwrap()
	}
}

#[test]
fn background_reports_before_program_finishes() {
	let mut session = Session::start();
	let started = Instant::now();
	let pid = session.background("sleep 5 &");
	assert!(started.elapsed() < Duration::from_secs(4));

	// the shell keeps taking input while the job runs
	session.send("echo still here");
	assert_eq!(session.read_line(), "still here\n");

	// isolated in a group of its own
	assert_eq!(getpgid(Some(pid)).unwrap(), pid);

	assert!(session.finish().success());
	let _ = kill(pid, Signal::SIGKILL);
}

#[cfg(target_os = "linux")]
#[test]
fn background_process_is_reaped() {
	let mut session = Session::start();
	let pid = session.background("true &");
	let stat = format!("/proc/{}/stat", pid);
	let deadline = Instant::now() + Duration::from_secs(5);
	while Path::new(&stat).exists() && Instant::now() < deadline {
		sleep(Duration::from_millis(20));
	}
	assert!(!Path::new(&stat).exists(), "{} was not reaped", pid);
	assert!(session.finish().success());
}

#[test]
fn interrupt_does_not_kill_the_shell() {
	let mut session = Session::start();
	session.send("sleep 1");
	session.send("echo alive");
	sleep(Duration::from_millis(300));
	kill(Pid::from_raw(session.child.id() as i32), Signal::SIGINT).unwrap();
	assert_eq!(session.read_line(), "alive\n");
	assert!(session.finish().success());
}

#[test]
fn interrupt_to_group_ends_foreground_pipeline() {
	let mut cmd = lsh_command();
	cmd.process_group(0);
	let mut session = Session::spawn(cmd);
	let pgid = Pid::from_raw(session.child.id() as i32);

	let started = Instant::now();
	session.send("sleep 5 | cat");
	sleep(Duration::from_millis(300));
	// what a terminal ^C does: every member of the foreground group gets it
	kill(Pid::from_raw(-pgid.as_raw()), Signal::SIGINT).unwrap();

	session.send("echo alive");
	assert_eq!(session.read_line(), "alive\n");
	assert!(started.elapsed() < Duration::from_secs(4));
	assert!(session.finish().success());
}

#[cfg(target_os = "linux")]
#[test]
fn every_background_job_is_reaped() {
	let mut session = Session::start();
	let pids: Vec<Pid> = (0 .. 5).map(|_| session.background("true &")).collect();
	let deadline = Instant::now() + Duration::from_secs(5);
	for pid in pids {
		let stat = format!("/proc/{}/stat", pid);
		while Path::new(&stat).exists() && Instant::now() < deadline {
			sleep(Duration::from_millis(20));
		}
		assert!(!Path::new(&stat).exists(), "{} was not reaped", pid);
	}
	assert!(session.finish().success());
}

#[cfg(target_os = "linux")]
/// Lowers RLIMIT_NOFILE so that exactly `spare` descriptors can be opened
/// after exec. Descriptors marked close-on-exec count as free.
fn leave_spare_fds(spare: u64) -> io::Result<()> {
	let mut free = 0;
	let mut fd: libc::c_int = 0;
	while free < spare {
		let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
		if flags < 0 || flags & libc::FD_CLOEXEC != 0 {
			free += 1;
		}
		fd += 1;
	}
	let limit = libc::rlimit { rlim_cur: fd as libc::rlim_t, rlim_max: fd as libc::rlim_t };
	if unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &limit) } < 0 {
		return Err(io::Error::last_os_error());
	}
	Ok(())
}

#[cfg(target_os = "linux")]
#[test]
fn pipe_failure_is_reported_and_shell_continues() {
	// the shell holds 4 descriptors (saved stdin/stdout and the signal socket
	// pair), so the leader gets one pipe and fails on the second
	let mut cmd = lsh_command();
	cmd.env("RUST_LOG", "debug");
	unsafe {
		cmd.pre_exec(|| leave_spare_fds(4 + 3));
	}
	assert_cmd::Command::from_std(cmd)
		.write_stdin("echo hi | cat | cat\necho ok\n")
		.assert().success()
		.stdout("ok\n")
		.stderr(predicate::str::contains("pipe failed"))
		.stderr(predicate::str::contains("exited with status 1"));
}
