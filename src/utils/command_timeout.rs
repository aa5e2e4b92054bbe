// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::ffi::OsStr;
use std::io::{self, Read};
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Execute a command with a timeout.
/// Returns Ok(Output) if the command completes within the timeout,
/// Err if timeout occurs or command fails to start. A child that overruns
/// the timeout is killed and reaped before returning.
pub fn run_command_with_timeout(
    command: &OsStr,
    args: &[&str],
    timeout: Duration,
) -> io::Result<Output> {
    let mut child = Command::new(command)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Output {
                status,
                stdout: collect(stdout),
                stderr: collect(stderr),
            });
        }
        let now = Instant::now();
        if now >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("Command timed out after {timeout:?}"),
            ));
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Runs `command` and returns its stdout, mapping spawn failures, timeouts
/// and non-zero exits to [`Error::CommandFailed`].
pub fn run_for_stdout(command: &OsStr, args: &[&str], timeout: Duration) -> Result<String> {
    let display = || {
        let mut line = command.to_string_lossy().into_owned();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    };

    let output = run_command_with_timeout(command, args, timeout).map_err(|e| {
        Error::CommandFailed {
            command: display(),
            code: None,
            stderr: e.to_string(),
        }
    })?;

    if !output.status.success() {
        return Err(Error::CommandFailed {
            command: display(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_stdout_captured() {
        let out =
            run_for_stdout(OsStr::new("echo"), &["link", "UP"], Duration::from_secs(5)).unwrap();
        assert_eq!(out.trim(), "link UP");
    }

    #[test]
    fn test_missing_binary() {
        let err = run_for_stdout(
            OsStr::new("/nonexistent/hccn_tool"),
            &["-i", "0"],
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, Error::CommandFailed { code: None, .. }));
    }

    #[test]
    fn test_non_zero_exit() {
        let err = run_for_stdout(OsStr::new("false"), &[], Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, Error::CommandFailed { code: Some(1), .. }));
    }

    #[test]
    fn test_timeout() {
        let err = run_command_with_timeout(OsStr::new("sleep"), &["5"], Duration::from_millis(50))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_stderr_captured() {
        let output = run_command_with_timeout(
            OsStr::new("sh"),
            &["-c", "echo out; echo err >&2"],
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "out");
        assert_eq!(String::from_utf8_lossy(&output.stderr).trim(), "err");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_timed_out_child_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("child.pid");
        let script = format!("echo $$ > {}; exec sleep 30", pid_file.display());

        let started = Instant::now();
        let err = run_command_with_timeout(
            OsStr::new("sh"),
            &["-c", &script],
            Duration::from_millis(300),
        )
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(5));

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let proc_dir = std::path::PathBuf::from(format!("/proc/{}", pid.trim()));
        assert!(!proc_dir.exists(), "child {} still running", pid.trim());
    }
}
