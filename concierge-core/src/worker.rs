//! The System Worker (C1, spec §4.2): runs subprocesses, owns per-executable
//! locks, retries, timeouts, trace output, privilege-drop, and user-home
//! file I/O with ownership repair.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::command::Command;
use crate::error::{ConciergeError, Result};
use crate::models::{SnapInfo, SnapSource};
use crate::retry::{self, RetryBounds, RetryLimit};
use crate::user::{self, InvokingUser};

/// Retry bounds for `run_with_retries` (spec §4.2): [1s, 60s], jitterable.
const RUN_RETRY_BOUNDS: RetryBounds = RetryBounds { min: Duration::from_secs(1), max: Duration::from_secs(60) };

/// Fraction of `max_duration` allotted to a single attempt, leaving room
/// for at least one retry.
const PER_ATTEMPT_FRACTION: f64 = 0.9;

pub struct Worker {
    trace: bool,
    invoking_user: InvokingUser,
    locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    snap_source: Box<dyn SnapSource>,
}

impl Worker {
    pub fn new(trace: bool, snap_source: Box<dyn SnapSource>) -> Self {
        Worker {
            trace,
            invoking_user: user::resolve(),
            locks: StdMutex::new(HashMap::new()),
            snap_source,
        }
    }

    pub fn username(&self) -> &str {
        &self.invoking_user.username
    }

    pub fn home_dir(&self) -> &Path {
        &self.invoking_user.home_dir
    }

    /// Execute synchronously in a child process; stdin closed, stdout and
    /// stderr merged. On nonzero exit, fails with a `CommandFailure`. In
    /// trace mode, the command and its output are printed regardless of
    /// outcome.
    pub async fn run(&self, cmd: &Command) -> Result<Vec<u8>> {
        let _scope = crate::scoped_context!("executable" => cmd.executable.clone());
        let command_string = cmd.command_string();
        let argv = cmd.full_argv();
        debug!(command = %command_string, "starting command");

        let mut child = TokioCommand::new(&argv[0])
            .args(&argv[1..])
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(ConciergeError::Io)?;

        let mut stdout_pipe = child.stdout.take().expect("stdout was piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr was piped");
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();

        let (stdout_res, stderr_res, status_res) = tokio::join!(
            stdout_pipe.read_to_end(&mut stdout_buf),
            stderr_pipe.read_to_end(&mut stderr_buf),
            child.wait(),
        );
        stdout_res.map_err(ConciergeError::Io)?;
        stderr_res.map_err(ConciergeError::Io)?;
        let status = status_res.map_err(ConciergeError::Io)?;

        let mut merged = stdout_buf;
        merged.extend_from_slice(&stderr_buf);
        let merged_output = String::from_utf8_lossy(&merged).into_owned();

        if self.trace {
            print_trace(&command_string, &merged_output);
        }

        if !status.success() {
            let exit_code = status.code().unwrap_or(1);
            return Err(ConciergeError::command(command_string, exit_code, merged_output));
        }

        debug!(command = %command_string, "finished command");
        Ok(merged)
    }

    /// Acquire the lock keyed by `cmd.executable`, then call `run`. Locks
    /// are allocated lazily; `tokio::sync::Mutex` serves waiters in FIFO
    /// order, giving the fairness spec §4.2 asks for.
    pub async fn run_exclusive(&self, cmd: &Command) -> Result<Vec<u8>> {
        let lock = self.lock_for(&cmd.executable);
        let _guard = lock.lock().await;
        self.run(cmd).await
    }

    fn lock_for(&self, executable: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("lock table poisoned");
        locks
            .entry(executable.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Retry on `CommandFailure` or per-attempt timeout using exponential
    /// backoff bounded to [1s, 60s] and an overall deadline of
    /// `max_duration`. Each attempt is capped to 90% of `max_duration`.
    pub async fn run_with_retries(&self, cmd: &Command, max_duration: Duration) -> Result<Vec<u8>> {
        let per_attempt = max_duration.mul_f64(PER_ATTEMPT_FRACTION);
        let command_string = cmd.command_string();

        retry::retry(RUN_RETRY_BOUNDS, RetryLimit::MaxDuration(max_duration), retry::never_terminal, || {
            let command_string = command_string.clone();
            async move {
                match tokio::time::timeout(per_attempt, self.run(cmd)).await {
                    Ok(result) => result,
                    Err(_elapsed) => Err(ConciergeError::timeout(command_string)),
                }
            }
        })
        .await
    }

    /// Write a file under the invoking user's home. `rel_path` must not be
    /// absolute.
    pub async fn write_home_file(&self, rel_path: &Path, contents: &[u8]) -> Result<()> {
        self.require_relative(rel_path)?;
        if let Some(parent) = rel_path.parent() {
            if !parent.as_os_str().is_empty() {
                self.mk_home_subdir(parent).await?;
            }
        }

        let full_path = self.home_dir().join(rel_path);
        tokio::fs::write(&full_path, contents).await.map_err(ConciergeError::Io)?;
        self.chown_recursive(&full_path).await;
        debug!(path = %full_path.display(), "wrote file");
        Ok(())
    }

    pub async fn mk_home_subdir(&self, rel_path: &Path) -> Result<()> {
        self.require_relative(rel_path)?;
        let full_path = self.home_dir().join(rel_path);
        tokio::fs::create_dir_all(&full_path).await.map_err(ConciergeError::Io)?;

        if let Some(top) = rel_path.components().next() {
            let top_level = self.home_dir().join(top.as_os_str());
            self.chown_recursive(&top_level).await;
        }

        debug!(path = %full_path.display(), "created directory");
        Ok(())
    }

    pub async fn remove_all_home(&self, rel_path: &Path) -> Result<()> {
        self.require_relative(rel_path)?;
        let full_path = self.home_dir().join(rel_path);
        if full_path.is_dir() {
            tokio::fs::remove_dir_all(&full_path).await.map_err(ConciergeError::Io)?;
        } else if full_path.exists() {
            tokio::fs::remove_file(&full_path).await.map_err(ConciergeError::Io)?;
        }
        Ok(())
    }

    pub async fn read_home_file(&self, rel_path: &Path) -> Result<Vec<u8>> {
        self.require_relative(rel_path)?;
        self.read_file(&self.home_dir().join(rel_path)).await
    }

    pub async fn read_file(&self, abs_path: &Path) -> Result<Vec<u8>> {
        if !abs_path.exists() {
            return Err(ConciergeError::FileNotFound(format!("file '{}' does not exist", abs_path.display())));
        }
        tokio::fs::read(abs_path).await.map_err(ConciergeError::Io)
    }

    pub async fn snap_info(&self, name: &str, channel: &str) -> Result<SnapInfo> {
        self.snap_source.snap_info(name, channel).await
    }

    pub async fn snap_channels(&self, name: &str) -> Result<Vec<String>> {
        self.snap_source.snap_channels(name).await
    }

    fn require_relative(&self, rel_path: &Path) -> Result<()> {
        if rel_path.is_absolute() {
            return Err(ConciergeError::ConfigurationInvalid(format!(
                "home-relative path must not be absolute: {}",
                rel_path.display()
            )));
        }
        Ok(())
    }

    /// `chown`-s recursively to the invoking user's uid/gid when the
    /// process is running privileged (spec §4.2 "Ownership repair").
    /// Failure to `chown` is logged but does not abort the operation.
    async fn chown_recursive(&self, path: &Path) {
        if !self.invoking_user.privileged {
            return;
        }

        let username = self.invoking_user.username.clone();
        let path = path.to_path_buf();

        let outcome = tokio::task::spawn_blocking(move || chown_recursive_blocking(&path, &username)).await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "failed to change ownership"),
            Err(e) => warn!(error = %e, "chown task panicked"),
        }
    }
}

fn chown_recursive_blocking(path: &Path, username: &str) -> std::io::Result<()> {
    use nix::unistd::{chown, Gid, Uid, User};

    let user = User::from_name(username)
        .map_err(|e| std::io::Error::other(e.to_string()))?
        .ok_or_else(|| std::io::Error::other(format!("unknown user: {username}")))?;
    let uid = Uid::from_raw(user.uid.as_raw());
    let gid = Gid::from_raw(user.gid.as_raw());

    let mut stack = vec![path.to_path_buf()];
    while let Some(current) = stack.pop() {
        if let Err(e) = chown(&current, Some(uid), Some(gid)) {
            warn!(path = %current.display(), error = %e, "failed to change ownership");
        }
        if current.is_dir() {
            if let Ok(entries) = std::fs::read_dir(&current) {
                for entry in entries.flatten() {
                    stack.push(entry.path());
                }
            }
        }
    }

    Ok(())
}

fn print_trace(command: &str, output: &str) {
    println!("\n\x1b[1;32;4mCommand:\x1b[0m \x1b[1m{command}\x1b[0m");
    if !output.is_empty() {
        println!("\x1b[1;32mOutput:\x1b[0m\n{output}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NullSnapSource;

    #[async_trait]
    impl SnapSource for NullSnapSource {
        async fn snap_info(&self, _name: &str, _channel: &str) -> Result<SnapInfo> {
            Ok(SnapInfo::default())
        }
        async fn snap_channels(&self, _name: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    fn worker() -> Worker {
        Worker::new(false, Box::new(NullSnapSource))
    }

    #[tokio::test]
    async fn run_captures_stdout_and_exit_code() {
        let w = worker();
        let cmd = Command::new("sh", vec!["-c".into(), "echo hello".into()]);
        let output = w.run(&cmd).await.unwrap();
        assert!(String::from_utf8_lossy(&output).contains("hello"));
    }

    #[tokio::test]
    async fn run_fails_on_nonzero_exit() {
        let w = worker();
        let cmd = Command::new("sh", vec!["-c".into(), "exit 3".into()]);
        let err = w.run(&cmd).await.unwrap_err();
        match err {
            ConciergeError::Command(f) => assert_eq!(f.exit_code, 3),
            other => panic!("expected CommandFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn run_exclusive_serializes_same_executable() {
        let w = Arc::new(worker());
        let a = w.clone();
        let b = w.clone();

        let ta = tokio::spawn(async move {
            let cmd = Command::new("sh", vec!["-c".into(), "sleep 0.05; echo a".into()]);
            a.run_exclusive(&cmd).await.unwrap();
        });
        let tb = tokio::spawn(async move {
            let cmd = Command::new("sh", vec!["-c".into(), "echo b".into()]);
            b.run_exclusive(&cmd).await.unwrap();
        });

        let _ = tokio::join!(ta, tb);
    }

    #[tokio::test]
    async fn home_file_io_rejects_absolute_paths() {
        let w = worker();
        let err = w.write_home_file(Path::new("/etc/passwd"), b"x").await.unwrap_err();
        assert!(matches!(err, ConciergeError::ConfigurationInvalid(_)));
    }

    #[tokio::test]
    async fn run_with_retries_eventually_times_out() {
        let w = worker();
        let cmd = Command::new("sh", vec!["-c".into(), "sleep 5".into()]);
        let err = w.run_with_retries(&cmd, Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, ConciergeError::Command(_)));
    }
}
