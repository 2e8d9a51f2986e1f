//! External command execution.
//!
//! Every pipeline step is an external tool (curl, git, tar, patch, sh,
//! strip, readelf). This module is the one place that spawns them, with
//! three run modes: capture the output, stream it to the terminal, or tee
//! every line to both the terminal and a build log.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

/// Output of a finished child, captured as strings.
#[derive(Debug)]
pub struct Captured {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl Captured {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code, -1 when the child was killed by a signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// One external command invocation.
///
/// Strict by default: a non-zero exit becomes an error carrying the
/// child's stderr. `lenient()` turns that off for callers that inspect
/// the status themselves.
pub struct Cmd {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    workdir: Option<PathBuf>,
    lenient: bool,
    fail_note: Option<String>,
}

impl Cmd {
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            env: Vec::new(),
            workdir: None,
            lenient: false,
            fail_note: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_string()));
        self
    }

    pub fn arg_path(self, path: &Path) -> Self {
        let arg = path.to_string_lossy().into_owned();
        self.arg(arg)
    }

    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .push((key.as_ref().to_string(), value.as_ref().to_string()));
        self
    }

    pub fn workdir(mut self, dir: &Path) -> Self {
        self.workdir = Some(dir.to_path_buf());
        self
    }

    /// Treat a non-zero exit as an ordinary outcome instead of an error.
    pub fn lenient(mut self) -> Self {
        self.lenient = true;
        self
    }

    /// Message used instead of the program name when the command fails.
    pub fn on_fail(mut self, note: impl AsRef<str>) -> Self {
        self.fail_note = Some(note.as_ref().to_string());
        self
    }

    fn assemble(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        for (key, value) in &self.env {
            command.env(key, value);
        }
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }
        command
    }

    fn spawn_context(&self) -> String {
        format!("could not run '{}' - is it installed?", self.program)
    }

    fn failure(&self, code: i32, stderr: &str) -> anyhow::Error {
        let what = match &self.fail_note {
            Some(note) => note.clone(),
            None => format!("{} exited with an error", self.program),
        };
        if stderr.is_empty() {
            anyhow::anyhow!("{} (exit {})", what, code)
        } else {
            anyhow::anyhow!("{} (exit {})\n{}", what, code, stderr)
        }
    }

    /// Run to completion, capturing stdout and stderr.
    pub fn capture(self) -> Result<Captured> {
        let output = self
            .assemble()
            .output()
            .with_context(|| self.spawn_context())?;

        let captured = Captured {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !self.lenient && !captured.success() {
            return Err(self.failure(captured.code(), captured.stderr_trimmed()));
        }
        Ok(captured)
    }

    /// Run with the terminal's own stdio. For children that draw their
    /// own progress, like curl and git.
    pub fn stream(self) -> Result<ExitStatus> {
        let mut command = self.assemble();
        command.stdin(Stdio::inherit());
        command.stdout(Stdio::inherit());
        command.stderr(Stdio::inherit());

        let status = command.status().with_context(|| self.spawn_context())?;
        if !self.lenient && !status.success() {
            return Err(self.failure(status.code().unwrap_or(-1), ""));
        }
        Ok(status)
    }

    /// Run while copying every output line to the terminal and appending
    /// it to `log`.
    ///
    /// stderr is drained on a helper thread so neither pipe can fill up
    /// and stall the child.
    pub fn log_to(self, log: &Path) -> Result<ExitStatus> {
        let out_log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log)
            .with_context(|| format!("could not open log file {}", log.display()))?;
        let err_log = out_log
            .try_clone()
            .context("could not duplicate log file handle")?;

        let mut command = self.assemble();
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let mut child = command.spawn().with_context(|| self.spawn_context())?;
        let stdout = child.stdout.take().context("child has no stdout pipe")?;
        let stderr = child.stderr.take().context("child has no stderr pipe")?;

        let err_drain = std::thread::spawn(move || tee(stderr, err_log, true));
        tee(stdout, out_log, false);
        let _ = err_drain.join();

        let status = child.wait().context("could not wait for child")?;
        if !self.lenient && !status.success() {
            return Err(self.failure(status.code().unwrap_or(-1), ""));
        }
        Ok(status)
    }
}

/// Copy lines from a child pipe to the terminal and a log file.
fn tee(pipe: impl std::io::Read, mut log: File, to_stderr: bool) {
    for line in BufReader::new(pipe).lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        if to_stderr {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
        let _ = writeln!(log, "{}", line);
    }
}

/// True when `program` resolves on PATH.
pub fn have(program: &str) -> bool {
    Command::new("sh")
        .args(["-c", &format!("command -v {} >/dev/null 2>&1", program)])
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
