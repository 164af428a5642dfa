//! External process execution behind the [`Executor`] trait.
use anyhow::{Context, Result, bail};
use std::io::{BufRead as _, BufReader, Write as _};
use std::path::Path;
use std::process::{Command, Output, Stdio};

/// Result of a command execution.
///
/// Commands run with inherited output leave `stdout` and `stderr` empty.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Exit code, `None` if terminated by a signal.
    pub code: Option<i32>,
}

impl From<Output> for ExecResult {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

/// Which standard streams a child shares with this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attach {
    /// Inherit standard input; otherwise it is closed.
    pub stdin: bool,
    /// Inherit standard output; otherwise it is discarded.
    pub stdout: bool,
    /// Inherit standard error; otherwise it is discarded.
    pub stderr: bool,
}

impl Default for Attach {
    fn default() -> Self {
        Self {
            stdin: true,
            stdout: true,
            stderr: true,
        }
    }
}

/// Runs external programs. Production code uses [`SystemExecutor`]; tests
/// substitute a recording mock.
pub trait Executor: Send + Sync {
    /// Run a command, capturing output, and fail on non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned or exits non-zero.
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult>;

    /// Like [`run`](Self::run) but in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned or exits non-zero.
    fn run_in(&self, dir: &Path, program: &str, args: &[&str]) -> Result<ExecResult>;

    /// Run a command, capturing output, without checking the exit status.
    ///
    /// # Errors
    ///
    /// Returns an error only if the command cannot be spawned.
    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult>;

    /// Run a command attached to this process's streams as selected by
    /// `attach`, without checking the exit status.
    ///
    /// # Errors
    ///
    /// Returns an error only if the command cannot be spawned.
    fn run_attached(&self, program: &str, args: &[&str], attach: Attach) -> Result<ExecResult>;

    /// Write `input` to the child's standard input, close it, and wait.
    /// Output streams are inherited.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned or the input
    /// cannot be written.
    fn run_with_input(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
        input: &[u8],
    ) -> Result<ExecResult>;

    /// Run a command and pass each line of its standard output to
    /// `on_line` as it arrives. Standard error is inherited.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned.
    fn run_streaming(
        &self,
        program: &str,
        args: &[&str],
        on_line: &mut dyn FnMut(&str),
    ) -> Result<ExecResult>;

    /// Check if a program is available on `PATH`.
    fn which(&self, program: &str) -> bool;
}

/// [`Executor`] backed by [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

/// Execute a command and return the result, bailing on non-zero exit.
fn execute_checked(mut cmd: Command, label: &str) -> Result<ExecResult> {
    let output = cmd
        .output()
        .with_context(|| format!("failed to execute: {label}"))?;
    let result = ExecResult::from(output);
    if !result.success {
        bail!(
            "{label} failed (exit {}): {}",
            result.code.unwrap_or(-1),
            result.stderr.trim()
        );
    }
    Ok(result)
}

fn stdio(inherit: bool) -> Stdio {
    if inherit { Stdio::inherit() } else { Stdio::null() }
}

impl Executor for SystemExecutor {
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        execute_checked(cmd, program)
    }

    fn run_in(&self, dir: &Path, program: &str, args: &[&str]) -> Result<ExecResult> {
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(dir);
        execute_checked(cmd, &format!("{program} in {}", dir.display()))
    }

    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("failed to execute: {program}"))?;
        Ok(ExecResult::from(output))
    }

    fn run_attached(&self, program: &str, args: &[&str], attach: Attach) -> Result<ExecResult> {
        let status = Command::new(program)
            .args(args)
            .stdin(stdio(attach.stdin))
            .stdout(stdio(attach.stdout))
            .stderr(stdio(attach.stderr))
            .status()
            .with_context(|| format!("failed to execute: {program}"))?;
        Ok(ExecResult {
            success: status.success(),
            code: status.code(),
            ..ExecResult::default()
        })
    }

    fn run_with_input(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
        input: &[u8],
    ) -> Result<ExecResult> {
        let mut cmd = Command::new(program);
        cmd.args(args).stdin(Stdio::piped());
        for (k, v) in env {
            cmd.env(k, v);
        }
        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to execute: {program}"))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input)
                .with_context(|| format!("writing input to {program}"))?;
        }
        let status = child
            .wait()
            .with_context(|| format!("waiting for {program}"))?;
        Ok(ExecResult {
            success: status.success(),
            code: status.code(),
            ..ExecResult::default()
        })
    }

    fn run_streaming(
        &self,
        program: &str,
        args: &[&str],
        on_line: &mut dyn FnMut(&str),
    ) -> Result<ExecResult> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to execute: {program}"))?;
        let mut collected = String::new();
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let line = line.with_context(|| format!("reading output of {program}"))?;
                on_line(&line);
                collected.push_str(&line);
                collected.push('\n');
            }
        }
        let output = child
            .wait_with_output()
            .with_context(|| format!("waiting for {program}"))?;
        let mut result = ExecResult::from(output);
        result.stdout = collected;
        Ok(result)
    }

    fn which(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// A program and its arguments, built before handing them to an [`Executor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program to start.
    pub program: String,
    /// Arguments, in order.
    pub args: Vec<String>,
}

impl Invocation {
    /// `program` with `args`.
    #[must_use]
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Split `command` the way a POSIX shell would, without running one.
    ///
    /// # Errors
    ///
    /// Returns an error if the quoting is unbalanced or the command is empty.
    pub fn split(command: &str) -> Result<Self> {
        let words = shlex::split(command)
            .with_context(|| format!("invalid quoting in command: {command}"))?;
        let mut words = words.into_iter();
        let Some(program) = words.next() else {
            bail!("empty command");
        };
        Ok(Self {
            program,
            args: words.collect(),
        })
    }

    /// Run `command` through `shell`: `powershell -NoProfile -NoLogo
    /// -Command` on Windows, `shell -c` elsewhere.
    #[must_use]
    pub fn shell(shell: &str, command: &str) -> Self {
        if shell.starts_with("powershell") {
            Self::new(shell, ["-NoProfile", "-NoLogo", "-Command", command])
        } else {
            Self::new(shell, ["-c", command])
        }
    }

    /// Wrap in `sudo -E`.
    #[must_use]
    pub fn sudo(self) -> Self {
        let mut args = vec!["-E".to_string(), self.program];
        args.extend(self.args);
        Self {
            program: "sudo".to_string(),
            args,
        }
    }

    /// Wrap in `sudo -E` when `elevate` is set.
    #[must_use]
    pub fn sudo_if(self, elevate: bool) -> Self {
        if elevate { self.sudo() } else { self }
    }

    /// Arguments as borrowed strings, for the [`Executor`] methods.
    #[must_use]
    pub fn arg_refs(&self) -> Vec<&str> {
        self.args.iter().map(String::as_str).collect()
    }

    /// Run attached to this process's streams and fail on non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be started or exits non-zero.
    pub fn run_attached(&self, executor: &dyn Executor, attach: Attach) -> Result<ExecResult> {
        let result = executor.run_attached(&self.program, &self.arg_refs(), attach)?;
        self.check(result)
    }

    /// Run capturing output and fail on non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be started or exits non-zero.
    pub fn run_captured(&self, executor: &dyn Executor) -> Result<ExecResult> {
        let result = executor.run_unchecked(&self.program, &self.arg_refs())?;
        self.check(result)
    }

    /// Turn a non-zero exit in `result` into an error naming this command.
    ///
    /// # Errors
    ///
    /// Returns an error unless `result` succeeded.
    pub fn check(&self, result: ExecResult) -> Result<ExecResult> {
        if result.success {
            return Ok(result);
        }
        let stderr = result.stderr.trim();
        match result.code {
            Some(code) if stderr.is_empty() => bail!("{self} exited with status {code}"),
            Some(code) => bail!("{self} exited with status {code}: {stderr}"),
            None => bail!("{self} was terminated by a signal"),
        }
    }
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[cfg(not(windows))]
    #[test]
    fn run_echo() {
        let result = SystemExecutor.run("echo", &["hello"]).unwrap();
        assert!(result.success, "echo command should succeed");
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[cfg(not(windows))]
    #[test]
    fn run_failure() {
        let result = SystemExecutor.run("false", &[]);
        assert!(result.is_err(), "non-zero exit should produce an error");
    }

    #[cfg(not(windows))]
    #[test]
    fn run_unchecked_failure() {
        let result = SystemExecutor.run_unchecked("false", &[]).unwrap();
        assert!(!result.success, "non-zero exit should set success=false");
    }

    #[cfg(not(windows))]
    #[test]
    fn run_with_input_feeds_stdin() {
        let result = SystemExecutor
            .run_with_input("sh", &["-c", "test \"$(cat)\" = ping"], &[], b"ping")
            .unwrap();
        assert!(result.success, "child should read the piped input");
    }

    #[cfg(not(windows))]
    #[test]
    fn run_with_input_passes_env() {
        let result = SystemExecutor
            .run_with_input("sh", &["-c", "test \"$MARK\" = 1"], &[("MARK", "1")], b"")
            .unwrap();
        assert!(result.success);
    }

    #[cfg(not(windows))]
    #[test]
    fn run_streaming_yields_lines_in_order() {
        let mut seen = Vec::new();
        let result = SystemExecutor
            .run_streaming("printf", &["a\\nb\\n"], &mut |line| seen.push(line.to_string()))
            .unwrap();
        assert!(result.success);
        assert_eq!(seen, vec!["a", "b"]);
        assert_eq!(result.stdout, "a\nb\n");
    }

    #[cfg(not(windows))]
    #[test]
    fn run_attached_reports_status() {
        let attach = Attach {
            stdin: false,
            stdout: false,
            stderr: false,
        };
        let result = SystemExecutor.run_attached("false", &[], attach).unwrap();
        assert!(!result.success);
        assert_eq!(result.code, Some(1));
    }

    #[test]
    fn which_missing_program() {
        assert!(
            !SystemExecutor.which("this-program-does-not-exist-12345"),
            "non-existent program should not be found"
        );
    }

    #[test]
    fn spawn_failure_is_an_error() {
        assert!(
            SystemExecutor
                .run_unchecked("this-program-does-not-exist-12345", &[])
                .is_err()
        );
    }

    #[test]
    fn invocation_split_honours_quotes() {
        let inv = Invocation::split("git commit -m 'two words'").unwrap();
        assert_eq!(inv.program, "git");
        assert_eq!(inv.args, ["commit", "-m", "two words"]);
        assert!(Invocation::split("  ").is_err());
        assert!(Invocation::split("echo 'open").is_err());
    }

    #[test]
    fn invocation_sudo_prefixes() {
        let inv = Invocation::new("apt-get", ["install", "jq"]).sudo();
        assert_eq!(inv.to_string(), "sudo -E apt-get install jq");
        let same = Invocation::new("ls", Vec::<String>::new()).sudo_if(false);
        assert_eq!(same.to_string(), "ls");
    }

    #[test]
    fn invocation_shell_forms() {
        assert_eq!(Invocation::shell("bash", "echo hi").args, ["-c", "echo hi"]);
        assert_eq!(
            Invocation::shell("powershell", "dir").args,
            ["-NoProfile", "-NoLogo", "-Command", "dir"]
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn invocation_failure_names_the_command() {
        let err = Invocation::new("false", Vec::<String>::new())
            .run_captured(&SystemExecutor)
            .unwrap_err();
        assert_eq!(err.to_string(), "false exited with status 1");
    }
}
