use std::{
    io::{self, Read, Write},
    path::Path,
    process::{Command, ExitStatus, Stdio},
    thread,
};

use anyhow::{Context, Result};

use crate::progress::ProgressSuspendGuard;

const DEFAULT_MAX_CAPTURE_BYTES: usize = 1024 * 1024;

/// Package managers localise their messages; failure classification matches
/// the C locale text.
const BACKEND_LOCALE: [(&str, &str); 2] = [("LC_ALL", "C"), ("LANG", "C")];

fn max_capture_bytes() -> usize {
    std::env::var("YOINK_MAX_CAPTURE_BYTES")
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_CAPTURE_BYTES)
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// stderr followed by stdout, the way a user would want to read a
    /// failing backend's output.
    pub fn combined(&self) -> String {
        let mut text = String::new();
        for part in [self.stderr.trim_end(), self.stdout.trim_end()] {
            if part.is_empty() {
                continue;
            }
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(part);
        }
        text
    }
}

/// How backend subprocesses are run for this invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Invoker {
    /// Echo subprocess output live instead of only capturing it.
    pub verbose: bool,
}

impl Invoker {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Runs a backend tool in the C locale, streaming its output when verbose.
    ///
    /// # Errors
    /// Returns an error when the program cannot be spawned.
    pub fn run(&self, program: &str, args: &[String], cwd: &Path) -> Result<RunOutput> {
        tracing::debug!(program, ?args, cwd = %cwd.display(), "running backend command");
        if self.verbose {
            eprintln!("yoink ▸ {}", render_command(program, args));
            run_command_streaming(program, args, &locale_env(), cwd)
        } else {
            run_command(program, args, &locale_env(), cwd)
        }
    }

    /// Runs `first | second` without a shell, with `cwd` for both sides.
    ///
    /// # Errors
    /// Returns an error when either program cannot be spawned.
    pub fn run_pipeline(
        &self,
        first: (&str, &[String]),
        second: (&str, &[String]),
        cwd: &Path,
    ) -> Result<RunOutput> {
        if self.verbose {
            eprintln!(
                "yoink ▸ {} | {}",
                render_command(first.0, first.1),
                render_command(second.0, second.1)
            );
        }
        run_pipeline(first, second, &locale_env(), cwd)
    }
}

fn locale_env() -> Vec<(String, String)> {
    BACKEND_LOCALE
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn render_command(program: &str, args: &[String]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Execute a program and capture stdout/stderr.
///
/// # Errors
///
/// Returns an error when the program cannot be spawned or the I/O streams cannot
/// be read entirely.
pub fn run_command(
    program: &str,
    args: &[String],
    envs: &[(String, String)],
    cwd: &Path,
) -> Result<RunOutput> {
    let mut command = configured_command(program, args, envs, cwd);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to start {program}"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("stdout missing for {program}"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("stderr missing for {program}"))?;
    let limit = max_capture_bytes();
    let stdout_handle = thread::spawn(move || read_to_string_limited(stdout, limit));
    let stderr_handle = thread::spawn(move || read_to_string_limited(stderr, limit));

    let status = child
        .wait()
        .with_context(|| format!("failed to wait for {program}"))?;
    let (mut stdout, stdout_truncated) = stdout_handle
        .join()
        .map_err(|_| anyhow::anyhow!("stdout thread panicked"))??;
    let (mut stderr, stderr_truncated) = stderr_handle
        .join()
        .map_err(|_| anyhow::anyhow!("stderr thread panicked"))??;
    if stdout_truncated {
        stdout.push_str("\n[...truncated...]\n");
    }
    if stderr_truncated {
        stderr.push_str("\n[...truncated...]\n");
    }
    Ok(RunOutput {
        code: exit_code(status),
        stdout,
        stderr,
    })
}

/// Execute a program while streaming stdout/stderr to the parent process.
///
/// # Errors
///
/// Returns an error when the program cannot be spawned or its output streams
/// cannot be read.
pub fn run_command_streaming(
    program: &str,
    args: &[String],
    envs: &[(String, String)],
    cwd: &Path,
) -> Result<RunOutput> {
    let _suspend = ProgressSuspendGuard::new();
    let mut command = configured_command(program, args, envs, cwd);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to start {program}"))?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("stdout missing for {program}"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("stderr missing for {program}"))?;

    let limit = max_capture_bytes();
    // Backend chatter goes to stderr so it never mixes with the target's stdout.
    let stdout_handle =
        thread::spawn(move || tee_to_string_limited(&mut stdout, io::stderr(), limit));
    let stderr_handle =
        thread::spawn(move || tee_to_string_limited(&mut stderr, io::stderr(), limit));

    let status = child
        .wait()
        .with_context(|| format!("failed to wait for {program}"))?;
    let stdout = stdout_handle
        .join()
        .map_err(|_| anyhow::anyhow!("stdout thread panicked"))??;
    let stderr = stderr_handle
        .join()
        .map_err(|_| anyhow::anyhow!("stderr thread panicked"))??;

    Ok(RunOutput {
        code: exit_code(status),
        stdout,
        stderr,
    })
}

/// Connects `first`'s stdout to `second`'s stdin and captures both stderr
/// streams. The reported code is the first non-zero exit of the two.
///
/// # Errors
///
/// Returns an error when either program cannot be spawned.
pub fn run_pipeline(
    first: (&str, &[String]),
    second: (&str, &[String]),
    envs: &[(String, String)],
    cwd: &Path,
) -> Result<RunOutput> {
    let (first_program, first_args) = first;
    let (second_program, second_args) = second;

    let mut producer = configured_command(first_program, first_args, envs, cwd);
    producer.stdin(Stdio::null());
    producer.stdout(Stdio::piped());
    producer.stderr(Stdio::piped());
    let mut producer = producer
        .spawn()
        .with_context(|| format!("failed to start {first_program}"))?;
    let pipe = producer
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("stdout missing for {first_program}"))?;

    let mut consumer = configured_command(second_program, second_args, envs, cwd);
    consumer.stdin(Stdio::from(pipe));
    consumer.stdout(Stdio::piped());
    consumer.stderr(Stdio::piped());
    let consumer = match consumer.spawn() {
        Ok(child) => child,
        Err(err) => {
            let _ = producer.kill();
            let _ = producer.wait();
            return Err(err).with_context(|| format!("failed to start {second_program}"));
        }
    };

    let limit = max_capture_bytes();
    let producer_stderr = producer
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("stderr missing for {first_program}"))?;
    let producer_errors = thread::spawn(move || read_to_string_limited(producer_stderr, limit));

    let consumer_output = consumer
        .wait_with_output()
        .with_context(|| format!("failed to wait for {second_program}"))?;
    let producer_status = producer
        .wait()
        .with_context(|| format!("failed to wait for {first_program}"))?;
    let (producer_stderr, _) = producer_errors
        .join()
        .map_err(|_| anyhow::anyhow!("stderr thread panicked"))??;

    let producer_code = exit_code(producer_status);
    let consumer_code = exit_code(consumer_output.status);
    let code = if producer_code == 0 {
        consumer_code
    } else {
        producer_code
    };
    let mut stderr = producer_stderr;
    stderr.push_str(&String::from_utf8_lossy(&consumer_output.stderr));
    Ok(RunOutput {
        code,
        stdout: String::from_utf8_lossy(&consumer_output.stdout).to_string(),
        stderr,
    })
}

fn configured_command(
    program: &str,
    args: &[String],
    envs: &[(String, String)],
    cwd: &Path,
) -> Command {
    let mut command = Command::new(program);
    command.args(args);
    for (key, value) in envs {
        command.env(key, value);
    }
    command.current_dir(cwd);
    command
}

/// Execute a program with inherited stdio and wait for it.
///
/// # Errors
///
/// Returns the spawn error unchanged so callers can report it precisely.
pub fn run_command_passthrough(
    program: &Path,
    args: &[String],
    envs: &[(String, String)],
    cwd: &Path,
) -> io::Result<i32> {
    let _suspend = ProgressSuspendGuard::new();
    let mut command = Command::new(program);
    command.args(args);
    for (key, value) in envs {
        command.env(key, value);
    }
    command.current_dir(cwd);
    command.stdin(Stdio::inherit());
    command.stdout(Stdio::inherit());
    command.stderr(Stdio::inherit());

    let status = command.status()?;
    Ok(exit_code(status))
}

/// The child's exit code, or `128 + signal` when it was killed by a signal.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

fn read_to_string_limited(mut reader: impl Read, limit: usize) -> Result<(String, bool)> {
    let mut buffer = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        append_limited(&mut buffer, &chunk[..read], limit, &mut truncated);
    }
    Ok((String::from_utf8_lossy(&buffer).to_string(), truncated))
}

fn tee_to_string_limited(
    reader: &mut dyn Read,
    mut writer: impl Write,
    limit: usize,
) -> Result<String> {
    let mut buffer = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        writer.write_all(&chunk[..read])?;
        append_limited(&mut buffer, &chunk[..read], limit, &mut truncated);
    }
    writer.flush().ok();
    let mut text = String::from_utf8_lossy(&buffer).to_string();
    if truncated {
        text.push_str("\n[...truncated...]\n");
    }
    Ok(text)
}

/// Keeps the tail of the stream; the end of a backend's output is where the
/// error usually is.
fn append_limited(buffer: &mut Vec<u8>, chunk: &[u8], limit: usize, truncated: &mut bool) {
    if limit == 0 {
        return;
    }
    if buffer.len().saturating_add(chunk.len()) <= limit {
        buffer.extend_from_slice(chunk);
        return;
    }
    *truncated = true;
    let old_len = buffer.len();
    let excess = old_len.saturating_add(chunk.len()).saturating_sub(limit);
    if excess >= old_len {
        buffer.clear();
        let drop_from_chunk = excess.saturating_sub(old_len).min(chunk.len());
        buffer.extend_from_slice(&chunk[drop_from_chunk..]);
    } else {
        buffer.drain(0..excess);
        buffer.extend_from_slice(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::path::Path;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[test]
    fn run_command_captures_output_and_status() -> Result<()> {
        let output = run_command(
            "/bin/sh",
            &sh("printf out && printf err >&2; exit 7"),
            &[],
            Path::new("."),
        )?;
        assert_eq!(output.code, 7);
        assert_eq!(output.stdout, "out");
        assert_eq!(output.stderr, "err");
        assert_eq!(output.combined(), "err\nout");
        Ok(())
    }

    #[test]
    fn run_command_truncates_large_output() -> Result<()> {
        let bytes = DEFAULT_MAX_CAPTURE_BYTES + 1024;
        let output = run_command(
            "/bin/sh",
            &sh(&format!("yes a | head -c {bytes}")),
            &[],
            Path::new("."),
        )?;
        assert!(
            output.stdout.contains("[...truncated...]"),
            "stdout should include truncation marker"
        );
        assert!(
            output.stdout.len() <= DEFAULT_MAX_CAPTURE_BYTES + 64,
            "stdout should be bounded"
        );
        Ok(())
    }

    #[test]
    #[serial]
    fn run_command_streaming_captures_output() -> Result<()> {
        let output = run_command_streaming(
            "/bin/sh",
            &sh("printf out && printf err >&2"),
            &[],
            Path::new("."),
        )?;
        assert_eq!(output.stdout, "out");
        assert_eq!(output.stderr, "err");
        Ok(())
    }

    #[test]
    fn invoker_forces_c_locale() -> Result<()> {
        let output = Invoker::new(false).run("/bin/sh", &sh("printf \"$LC_ALL\""), Path::new("."))?;
        assert_eq!(output.stdout, "C");
        Ok(())
    }

    #[test]
    fn pipeline_connects_stdout_to_stdin() -> Result<()> {
        let output = run_pipeline(
            ("/bin/sh", sh("printf 'a\\nb\\n'").as_slice()),
            ("/bin/sh", sh("wc -l | tr -d ' '").as_slice()),
            &[],
            Path::new("."),
        )?;
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "2");
        Ok(())
    }

    #[test]
    fn pipeline_reports_producer_failure() -> Result<()> {
        let output = run_pipeline(
            ("/bin/sh", sh("echo broken >&2; exit 3").as_slice()),
            ("/bin/sh", sh("cat >/dev/null").as_slice()),
            &[],
            Path::new("."),
        )?;
        assert_eq!(output.code, 3);
        assert!(output.stderr.contains("broken"));
        Ok(())
    }

    #[test]
    #[serial]
    fn passthrough_returns_status() -> Result<()> {
        let code = run_command_passthrough(Path::new("/bin/sh"), &sh("exit 4"), &[], Path::new("."))?;
        assert_eq!(code, 4);
        Ok(())
    }

    #[test]
    #[serial]
    fn signal_termination_maps_above_128() -> Result<()> {
        let code =
            run_command_passthrough(Path::new("/bin/sh"), &sh("kill -TERM $$"), &[], Path::new("."))?;
        assert_eq!(code, 128 + 15);
        Ok(())
    }

    #[test]
    #[serial]
    fn passthrough_surfaces_spawn_errors() {
        let err = run_command_passthrough(
            Path::new("/nonexistent/yoink-test-binary"),
            &[],
            &[],
            Path::new("."),
        )
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
