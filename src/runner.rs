use anyhow::{Context, Result};
use declarative::{ActuationError, CommandOutput, CommandSpec};
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Build the process for a command spec: env overlay, cwd, and `runuser`
/// when the command runs as another account.
fn build(spec: &CommandSpec) -> Command {
    let mut cmd = match &spec.user {
        Some(user) => {
            let mut cmd = Command::new("runuser");
            cmd.args(["-u", user.as_str(), "--", spec.program.as_str()]);
            cmd
        }
        None => Command::new(&spec.program),
    };
    cmd.args(&spec.args);
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }
    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }
    cmd
}

/// Run a command and capture output, killing it once `timeout` passes
pub fn run_capture(spec: &CommandSpec, timeout: Option<Duration>) -> Result<CommandOutput, ActuationError> {
    log::debug!("running: {}", spec.display());

    let mut child = build(spec)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ActuationError::failed(format!("Failed to execute {}: {}", spec.display(), e)))?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let success = wait(&mut child, spec, timeout)?;

    Ok(CommandOutput {
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
        success,
    })
}

/// Run a command that must succeed, with its stderr in the error
pub fn run_checked(spec: &CommandSpec, timeout: Option<Duration>) -> Result<CommandOutput, ActuationError> {
    let output = run_capture(spec, timeout)?;
    if output.success {
        Ok(output)
    } else {
        Err(ActuationError::failed(format!(
            "{} failed: {}",
            spec.display(),
            output.stderr_str().trim()
        )))
    }
}

/// Run a query command, returning its exit code and stdout
pub fn run_query(spec: &CommandSpec) -> Result<(Option<i32>, String)> {
    let output = build(spec)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to execute: {}", spec.display()))?;
    Ok((
        output.status.code(),
        String::from_utf8_lossy(&output.stdout).to_string(),
    ))
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn wait(child: &mut Child, spec: &CommandSpec, timeout: Option<Duration>) -> Result<bool, ActuationError> {
    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status.success()),
            Ok(None) => {}
            Err(e) => {
                return Err(ActuationError::failed(format!(
                    "Failed to wait for {}: {}",
                    spec.display(),
                    e
                )));
            }
        }

        if let Some(limit) = timeout
            && started.elapsed() >= limit
        {
            log::warn!("{} exceeded {:?}, killing", spec.display(), limit);
            let _ = child.kill();
            let _ = child.wait();
            return Err(ActuationError::TimedOut {
                what: spec.display(),
                after: limit,
            });
        }

        thread::sleep(POLL_INTERVAL);
    }
}
