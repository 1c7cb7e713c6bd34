//! Shared subprocess execution for CLI-backed generators.

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Default wall-clock limit for one generation call.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Runs a command to completion and returns its stdout.
///
/// `stdin_payload` is written to the child's stdin when present, while its
/// output is read. The timeout covers the whole exchange. The child is killed
/// on timeout or if the returned future is dropped before it finishes.
pub(crate) async fn run_cli(
    generator: &str,
    program: &str,
    args: &[String],
    stdin_payload: Option<&str>,
    timeout: Duration,
) -> Result<String> {
    tracing::debug!(generator, program, args = ?args, "invoking generation backend");

    let mut child = Command::new(program)
        .args(args)
        .stdin(if stdin_payload.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Backend(format!("failed to spawn {}: {}", program, e)))?;

    let stdin = child.stdin.take();
    let feed = async move {
        let (Some(mut stdin), Some(payload)) = (stdin, stdin_payload) else {
            return Ok(());
        };
        match stdin.write_all(payload.as_bytes()).await {
            // The child may exit without reading all of its input.
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
            other => other,
        }
    };

    // Stdin is fed while stdout drains; the time limit covers both.
    let exchange = async { tokio::join!(feed, child.wait_with_output()) };
    let (fed, output) = match tokio::time::timeout(timeout, exchange).await {
        Ok(joined) => joined,
        Err(_) => {
            tracing::warn!(generator, limit = ?timeout, "generation backend timed out");
            return Err(Error::BackendTimeout {
                generator: generator.to_string(),
                limit: timeout,
            });
        }
    };
    let output =
        output.map_err(|e| Error::Backend(format!("failed to wait for {}: {}", program, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Backend(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            stderr.trim()
        )));
    }

    fed.map_err(|e| Error::Backend(format!("failed to write prompt to {}: {}", program, e)))?;

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
