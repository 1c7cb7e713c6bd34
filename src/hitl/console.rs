//! Terminal approval gate and output sink.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::error::{Error, Result};

use super::{ApprovalGate, Decision, OutputSink};

type Reader = Box<dyn AsyncBufRead + Send + Unpin>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Approval gate that prints the content and reads `y`/`n` from a terminal.
///
/// Any answer other than `y` or `yes` (case-insensitive) rejects.
pub struct ConsoleGate {
    io: Mutex<(Reader, Writer)>,
    timeout: Option<Duration>,
}

impl ConsoleGate {
    /// Creates a gate on the process's stdin and stdout.
    pub fn stdio() -> Self {
        Self::new(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
    }

    /// Creates a gate on arbitrary streams.
    pub fn new(
        reader: impl AsyncBufRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            io: Mutex::new((Box::new(reader), Box::new(writer))),
            timeout: None,
        }
    }

    /// Fails the approval when no answer arrives within `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    async fn read_answer(reader: &mut Reader) -> Result<String> {
        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| Error::ApprovalInput(e.to_string()))?;
        if read == 0 {
            return Err(Error::ApprovalInput("input closed before an answer".to_string()));
        }
        Ok(line)
    }
}

/// Parses a terminal answer.
fn parse_answer(answer: &str) -> Decision {
    let answer = answer.trim().to_lowercase();
    Decision::from(answer == "y" || answer == "yes")
}

#[async_trait]
impl ApprovalGate for ConsoleGate {
    async fn ask(&self, title: &str, content: &str) -> Result<Decision> {
        let mut io = self.io.lock().await;
        let (reader, writer) = &mut *io;

        let banner = format!(
            "\n--- {} ---\n\n{}\n\nApprove this output? (y/n): ",
            title, content
        );
        writer.write_all(banner.as_bytes()).await?;
        writer.flush().await?;

        let answer = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, Self::read_answer(reader))
                .await
                .map_err(|_| Error::ApprovalTimeout(limit))??,
            None => Self::read_answer(reader).await?,
        };

        let decision = parse_answer(&answer);
        tracing::info!(title, decision = ?decision, "approval answered");
        Ok(decision)
    }
}

/// Sink that prints stage progress and output to stdout.
///
/// Gated output is left to the approval gate unless `show_gated` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink {
    show_gated: bool,
}

impl ConsoleSink {
    /// Creates a sink that prints only ungated output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also prints output of gated stages, for runs without an interactive gate.
    pub fn with_gated(mut self, show_gated: bool) -> Self {
        self.show_gated = show_gated;
        self
    }

    fn shows(&self, gated: bool) -> bool {
        !gated || self.show_gated
    }
}

impl OutputSink for ConsoleSink {
    fn stage_started(&self, index: usize, total: usize, title: &str) {
        println!("\n[{}/{}] Generating {}...", index + 1, total, title);
    }

    fn stage_output(&self, title: &str, content: &str, gated: bool) {
        if self.shows(gated) {
            println!("\n--- {} ---\n\n{}", title, content);
        }
    }

    fn stage_skipped(&self, title: &str) {
        println!("\n{}: carried over from the previous run", title);
    }
}
