use std::io::Write;

use tracing::debug;

/// Why the poller is retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// Server unreachable or answering with an error status.
    Unreachable,
    /// Server answered with something we could not parse.
    Unknown,
}

/// What the single status line currently says.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Recording,
    Retrying(RetryReason),
}

impl Status {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Recording => "Recording Vocaluxe play history...",
            Self::Retrying(RetryReason::Unreachable) => {
                "Can't connect to the Vocaluxe server, retrying..."
            }
            Self::Retrying(RetryReason::Unknown) => "Unknown error occurred, retrying...",
        }
    }
}

/// Receives status changes from the poller.
pub trait StatusSink {
    fn show(&mut self, status: &Status);
}

/// Keeps one terminal line up to date by clearing and rewriting it in place.
pub struct TerminalStatus<W: Write> {
    out: W,
}

impl TerminalStatus<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> TerminalStatus<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Move off the status line so the shell prompt starts clean.
    pub fn finish(&mut self) {
        if let Err(e) = writeln!(self.out).and_then(|_| self.out.flush()) {
            debug!("[status] terminal write failed: {}", e);
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> StatusSink for TerminalStatus<W> {
    fn show(&mut self, status: &Status) {
        let res = write!(self.out, "\x1b[K\r{}\r", status.message()).and_then(|_| self.out.flush());
        if let Err(e) = res {
            debug!("[status] terminal write failed: {}", e);
        }
    }
}
