//! Ordered stdout/stderr buffers for the active execution.

use serde::{Deserialize, Serialize};

/// Output stream of the remote script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    /// Map an `output` envelope event name to a stream.
    #[must_use]
    pub fn from_event(event: &str) -> Option<Self> {
        match event {
            "stdout" => Some(Self::Stdout),
            "stderr" => Some(Self::Stderr),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Pair of append-only line sequences.
///
/// Order is preserved within each stream. Nothing relates the position of a
/// stdout line to a stderr line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputBuffer {
    stdout: Vec<String>,
    stderr: Vec<String>,
}

impl OutputBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line to a stream.
    pub fn append_line(&mut self, stream: Stream, line: impl Into<String>) {
        match stream {
            Stream::Stdout => self.stdout.push(line.into()),
            Stream::Stderr => self.stderr.push(line.into()),
        }
    }

    /// Drop all lines from both streams.
    pub fn clear(&mut self) {
        self.stdout.clear();
        self.stderr.clear();
    }

    /// Lines received on stdout, oldest first.
    #[must_use]
    pub fn stdout(&self) -> &[String] {
        &self.stdout
    }

    /// Lines received on stderr, oldest first.
    #[must_use]
    pub fn stderr(&self) -> &[String] {
        &self.stderr
    }

    #[must_use]
    pub fn lines(&self, stream: Stream) -> &[String] {
        match stream {
            Stream::Stdout => &self.stdout,
            Stream::Stderr => &self.stderr,
        }
    }

    /// Total number of lines across both streams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stdout.len() + self.stderr.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }
}
