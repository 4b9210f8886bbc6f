//! Worker-side half of the stdio protocol.
//!
//! A worker binary reads exactly one request, writes any number of messages,
//! and (for streaming workers) finishes with the done sentinel.
//!
//! ```no_run
//! use actionvisor::WorkerChannel;
//!
//! # async fn run() -> std::io::Result<()> {
//! let mut channel = WorkerChannel::stdio();
//! if let Some(request) = channel.recv_request().await? {
//!     channel.send(&format!("handled {} bytes", request.len())).await?;
//! }
//! channel.finish("PROCESS FINISHED").await
//! # }
//! ```

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};

use super::frame;

/// Framed message channel from inside a worker process.
pub struct WorkerChannel<R, W> {
    reader: R,
    writer: W,
}

impl WorkerChannel<BufReader<Stdin>, Stdout> {
    /// Channel over the current process's stdin/stdout.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> WorkerChannel<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wraps an arbitrary reader/writer pair.
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Reads the request payload.
    ///
    /// Returns `Ok(None)` if the parent closed the channel without sending one.
    pub async fn recv_request(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                return Ok(None);
            }
            match frame::decode(&line) {
                Ok(Some(payload)) => return Ok(Some(payload)),
                Ok(None) => continue,
                Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
            }
        }
    }

    /// Writes one message to the parent.
    pub async fn send(&mut self, message: &str) -> io::Result<()> {
        self.writer
            .write_all(frame::encode(message).as_bytes())
            .await?;
        self.writer.flush().await
    }

    /// Writes the done sentinel and flushes.
    pub async fn finish(&mut self, done_message: &str) -> io::Result<()> {
        self.send(done_message).await?;
        self.writer.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, duplex};

    #[tokio::test]
    async fn request_and_messages_round_trip_through_frames() {
        let (parent_side, worker_side) = duplex(1024);
        let (worker_read, worker_write) = tokio::io::split(worker_side);
        let (mut parent_read, mut parent_write) = tokio::io::split(parent_side);

        parent_write
            .write_all(frame::encode(r#"{"webhookId":"wh-1"}"#).as_bytes())
            .await
            .unwrap();

        let mut channel = WorkerChannel::new(BufReader::new(worker_read), worker_write);
        let request = channel.recv_request().await.unwrap();
        assert_eq!(request.as_deref(), Some(r#"{"webhookId":"wh-1"}"#));

        channel.send("chunk 1").await.unwrap();
        channel.finish("PROCESS FINISHED").await.unwrap();
        drop(channel);

        let mut out = String::new();
        parent_read.read_to_string(&mut out).await.unwrap();
        let lines: Vec<_> = out
            .lines()
            .filter_map(|l| frame::decode(l).unwrap())
            .collect();
        assert_eq!(lines, vec!["chunk 1", "PROCESS FINISHED"]);
    }

    #[tokio::test]
    async fn closed_parent_yields_no_request() {
        let (parent_side, worker_side) = duplex(64);
        drop(parent_side);
        let (r, w) = tokio::io::split(worker_side);
        let mut channel = WorkerChannel::new(BufReader::new(r), w);
        assert_eq!(channel.recv_request().await.unwrap(), None);
    }
}
