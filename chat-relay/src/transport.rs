use std::io;

use anyhow::{Context, Result};
use tokio::{
    io::AsyncWriteExt,
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};

use crate::protocol::{Framing, MessageReader, strip_line_ending, write_line};

/// Longest server line a client accepts in one piece.
const RECEIVE_LIMIT: usize = 64 * 1024;

/// Client-side connection to a relay.
///
/// Front-ends hold one of these rather than owning the socket themselves.
/// The server always terminates its lines, so inbound traffic is read line by
/// line whatever `framing` says; `framing` only decides how outbound messages
/// are written.
pub struct Transport {
    reader: MessageReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    framing: Framing,
}

impl Transport {
    pub async fn connect(addr: &str, framing: Framing) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("failed to connect to {addr}"))?;
        Ok(Self::from_stream(stream, framing))
    }

    pub fn from_stream(stream: TcpStream, framing: Framing) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: MessageReader::new(reader, Framing::Lines, RECEIVE_LIMIT),
            writer,
            framing,
        }
    }

    /// Sends one message. Raw framing writes the bare text, as existing
    /// clients do; line framing appends the delimiter.
    pub async fn send(&mut self, text: &str) -> io::Result<()> {
        match self.framing {
            Framing::Raw => {
                self.writer.write_all(text.as_bytes()).await?;
                self.writer.flush().await
            }
            Framing::Lines => write_line(&mut self.writer, text).await,
        }
    }

    /// Next line from the server without its terminator, or `None` once the
    /// server has closed the connection.
    ///
    /// Cancel-safe: a partly received line stays buffered if the future is
    /// dropped, so this can sit in a `select!` loop.
    pub async fn receive(&mut self) -> io::Result<Option<String>> {
        let line = self.reader.next_message().await?;
        Ok(line.map(|line| strip_line_ending(&line).to_string()))
    }

    pub async fn close(mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }
}
