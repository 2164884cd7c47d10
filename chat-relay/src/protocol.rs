use std::io;

use clap::ValueEnum;
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Keyword a participant sends to leave the chat.
pub const QUIT_KEYWORD: &str = "quit";

/// How inbound bytes are split into logical messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Framing {
    /// Each read from the socket is one message. Matches the bare byte-stream
    /// protocol that existing clients speak, including its coalescing hazard.
    #[default]
    Raw,
    /// Each newline-terminated line is one message.
    Lines,
}

/// Reads logical messages from one side of a connection.
///
/// Both framings keep partial input inside the reader between calls, so a
/// pending [`next_message`](Self::next_message) can be dropped by `select!`
/// without losing bytes.
pub struct MessageReader<R> {
    inner: Inner<R>,
}

enum Inner<R> {
    Raw {
        reader: R,
        read_len: usize,
        /// Start of a UTF-8 sequence cut off by the previous read.
        partial: Vec<u8>,
    },
    Lines(FramedRead<R, LinesCodec>),
}

impl<R> MessageReader<R>
where
    R: AsyncRead + Unpin,
{
    /// `limit` is the size of one read for [`Framing::Raw`] and the longest
    /// accepted line for [`Framing::Lines`].
    pub fn new(reader: R, framing: Framing, limit: usize) -> Self {
        let limit = limit.max(1);
        let inner = match framing {
            Framing::Raw => Inner::Raw {
                reader,
                read_len: limit,
                partial: Vec::new(),
            },
            Framing::Lines => {
                Inner::Lines(FramedRead::new(reader, LinesCodec::new_with_max_length(limit)))
            }
        };
        Self { inner }
    }

    /// Returns the next message, or `None` once the peer has closed its side.
    ///
    /// Bytes that are not valid UTF-8 surface as `InvalidData`; so does a line
    /// longer than the configured limit.
    pub async fn next_message(&mut self) -> io::Result<Option<String>> {
        match &mut self.inner {
            Inner::Raw {
                reader,
                read_len,
                partial,
            } => next_chunk(reader, *read_len, partial).await,
            Inner::Lines(lines) => match lines.next().await {
                None => Ok(None),
                Some(Ok(line)) => Ok(Some(line)),
                Some(Err(LinesCodecError::Io(err))) => Err(err),
                Some(Err(err @ LinesCodecError::MaxLineLengthExceeded)) => {
                    Err(io::Error::new(io::ErrorKind::InvalidData, err))
                }
            },
        }
    }
}

/// One read is one message, except that a character split across reads is
/// held back until its remaining bytes arrive.
async fn next_chunk<R>(
    reader: &mut R,
    read_len: usize,
    partial: &mut Vec<u8>,
) -> io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; read_len];
    loop {
        let bytes = reader.read(&mut buf).await?;
        if bytes == 0 {
            if partial.is_empty() {
                return Ok(None);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream ended inside a UTF-8 sequence",
            ));
        }
        partial.extend_from_slice(&buf[..bytes]);

        let err = match String::from_utf8(std::mem::take(partial)) {
            Ok(text) => return Ok(Some(text)),
            Err(err) => err,
        };
        let utf8 = err.utf8_error();
        if utf8.error_len().is_some() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, err));
        }

        let mut complete = err.into_bytes();
        *partial = complete.split_off(utf8.valid_up_to());
        if !complete.is_empty() {
            return String::from_utf8(complete)
                .map(Some)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err));
        }
    }
}

/// Writes `message` followed by a newline and flushes so peers see it promptly.
pub async fn write_line<W>(writer: &mut W, message: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = Vec::with_capacity(message.len() + 1);
    encoded.extend_from_slice(message.as_bytes());
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await
}

pub fn strip_line_ending(text: &str) -> &str {
    text.trim_end_matches(LINE_ENDINGS)
}

pub fn is_quit(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case(QUIT_KEYWORD)
}

pub fn join_announcement(name: &str) -> String {
    format!("{name} joined the chat!")
}

pub fn departure_announcement(name: &str) -> String {
    format!("{name} left the chat!")
}

pub fn chat_line(name: &str, text: &str) -> String {
    format!("{name}: {text}")
}
