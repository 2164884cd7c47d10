use std::{io, net::SocketAddr};

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};
use tokio_util::sync::CancellationToken;

use crate::protocol::write_line;

pub type ConnectionId = u64;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Server-side handle to one accepted client.
///
/// Holds the write half of the socket; the read half stays with the owning
/// session. Writes are serialized per connection, so every recipient sees
/// whole messages in the order they were sent to it.
pub struct Connection {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    writer: Mutex<BoxedWriter>,
    closed: CancellationToken,
}

impl Connection {
    pub fn new<W>(id: ConnectionId, peer: Option<SocketAddr>, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id,
            peer,
            writer: Mutex::new(Box::new(writer)),
            closed: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub async fn send_line(&self, message: &str) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection already closed",
            ));
        }
        let mut writer = self.writer.lock().await;
        write_line(&mut *writer, message).await
    }

    /// Marks the connection closed and shuts down the write half.
    ///
    /// Safe to call more than once; the session blocked on this connection's
    /// read wakes through [`Connection::closed`].
    pub async fn close(&self) {
        self.closed.cancel();
        let mut writer = self.writer.lock().await;
        // The peer may already be gone; there is nothing left to report to.
        let _ = writer.shutdown().await;
    }

    /// Resolves once [`Connection::close`] has been called.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn send_line_writes_terminated_message() {
        let (writer, mut reader) = tokio::io::duplex(1024);
        let connection = Connection::new(1, None, writer);

        connection.send_line("hello").await.expect("send");
        connection.close().await;

        let mut received = String::new();
        reader.read_to_string(&mut received).await.expect("read");
        assert_eq!(received, "hello\n");
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (writer, _reader) = tokio::io::duplex(1024);
        let connection = Connection::new(7, None, writer);

        connection.close().await;
        connection.close().await;

        assert!(connection.is_closed());
        let err = connection.send_line("late").await.expect_err("closed");
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn close_wakes_waiters() {
        let (writer, _reader) = tokio::io::duplex(64);
        let connection = std::sync::Arc::new(Connection::new(3, None, writer));

        let waiter = {
            let connection = std::sync::Arc::clone(&connection);
            tokio::spawn(async move { connection.closed().await })
        };

        connection.close().await;
        waiter.await.expect("waiter task");
        assert!(connection.is_closed());
    }
}
