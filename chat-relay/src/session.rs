use std::{io, sync::Arc};

use tokio::{io::AsyncRead, select};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    broadcast::Broadcaster,
    connection::Connection,
    protocol::{
        MessageReader, chat_line, departure_announcement, is_quit, join_announcement,
        strip_line_ending,
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the first message, which becomes the display name.
    Handshaking,
    /// Registered and relaying messages under `name`.
    Active { name: String },
    Closed,
}

/// Why a session reached [`SessionState::Closed`].
#[derive(Debug)]
pub enum CloseReason {
    /// The participant sent the quit keyword.
    Quit,
    /// The peer closed its side of the socket.
    Disconnected,
    /// Reading failed: reset, invalid UTF-8, and so on.
    ReadFailed(io::Error),
    /// A broadcast could not reach this connection and removed it.
    Evicted,
    /// The registry refused the connection.
    Rejected,
    /// The server is shutting down.
    Shutdown,
}

/// Server-side state machine for one connected client.
pub struct ClientSession<R> {
    connection: Arc<Connection>,
    reader: MessageReader<R>,
    broadcaster: Broadcaster,
    shutdown: CancellationToken,
    state: SessionState,
}

impl<R> ClientSession<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(
        connection: Arc<Connection>,
        reader: MessageReader<R>,
        broadcaster: Broadcaster,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            connection,
            reader,
            broadcaster,
            shutdown,
            state: SessionState::Handshaking,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Drives the session until it closes. Failures stay inside the session:
    /// they are logged and turn into a [`CloseReason`].
    pub async fn run(mut self) -> CloseReason {
        let reason = match self.handshake().await {
            Ok(name) => match self.activate(name.clone()).await {
                Ok(()) => self.relay(&name).await,
                Err(reason) => reason,
            },
            Err(reason) => reason,
        };

        self.close(&reason).await;
        reason
    }

    async fn handshake(&mut self) -> Result<String, CloseReason> {
        let raw = self.next_message().await?;
        Ok(strip_line_ending(&raw).to_string())
    }

    async fn activate(&mut self, name: String) -> Result<(), CloseReason> {
        let id = self.connection.id();
        if let Err(err) = self
            .broadcaster
            .registry()
            .insert(Arc::clone(&self.connection), name.clone())
            .await
        {
            warn!(connection = id, error = %err, "failed to register participant");
            return Err(CloseReason::Rejected);
        }

        info!(peer = ?self.connection.peer(), connection = id, %name, "participant joined");
        self.state = SessionState::Active { name: name.clone() };
        self.broadcaster
            .broadcast(join_announcement(&name), Some(id))
            .await;
        Ok(())
    }

    async fn relay(&mut self, name: &str) -> CloseReason {
        let id = self.connection.id();
        loop {
            let raw = match self.next_message().await {
                Ok(raw) => raw,
                Err(reason) => return reason,
            };

            let text = strip_line_ending(&raw);
            if text.is_empty() {
                continue;
            }

            debug!(connection = id, %name, message = %text, "received message");
            self.broadcaster
                .broadcast(chat_line(name, text), Some(id))
                .await;

            if is_quit(text) {
                return CloseReason::Quit;
            }
        }
    }

    async fn next_message(&mut self) -> Result<String, CloseReason> {
        select! {
            _ = self.shutdown.cancelled() => Err(CloseReason::Shutdown),
            _ = self.connection.closed() => Err(CloseReason::Evicted),
            message = self.reader.next_message() => match message {
                Ok(Some(message)) => Ok(message),
                Ok(None) => Err(CloseReason::Disconnected),
                Err(err) => Err(CloseReason::ReadFailed(err)),
            },
        }
    }

    async fn close(&mut self, reason: &CloseReason) {
        let id = self.connection.id();
        let previous = std::mem::replace(&mut self.state, SessionState::Closed);

        if let CloseReason::ReadFailed(err) = reason {
            warn!(connection = id, error = ?err, "failed to read from client");
        }

        let departed = match previous {
            SessionState::Active { .. } => self.broadcaster.registry().remove(id).await,
            _ => None,
        };
        self.connection.close().await;

        match departed {
            Some(name) => {
                info!(peer = ?self.connection.peer(), connection = id, %name, ?reason, "participant left");
                self.broadcaster
                    .broadcast(departure_announcement(&name), None)
                    .await;
            }
            None => debug!(connection = id, ?reason, "session closed"),
        }
    }
}
