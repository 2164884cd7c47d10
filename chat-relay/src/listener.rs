use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{info, warn};

use crate::{
    broadcast::Broadcaster,
    config::RelayConfig,
    connection::Connection,
    protocol::MessageReader,
    registry::ConnectionRegistry,
    session::ClientSession,
};

/// Accepts clients and runs one [`ClientSession`] task per connection.
pub struct Listener {
    listener: TcpListener,
    config: RelayConfig,
    broadcaster: Broadcaster,
}

impl Listener {
    /// Binds the relay. Failing to bind is fatal; nothing else is.
    pub async fn bind(addr: &str, config: RelayConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        Ok(Self::new(listener, config))
    }

    pub fn new(listener: TcpListener, config: RelayConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            listener,
            config,
            broadcaster: Broadcaster::new(registry),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(self.broadcaster.registry())
    }

    /// Accepts connections until `shutdown` resolves, then closes every
    /// session and waits for their cleanup to finish.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Listener {
            listener,
            config,
            broadcaster,
        } = self;
        let sessions = TaskTracker::new();
        let stop = CancellationToken::new();
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => break,
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &config, &broadcaster, &stop, &sessions);
                }
            }
        }

        let participants = broadcaster.registry().len().await;
        info!(participants, "relay shutting down");
        stop.cancel();
        sessions.close();
        sessions.wait().await;
        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    config: &RelayConfig,
    broadcaster: &Broadcaster,
    stop: &CancellationToken,
    sessions: &TaskTracker,
) {
    match result {
        Ok((stream, peer)) => {
            info!(%peer, "new connection");
            spawn_session(stream, peer, config, broadcaster, stop, sessions);
        }
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_session(
    stream: TcpStream,
    peer: SocketAddr,
    config: &RelayConfig,
    broadcaster: &Broadcaster,
    stop: &CancellationToken,
    sessions: &TaskTracker,
) {
    let (reader, writer) = stream.into_split();
    let id = broadcaster.registry().next_id();
    let connection = Arc::new(Connection::new(id, Some(peer), writer));
    let session = ClientSession::new(
        connection,
        MessageReader::new(reader, config.framing, config.read_limit()),
        broadcaster.clone(),
        stop.child_token(),
    );

    sessions.spawn(async move {
        let reason = session.run().await;
        info!(%peer, connection = id, ?reason, "connection closed");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn run_until_can_be_spawned() {
        let listener = Listener::bind("127.0.0.1:0", RelayConfig::default())
            .await
            .expect("bind");

        let run = listener.run_until(std::future::ready(()));
        assert_send(&run);
        tokio::spawn(run).await.expect("join").expect("run");
    }
}
