use std::{collections::VecDeque, sync::Arc};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    connection::ConnectionId,
    protocol::departure_announcement,
    registry::ConnectionRegistry,
};

/// Outcome of one [`Broadcaster::broadcast`] call, including any departure
/// announcements it triggered.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastSummary {
    /// Successful writes across every message sent by the call.
    pub delivered: usize,
    /// Participants evicted because a write to them failed.
    pub departed: Vec<String>,
}

/// Fans messages out to every registered connection.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    /// Held for a whole fan-out so concurrent broadcasts reach every
    /// recipient in the same order.
    order: Arc<Mutex<()>>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            order: Arc::new(Mutex::new(())),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Sends `message` to every registered connection except `excluded`.
    ///
    /// Writes happen one recipient at a time from the calling task, against a
    /// snapshot of the registry. A recipient whose write fails is removed and
    /// closed, and its departure is announced to everyone left once the
    /// current fan-out finishes. Removal is idempotent, so each failed
    /// connection produces at most one announcement.
    ///
    /// Calls from different sessions are serialized: a slow recipient delays
    /// later broadcasts instead of letting them overtake the one in flight.
    pub async fn broadcast(
        &self,
        message: impl Into<String>,
        excluded: Option<ConnectionId>,
    ) -> BroadcastSummary {
        let _order = self.order.lock().await;
        let mut summary = BroadcastSummary::default();
        let mut pending: VecDeque<(String, Option<ConnectionId>)> =
            VecDeque::from([(message.into(), excluded)]);

        while let Some((message, excluded)) = pending.pop_front() {
            info!(%message, "broadcasting message");

            for entry in self.registry.snapshot().await {
                let id = entry.connection.id();
                if Some(id) == excluded {
                    continue;
                }

                match entry.connection.send_line(&message).await {
                    Ok(()) => summary.delivered += 1,
                    Err(err) => {
                        warn!(
                            connection = id,
                            name = %entry.name,
                            error = ?err,
                            "failed to deliver message"
                        );
                        if let Some(name) = self.registry.remove(id).await {
                            entry.connection.close().await;
                            info!(connection = id, %name, "evicted unreachable participant");
                            pending.push_back((departure_announcement(&name), None));
                            summary.departed.push(name);
                        }
                    }
                }
            }
        }

        debug!(
            delivered = summary.delivered,
            departed = summary.departed.len(),
            "broadcast complete"
        );
        summary
    }
}
