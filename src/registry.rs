//! Live push connections and the fan-out of task change events.
//!
//! Each WebSocket connection holds a [`Subscription`] for as long as it is
//! open. Dropping the subscription removes the connection from the registry,
//! so cleanup follows the connection's lifetime on every exit path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, warn};
use tokio::sync::mpsc;

use crate::model::{Action, Task, TaskEvent};

/// Per-connection queues are unbounded. A client that stops reading keeps
/// accumulating events until its socket errors out and the subscription drops.
#[derive(Default)]
pub struct Registry {
    next_id: AtomicU64,
    clients: Mutex<HashMap<u64, mpsc::UnboundedSender<String>>>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn clients(&self) -> MutexGuard<'_, HashMap<u64, mpsc::UnboundedSender<String>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new connection. Messages broadcast while the returned
    /// subscription is alive are delivered to it in send order.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let total = {
            let mut clients = self.clients();
            clients.insert(id, tx);
            clients.len()
        };
        debug!("Client {id} connected ({total} total)");
        Subscription {
            id,
            registry: Arc::clone(self),
            rx,
        }
    }

    fn unsubscribe(&self, id: u64) {
        let total = {
            let mut clients = self.clients();
            clients.remove(&id);
            clients.len()
        };
        debug!("Client {id} disconnected ({total} total)");
    }

    pub fn len(&self) -> usize {
        self.clients().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send `{type: "task_update", action, task, timestamp}` to every open
    /// connection and return how many accepted it.
    ///
    /// A connection whose receiving side is already gone is skipped; it is
    /// removed when its subscription drops, not here.
    pub fn broadcast(&self, action: Action, task: &Task) -> usize {
        let clients = self.clients();
        if clients.is_empty() {
            return 0;
        }
        let event = TaskEvent::new(action, task.clone());
        let message = match serde_json::to_string(&event) {
            Ok(m) => m,
            Err(e) => {
                warn!("Failed to encode {action} event for task {}: {e}", task.id);
                return 0;
            }
        };
        let delivered = clients
            .values()
            .filter(|tx| tx.send(message.clone()).is_ok())
            .count();
        debug!("Broadcasted {action} to {delivered}/{} clients", clients.len());
        delivered
    }
}

/// A registered connection. Removed from the registry on drop.
pub struct Subscription {
    id: u64,
    registry: Arc<Registry>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next serialized event for this connection.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    #[cfg(test)]
    pub(crate) fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unsubscribe(self.id);
    }
}
