//! Pending-reply table: requests register their id before sending; the receive loop
//! hands each ACK/NACK to the matching waiter.

use std::collections::HashMap;

use lantalk_core::Reply;
use tokio::sync::{oneshot, Mutex};

#[derive(Default)]
pub struct PendingReplies {
    waiters: Mutex<HashMap<String, oneshot::Sender<Reply>>>,
}

impl PendingReplies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start waiting for a reply to `id`. Registering the same id again replaces the older waiter.
    pub async fn register(&self, id: &str) -> oneshot::Receiver<Reply> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.insert(id.to_string(), tx);
        rx
    }

    /// Hand `reply` to its waiter. Gives the reply back when nobody is waiting for that id.
    pub async fn deliver(&self, reply: Reply) -> Result<(), Reply> {
        let waiter = self.waiters.lock().await.remove(reply.id());
        match waiter {
            Some(tx) => tx.send(reply),
            None => Err(reply),
        }
    }

    /// Stop waiting for `id` (timeout or caller gave up).
    pub async fn cancel(&self, id: &str) {
        self.waiters.lock().await.remove(id);
    }

    pub async fn len(&self) -> usize {
        self.waiters.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
