//! Fan-out of encoded frames to connected sessions.
//!
//! The router owns the producer side of every per-connection outbound
//! queue; each connection's write task is the sole consumer of its own
//! channel. A failed send to one channel is logged and skipped so the
//! remaining channels still get the frame, and it never drives session
//! removal (that decision belongs to the transport disconnect event and
//! the explicit leave request alone).

use crate::registry::RegistryError;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::RwLock;

/// Routes raw text frames to per-connection outbound channels.
#[derive(Debug, Default)]
pub struct BroadcastRouter {
    channels: RwLock<HashMap<String, mpsc::UnboundedSender<Arc<String>>>>,
}

impl BroadcastRouter {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a connection's outbound channel. A reconnect under the same
    /// id replaces the old channel, which closes the stale write task.
    pub async fn add(&self, session_id: impl Into<String>, sender: mpsc::UnboundedSender<Arc<String>>) {
        let session_id = session_id.into();
        debug!("Outbound channel registered for {}", session_id);
        self.channels.write().await.insert(session_id, sender);
    }

    /// Drops a connection's outbound channel, ending its write task.
    pub async fn remove(&self, session_id: &str) {
        if self.channels.write().await.remove(session_id).is_some() {
            debug!("Outbound channel removed for {}", session_id);
        }
    }

    /// Sends a frame to every currently-registered channel.
    pub async fn broadcast(&self, text: impl Into<String>) {
        let frame = Arc::new(text.into());
        let channels = self.channels.read().await;
        for (session_id, sender) in channels.iter() {
            if sender.send(Arc::clone(&frame)).is_err() {
                // Peer's write task is gone; transport disconnect handling
                // will reclaim the channel. Keep delivering to the rest.
                warn!("Dropped broadcast frame for closed channel {}", session_id);
            }
        }
    }

    /// Sends a frame to one session's channel.
    pub async fn send_to(&self, session_id: &str, text: impl Into<String>) -> Result<(), RegistryError> {
        let channels = self.channels.read().await;
        match channels.get(session_id) {
            Some(sender) => {
                if sender.send(Arc::new(text.into())).is_err() {
                    warn!("Dropped frame for closed channel {}", session_id);
                }
                Ok(())
            }
            None => Err(RegistryError::UnknownSession(session_id.to_string())),
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.channels.read().await.len()
    }
}
