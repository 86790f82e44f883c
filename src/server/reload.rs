// src/server/reload.rs

//! Broadcast of reload events to connected browsers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::types::ReloadKind;

const CHANNEL_CAPACITY: usize = 16;

/// Shared between the runtime (sender) and the dev server (one receiver per
/// connected browser). Cheap to clone.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    tx: broadcast::Sender<ReloadKind>,
    sessions: Arc<AtomicUsize>,
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ReloadHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Tell every connected browser to reload. Returns how many were told.
    pub fn notify(&self, kind: ReloadKind) -> usize {
        if kind == ReloadKind::None {
            return 0;
        }
        // Err only means nobody is listening.
        let delivered = self.tx.send(kind).unwrap_or(0);
        info!(?kind, browsers = delivered, "live reload");
        delivered
    }

    /// Register a browser session; it ends when the subscription is dropped.
    pub fn subscribe(&self) -> ReloadSubscription {
        let count = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(sessions = count, "browser connected");
        ReloadSubscription {
            rx: self.tx.subscribe(),
            sessions: Arc::clone(&self.sessions),
        }
    }

    /// Number of currently connected browsers.
    pub fn session_count(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

/// One connected browser.
#[derive(Debug)]
pub struct ReloadSubscription {
    rx: broadcast::Receiver<ReloadKind>,
    sessions: Arc<AtomicUsize>,
}

impl ReloadSubscription {
    /// Next reload to forward, or `None` once the hub is gone.
    ///
    /// A lagging browser gets a full reload, since it missed something.
    pub async fn next(&mut self) -> Option<ReloadKind> {
        match self.rx.recv().await {
            Ok(kind) => Some(kind),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "browser lagged behind reload events");
                Some(ReloadKind::Full)
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

impl Drop for ReloadSubscription {
    fn drop(&mut self) {
        let count = self.sessions.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        debug!(sessions = count, "browser disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sessions_are_counted_and_notified() {
        let hub = ReloadHub::new();
        assert_eq!(hub.notify(ReloadKind::Full), 0);

        let mut a = hub.subscribe();
        let b = hub.subscribe();
        assert_eq!(hub.session_count(), 2);

        assert_eq!(hub.notify(ReloadKind::InjectCss), 2);
        assert_eq!(a.next().await, Some(ReloadKind::InjectCss));

        drop(b);
        assert_eq!(hub.session_count(), 1);
        assert_eq!(hub.notify(ReloadKind::None), 0);
    }
}
