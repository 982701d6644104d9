use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use payrelay_core::ids::ConnectionId;
use tokio::sync::mpsc;

/// Failure modes for a single transmit on one connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendError {
    /// The bounded send queue is full. The peer exists but is not
    /// draining fast enough; the frame is dropped.
    QueueFull,
    /// The writer side is gone. The connection is dead.
    Closed,
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QueueFull => f.write_str("send queue full"),
            Self::Closed => f.write_str("connection closed"),
        }
    }
}

/// Handle to one live real-time connection.
///
/// The gateway owns the socket and its lifetime; everything else (the
/// registry, the delivery engine) sees only this handle and may push
/// frames into its bounded queue. Lifecycle operations stay with the
/// gateway — the handle only flips its open flag.
pub struct Connection {
    id: ConnectionId,
    tx: mpsc::Sender<String>,
    open: AtomicBool,
    last_pong: AtomicU64,
}

impl Connection {
    /// Create a handle plus the receiver end that the gateway's writer
    /// task drains into the socket.
    pub fn channel(max_send_queue: usize) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(max_send_queue);
        let conn = Arc::new(Self {
            id: ConnectionId::new(),
            tx,
            open: AtomicBool::new(true),
            last_pong: AtomicU64::new(now_secs()),
        });
        (conn, rx)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed) && !self.tx.is_closed()
    }

    /// Flip the handle to closed. Safe to call more than once.
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::Relaxed);
    }

    /// Queue a serialized frame for the peer without blocking.
    pub fn send(&self, payload: &str) -> Result<(), SendError> {
        match self.tx.try_send(payload.to_owned()) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(SendError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.mark_closed();
                Err(SendError::Closed)
            }
        }
    }

    pub fn record_pong(&self) {
        self.last_pong.store(now_secs(), Ordering::Relaxed);
    }

    /// Whether the peer answered a ping within the timeout window.
    pub fn is_alive(&self, timeout: Duration) -> bool {
        let last = self.last_pong.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < timeout.as_secs()
    }

    #[cfg(test)]
    pub(crate) fn force_stale(&self) {
        self.last_pong.store(0, Ordering::Relaxed);
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_queues_frame() {
        let (conn, mut rx) = Connection::channel(4);
        conn.send("{\"status\":\"ok\"}").unwrap();
        assert_eq!(rx.try_recv().unwrap(), "{\"status\":\"ok\"}");
    }

    #[test]
    fn send_reports_full_queue() {
        let (conn, _rx) = Connection::channel(1);
        conn.send("first").unwrap();
        assert_eq!(conn.send("second"), Err(SendError::QueueFull));
    }

    #[test]
    fn send_after_receiver_dropped_reports_closed() {
        let (conn, rx) = Connection::channel(1);
        drop(rx);
        assert_eq!(conn.send("frame"), Err(SendError::Closed));
        assert!(!conn.is_open());
    }

    #[test]
    fn mark_closed_is_idempotent() {
        let (conn, _rx) = Connection::channel(1);
        assert!(conn.is_open());
        conn.mark_closed();
        conn.mark_closed();
        assert!(!conn.is_open());
    }

    #[test]
    fn pong_tracking() {
        let (conn, _rx) = Connection::channel(1);
        assert!(conn.is_alive(Duration::from_secs(90)));

        conn.force_stale();
        assert!(!conn.is_alive(Duration::from_secs(90)));

        conn.record_pong();
        assert!(conn.is_alive(Duration::from_secs(90)));
    }

    #[test]
    fn connection_ids_are_unique() {
        let (a, _ra) = Connection::channel(1);
        let (b, _rb) = Connection::channel(1);
        assert_ne!(a.id(), b.id());
    }
}
