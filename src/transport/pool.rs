//! Session pool keyed by SessionId.
//!
//! Maps every connected session to the sending half of its outbound queue.
//! The session's writer task owns the receiving half.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              SessionPool                │
//! │  ┌─────────────────────────────────┐    │
//! │  │ SessionId=a → outbound queue a  │    │
//! │  │ SessionId=b → outbound queue b  │    │
//! │  │ SessionId=c → outbound queue c  │    │
//! │  └─────────────────────────────────┘    │
//! └─────────────────────────────────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::SessionId;

// ============================================================================
// Types
// ============================================================================

/// One encoded wire frame.
pub type Frame = Vec<u8>;

// ============================================================================
// SessionPool
// ============================================================================

/// Outbound queues of all connected sessions.
///
/// Thread-safe. Lookups clone the sender and release the lock before any
/// await, so a full queue never blocks other sessions.
#[derive(Debug, Default)]
pub struct SessionPool {
    /// Outbound queue senders by session ID.
    sessions: RwLock<FxHashMap<SessionId, mpsc::Sender<Frame>>>,
}

impl SessionPool {
    /// Creates an empty pool.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of connected sessions.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns `true` if no session is connected.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Returns `true` if the session is connected.
    #[inline]
    #[must_use]
    pub fn contains(&self, session_id: SessionId) -> bool {
        self.sessions.read().contains_key(&session_id)
    }

    /// Registers a session's outbound queue.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateSession`] if the ID is already in use.
    pub fn insert(&self, session_id: SessionId, outbound: mpsc::Sender<Frame>) -> Result<()> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&session_id) {
            return Err(Error::duplicate_session(session_id));
        }
        sessions.insert(session_id, outbound);
        debug!(session_id = %session_id, "Session added to pool");
        Ok(())
    }

    /// Removes a session, returning `true` if it was present.
    pub fn remove(&self, session_id: SessionId) -> bool {
        let removed = self.sessions.write().remove(&session_id).is_some();
        if removed {
            debug!(session_id = %session_id, "Session removed from pool");
        }
        removed
    }

    /// Queues a frame for a session, waiting while its queue is full.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionNotFound`] if the session is not connected
    /// - [`Error::ConnectionClosed`] if its writer has exited
    pub async fn deliver(&self, session_id: SessionId, frame: Frame) -> Result<()> {
        let outbound = self.sender(session_id)?;
        outbound
            .send(frame)
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Queues a frame for a session without waiting.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionNotFound`] if the session is not connected
    /// - [`Error::Connection`] if its queue is full
    /// - [`Error::ConnectionClosed`] if its writer has exited
    pub fn try_deliver(&self, session_id: SessionId, frame: Frame) -> Result<()> {
        let outbound = self.sender(session_id)?;
        outbound.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => {
                Error::connection(format!("outbound queue full for {session_id}"))
            }
            TrySendError::Closed(_) => Error::ConnectionClosed,
        })
    }

    /// Clones the outbound sender for a session.
    fn sender(&self, session_id: SessionId) -> Result<mpsc::Sender<Frame>> {
        self.sessions
            .read()
            .get(&session_id)
            .cloned()
            .ok_or_else(|| Error::session_not_found(session_id))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deliver_to_session() {
        let pool = SessionPool::new();
        let session_id = SessionId::generate();
        let (tx, mut rx) = mpsc::channel(8);
        pool.insert(session_id, tx).expect("insert");

        pool.deliver(session_id, b"update: v2".to_vec())
            .await
            .expect("deliver");
        assert_eq!(rx.recv().await.as_deref(), Some(&b"update: v2"[..]));
    }

    #[tokio::test]
    async fn test_deliver_to_unknown_session() {
        let pool = SessionPool::new();
        let err = pool
            .deliver(SessionId::generate(), b"x: y".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_deliver_to_closed_session() {
        let pool = SessionPool::new();
        let session_id = SessionId::generate();
        let (tx, rx) = mpsc::channel(8);
        pool.insert(session_id, tx).expect("insert");
        drop(rx);

        let err = pool.deliver(session_id, b"x: y".to_vec()).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[test]
    fn test_try_deliver_full_queue() {
        let pool = SessionPool::new();
        let session_id = SessionId::generate();
        let (tx, _rx) = mpsc::channel(1);
        pool.insert(session_id, tx).expect("insert");

        pool.try_deliver(session_id, b"a: 1".to_vec()).expect("first fits");
        let err = pool.try_deliver(session_id, b"a: 2".to_vec()).unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
    }

    #[test]
    fn test_duplicate_insert() {
        let pool = SessionPool::new();
        let session_id = SessionId::generate();
        let (tx, _rx) = mpsc::channel(1);
        pool.insert(session_id, tx.clone()).expect("insert");

        assert!(pool.insert(session_id, tx).unwrap_err().is_duplicate());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_remove() {
        let pool = SessionPool::new();
        let session_id = SessionId::generate();
        let (tx, _rx) = mpsc::channel(1);
        pool.insert(session_id, tx).expect("insert");

        assert!(pool.remove(session_id));
        assert!(!pool.remove(session_id));
        assert!(pool.is_empty());
    }
}
