//! Per-session write locks.
//!
//! Several phones at one table write to the same cart. Every cart and
//! checkout operation holds its session's lock for the whole
//! read-validate-write sequence, so a merge or a cap check never acts on a
//! cart another request is changing.
//!
//! Locks are created on first use and dropped from the map when the last
//! holder or waiter lets go.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

#[derive(Debug, Clone, Default)]
pub struct SessionLocks {
    map: Arc<Mutex<LockMap>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `session_id`.
    pub async fn lock(&self, session_id: &str) -> SessionGuard {
        let mutex = {
            let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(session_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        SessionGuard {
            guard: Some(mutex.lock_owned().await),
            session_id: session_id.to_string(),
            map: Arc::clone(&self.map),
        }
    }

    /// Number of sessions with a live lock entry.
    pub fn len(&self) -> usize {
        self.map.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held while a session is being written. Releases on drop.
#[derive(Debug)]
pub struct SessionGuard {
    guard: Option<OwnedMutexGuard<()>>,
    session_id: String,
    map: Arc<Mutex<LockMap>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map's own reference left: nobody holds or waits
        if map
            .get(&self.session_id)
            .is_some_and(|m| Arc::strong_count(m) == 1)
        {
            map.remove(&self.session_id);
        }
    }
}
