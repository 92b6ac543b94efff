//! Wait/notify coordination on byte-string keys.
//!
//! [`KeyWatcher`] backs the `WAIT`/`NOTIFY` operation modes: a reader that
//! misses a key registers interest with [`add_key`](KeyWatcher::add_key)
//! *before releasing the database lock*, then awaits the returned
//! [`KeyWait`] with the lock released. A writer that stores the key calls
//! [`notify_key`](KeyWatcher::notify_key) and wakes every current waiter.
//!
//! Per key the state machine is `None -> Waiting(n > 0) -> None`: an entry
//! is created by the first waiter and torn down when the last one leaves.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Outcome of a [`KeyWait::wait`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A notification for the key arrived; re-probe the database.
    KeyPresent,
    /// The deadline elapsed before any notification.
    TimedOut,
    /// The watcher was torn down underneath the waiter.
    Cancelled,
}

struct WatchEntry {
    waiters: usize,
    // Distinguishes an entry from a later one under the same key, so a
    // stale waiter released after cancel_all cannot decrement a successor.
    generation: u64,
    tx: broadcast::Sender<()>,
}

#[derive(Default)]
struct WatchMap {
    entries: HashMap<Bytes, WatchEntry>,
    next_generation: u64,
}

/// Map from keys to their wait lists.
///
/// Safe for concurrent `add_key` / `wait` / `notify_key` from any task.
pub struct KeyWatcher {
    map: Mutex<WatchMap>,
}

impl KeyWatcher {
    pub fn new() -> Self {
        Self {
            map: Mutex::new(WatchMap::default()),
        }
    }

    /// Registers interest in `key` and returns the subscription to await.
    ///
    /// The subscription is armed from the moment this returns: a
    /// notification sent after `add_key` but before the caller awaits is
    /// not lost.
    pub fn add_key(&self, key: &[u8]) -> KeyWait<'_> {
        let key = Bytes::copy_from_slice(key);
        let mut map = self.map.lock().expect("key watcher poisoned");
        map.next_generation += 1;
        let generation = map.next_generation;
        let entry = map.entries.entry(key.clone()).or_insert_with(|| WatchEntry {
            waiters: 0,
            generation,
            tx: broadcast::channel(1).0,
        });
        entry.waiters += 1;
        let generation = entry.generation;
        let rx = entry.tx.subscribe();
        KeyWait {
            watcher: self,
            key,
            generation,
            rx,
        }
    }

    /// Wakes all current waiters for `key`. No-op if nobody waits.
    pub fn notify_key(&self, key: &[u8]) {
        let map = self.map.lock().expect("key watcher poisoned");
        if let Some(entry) = map.entries.get(key) {
            // Send can only fail when every receiver is already gone.
            let _ = entry.tx.send(());
        }
    }

    /// Tears down every entry, waking all waiters with
    /// [`WaitOutcome::Cancelled`].
    pub fn cancel_all(&self) {
        self.map
            .lock()
            .expect("key watcher poisoned")
            .entries
            .clear();
    }

    /// Number of keys currently watched.
    pub fn watched_keys(&self) -> usize {
        self.map.lock().expect("key watcher poisoned").entries.len()
    }
}

impl Default for KeyWatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered waiter for one key. Dropping it (after `wait` or without
/// waiting at all) releases the registration.
pub struct KeyWait<'w> {
    watcher: &'w KeyWatcher,
    key: Bytes,
    generation: u64,
    rx: broadcast::Receiver<()>,
}

impl KeyWait<'_> {
    /// Blocks until a matching notification arrives or `timeout` elapses.
    pub async fn wait(mut self, timeout: Option<Duration>) -> WaitOutcome {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.rx.recv()).await {
                Ok(received) => Self::outcome(received),
                Err(_) => WaitOutcome::TimedOut,
            },
            None => Self::outcome(self.rx.recv().await),
        }
    }

    fn outcome(received: Result<(), RecvError>) -> WaitOutcome {
        match received {
            // Lagged still means at least one notification fired.
            Ok(()) | Err(RecvError::Lagged(_)) => WaitOutcome::KeyPresent,
            Err(RecvError::Closed) => WaitOutcome::Cancelled,
        }
    }
}

impl Drop for KeyWait<'_> {
    fn drop(&mut self) {
        let mut map = self.watcher.map.lock().expect("key watcher poisoned");
        if let Some(entry) = map.entries.get_mut(&self.key) {
            if entry.generation != self.generation {
                return;
            }
            entry.waiters -= 1;
            if entry.waiters == 0 {
                map.entries.remove(&self.key);
            }
        }
    }
}
