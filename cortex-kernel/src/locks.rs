//! Named asynchronous mutexes with owner ids and timeouts.
//!
//! These locks arbitrate *logical* ownership — who may drive the
//! avatar's look/move actuators, who holds the long-task slot — not
//! memory safety. The combat reflex acquires with timeout 0 on entering
//! ENGAGE; deliberative code uses a short timeout and backs off.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

struct Waiter {
    seq: u64,
    owner: String,
    tx: oneshot::Sender<()>,
}

#[derive(Default)]
struct LockState {
    owner: Option<String>,
    acquired_at: Option<Instant>,
    waiters: VecDeque<Waiter>,
}

/// Wait forever.
pub const WAIT_FOREVER: i64 = -1;
/// Do not wait at all.
pub const NO_WAIT: i64 = 0;

/// Named lock table. Cheap to clone; clones share the table.
#[derive(Clone)]
pub struct LockManager {
    locks: Arc<Mutex<HashMap<String, LockState>>>,
    next_seq: Arc<Mutex<u64>>,
}

impl LockManager {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
            next_seq: Arc::new(Mutex::new(0)),
        }
    }

    /// Acquire `name` for `owner`.
    ///
    /// `timeout_ms == 0` returns immediately; negative waits forever.
    /// Reentry by the current owner succeeds immediately. Waiters are
    /// served FIFO.
    pub async fn acquire(&self, name: &str, owner: &str, timeout_ms: i64) -> bool {
        let (seq, rx) = {
            let mut locks = self.locks.lock().unwrap();
            let state = locks.entry(name.to_string()).or_default();
            match &state.owner {
                None => {
                    state.owner = Some(owner.to_string());
                    state.acquired_at = Some(Instant::now());
                    return true;
                }
                Some(current) if current == owner => return true,
                Some(_) => {
                    if timeout_ms == NO_WAIT {
                        return false;
                    }
                    let (tx, rx) = oneshot::channel();
                    let seq = {
                        let mut next = self.next_seq.lock().unwrap();
                        *next += 1;
                        *next
                    };
                    state.waiters.push_back(Waiter {
                        seq,
                        owner: owner.to_string(),
                        tx,
                    });
                    (seq, rx)
                }
            }
        };

        let granted = if timeout_ms < 0 {
            rx.await.is_ok()
        } else {
            match tokio::time::timeout(Duration::from_millis(timeout_ms as u64), rx).await {
                Ok(result) => result.is_ok(),
                Err(_) => false,
            }
        };
        if granted {
            return true;
        }

        // Timed out (or the manager dropped the sender). Remove our
        // waiter entry; if the handoff raced the timeout and already
        // granted us the lock, give it back.
        let handoff = {
            let mut locks = self.locks.lock().unwrap();
            let Some(state) = locks.get_mut(name) else {
                return false;
            };
            state.waiters.retain(|w| w.seq != seq);
            state.owner.as_deref() == Some(owner)
        };
        if handoff {
            self.release(name, owner);
        }
        false
    }

    /// Release `name` if `owner` holds it. Release by a non-owner is a
    /// no-op returning false. The next live waiter, if any, becomes the
    /// owner.
    pub fn release(&self, name: &str, owner: &str) -> bool {
        let mut locks = self.locks.lock().unwrap();
        let Some(state) = locks.get_mut(name) else {
            return false;
        };
        if state.owner.as_deref() != Some(owner) {
            return false;
        }
        loop {
            match state.waiters.pop_front() {
                Some(waiter) => {
                    state.owner = Some(waiter.owner.clone());
                    state.acquired_at = Some(Instant::now());
                    if waiter.tx.send(()).is_ok() {
                        break;
                    }
                    // Receiver gave up (timeout); try the next waiter.
                }
                None => {
                    state.owner = None;
                    state.acquired_at = None;
                    break;
                }
            }
        }
        true
    }

    /// Current owner of `name`, if held.
    #[must_use]
    pub fn owner_of(&self, name: &str) -> Option<String> {
        self.locks
            .lock()
            .unwrap()
            .get(name)
            .and_then(|s| s.owner.clone())
    }

    /// How long `name` has been held, if held.
    #[must_use]
    pub fn held_for(&self, name: &str) -> Option<Duration> {
        self.locks
            .lock()
            .unwrap()
            .get(name)
            .and_then(|s| s.acquired_at)
            .map(|at| at.elapsed())
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_free_lock() {
        let lm = LockManager::new();
        assert!(lm.acquire("look", "combat", NO_WAIT).await);
        assert_eq!(lm.owner_of("look").as_deref(), Some("combat"));
    }

    #[tokio::test]
    async fn reentry_is_immediate() {
        let lm = LockManager::new();
        assert!(lm.acquire("move", "combat", NO_WAIT).await);
        assert!(lm.acquire("move", "combat", NO_WAIT).await);
    }

    #[tokio::test]
    async fn non_blocking_acquire_on_held_lock_fails() {
        let lm = LockManager::new();
        assert!(lm.acquire("look", "combat", NO_WAIT).await);
        assert!(!lm.acquire("look", "planner", NO_WAIT).await);
    }

    #[tokio::test]
    async fn release_by_non_owner_is_noop() {
        let lm = LockManager::new();
        assert!(lm.acquire("look", "combat", NO_WAIT).await);
        assert!(!lm.release("look", "planner"));
        assert_eq!(lm.owner_of("look").as_deref(), Some("combat"));
    }

    #[tokio::test]
    async fn fifo_handoff() {
        let lm = LockManager::new();
        assert!(lm.acquire("look", "a", NO_WAIT).await);

        let lm2 = lm.clone();
        let waiter = tokio::spawn(async move { lm2.acquire("look", "b", WAIT_FOREVER).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(lm.release("look", "a"));
        assert!(waiter.await.unwrap());
        assert_eq!(lm.owner_of("look").as_deref(), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_acquire_gives_up() {
        let lm = LockManager::new();
        assert!(lm.acquire("look", "a", NO_WAIT).await);
        assert!(!lm.acquire("look", "b", 100).await);
        // The failed waiter must not linger in the queue.
        assert!(lm.release("look", "a"));
        assert_eq!(lm.owner_of("look"), None);
    }
}
