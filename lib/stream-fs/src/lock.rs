//! Process-wide advisory locks keyed by the normalized logical reference.
//!
//! Most backends have no locking concept at all, so lock requests are
//! relayed to a side-channel registry that is independent of the backend.
//! The locks are purely cooperative among users of this adapter within one
//! process; nothing stops the backend, or anyone else, from mutating the
//! underlying object.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Condvar, Mutex};
use tracing::trace;

/// Identifies the side-channel lock resource for one logical reference:
/// a stable hash of the normalized `scheme://target` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockToken(u64);

impl LockToken {
    pub fn for_reference(canonical: &str) -> Self {
        let digest = Sha256::digest(canonical.as_bytes());
        let mut key = [0u8; 8];
        key.copy_from_slice(&digest[..8]);

        Self(u64::from_be_bytes(key))
    }

    /// Deterministic resource name, usable as a scratch-location file name.
    pub fn resource_name(&self) -> String {
        format!("stream-fs-{}.lock", hex::encode(self.0.to_be_bytes()))
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
    Unlock,
}

#[derive(Debug, Default)]
struct LockState {
    exclusive: bool,
    readers: usize,
}

impl LockState {
    fn is_free(&self) -> bool {
        !self.exclusive && self.readers == 0
    }
}

/// The in-process lock table. Acquisition blocks until compatible unless the
/// caller asked for a non-blocking attempt.
#[derive(Debug, Default)]
pub struct LockRegistry {
    states: Mutex<HashMap<u64, LockState>>,
    released: Condvar,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `mode` for `token`. Returns whether the operation succeeded;
    /// a non-blocking attempt on a busy lock fails instead of waiting.
    pub fn apply(&self, token: LockToken, mode: LockMode, non_blocking: bool) -> bool {
        match mode {
            LockMode::Shared => self.acquire_shared(token, non_blocking),
            LockMode::Exclusive => self.acquire_exclusive(token, non_blocking),
            LockMode::Unlock => self.release(token),
        }
    }

    fn acquire_shared(&self, token: LockToken, non_blocking: bool) -> bool {
        let Ok(mut states) = self.states.lock() else {
            return false;
        };

        while states.entry(token.0).or_default().exclusive {
            if non_blocking {
                return false;
            }
            states = match self.released.wait(states) {
                Ok(guard) => guard,
                Err(_) => return false,
            };
        }

        states.entry(token.0).or_default().readers += 1;
        trace!(%token, "shared lock acquired");

        true
    }

    fn acquire_exclusive(&self, token: LockToken, non_blocking: bool) -> bool {
        let Ok(mut states) = self.states.lock() else {
            return false;
        };

        while !states.entry(token.0).or_default().is_free() {
            if non_blocking {
                return false;
            }
            states = match self.released.wait(states) {
                Ok(guard) => guard,
                Err(_) => return false,
            };
        }

        states.entry(token.0).or_default().exclusive = true;
        trace!(%token, "exclusive lock acquired");

        true
    }

    /// Releases one holder. An exclusive hold clears entirely; a shared hold
    /// drops one reader. Unlocking a free lock succeeds as a no-op.
    fn release(&self, token: LockToken) -> bool {
        let Ok(mut states) = self.states.lock() else {
            return false;
        };

        if let Some(state) = states.get_mut(&token.0) {
            if state.exclusive {
                state.exclusive = false;
            } else {
                state.readers = state.readers.saturating_sub(1);
            }

            if state.is_free() {
                states.remove(&token.0);
            }
        }

        trace!(%token, "lock released");
        self.released.notify_all();

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(reference: &str) -> LockToken {
        LockToken::for_reference(reference)
    }

    #[test]
    fn test_token_is_stable_and_distinct() {
        assert_eq!(token("mem://a.txt"), token("mem://a.txt"));
        assert_ne!(token("mem://a.txt"), token("mem://b.txt"));
        assert_eq!(
            token("mem://a.txt").resource_name(),
            token("mem://a.txt").resource_name(),
        );
    }

    #[test]
    fn test_exclusive_excludes_everyone() {
        let locks = LockRegistry::new();
        let t = token("mem://file");

        assert!(locks.apply(t, LockMode::Exclusive, true));
        assert!(!locks.apply(t, LockMode::Exclusive, true), "already held");
        assert!(!locks.apply(t, LockMode::Shared, true), "readers wait too");

        assert!(locks.apply(t, LockMode::Unlock, true));
        assert!(locks.apply(t, LockMode::Shared, true), "free after unlock");
    }

    #[test]
    fn test_shared_locks_coexist() {
        let locks = LockRegistry::new();
        let t = token("mem://file");

        assert!(locks.apply(t, LockMode::Shared, true));
        assert!(locks.apply(t, LockMode::Shared, true));
        assert!(
            !locks.apply(t, LockMode::Exclusive, true),
            "writers wait for readers",
        );

        assert!(locks.apply(t, LockMode::Unlock, true));
        assert!(
            !locks.apply(t, LockMode::Exclusive, true),
            "one reader remains",
        );
        assert!(locks.apply(t, LockMode::Unlock, true));
        assert!(locks.apply(t, LockMode::Exclusive, true));
    }

    #[test]
    fn test_unrelated_references_do_not_contend() {
        let locks = LockRegistry::new();

        assert!(locks.apply(token("mem://a"), LockMode::Exclusive, true));
        assert!(locks.apply(token("mem://b"), LockMode::Exclusive, true));
    }

    #[test]
    fn test_blocking_acquire_waits_for_release() {
        use std::sync::Arc;

        let locks = Arc::new(LockRegistry::new());
        let t = token("mem://contended");
        assert!(locks.apply(t, LockMode::Exclusive, true));

        let contender = {
            let locks = Arc::clone(&locks);
            std::thread::spawn(move || locks.apply(t, LockMode::Exclusive, false))
        };

        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(locks.apply(t, LockMode::Unlock, true));

        assert!(contender.join().unwrap(), "blocked acquire succeeds");
    }
}
