use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use uuid::Uuid;

/// Per-user guard against double-submitted checkouts within this process.
///
/// Acquisition never waits: a second checkout for the same user is turned
/// away while the first holds the guard. Other users are unaffected.
#[derive(Clone, Default)]
pub struct CheckoutLocks {
    held: Arc<Mutex<HashSet<Uuid>>>,
}

impl CheckoutLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, user_id: Uuid) -> Option<CheckoutLockGuard> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(user_id) {
            return None;
        }
        Some(CheckoutLockGuard {
            held: Arc::clone(&self.held),
            user_id,
        })
    }
}

/// Releases the user's checkout slot when dropped.
pub struct CheckoutLockGuard {
    held: Arc<Mutex<HashSet<Uuid>>>,
    user_id: Uuid,
}

impl Drop for CheckoutLockGuard {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_for_same_user_is_refused_until_release() {
        let locks = CheckoutLocks::new();
        let user = Uuid::new_v4();

        let guard = locks.try_acquire(user).expect("first acquire");
        assert!(locks.try_acquire(user).is_none());

        drop(guard);
        assert!(locks.try_acquire(user).is_some());
    }

    #[test]
    fn users_do_not_contend() {
        let locks = CheckoutLocks::new();
        let _a = locks.try_acquire(Uuid::new_v4()).expect("a");
        assert!(locks.try_acquire(Uuid::new_v4()).is_some());
    }
}
