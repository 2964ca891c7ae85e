//! In-memory session store
//!
//! One slot per user id. Each slot carries its own async mutex so turns for
//! the same user run one at a time while different users proceed in
//! parallel. A slot's mutex is held across the whole read-modify-write of a
//! turn, including the external calls made while handling it. Turns work on
//! a draft and commit it at the end, so an abandoned turn leaves no trace.

use crate::types::SessionState;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Slot = Arc<Mutex<Option<SessionState>>>;

/// Process-lifetime table of conversation state keyed by user id
#[derive(Debug, Default)]
pub struct SessionStore {
    slots: DashMap<String, Slot>,
}

/// Exclusive access to one user's slot
pub struct SessionGuard {
    user_id: String,
    guard: OwnedMutexGuard<Option<SessionState>>,
}

impl SessionGuard {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn state(&self) -> Option<&SessionState> {
        self.guard.as_ref()
    }

    pub fn state_mut(&mut self) -> Option<&mut SessionState> {
        self.guard.as_mut()
    }

    /// The session, created fresh if the user has none
    pub fn get_or_create(&mut self) -> &mut SessionState {
        if self.guard.is_none() {
            tracing::info!("[SESSION] New session for {}", self.user_id);
        }
        let user_id = &self.user_id;
        self.guard.get_or_insert_with(|| SessionState::new(user_id.clone()))
    }

    /// A working copy of the session, fresh if the user has none. Nothing
    /// is stored until it is passed to `commit`.
    pub fn draft(&self) -> SessionState {
        match self.guard.as_ref() {
            Some(state) => state.clone(),
            None => {
                tracing::info!("[SESSION] New session for {}", self.user_id);
                SessionState::new(self.user_id.clone())
            }
        }
    }

    /// Replace the stored session with a finished draft
    pub fn commit(&mut self, state: SessionState) {
        *self.guard = Some(state);
    }

    /// Delete the session; returns whether one existed
    pub fn remove(&mut self) -> bool {
        self.guard.take().is_some()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, user_id: &str) -> Slot {
        Arc::clone(self.slots.entry(user_id.to_string()).or_default().value())
    }

    /// Wait for exclusive access to a user's session
    pub async fn lock(&self, user_id: &str) -> SessionGuard {
        let guard = self.slot(user_id).lock_owned().await;
        SessionGuard {
            user_id: user_id.to_string(),
            guard,
        }
    }

    /// Like `lock`, but only for users that already have a slot
    pub async fn lock_existing(&self, user_id: &str) -> Option<SessionGuard> {
        let slot = self.slots.get(user_id).map(|s| Arc::clone(s.value()))?;
        let guard = slot.lock_owned().await;
        Some(SessionGuard {
            user_id: user_id.to_string(),
            guard,
        })
    }

    /// A copy of the current state, if any
    pub async fn snapshot(&self, user_id: &str) -> Option<SessionState> {
        let slot = self.slots.get(user_id).map(|s| Arc::clone(s.value()))?;
        let guard = slot.lock().await;
        guard.clone()
    }

    /// Delete a user's session entirely
    pub async fn reset(&self, user_id: &str) -> bool {
        let existed = match self.lock_existing(user_id).await {
            Some(mut guard) => guard.remove(),
            None => return false,
        };

        // Drop the slot too unless another turn is already waiting on it
        self.slots.remove_if(user_id, |_, slot| {
            Arc::strong_count(slot) == 1
                && slot.try_lock().map(|state| state.is_none()).unwrap_or(false)
        });

        if existed {
            tracing::info!("[SESSION] Reset session for {}", user_id);
        }
        existed
    }

    /// Drop sessions idle longer than `max_idle`. Slots that are busy or
    /// referenced by a waiting turn are left alone.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now() - max_idle;
        let candidates: Vec<String> = self.slots.iter().map(|e| e.key().clone()).collect();

        let mut evicted = 0;
        for user_id in candidates {
            let removed = self.slots.remove_if(&user_id, |_, slot| {
                Arc::strong_count(slot) == 1
                    && slot
                        .try_lock()
                        .map(|state| state.as_ref().map_or(true, |s| s.last_active < cutoff))
                        .unwrap_or(false)
            });
            if removed.is_some() {
                evicted += 1;
            }
        }

        if evicted > 0 {
            tracing::info!("[SESSION] Evicted {} idle session(s)", evicted);
        }
        evicted
    }

    /// Number of slots, including empty ones left by unfinished turns
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
