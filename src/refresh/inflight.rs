//! At most one refresh cycle per location at a time.
//!
//! The first caller for a location becomes the leader and runs the cycle.
//! Callers arriving while it runs subscribe to the leader's result instead of
//! starting a second cycle.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use tokio::sync::watch;

use crate::models::RefreshResult;

pub type LocationKey = (u64, u64);

type Pending = HashMap<LocationKey, watch::Receiver<Option<RefreshResult>>>;

#[derive(Default)]
pub struct InFlight {
    pending: Arc<Mutex<Pending>>,
}

pub enum Slot {
    Leader(LeaderGuard),
    Follower(watch::Receiver<Option<RefreshResult>>),
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self, key: LocationKey) -> Slot {
        let mut pending = lock(&self.pending);
        if let Some(receiver) = pending.get(&key) {
            return Slot::Follower(receiver.clone());
        }

        let (sender, receiver) = watch::channel(None);
        pending.insert(key, receiver);
        Slot::Leader(LeaderGuard {
            pending: self.pending.clone(),
            key,
            sender,
        })
    }

    pub fn is_active(&self, key: LocationKey) -> bool {
        lock(&self.pending).contains_key(&key)
    }
}

/// Held by the caller running the cycle. Dropping it releases the location;
/// if [`LeaderGuard::complete`] was never called, waiters see the channel
/// close and run their own cycle.
pub struct LeaderGuard {
    pending: Arc<Mutex<Pending>>,
    key: LocationKey,
    sender: watch::Sender<Option<RefreshResult>>,
}

impl LeaderGuard {
    pub fn complete(self, result: &RefreshResult) {
        // No receivers left is fine; the map entry is dropped right after.
        let _ = self.sender.send(Some(result.clone()));
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        lock(&self.pending).remove(&self.key);
    }
}

fn lock(pending: &Mutex<Pending>) -> MutexGuard<'_, Pending> {
    match pending.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
