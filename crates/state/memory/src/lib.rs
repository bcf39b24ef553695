//! In-memory reference implementation of [`StateStore`] and
//! [`DistributedLock`], backing Latchflow's process-singleton state with a
//! `DashMap` guarded per key by the map's own entry-level locking.
//!
//! This is the reference behavior described by §5/§9: a single process
//! converges correctly; a clustered deployment must swap in a shared
//! backend implementing the same traits.

use std::collections::VecDeque;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use latchflow_state::{CasResult, DistributedLock, LockGuard, StateError, StateKey, StateStore};

struct Entry {
    value: String,
    expires_at: Option<SystemTime>,
}

impl Entry {
    fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

/// In-memory, process-local key/value store.
#[derive(Default)]
pub struct MemoryStateStore {
    entries: DashMap<String, Entry>,
    windows: DashMap<String, VecDeque<i64>>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh(&self, key: &str) -> Option<String> {
        let now = SystemTime::now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError> {
        Ok(self.fresh(&key.canonical()))
    }

    async fn set(&self, key: &StateKey, value: &str, ttl: Option<Duration>) -> Result<(), StateError> {
        self.entries.insert(
            key.canonical(),
            Entry {
                value: value.to_owned(),
                expires_at: ttl.map(|d| SystemTime::now() + d),
            },
        );
        Ok(())
    }

    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StateError> {
        let canonical = key.canonical();
        if self.fresh(&canonical).is_some() {
            return Ok(false);
        }
        self.entries.insert(
            canonical,
            Entry {
                value: value.to_owned(),
                expires_at: ttl.map(|d| SystemTime::now() + d),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &StateKey) -> Result<bool, StateError> {
        Ok(self.entries.remove(&key.canonical()).is_some())
    }

    async fn increment(&self, key: &StateKey, delta: i64, ttl: Option<Duration>) -> Result<i64, StateError> {
        let canonical = key.canonical();
        let current = self.fresh(&canonical).and_then(|v| v.parse::<i64>().ok()).unwrap_or(0);
        let next = current + delta;
        self.entries.insert(
            canonical,
            Entry {
                value: next.to_string(),
                expires_at: ttl.map(|d| SystemTime::now() + d),
            },
        );
        Ok(next)
    }

    async fn compare_and_swap(
        &self,
        key: &StateKey,
        expected: Option<&str>,
        new_value: &str,
        ttl: Option<Duration>,
    ) -> Result<CasResult, StateError> {
        let canonical = key.canonical();
        let current = self.fresh(&canonical);
        if current.as_deref() != expected {
            return Ok(CasResult::Conflict { current_value: current });
        }
        self.entries.insert(
            canonical,
            Entry {
                value: new_value.to_owned(),
                expires_at: ttl.map(|d| SystemTime::now() + d),
            },
        );
        Ok(CasResult::Ok)
    }

    async fn record_and_count_window(
        &self,
        key: &StateKey,
        now_ms: i64,
        window: Duration,
    ) -> Result<usize, StateError> {
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        let mut samples = self.windows.entry(key.canonical()).or_default();
        samples.push_back(now_ms);
        while let Some(&front) = samples.front() {
            if now_ms - front > window_ms {
                samples.pop_front();
            } else {
                break;
            }
        }
        Ok(samples.len())
    }
}

struct MemoryLockEntry {
    owner: u64,
    expires_at: SystemTime,
}

/// In-memory distributed lock. Leases are identified by a random owner
/// token so a guard can't release a lock some other owner re-acquired
/// after expiry. The lock table lives behind an `Arc` so guards can hold
/// a cheap clone of it independent of the `MemoryDistributedLock`'s own
/// lifetime.
#[derive(Clone, Default)]
pub struct MemoryDistributedLock {
    locks: std::sync::Arc<DashMap<String, MemoryLockEntry>>,
}

impl MemoryDistributedLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire_once(&self, name: &str, ttl: Duration) -> Option<u64> {
        let now = SystemTime::now();
        let owner = rand_owner();
        match self.locks.get(name) {
            Some(existing) if existing.expires_at > now => None,
            _ => {
                self.locks.insert(
                    name.to_owned(),
                    MemoryLockEntry {
                        owner,
                        expires_at: now + ttl,
                    },
                );
                Some(owner)
            }
        }
    }
}

fn rand_owner() -> u64 {
    static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let seq = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    nanos ^ seq.rotate_left(32)
}

#[async_trait]
impl DistributedLock for MemoryDistributedLock {
    async fn try_acquire(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<Box<dyn LockGuard>>, StateError> {
        Ok(self.acquire_once(name, ttl).map(|owner| {
            Box::new(MemoryLockGuard {
                locks: self.locks.clone(),
                name: name.to_owned(),
                owner,
            }) as Box<dyn LockGuard>
        }))
    }

    async fn acquire(
        &self,
        name: &str,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<Box<dyn LockGuard>, StateError> {
        let deadline = SystemTime::now() + timeout;
        loop {
            if let Some(owner) = self.acquire_once(name, ttl) {
                return Ok(Box::new(MemoryLockGuard {
                    locks: self.locks.clone(),
                    name: name.to_owned(),
                    owner,
                }));
            }
            if SystemTime::now() >= deadline {
                return Err(StateError::LockTimeout(name.to_owned(), timeout));
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

struct MemoryLockGuard {
    locks: std::sync::Arc<DashMap<String, MemoryLockEntry>>,
    name: String,
    owner: u64,
}

#[async_trait]
impl LockGuard for MemoryLockGuard {
    async fn extend(&self, duration: Duration) -> Result<(), StateError> {
        if let Some(mut entry) = self.locks.get_mut(&self.name) {
            if entry.owner == self.owner {
                entry.expires_at = SystemTime::now() + duration;
                return Ok(());
            }
        }
        Err(StateError::NotHeld)
    }

    async fn release(self: Box<Self>) -> Result<(), StateError> {
        self.locks.remove_if(&self.name, |_, entry| entry.owner == self.owner);
        Ok(())
    }

    async fn is_held(&self) -> Result<bool, StateError> {
        let now = SystemTime::now();
        Ok(self
            .locks
            .get(&self.name)
            .is_some_and(|entry| entry.owner == self.owner && entry.expires_at > now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use latchflow_state::testing::run_store_conformance_tests;

    #[tokio::test]
    async fn passes_store_conformance_suite() {
        let store = MemoryStateStore::new();
        run_store_conformance_tests(&store).await.unwrap();
    }
}
