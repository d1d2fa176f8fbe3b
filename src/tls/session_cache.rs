//! Server-side session cache bounded by capacity and timeout.
//!
//! The engine's in-memory cache only bounds the number of sessions. This
//! wrapper records when each session was stored and refuses to resume one
//! older than the configured timeout.
//!
//! Timestamps of sessions the engine evicted on its own linger until the
//! timestamp map reaches twice the capacity; one sweep then drops them
//! together with every expired session. A sweep runs at most once per
//! `capacity` stores.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rustls::server::{ServerSessionMemoryCache, StoresServerSessions};

#[derive(Debug)]
pub struct ExpiringSessionCache {
    sessions: Arc<ServerSessionMemoryCache>,
    stored_at: DashMap<Vec<u8>, Instant>,
    capacity: usize,
    timeout: Duration,
    purging: AtomicBool,
}

impl ExpiringSessionCache {
    /// Create a cache holding at most `capacity` sessions for `timeout` each.
    pub fn new(capacity: usize, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            sessions: ServerSessionMemoryCache::new(capacity),
            stored_at: DashMap::new(),
            capacity,
            timeout,
            purging: AtomicBool::new(false),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn is_expired(&self, key: &[u8]) -> bool {
        self.stored_at
            .get(key)
            .map(|stored| stored.elapsed() >= self.timeout)
            .unwrap_or(false)
    }

    /// Drop timestamps of sessions that expired or were evicted by the
    /// underlying cache.
    fn purge(&self) {
        if self
            .purging
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let before = self.stored_at.len();
        let mut expired = Vec::new();
        self.stored_at.retain(|key, stored| {
            if stored.elapsed() >= self.timeout {
                expired.push(key.clone());
                false
            } else {
                self.sessions.get(key).is_some()
            }
        });
        for key in expired {
            self.sessions.take(&key);
        }
        self.purging.store(false, Ordering::Release);
        tracing::trace!(before, after = self.stored_at.len(), "purged session cache");
    }
}

impl StoresServerSessions for ExpiringSessionCache {
    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> bool {
        if self.stored_at.len() >= self.capacity.saturating_mul(2).max(1) {
            self.purge();
        }
        let stored = self.sessions.put(key.clone(), value);
        if stored {
            self.stored_at.insert(key, Instant::now());
        }
        stored
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        if self.is_expired(key) {
            self.stored_at.remove(key);
            self.sessions.take(key);
            return None;
        }
        self.sessions.get(key)
    }

    fn take(&self, key: &[u8]) -> Option<Vec<u8>> {
        let expired = self.is_expired(key);
        self.stored_at.remove(key);
        let value = self.sessions.take(key);
        if expired {
            None
        } else {
            value
        }
    }

    fn can_cache(&self) -> bool {
        true
    }
}
