//! Correlation of server replies with client requests.
//!
//! Records expire after a fixed time-to-live and the table never holds more than
//! `capacity` records; the oldest records are evicted first.

use super::message::TransactionId;
use std::{
    collections::{HashMap, VecDeque},
    time::{Duration, Instant},
};

pub const DEFAULT_TTL: Duration = Duration::from_secs(120);
pub const DEFAULT_CAPACITY: usize = 4096;

#[derive(Debug)]
pub struct TransactionTracker {
    ttl: Duration,
    capacity: usize,
    seen: HashMap<TransactionId, Instant>,
    // Insertion order. A re-marked id leaves a stale entry behind, which is
    // skipped on eviction because its instant no longer matches `seen`.
    order: VecDeque<(TransactionId, Instant)>,
}

impl Default for TransactionTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CAPACITY)
    }
}

impl TransactionTracker {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            seen: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Records `id` as a client request seen now.
    pub fn mark(&mut self, id: TransactionId) {
        self.mark_at(id, Instant::now());
    }

    pub fn seen(&mut self, id: TransactionId) -> bool {
        self.seen_at(id, Instant::now())
    }

    pub fn mark_at(&mut self, id: TransactionId, now: Instant) {
        self.expire(now);
        self.seen.insert(id, now);
        self.order.push_back((id, now));
        while self.seen.len() > self.capacity && !self.order.is_empty() {
            self.evict_oldest();
        }
        if self.order.len() > 2 * self.capacity {
            self.compact();
        }
    }

    pub fn seen_at(&mut self, id: TransactionId, now: Instant) -> bool {
        self.expire(now);
        self.seen.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn expire(&mut self, now: Instant) {
        while let Some(&(_, marked)) = self.order.front() {
            if now.saturating_duration_since(marked) < self.ttl {
                break;
            }
            self.evict_oldest();
        }
    }

    // Drops queue entries left behind by re-marked ids.
    fn compact(&mut self) {
        let seen = &self.seen;
        self.order.retain(|(id, marked)| seen.get(id) == Some(marked));
    }

    fn evict_oldest(&mut self) {
        if let Some((id, marked)) = self.order.pop_front() {
            if self.seen.get(&id) == Some(&marked) {
                self.seen.remove(&id);
            }
        }
    }
}
