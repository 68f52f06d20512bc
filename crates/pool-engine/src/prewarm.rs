// SPDX-License-Identifier: MIT

//! Three-level prewarm pool (§4.7): a cache of agent handles at varying
//! stages of readiness, keyed by tier, so `pool_manager::get_or_create`
//! can skip straight past the cold-start path when a match is available.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pool_core::clock::{Clock, SystemClock};
use pool_core::tier::ProjectTier;
use pool_wire::agent::AgentContract;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrewarmLevel {
    /// Fully initialized: tools and clients already warm.
    L1,
    /// Tools initialized; the caller still has client setup to finish.
    L2,
    /// Config-only template; nothing about the agent has run yet.
    L3,
}

impl PrewarmLevel {
    fn ttl(self) -> Duration {
        match self {
            PrewarmLevel::L1 => Duration::from_secs(3600),
            PrewarmLevel::L2 => Duration::from_secs(7200),
            PrewarmLevel::L3 => Duration::from_secs(86_400),
        }
    }
}

struct Entry {
    agent: Arc<dyn AgentContract>,
    cached_at: Instant,
}

#[derive(Debug, Clone, Default)]
pub struct PrewarmStats {
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub l3_hits: u64,
    pub misses: u64,
    pub expirations: u64,
}

type TierQueues = Mutex<HashMap<ProjectTier, VecDeque<Entry>>>;

/// Caches agent handles per `(level, tier)`. `capacity_per_tier` bounds each
/// `(level, tier)` queue independently.
pub struct PrewarmPool<C: Clock = SystemClock> {
    clock: C,
    capacity_per_tier: usize,
    low_watermark_pct: f64,
    l1: TierQueues,
    l2: TierQueues,
    l3: TierQueues,
    stats: Mutex<PrewarmStats>,
}

impl<C: Clock> PrewarmPool<C> {
    pub fn new(capacity_per_tier: usize, clock: C) -> Self {
        Self {
            clock,
            capacity_per_tier,
            low_watermark_pct: 0.2,
            l1: Mutex::new(HashMap::new()),
            l2: Mutex::new(HashMap::new()),
            l3: Mutex::new(HashMap::new()),
            stats: Mutex::new(PrewarmStats::default()),
        }
    }

    pub fn stats(&self) -> PrewarmStats {
        self.stats.lock().clone()
    }

    fn queues_for(&self, level: PrewarmLevel) -> &TierQueues {
        match level {
            PrewarmLevel::L1 => &self.l1,
            PrewarmLevel::L2 => &self.l2,
            PrewarmLevel::L3 => &self.l3,
        }
    }

    /// §4.7 `return_instance`: places the handle into `level`'s pool for
    /// `tier` unless that queue is already at capacity.
    pub fn return_instance(
        &self,
        tier: ProjectTier,
        level: PrewarmLevel,
        agent: Arc<dyn AgentContract>,
    ) -> bool {
        let queues = self.queues_for(level);
        let mut guard = queues.lock();
        let queue = guard.entry(tier).or_default();
        if queue.len() >= self.capacity_per_tier {
            return false;
        }
        queue.push_back(Entry { agent, cached_at: self.clock.now() });

        if level == PrewarmLevel::L1 {
            let low_watermark = (self.capacity_per_tier as f64 * self.low_watermark_pct).ceil() as usize;
            if queue.len() < low_watermark {
                tracing::warn!(?tier, size = queue.len(), low_watermark, "L1 prewarm pool below low watermark");
            }
        }
        true
    }

    /// §4.7 `get_prewarmed`: tries L1, then L2, then L3 for `tier`, discarding
    /// any expired entries encountered along the way.
    pub fn get_prewarmed(&self, tier: ProjectTier) -> Option<(PrewarmLevel, Arc<dyn AgentContract>)> {
        for level in [PrewarmLevel::L1, PrewarmLevel::L2, PrewarmLevel::L3] {
            if let Some(agent) = self.take_fresh(level, tier) {
                self.record_hit(level);
                return Some((level, agent));
            }
        }
        self.stats.lock().misses += 1;
        None
    }

    fn take_fresh(&self, level: PrewarmLevel, tier: ProjectTier) -> Option<Arc<dyn AgentContract>> {
        let queues = self.queues_for(level);
        let mut guard = queues.lock();
        let queue = guard.entry(tier).or_default();
        let ttl = level.ttl();
        let mut expired = 0u64;
        let result = loop {
            match queue.pop_front() {
                None => break None,
                Some(entry) => {
                    if self.clock.now().saturating_duration_since(entry.cached_at) > ttl {
                        expired += 1;
                        continue;
                    }
                    break Some(entry.agent);
                }
            }
        };
        if expired > 0 {
            self.stats.lock().expirations += expired;
        }
        result
    }

    fn record_hit(&self, level: PrewarmLevel) {
        let mut stats = self.stats.lock();
        match level {
            PrewarmLevel::L1 => stats.l1_hits += 1,
            PrewarmLevel::L2 => stats.l2_hits += 1,
            PrewarmLevel::L3 => stats.l3_hits += 1,
        }
    }

    /// Evicts every expired entry across all levels and tiers. Intended to
    /// run on a 60 s maintenance tick.
    pub fn evict_expired(&self) -> u64 {
        let mut total = 0;
        for level in [PrewarmLevel::L1, PrewarmLevel::L2, PrewarmLevel::L3] {
            let ttl = level.ttl();
            let queues = self.queues_for(level);
            let mut guard = queues.lock();
            for queue in guard.values_mut() {
                let before = queue.len();
                queue.retain(|entry| self.clock.now().saturating_duration_since(entry.cached_at) <= ttl);
                total += (before - queue.len()) as u64;
            }
        }
        if total > 0 {
            self.stats.lock().expirations += total;
        }
        total
    }
}

#[cfg(test)]
#[path = "prewarm_tests.rs"]
mod tests;
