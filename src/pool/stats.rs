// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::atomic::{AtomicU64, Ordering};

use super::entry::Eviction;

/// Snapshot of pool occupancy and lifetime counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Sessions currently held by the pool, free or leased
    pub pooled_sessions: usize,
    /// Sessions currently leased out
    pub in_use_sessions: usize,
    /// Distinct `(username, host, port)` endpoints with at least one session
    pub endpoints: usize,
    pub sessions_created: u64,
    pub sessions_reused: u64,
    pub connect_failures: u64,
    pub expired_evictions: u64,
    pub idle_evictions: u64,
    pub disconnected_evictions: u64,
    /// Sessions dropped after a transport failure or cancelled lease
    pub invalidations: u64,
}

impl PoolStats {
    pub fn idle_sessions(&self) -> usize {
        self.pooled_sessions - self.in_use_sessions
    }

    pub fn total_evictions(&self) -> u64 {
        self.expired_evictions + self.idle_evictions + self.disconnected_evictions
    }

    /// Fraction of acquisitions served from an existing session.
    pub fn reuse_rate(&self) -> f64 {
        let total = self.sessions_created + self.sessions_reused;
        if total == 0 {
            0.0
        } else {
            self.sessions_reused as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(super) struct PoolCounters {
    pub(super) created: AtomicU64,
    pub(super) reused: AtomicU64,
    pub(super) connect_failures: AtomicU64,
    pub(super) expired: AtomicU64,
    pub(super) idle: AtomicU64,
    pub(super) disconnected: AtomicU64,
    pub(super) invalidated: AtomicU64,
}

impl PoolCounters {
    pub(super) fn record_eviction(&self, reason: Eviction) {
        let counter = match reason {
            Eviction::Expired => &self.expired,
            Eviction::Idle => &self.idle,
            Eviction::Disconnected => &self.disconnected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn fill(&self, stats: &mut PoolStats) {
        stats.sessions_created = self.created.load(Ordering::Relaxed);
        stats.sessions_reused = self.reused.load(Ordering::Relaxed);
        stats.connect_failures = self.connect_failures.load(Ordering::Relaxed);
        stats.expired_evictions = self.expired.load(Ordering::Relaxed);
        stats.idle_evictions = self.idle.load(Ordering::Relaxed);
        stats.disconnected_evictions = self.disconnected.load(Ordering::Relaxed);
        stats.invalidations = self.invalidated.load(Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuse_rate() {
        let stats = PoolStats {
            sessions_created: 1,
            sessions_reused: 3,
            ..Default::default()
        };
        assert_eq!(stats.reuse_rate(), 0.75);
        assert_eq!(PoolStats::default().reuse_rate(), 0.0);
    }

    #[test]
    fn test_eviction_counters() {
        let counters = PoolCounters::default();
        counters.record_eviction(Eviction::Idle);
        counters.record_eviction(Eviction::Idle);
        counters.record_eviction(Eviction::Expired);

        let mut stats = PoolStats::default();
        counters.fill(&mut stats);
        assert_eq!(stats.idle_evictions, 2);
        assert_eq!(stats.total_evictions(), 3);
    }
}
