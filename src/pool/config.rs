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

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum lifetime of a session since it was opened (default: 30 minutes)
    pub max_life: Duration,
    /// Maximum time a free session may sit unused (default: 5 minutes)
    pub max_idle: Duration,
    /// Period of the background sweep (default: 60 seconds)
    pub sweep_interval: Duration,
    /// Upper bound on sessions per endpoint, free or leased (default: 4)
    pub max_sessions_per_target: usize,
    /// Time allowed to open a session or wait for a free slot (default: 30 seconds)
    pub connect_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_life: Duration::from_secs(30 * 60),
            max_idle: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(60),
            max_sessions_per_target: 4,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    pub fn new(max_life: Duration, max_idle: Duration) -> Self {
        Self {
            max_life,
            max_idle,
            ..Default::default()
        }
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_max_sessions_per_target(mut self, max: usize) -> Self {
        // Zero slots would make every acquire wait forever
        self.max_sessions_per_target = max.max(1);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.max_sessions_per_target, 4);
        assert!(config.max_idle < config.max_life);
    }

    #[test]
    fn test_slot_cap_is_at_least_one() {
        let config = PoolConfig::default().with_max_sessions_per_target(0);
        assert_eq!(config.max_sessions_per_target, 1);
    }
}
