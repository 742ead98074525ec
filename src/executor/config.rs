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

use super::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Default number of targets worked on at once (default: 10)
    pub concurrency: usize,
    /// Retries after a connection-level failure (default: 3)
    pub retry_attempts: u32,
    /// Fixed wait between attempts (default: 2 seconds)
    pub retry_delay: Duration,
    /// Default deadline for one fan-out (default: 5 minutes)
    pub timeout: Duration,
    /// Number of executions kept for statistics (default: 1000)
    pub history_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            retry_attempts: 3,
            retry_delay: Duration::from_secs(2),
            timeout: Duration::from_secs(300),
            history_capacity: 1000,
        }
    }
}

impl ExecutorConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, self.retry_delay)
    }
}
