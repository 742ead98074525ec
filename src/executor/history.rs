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

//! Bounded record of past executions, used for statistics.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::result_types::{ExecutionResult, FailureKind};

/// Summary of one past execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
    pub target: String,
    pub command: String,
    pub exit_code: i32,
    pub success: bool,
    pub failure: Option<FailureKind>,
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
}

impl From<&ExecutionResult> for ExecutionRecord {
    fn from(result: &ExecutionResult) -> Self {
        Self {
            target: result.target.clone(),
            command: result.command.clone(),
            exit_code: result.exit_code,
            success: result.success,
            failure: result.failure,
            duration: result.duration,
            timestamp: result.timestamp,
        }
    }
}

/// Aggregates over the executions still held in history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub connection_failures: usize,
    pub cancelled: usize,
    pub average_duration: Duration,
    pub last_execution: Option<DateTime<Utc>>,
}

impl ExecutionStats {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successful as f64 / self.total as f64 * 100.0
        }
    }
}

/// Ring buffer of execution records; the oldest is dropped when full.
#[derive(Debug)]
pub struct ExecutionHistory {
    capacity: usize,
    records: Mutex<VecDeque<ExecutionRecord>>,
}

impl ExecutionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record<'a, I>(&self, results: I)
    where
        I: IntoIterator<Item = &'a ExecutionResult>,
    {
        if self.capacity == 0 {
            return;
        }
        let Ok(mut records) = self.records.lock() else {
            tracing::warn!("Execution history lock poisoned; dropping records");
            return;
        };
        for result in results {
            if records.len() == self.capacity {
                records.pop_front();
            }
            records.push_back(ExecutionRecord::from(result));
        }
    }

    /// Records from oldest to newest.
    pub fn snapshot(&self) -> Vec<ExecutionRecord> {
        self.records
            .lock()
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> ExecutionStats {
        let Ok(records) = self.records.lock() else {
            return ExecutionStats::default();
        };

        let mut stats = ExecutionStats {
            total: records.len(),
            ..Default::default()
        };
        let mut total_duration = Duration::ZERO;
        for record in records.iter() {
            if record.success {
                stats.successful += 1;
            } else {
                stats.failed += 1;
            }
            match record.failure {
                Some(FailureKind::Connection) => stats.connection_failures += 1,
                Some(FailureKind::Cancelled) => stats.cancelled += 1,
                _ => {}
            }
            total_duration += record.duration;
        }
        if let Ok(count) = u32::try_from(stats.total) {
            if count > 0 {
                stats.average_duration = total_duration / count;
            }
        }
        stats.last_execution = records.back().map(|r| r.timestamp);
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::CommandOutput;

    fn result(target: &str, exit_code: i32, millis: u64) -> ExecutionResult {
        ExecutionResult::completed(
            target,
            "cmd",
            CommandOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code,
            },
            Duration::from_millis(millis),
            1,
        )
    }

    #[test]
    fn test_oldest_record_is_evicted() {
        let history = ExecutionHistory::new(2);
        let results = [result("a", 0, 1), result("b", 0, 1), result("c", 0, 1)];
        history.record(&results);

        let targets: Vec<_> = history.snapshot().into_iter().map(|r| r.target).collect();
        assert_eq!(targets, vec!["b", "c"]);
    }

    #[test]
    fn test_stats() {
        let history = ExecutionHistory::new(10);
        let cancelled = ExecutionResult::failed(
            "c",
            "cmd",
            FailureKind::Cancelled,
            "",
            Duration::from_millis(30),
            0,
        );
        history.record(&[result("a", 0, 10), result("b", 1, 20), cancelled]);

        let stats = history.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.average_duration, Duration::from_millis(20));
        assert!((stats.success_rate() - 33.333).abs() < 0.01);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let history = ExecutionHistory::new(0);
        history.record(&[result("a", 0, 1)]);
        assert!(history.is_empty());
        assert_eq!(history.stats().success_rate(), 0.0);
    }
}
