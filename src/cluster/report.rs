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

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::executor::ExecutionResult;

/// Outcome of one command across a cluster.
#[derive(Debug, Clone)]
pub struct ClusterExecutionReport {
    pub cluster: String,
    pub command: String,
    pub results: BTreeMap<String, ExecutionResult>,
    pub successful_count: usize,
    pub failed_count: usize,
    pub total_duration: Duration,
    /// `total_duration / results.len()`, zero when there are no results
    pub average_duration: Duration,
    pub started_at: DateTime<Utc>,
}

impl ClusterExecutionReport {
    pub fn new(
        cluster: impl Into<String>,
        command: impl Into<String>,
        results: BTreeMap<String, ExecutionResult>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let successful_count = results.values().filter(|r| r.exit_code == 0).count();
        let failed_count = results.len() - successful_count;
        let total_duration: Duration = results.values().map(|r| r.duration).sum();
        let average_duration = match u32::try_from(results.len()) {
            Ok(count) if count > 0 => total_duration / count,
            _ => Duration::ZERO,
        };

        Self {
            cluster: cluster.into(),
            command: command.into(),
            results,
            successful_count,
            failed_count,
            total_duration,
            average_duration,
            started_at,
        }
    }

    /// Percentage of members whose command exited with 0.
    pub fn success_rate(&self) -> f64 {
        if self.results.is_empty() {
            0.0
        } else {
            self.successful_count as f64 / self.results.len() as f64 * 100.0
        }
    }

    pub fn failed_targets(&self) -> Vec<&str> {
        self.results
            .values()
            .filter(|r| r.exit_code != 0)
            .map(|r| r.target.as_str())
            .collect()
    }

    pub fn successful_targets(&self) -> Vec<&str> {
        self.results
            .values()
            .filter(|r| r.exit_code == 0)
            .map(|r| r.target.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::FailureKind;
    use crate::transport::CommandOutput;

    fn completed(target: &str, exit_code: i32, secs: u64) -> (String, ExecutionResult) {
        let output = CommandOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code,
        };
        (
            target.to_string(),
            ExecutionResult::completed(target, "uptime", output, Duration::from_secs(secs), 1),
        )
    }

    #[test]
    fn test_counts_and_rates() {
        let mut results: BTreeMap<_, _> =
            [completed("a", 0, 1), completed("b", 0, 3), completed("c", 2, 2)]
                .into_iter()
                .collect();
        results.insert(
            "d".to_string(),
            ExecutionResult::failed(
                "d",
                "uptime",
                FailureKind::Connection,
                "refused",
                Duration::from_secs(2),
                4,
            ),
        );

        let report = ClusterExecutionReport::new("web", "uptime", results, Utc::now());
        assert_eq!(report.successful_count, 2);
        assert_eq!(report.failed_count, 2);
        assert_eq!(report.success_rate(), 50.0);
        assert_eq!(report.average_duration, Duration::from_secs(2));
        assert_eq!(report.failed_targets(), vec!["c", "d"]);
        assert_eq!(report.successful_targets(), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_report() {
        let report = ClusterExecutionReport::new("web", "uptime", BTreeMap::new(), Utc::now());
        assert_eq!(report.success_rate(), 0.0);
        assert_eq!(report.average_duration, Duration::ZERO);
    }
}
