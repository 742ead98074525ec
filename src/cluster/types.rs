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

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Overall state of a cluster at its last health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HealthStatus {
    Online,
    Degraded,
    Offline,
    /// Never checked, or no members to check
    Unknown,
}

impl HealthStatus {
    pub fn from_counts(online: usize, total: usize) -> Self {
        if total == 0 {
            HealthStatus::Unknown
        } else if online == total {
            HealthStatus::Online
        } else if online == 0 {
            HealthStatus::Offline
        } else {
            HealthStatus::Degraded
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HealthStatus::Online => "online",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Offline => "offline",
            HealthStatus::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Result of one health check. `online + offline == total` always holds.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterHealth {
    pub cluster: String,
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub status: HealthStatus,
    pub healthy_percent: f64,
    /// Wall time of the whole check
    pub response_time: Duration,
    pub checked_at: DateTime<Utc>,
    pub offline_targets: Vec<String>,
}

impl ClusterHealth {
    pub fn new(
        cluster: impl Into<String>,
        total: usize,
        online: usize,
        response_time: Duration,
        offline_targets: Vec<String>,
    ) -> Self {
        let online = online.min(total);
        let healthy_percent = if total == 0 {
            0.0
        } else {
            online as f64 / total as f64 * 100.0
        };
        Self {
            cluster: cluster.into(),
            total,
            online,
            offline: total - online,
            status: HealthStatus::from_counts(online, total),
            healthy_percent,
            response_time,
            checked_at: Utc::now(),
            offline_targets,
        }
    }
}

/// A named group of registered targets.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub name: String,
    pub description: String,
    /// Target names in insertion order
    pub members: Vec<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Snapshot from the most recent health check
    pub health: Option<ClusterHealth>,
}

impl Cluster {
    pub(super) fn new(
        name: String,
        description: String,
        members: Vec<String>,
        tags: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            name,
            description,
            members,
            tags,
            created_at: now,
            updated_at: now,
            health: None,
        }
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.members.iter().any(|m| m == name)
    }

    pub fn status(&self) -> HealthStatus {
        self.health
            .as_ref()
            .map_or(HealthStatus::Unknown, |health| health.status)
    }

    pub(super) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_counts() {
        assert_eq!(HealthStatus::from_counts(4, 4), HealthStatus::Online);
        assert_eq!(HealthStatus::from_counts(3, 4), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from_counts(0, 4), HealthStatus::Offline);
        assert_eq!(HealthStatus::from_counts(0, 0), HealthStatus::Unknown);
    }

    #[test]
    fn test_health_counts() {
        let health = ClusterHealth::new("web", 4, 3, Duration::ZERO, vec!["w4".into()]);
        assert_eq!(health.offline, 1);
        assert_eq!(health.healthy_percent, 75.0);
        assert_eq!(health.status, HealthStatus::Degraded);
    }

    #[test]
    fn test_never_checked_cluster_is_unknown() {
        let cluster = Cluster::new("web".into(), String::new(), vec!["w1".into()], vec![]);
        assert_eq!(cluster.status(), HealthStatus::Unknown);
        assert!(cluster.has_member("w1"));
    }
}
