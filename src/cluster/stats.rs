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

use super::types::{Cluster, HealthStatus};

/// Aggregate view over all clusters, derived on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterStats {
    pub total_clusters: usize,
    /// Sum of member counts; a target in two clusters counts twice
    pub total_members: usize,
    /// Clusters by last-known status
    pub by_status: BTreeMap<HealthStatus, usize>,
}

impl ClusterStats {
    pub(super) fn from_clusters<'a>(clusters: impl IntoIterator<Item = &'a Cluster>) -> Self {
        let mut stats = ClusterStats::default();
        for cluster in clusters {
            stats.total_clusters += 1;
            stats.total_members += cluster.members.len();
            *stats.by_status.entry(cluster.status()).or_insert(0) += 1;
        }
        stats
    }

    pub fn count(&self, status: HealthStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}
