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
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::report::ClusterExecutionReport;
use super::stats::ClusterStats;
use super::types::{Cluster, ClusterHealth};
use crate::executor::{BatchCommand, BatchReport, BatchSpec, ParallelExecutor};
use crate::registry::TargetRegistry;
use crate::shared::error::{FleetError, FleetResult};
use crate::shared::validation::validate_name;

/// Command used to probe liveness during health checks.
pub const DEFAULT_HEALTH_COMMAND: &str = "echo ok";

/// Named clusters of registered targets.
pub struct ClusterRegistry {
    clusters: RwLock<BTreeMap<String, Cluster>>,
    targets: Arc<TargetRegistry>,
    executor: Arc<ParallelExecutor>,
    health_command: RwLock<String>,
}

impl ClusterRegistry {
    pub fn new(targets: Arc<TargetRegistry>, executor: Arc<ParallelExecutor>) -> Self {
        Self {
            clusters: RwLock::new(BTreeMap::new()),
            targets,
            executor,
            health_command: RwLock::new(DEFAULT_HEALTH_COMMAND.to_string()),
        }
    }

    /// Replace the probe command; existing clusters are kept.
    pub fn set_health_command(&self, command: impl Into<String>) {
        *self
            .health_command
            .write()
            .unwrap_or_else(PoisonError::into_inner) = command.into();
    }

    pub fn health_command(&self) -> String {
        self.health_command
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Cluster>> {
        self.clusters.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Cluster>> {
        self.clusters.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create_cluster(
        &self,
        name: &str,
        description: &str,
        members: Vec<String>,
        tags: Vec<String>,
    ) -> FleetResult<Cluster> {
        validate_name("cluster name", name)?;

        let mut clusters = self.write();
        if clusters.contains_key(name) {
            return Err(FleetError::DuplicateName(name.to_string()));
        }
        if members.is_empty() {
            return Err(FleetError::EmptyMembers(name.to_string()));
        }
        for (index, member) in members.iter().enumerate() {
            if members[..index].contains(member) {
                return Err(FleetError::DuplicateMember {
                    cluster: name.to_string(),
                    member: member.clone(),
                });
            }
            if !self.targets.contains(member) {
                return Err(FleetError::target_not_found(member.as_str()));
            }
        }

        let cluster = Cluster::new(
            name.to_string(),
            description.to_string(),
            members,
            tags,
        );
        info!(
            "Created cluster '{}' with {} member(s)",
            name,
            cluster.members.len()
        );
        clusters.insert(name.to_string(), cluster.clone());
        Ok(cluster)
    }

    pub fn delete_cluster(&self, name: &str) -> FleetResult<Cluster> {
        let removed = self
            .write()
            .remove(name)
            .ok_or_else(|| FleetError::cluster_not_found(name))?;
        info!("Deleted cluster '{}'", name);
        Ok(removed)
    }

    pub fn get_cluster(&self, name: &str) -> FleetResult<Cluster> {
        self.read()
            .get(name)
            .cloned()
            .ok_or_else(|| FleetError::cluster_not_found(name))
    }

    /// All clusters sorted by name.
    pub fn list_clusters(&self) -> Vec<Cluster> {
        self.read().values().cloned().collect()
    }

    pub fn add_member(&self, cluster: &str, member: &str) -> FleetResult<()> {
        let mut clusters = self.write();
        let entry = clusters
            .get_mut(cluster)
            .ok_or_else(|| FleetError::cluster_not_found(cluster))?;
        if entry.has_member(member) {
            return Err(FleetError::DuplicateMember {
                cluster: cluster.to_string(),
                member: member.to_string(),
            });
        }
        if !self.targets.contains(member) {
            return Err(FleetError::target_not_found(member));
        }

        entry.members.push(member.to_string());
        entry.touch();
        debug!("Added {} to cluster '{}'", member, cluster);
        Ok(())
    }

    pub fn remove_member(&self, cluster: &str, member: &str) -> FleetResult<()> {
        let mut clusters = self.write();
        let entry = clusters
            .get_mut(cluster)
            .ok_or_else(|| FleetError::cluster_not_found(cluster))?;
        let index = entry
            .members
            .iter()
            .position(|m| m == member)
            .ok_or_else(|| FleetError::member_not_found(cluster, member))?;

        entry.members.remove(index);
        entry.touch();
        debug!("Removed {} from cluster '{}'", member, cluster);
        Ok(())
    }

    /// Drop `target` from every cluster; returns the clusters that changed.
    pub fn forget_target(&self, target: &str) -> Vec<String> {
        let mut changed = Vec::new();
        for cluster in self.write().values_mut() {
            let before = cluster.members.len();
            cluster.members.retain(|m| m != target);
            if cluster.members.len() != before {
                cluster.touch();
                changed.push(cluster.name.clone());
            }
        }
        if !changed.is_empty() {
            debug!("Removed {} from cluster(s) {:?}", target, changed);
        }
        changed
    }

    fn members_of(&self, name: &str) -> FleetResult<Vec<String>> {
        self.read()
            .get(name)
            .map(|cluster| cluster.members.clone())
            .ok_or_else(|| FleetError::cluster_not_found(name))
    }

    /// Run `command` on every member of the cluster.
    pub async fn execute_on_cluster(
        &self,
        name: &str,
        command: &str,
    ) -> FleetResult<ClusterExecutionReport> {
        let members = self.members_of(name)?;
        let targets = self.targets.resolve(&members)?;
        let started_at = Utc::now();

        let results = self.executor.execute(&targets, command).await;
        let report = ClusterExecutionReport::new(name, command, results, started_at);
        info!(
            "Cluster '{}': {}/{} succeeded",
            name,
            report.successful_count,
            report.results.len()
        );
        Ok(report)
    }

    /// Run an ordered batch across every member of the cluster.
    pub async fn execute_batch_on_cluster(
        &self,
        name: &str,
        batch_name: &str,
        commands: Vec<BatchCommand>,
        stop_on_failure: bool,
    ) -> FleetResult<BatchReport> {
        let members = self.members_of(name)?;
        let targets = self.targets.resolve(&members)?;
        let spec = BatchSpec::new(batch_name, targets, commands).with_stop_on_failure(stop_on_failure);
        self.executor.execute_batch(&spec).await
    }

    /// Probe every member and store the result as the cluster's snapshot.
    pub async fn check_cluster_health(&self, name: &str) -> FleetResult<ClusterHealth> {
        let members = self.members_of(name)?;
        let targets = self.targets.resolve(&members)?;
        let clock = Instant::now();

        let command = self.health_command();
        let results = self.executor.execute(&targets, &command).await;
        let online = results.values().filter(|r| r.exit_code == 0).count();
        let offline_targets = results
            .values()
            .filter(|r| r.exit_code != 0)
            .map(|r| r.target.clone())
            .collect();
        let health = ClusterHealth::new(name, results.len(), online, clock.elapsed(), offline_targets);

        // The cluster may have been deleted while the probe ran
        if let Some(cluster) = self.write().get_mut(name) {
            cluster.health = Some(health.clone());
        }
        debug!(
            "Cluster '{}' is {} ({}/{} online)",
            name, health.status, health.online, health.total
        );
        Ok(health)
    }

    /// Check every cluster in turn. Failures are logged and skipped.
    pub async fn check_all_health(&self) -> Vec<ClusterHealth> {
        let names: Vec<String> = self.read().keys().cloned().collect();
        let mut snapshots = Vec::with_capacity(names.len());
        for name in names {
            match self.check_cluster_health(&name).await {
                Ok(health) => snapshots.push(health),
                Err(e) => warn!("Health check for cluster '{}' failed: {}", name, e),
            }
        }
        snapshots
    }

    /// Re-check all clusters every `period` until `cancel_token` fires.
    pub fn spawn_health_monitor(
        self: &Arc<Self>,
        period: Duration,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        info!("Health monitor stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        let snapshots = registry.check_all_health().await;
                        debug!("Health monitor checked {} cluster(s)", snapshots.len());
                    }
                }
            }
        })
    }

    pub fn stats(&self) -> ClusterStats {
        ClusterStats::from_clusters(self.read().values())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
