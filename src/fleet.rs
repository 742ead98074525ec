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

//! Entry point tying the registries, the session pool and the executor together.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster::{Cluster, ClusterExecutionReport, ClusterHealth, ClusterRegistry, ClusterStats};
use crate::config::Config;
use crate::executor::{
    BatchCommand, BatchReport, BatchSpec, ExecutionRecord, ExecutionResult, ExecutionStats,
    ExecutorConfig, ParallelExecutor, TransferResult,
};
use crate::pool::{ConnectionPool, PoolConfig, PoolStats, SessionLease};
use crate::registry::TargetRegistry;
use crate::shared::error::{FleetError, FleetResult};
use crate::target::{TargetConfig, TargetUpdate};
use crate::transport::{TransportFactory, TunnelHandle};

/// Connection figures for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStats {
    pub total_targets: usize,
    /// Sessions currently leased out
    pub active_sessions: usize,
    /// Sessions held by the pool, free or leased
    pub pool_size: usize,
    pub pool: PoolStats,
}

/// A local port forward that keeps its session leased until closed.
pub struct Tunnel {
    handle: Option<TunnelHandle>,
    lease: Option<SessionLease>,
    pool: Arc<ConnectionPool>,
    local_addr: SocketAddr,
}

impl Tunnel {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop forwarding and return the session to the pool.
    pub async fn close(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.close().await;
        }
        if let Some(lease) = self.lease.take() {
            self.pool.release(&lease);
        }
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        // Closing the session tears down a forward that was never closed
        if let Some(lease) = self.lease.take() {
            self.pool.discard(&lease);
        }
    }
}

struct BackgroundTasks {
    cancel_token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Targets, clusters and the machinery to run commands on them.
pub struct Fleet {
    targets: Arc<TargetRegistry>,
    pool: Arc<ConnectionPool>,
    executor: Arc<ParallelExecutor>,
    clusters: Arc<ClusterRegistry>,
    health_interval: Option<Duration>,
    background: Mutex<Option<BackgroundTasks>>,
}

impl Fleet {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        pool_config: PoolConfig,
        executor_config: ExecutorConfig,
    ) -> Self {
        let targets = Arc::new(TargetRegistry::new());
        let pool = Arc::new(ConnectionPool::new(pool_config, factory));
        let executor = Arc::new(ParallelExecutor::new(Arc::clone(&pool), executor_config));
        let clusters = Arc::new(ClusterRegistry::new(
            Arc::clone(&targets),
            Arc::clone(&executor),
        ));
        Self {
            targets,
            pool,
            executor,
            clusters,
            health_interval: None,
            background: Mutex::new(None),
        }
    }

    /// Probe clusters with `command`, and every `interval` once background
    /// tasks are started.
    pub fn with_health_check(mut self, command: impl Into<String>, interval: Option<Duration>) -> Self {
        self.clusters.set_health_command(command);
        self.health_interval = interval;
        self
    }

    /// Build a fleet from configuration, registering its targets and clusters.
    pub fn from_config(
        config: &Config,
        factory: Arc<dyn TransportFactory>,
        executor_config: ExecutorConfig,
    ) -> anyhow::Result<Self> {
        let fleet = Self::new(factory, config.pool_config(), executor_config)
            .with_health_check(config.health_command(), config.health_interval());

        for target in config.resolve_targets()? {
            let name = target.name.clone();
            fleet
                .add_target(target)
                .with_context(|| format!("Failed to register target '{name}'"))?;
        }
        for (name, cluster) in &config.clusters {
            fleet
                .create_cluster(
                    name,
                    &cluster.description,
                    cluster.members.clone(),
                    cluster.tags.clone(),
                )
                .with_context(|| format!("Failed to create cluster '{name}'"))?;
        }

        debug!(
            "Loaded {} target(s) and {} cluster(s) from configuration",
            fleet.targets.len(),
            fleet.clusters.len()
        );
        Ok(fleet)
    }

    pub fn executor(&self) -> &ParallelExecutor {
        &self.executor
    }

    // Targets

    pub fn add_target(&self, target: TargetConfig) -> FleetResult<()> {
        self.targets.add(target)
    }

    /// Unregister a target, drop it from every cluster and close its
    /// sessions unless another target shares the endpoint.
    pub async fn remove_target(&self, name: &str) -> FleetResult<TargetConfig> {
        let removed = self.targets.remove(name)?;
        self.clusters.forget_target(name);
        self.close_unshared_sessions(&removed).await;
        info!("Removed target {}", removed);
        Ok(removed)
    }

    /// Apply `update`; sessions opened with the old endpoint or credentials
    /// are closed.
    pub async fn update_target(&self, name: &str, update: TargetUpdate) -> FleetResult<TargetConfig> {
        let (previous, updated) = self.targets.update(name, &update)?;
        if previous.auth != updated.auth {
            // Sessions for the old endpoint were authenticated with the old
            // credentials and must not be handed to anyone again.
            self.pool.close_target(&previous).await;
            info!("Closed sessions of {} after a credential change", previous);
        } else if previous.key() != updated.key() {
            self.close_unshared_sessions(&previous).await;
        }
        Ok(updated)
    }

    async fn close_unshared_sessions(&self, target: &TargetConfig) {
        let key = target.key();
        let shared = self.targets.list().iter().any(|t| t.key() == key);
        if !shared {
            self.pool.close_target(target).await;
        }
    }

    pub fn list_targets(&self) -> Vec<TargetConfig> {
        self.targets.list()
    }

    pub fn list_targets_by_tag(&self, tag: &str) -> Vec<TargetConfig> {
        self.targets.list_by_tag(tag)
    }

    pub fn get_target(&self, name: &str) -> FleetResult<TargetConfig> {
        self.targets
            .get(name)
            .ok_or_else(|| FleetError::target_not_found(name))
    }

    // Execution

    pub async fn execute(&self, target: &str, command: &str) -> FleetResult<ExecutionResult> {
        let target = self.get_target(target)?;
        Ok(self.executor.execute_on_target(&target, command).await)
    }

    pub async fn execute_on<S: AsRef<str>>(
        &self,
        targets: &[S],
        command: &str,
    ) -> FleetResult<BTreeMap<String, ExecutionResult>> {
        let targets = self.targets.resolve(targets)?;
        Ok(self.executor.execute(&targets, command).await)
    }

    pub async fn execute_batch<S: AsRef<str>>(
        &self,
        batch_name: &str,
        targets: &[S],
        commands: Vec<BatchCommand>,
        stop_on_failure: bool,
    ) -> FleetResult<BatchReport> {
        let targets = self.targets.resolve(targets)?;
        let spec = BatchSpec::new(batch_name, targets, commands).with_stop_on_failure(stop_on_failure);
        self.executor.execute_batch(&spec).await
    }

    pub async fn execute_on_cluster(
        &self,
        cluster: &str,
        command: &str,
    ) -> FleetResult<ClusterExecutionReport> {
        self.clusters.execute_on_cluster(cluster, command).await
    }

    pub async fn execute_batch_on_cluster(
        &self,
        cluster: &str,
        batch_name: &str,
        commands: Vec<BatchCommand>,
        stop_on_failure: bool,
    ) -> FleetResult<BatchReport> {
        self.clusters
            .execute_batch_on_cluster(cluster, batch_name, commands, stop_on_failure)
            .await
    }

    pub async fn upload<S: AsRef<str>>(
        &self,
        targets: &[S],
        local_path: &Path,
        remote_path: &str,
    ) -> FleetResult<BTreeMap<String, TransferResult>> {
        let targets = self.targets.resolve(targets)?;
        let config = self.executor.config();
        self.executor
            .upload_to_targets(&targets, local_path, remote_path, config.concurrency, config.timeout)
            .await
    }

    pub async fn download<S: AsRef<str>>(
        &self,
        targets: &[S],
        remote_path: &str,
        local_dir: &Path,
    ) -> FleetResult<BTreeMap<String, TransferResult>> {
        let targets = self.targets.resolve(targets)?;
        let config = self.executor.config();
        self.executor
            .download_from_targets(&targets, remote_path, local_dir, config.concurrency, config.timeout)
            .await
    }

    /// Forward `127.0.0.1:local_port` through `target` to `remote_host:remote_port`.
    /// Port 0 picks a free local port.
    pub async fn open_tunnel(
        &self,
        target: &str,
        local_port: u16,
        remote_host: &str,
        remote_port: u16,
    ) -> FleetResult<Tunnel> {
        let target = self.get_target(target)?;
        let lease = self.pool.acquire(&target).await?;

        let created = lease
            .transport()
            .create_tunnel(local_port, remote_host, remote_port)
            .await;
        match created {
            Ok(handle) => {
                info!(
                    "Tunnel {} -> {}:{} via {}",
                    handle.local_addr, remote_host, remote_port, target.name
                );
                Ok(Tunnel {
                    local_addr: handle.local_addr,
                    handle: Some(handle),
                    lease: Some(lease),
                    pool: Arc::clone(&self.pool),
                })
            }
            Err(e) => {
                if e.is_session_fault() {
                    self.pool.invalidate(&lease).await;
                } else {
                    self.pool.release(&lease);
                }
                Err(e.into())
            }
        }
    }

    // Clusters

    pub fn create_cluster(
        &self,
        name: &str,
        description: &str,
        members: Vec<String>,
        tags: Vec<String>,
    ) -> FleetResult<Cluster> {
        self.clusters.create_cluster(name, description, members, tags)
    }

    pub fn delete_cluster(&self, name: &str) -> FleetResult<Cluster> {
        self.clusters.delete_cluster(name)
    }

    pub fn add_cluster_member(&self, cluster: &str, member: &str) -> FleetResult<()> {
        self.clusters.add_member(cluster, member)
    }

    pub fn remove_cluster_member(&self, cluster: &str, member: &str) -> FleetResult<()> {
        self.clusters.remove_member(cluster, member)
    }

    pub fn list_clusters(&self) -> Vec<Cluster> {
        self.clusters.list_clusters()
    }

    pub fn get_cluster(&self, name: &str) -> FleetResult<Cluster> {
        self.clusters.get_cluster(name)
    }

    pub async fn check_cluster_health(&self, name: &str) -> FleetResult<ClusterHealth> {
        self.clusters.check_cluster_health(name).await
    }

    pub async fn check_all_health(&self) -> Vec<ClusterHealth> {
        self.clusters.check_all_health().await
    }

    pub fn cluster_stats(&self) -> ClusterStats {
        self.clusters.stats()
    }

    // Diagnostics

    pub fn connection_stats(&self) -> ConnectionStats {
        let pool = self.pool.stats();
        ConnectionStats {
            total_targets: self.targets.len(),
            active_sessions: pool.in_use_sessions,
            pool_size: pool.pooled_sessions,
            pool,
        }
    }

    pub fn execution_stats(&self) -> ExecutionStats {
        self.executor.stats()
    }

    pub fn execution_history(&self) -> Vec<ExecutionRecord> {
        self.executor.history()
    }

    // Lifecycle

    /// Start the pool sweeper and, if configured, the health monitor.
    /// Calling this again while they run has no effect.
    pub fn start_background_tasks(&self) {
        let mut background = self
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if background.is_some() {
            return;
        }

        let cancel_token = CancellationToken::new();
        let mut handles = vec![self
            .pool
            .spawn_sweeper(self.pool.config().sweep_interval, cancel_token.child_token())];
        if let Some(interval) = self.health_interval {
            handles.push(
                self.clusters
                    .spawn_health_monitor(interval, cancel_token.child_token()),
            );
        }

        debug!("Started {} background task(s)", handles.len());
        *background = Some(BackgroundTasks {
            cancel_token,
            handles,
        });
    }

    /// Stop background tasks and close every pooled session.
    pub async fn shutdown(&self) {
        let background = self
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(tasks) = background {
            tasks.cancel_token.cancel();
            for handle in tasks.handles {
                if let Err(e) = handle.await {
                    warn!("Background task ended abnormally: {}", e);
                }
            }
        }

        let closed = self.pool.close_all().await;
        info!("Fleet shut down, closed {} session(s)", closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::HealthStatus;
    use crate::target::AuthMethod;
    use crate::transport::{SimulatedBehavior, SimulatedTransportFactory};

    fn target(name: &str, host: &str) -> TargetConfig {
        TargetConfig::new(name, host, 22, "root", AuthMethod::with_password("pw"))
    }

    fn fleet_with(factory: SimulatedTransportFactory) -> Fleet {
        Fleet::new(
            Arc::new(factory),
            PoolConfig::default(),
            ExecutorConfig::default().with_retry(0, Duration::ZERO),
        )
    }

    fn fleet() -> Fleet {
        let fleet = fleet_with(SimulatedTransportFactory::new());
        for i in 1..=3 {
            fleet
                .add_target(target(&format!("t{i}"), &format!("h{i}")))
                .unwrap();
        }
        fleet
    }

    #[tokio::test]
    async fn test_execute_on_unknown_target() {
        let fleet = fleet();
        let err = fleet.execute("missing", "echo hi").await.unwrap_err();
        assert!(matches!(err, FleetError::NotFound { kind: "target", .. }));

        let err = fleet.execute_on(&["t1", "nope"], "echo hi").await.unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn test_execute_on_and_stats() {
        let fleet = fleet();
        let results = fleet.execute_on(&["t1", "t2", "t3"], "echo hi").await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.values().all(|r| r.is_success() && r.output == "hi\n"));

        let conn = fleet.connection_stats();
        assert_eq!(conn.total_targets, 3);
        assert_eq!(conn.active_sessions, 0);
        assert_eq!(conn.pool_size, 3);

        let stats = fleet.execution_stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.successful, 3);
        assert_eq!(fleet.execution_history().len(), 3);
    }

    #[tokio::test]
    async fn test_remove_target_leaves_clusters_and_closes_sessions() {
        let fleet = fleet();
        fleet
            .create_cluster("web", "", vec!["t1".into(), "t2".into()], vec![])
            .unwrap();
        fleet.execute("t1", "true").await.unwrap();
        assert_eq!(fleet.connection_stats().pool_size, 1);

        fleet.remove_target("t1").await.unwrap();
        assert_eq!(fleet.get_cluster("web").unwrap().members, vec!["t2".to_string()]);
        assert_eq!(fleet.connection_stats().pool_size, 0);
        assert!(fleet.get_target("t1").is_err());
    }

    #[tokio::test]
    async fn test_remove_target_keeps_shared_endpoint_sessions() {
        let fleet = fleet();
        fleet.add_target(target("alias", "h1")).unwrap();
        fleet.execute("t1", "true").await.unwrap();

        fleet.remove_target("alias").await.unwrap();
        assert_eq!(fleet.connection_stats().pool_size, 1);
    }

    #[tokio::test]
    async fn test_update_target_endpoint_closes_old_sessions() {
        let fleet = fleet();
        fleet.execute("t1", "true").await.unwrap();

        let update = TargetUpdate {
            port: Some(2222),
            ..Default::default()
        };
        let updated = fleet.update_target("t1", update).await.unwrap();
        assert_eq!(updated.port, 2222);
        assert_eq!(fleet.connection_stats().pool_size, 0);

        let tags_only = TargetUpdate {
            tags: Some(vec!["gpu".into()]),
            ..Default::default()
        };
        fleet.execute("t1", "true").await.unwrap();
        fleet.update_target("t1", tags_only).await.unwrap();
        assert_eq!(fleet.connection_stats().pool_size, 1);
        assert_eq!(fleet.list_targets_by_tag("gpu").len(), 1);
    }

    #[tokio::test]
    async fn test_update_target_credentials_closes_old_sessions() {
        let fleet = fleet();
        fleet.execute("t1", "true").await.unwrap();
        assert_eq!(fleet.connection_stats().pool_size, 1);

        let rotated = TargetUpdate {
            auth: Some(AuthMethod::with_password("rotated")),
            ..Default::default()
        };
        let updated = fleet.update_target("t1", rotated).await.unwrap();
        assert_eq!(updated.key(), target("t1", "h1").key());
        assert_eq!(fleet.connection_stats().pool_size, 0);

        let result = fleet.execute("t1", "true").await.unwrap();
        assert!(result.success);
        assert_eq!(fleet.connection_stats().pool_size, 1);
    }

    #[tokio::test]
    async fn test_health_check_keeps_existing_clusters() {
        let factory = SimulatedTransportFactory::new()
            .with_default_behavior(SimulatedBehavior::default().with_exit_code("probe", 1));
        let fleet = fleet_with(factory);
        fleet.add_target(target("t1", "h1")).unwrap();
        fleet
            .create_cluster("web", "", vec!["t1".into()], vec![])
            .unwrap();

        let fleet = fleet.with_health_check("probe", None);
        assert_eq!(fleet.list_clusters().len(), 1);

        let health = fleet.check_cluster_health("web").await.unwrap();
        assert_eq!(health.online, 0);
        assert_eq!(health.offline_targets, vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn test_cluster_health_through_fleet() {
        let factory = SimulatedTransportFactory::new().with_host("h3", SimulatedBehavior::unreachable());
        let fleet = fleet_with(factory);
        for i in 1..=3 {
            fleet
                .add_target(target(&format!("t{i}"), &format!("h{i}")))
                .unwrap();
        }
        fleet
            .create_cluster("all", "every host", vec!["t1".into(), "t2".into(), "t3".into()], vec![])
            .unwrap();

        let health = fleet.check_cluster_health("all").await.unwrap();
        assert_eq!(health.online, 2);
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(fleet.get_cluster("all").unwrap().status(), HealthStatus::Degraded);
        assert_eq!(fleet.cluster_stats().count(HealthStatus::Degraded), 1);
    }

    #[tokio::test]
    async fn test_tunnel_holds_session_until_closed() {
        let fleet = fleet();
        let tunnel = fleet.open_tunnel("t1", 15432, "db.internal", 5432).await.unwrap();
        assert_eq!(tunnel.local_addr().port(), 15432);
        assert_eq!(fleet.connection_stats().active_sessions, 1);

        tunnel.close().await;
        let conn = fleet.connection_stats();
        assert_eq!(conn.active_sessions, 0);
        assert_eq!(conn.pool_size, 1);
    }

    #[tokio::test]
    async fn test_background_tasks_start_once_and_shutdown() {
        let fleet = fleet().with_health_check("true", Some(Duration::from_secs(30)));
        fleet.start_background_tasks();
        fleet.start_background_tasks();
        fleet.execute("t1", "true").await.unwrap();

        fleet.shutdown().await;
        assert_eq!(fleet.connection_stats().pool_size, 0);
    }
}
