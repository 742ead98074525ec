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

//! Fan-out behaviour of the parallel executor against simulated hosts.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetsh::executor::{BatchCommand, BatchSpec, ExecutorConfig, FailureKind, ParallelExecutor};
use fleetsh::pool::{ConnectionPool, PoolConfig};
use fleetsh::shared::TransportError;
use fleetsh::target::{AuthMethod, TargetConfig};
use fleetsh::transport::{
    CommandOutput, SimulatedBehavior, SimulatedTransportFactory, Transport, TransportFactory,
    TunnelHandle,
};
use tokio::time::Instant;

fn target(name: &str) -> TargetConfig {
    TargetConfig::new(name, name, 22, "deploy", AuthMethod::with_password("secret"))
}

fn targets(count: usize) -> Vec<TargetConfig> {
    (1..=count).map(|i| target(&format!("t{i}"))).collect()
}

fn executor(factory: &SimulatedTransportFactory, config: ExecutorConfig) -> ParallelExecutor {
    let pool = Arc::new(ConnectionPool::new(
        PoolConfig::default(),
        Arc::new(factory.clone()),
    ));
    ParallelExecutor::new(pool, config)
}

#[tokio::test(start_paused = true)]
async fn test_two_slots_run_three_targets_in_two_rounds() {
    let latency = Duration::from_millis(100);
    let factory = SimulatedTransportFactory::new()
        .with_default_behavior(SimulatedBehavior::default().with_latency(latency));
    let executor = executor(&factory, ExecutorConfig::default());

    let started = Instant::now();
    let results = executor
        .execute_on_targets(&targets(3), "echo hi", 2, Duration::from_secs(30))
        .await;
    let elapsed = started.elapsed();

    assert_eq!(results.len(), 3);
    for result in results.values() {
        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("hi"));
    }
    assert!(elapsed >= 2 * latency, "elapsed {elapsed:?}");
    assert!(elapsed < 3 * latency, "elapsed {elapsed:?}");
}

#[tokio::test]
async fn test_every_target_gets_a_result() {
    let factory = SimulatedTransportFactory::new()
        .with_host("t2", SimulatedBehavior::unreachable())
        .with_host("t4", SimulatedBehavior::default().with_exit_code("deploy", 3));
    let executor = executor(&factory, ExecutorConfig::default().with_retry(1, Duration::ZERO));

    let mut set = targets(5);
    set[4] = target("t5").with_enabled(false);
    let results = executor
        .execute_on_targets(&set, "./deploy.sh", 3, Duration::from_secs(30))
        .await;

    let names: Vec<&str> = results.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["t1", "t2", "t3", "t4", "t5"]);
    assert!(results["t1"].success);
    assert_eq!(results["t2"].failure, Some(FailureKind::Connection));
    assert_eq!(results["t4"].exit_code, 3);
    assert!(results["t4"].was_executed());
    assert_eq!(results["t5"].failure, Some(FailureKind::Disabled));
}

#[tokio::test]
async fn test_in_flight_never_exceeds_limit() {
    let factory = SimulatedTransportFactory::new().with_default_behavior(
        SimulatedBehavior::default().with_latency(Duration::from_millis(20)),
    );
    let metrics = factory.metrics();
    let executor = executor(&factory, ExecutorConfig::default());

    let results = executor
        .execute_on_targets(&targets(12), "uptime", 3, Duration::from_secs(30))
        .await;

    assert_eq!(results.len(), 12);
    assert!(results.values().all(|r| r.success));
    assert!(metrics.peak_in_flight() <= 3, "peak {}", metrics.peak_in_flight());
    assert!(metrics.peak_in_flight() >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_target_is_tried_retries_plus_one_times() {
    let factory = SimulatedTransportFactory::new().with_host("t1", SimulatedBehavior::unreachable());
    let metrics = factory.metrics();
    let executor = executor(
        &factory,
        ExecutorConfig::default().with_retry(2, Duration::from_secs(1)),
    );

    let result = executor.execute_on_target(&target("t1"), "uptime").await;

    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::Connection));
    assert_eq!(result.attempts, 3);
    assert_eq!(metrics.connect_attempts("t1"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_flaky_connect_recovers_within_retries() {
    let factory = SimulatedTransportFactory::new()
        .with_host("t1", SimulatedBehavior::default().with_connect_failures(2));
    let executor = executor(
        &factory,
        ExecutorConfig::default().with_retry(3, Duration::from_millis(500)),
    );

    let result = executor.execute_on_target(&target("t1"), "echo ready").await;

    assert!(result.success);
    assert_eq!(result.attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_cancels_stragglers() {
    let factory = SimulatedTransportFactory::new()
        .with_host("t2", SimulatedBehavior::default().with_latency(Duration::from_secs(60)));
    let executor = executor(&factory, ExecutorConfig::default());

    let results = executor
        .execute_on_targets(&targets(2), "sleep", 2, Duration::from_secs(5))
        .await;

    assert!(results["t1"].success);
    assert!(results["t2"].is_cancelled());
    assert!(!results["t2"].error.is_empty());
    assert_eq!(executor.pool().size(), 1);
}

#[tokio::test]
async fn test_stop_on_failure_skips_later_commands() {
    let factory = SimulatedTransportFactory::new()
        .with_host("t2", SimulatedBehavior::default().with_exit_code("migrate", 1));
    let executor = executor(&factory, ExecutorConfig::default());

    let spec = BatchSpec::new(
        "release",
        targets(3),
        vec![
            BatchCommand::new("prepare", "echo prepare"),
            BatchCommand::new("migrate", "./migrate"),
            BatchCommand::new("restart", "systemctl restart app"),
        ],
    )
    .with_stop_on_failure(true);

    let report = executor.execute_batch(&spec).await.unwrap();

    assert!(!report.completed);
    assert_eq!(report.failed_at.as_deref(), Some("migrate"));
    assert!(report.command("prepare").unwrap().all_successful());
    assert_eq!(report.command("migrate").unwrap().failed_targets(), vec!["t2"]);
    assert!(report.command("restart").is_none());
}

#[tokio::test]
async fn test_batch_without_stop_runs_everything() {
    let factory = SimulatedTransportFactory::new()
        .with_host("t2", SimulatedBehavior::default().with_exit_code("migrate", 1));
    let executor = executor(&factory, ExecutorConfig::default());

    let spec = BatchSpec::from_command_lines("release", targets(2), ["./migrate", "true"]);
    let report = executor.execute_batch(&spec).await.unwrap();

    assert!(report.completed);
    assert_eq!(report.failed_at, None);
    assert_eq!(report.total_executions(), 4);
    assert_eq!(report.successful_executions(), 3);
    assert!(report.command("step-2").unwrap().all_successful());
}

#[tokio::test]
async fn test_disabled_target_does_not_stop_batch() {
    let factory = SimulatedTransportFactory::new();
    let executor = executor(&factory, ExecutorConfig::default());

    let mut set = targets(2);
    set[1] = target("t2").with_enabled(false);
    let spec = BatchSpec::from_command_lines("release", set, ["./migrate", "true"])
        .with_stop_on_failure(true);
    let report = executor.execute_batch(&spec).await.unwrap();

    assert!(report.completed);
    assert_eq!(report.failed_at, None);
    let step = report.command("step-2").unwrap();
    assert!(step.results["t1"].success);
    assert_eq!(step.results["t2"].failure, Some(FailureKind::Disabled));
}

/// Sends every command but never sees an exit status, like a session that
/// drops right after the command starts.
struct LostExitStatus {
    connected: AtomicBool,
    executions: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for LostExitStatus {
    async fn connect(&self, _timeout: Duration) -> Result<(), TransportError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn execute(&self, _command: &str) -> Result<CommandOutput, TransportError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::CommandDidNotExit)
    }

    async fn upload_file(&self, _local: &Path, _remote: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn download_file(&self, _remote: &str, _local: &Path) -> Result<(), TransportError> {
        Ok(())
    }

    async fn create_tunnel(
        &self,
        _local_port: u16,
        _remote_host: &str,
        _remote_port: u16,
    ) -> Result<TunnelHandle, TransportError> {
        Err(TransportError::Other("tunnels unsupported".into()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn last_activity(&self) -> Option<DateTime<Utc>> {
        None
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct LostExitStatusFactory {
    executions: Arc<AtomicUsize>,
}

impl TransportFactory for LostExitStatusFactory {
    fn create(&self, _target: &TargetConfig) -> Arc<dyn Transport> {
        Arc::new(LostExitStatus {
            connected: AtomicBool::new(false),
            executions: Arc::clone(&self.executions),
        })
    }
}

#[tokio::test]
async fn test_command_without_exit_status_runs_once() {
    let executions = Arc::new(AtomicUsize::new(0));
    let factory = LostExitStatusFactory {
        executions: Arc::clone(&executions),
    };
    let pool = Arc::new(ConnectionPool::new(PoolConfig::default(), Arc::new(factory)));
    let executor = ParallelExecutor::new(
        Arc::clone(&pool),
        ExecutorConfig::default().with_retry(3, Duration::ZERO),
    );

    let result = executor.execute_on_target(&target("t1"), "./migrate.sh").await;

    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert_eq!(result.attempts, 1);
    assert!(!result.success);
    // The session is no longer trusted once the exit status went missing
    assert_eq!(pool.size(), 0);
}
