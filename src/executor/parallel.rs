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

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, error, info};

use super::config::ExecutorConfig;
use super::history::{ExecutionHistory, ExecutionRecord, ExecutionStats};
use super::result_types::{ExecutionResult, FailureKind, TransferDirection, TransferResult};
use super::retry::RetryPolicy;
use crate::pool::{ConnectionPool, SessionLease};
use crate::shared::error::{FleetError, FleetResult, ValidationError};
use crate::target::TargetConfig;
use crate::transport::CommandOutput;

/// Work done on each target of a fan-out.
#[derive(Debug)]
enum Job {
    Command(String),
    Upload {
        local_path: PathBuf,
        remote_path: String,
    },
    Download {
        remote_path: String,
        local_dir: PathBuf,
    },
}

/// What one target produced, before it is shaped into a public result.
struct TargetOutcome {
    /// `Some` for commands, `None` for transfers
    result: Result<Option<CommandOutput>, (FailureKind, String)>,
    duration: Duration,
    attempts: u32,
}

impl TargetOutcome {
    fn not_attempted(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            result: Err((kind, message.into())),
            duration: Duration::ZERO,
            attempts: 0,
        }
    }

    fn into_execution_result(self, target: &str, command: &str) -> ExecutionResult {
        match self.result {
            Ok(Some(output)) => {
                ExecutionResult::completed(target, command, output, self.duration, self.attempts)
            }
            Ok(None) => ExecutionResult::failed(
                target,
                command,
                FailureKind::Internal,
                "command produced no output",
                self.duration,
                self.attempts,
            ),
            Err((kind, message)) => ExecutionResult::failed(
                target,
                command,
                kind,
                message,
                self.duration,
                self.attempts,
            ),
        }
    }
}

/// Runs commands and transfers on many targets at once.
///
/// Every fan-out is bounded by a semaphore and one shared deadline, and
/// yields exactly one result per distinct target name.
pub struct ParallelExecutor {
    pool: Arc<ConnectionPool>,
    config: ExecutorConfig,
    history: ExecutionHistory,
}

impl ParallelExecutor {
    pub fn new(pool: Arc<ConnectionPool>, config: ExecutorConfig) -> Self {
        let history = ExecutionHistory::new(config.history_capacity);
        Self {
            pool,
            config,
            history,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Run `command` on every target with the configured concurrency and deadline.
    pub async fn execute(
        &self,
        targets: &[TargetConfig],
        command: &str,
    ) -> BTreeMap<String, ExecutionResult> {
        self.execute_on_targets(targets, command, self.config.concurrency, self.config.timeout)
            .await
    }

    /// Run `command` on every target, at most `concurrency_limit` at a time,
    /// all within `timeout`.
    ///
    /// Failures, cancellations and disabled targets are reported as
    /// unsuccessful results; nothing is dropped.
    pub async fn execute_on_targets(
        &self,
        targets: &[TargetConfig],
        command: &str,
        concurrency_limit: usize,
        timeout: Duration,
    ) -> BTreeMap<String, ExecutionResult> {
        debug!(
            "Executing '{}' on {} target(s) (limit {}, timeout {:?})",
            command,
            targets.len(),
            concurrency_limit,
            timeout
        );

        let outcomes = self
            .fan_out(targets, Job::Command(command.to_string()), concurrency_limit, timeout)
            .await;
        let results: BTreeMap<String, ExecutionResult> = outcomes
            .into_iter()
            .map(|(name, outcome)| {
                let result = outcome.into_execution_result(&name, command);
                (name, result)
            })
            .collect();

        let successful = results.values().filter(|r| r.success).count();
        info!(
            "'{}' finished: {}/{} target(s) successful",
            command,
            successful,
            results.len()
        );
        self.history.record(results.values());
        results
    }

    /// Run `command` on a single target with the configured deadline.
    pub async fn execute_on_target(&self, target: &TargetConfig, command: &str) -> ExecutionResult {
        let mut results = self
            .execute_on_targets(std::slice::from_ref(target), command, 1, self.config.timeout)
            .await;
        results.remove(&target.name).unwrap_or_else(|| {
            ExecutionResult::failed(
                &target.name,
                command,
                FailureKind::Internal,
                "no result recorded",
                Duration::ZERO,
                0,
            )
        })
    }

    /// Copy a local file to `remote_path` on every target.
    pub async fn upload_to_targets(
        &self,
        targets: &[TargetConfig],
        local_path: &Path,
        remote_path: &str,
        concurrency_limit: usize,
        timeout: Duration,
    ) -> FleetResult<BTreeMap<String, TransferResult>> {
        let is_file = tokio::fs::metadata(local_path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(ValidationError::new(
                "local_path",
                format!("{} is not a readable file", local_path.display()),
            )
            .into());
        }

        let job = Job::Upload {
            local_path: local_path.to_path_buf(),
            remote_path: remote_path.to_string(),
        };
        let outcomes = self.fan_out(targets, job, concurrency_limit, timeout).await;

        Ok(outcomes
            .into_iter()
            .map(|(name, outcome)| {
                let result = transfer_result(
                    &name,
                    TransferDirection::Upload,
                    local_path.to_path_buf(),
                    remote_path,
                    outcome,
                );
                (name, result)
            })
            .collect())
    }

    /// Fetch `remote_path` from every target into `local_dir`, one file per
    /// target named `<target>_<file name>`.
    pub async fn download_from_targets(
        &self,
        targets: &[TargetConfig],
        remote_path: &str,
        local_dir: &Path,
        concurrency_limit: usize,
        timeout: Duration,
    ) -> FleetResult<BTreeMap<String, TransferResult>> {
        tokio::fs::create_dir_all(local_dir).await.map_err(|e| {
            ValidationError::new(
                "local_dir",
                format!("cannot create {}: {e}", local_dir.display()),
            )
        })?;

        let job = Job::Download {
            remote_path: remote_path.to_string(),
            local_dir: local_dir.to_path_buf(),
        };
        let outcomes = self.fan_out(targets, job, concurrency_limit, timeout).await;

        Ok(outcomes
            .into_iter()
            .map(|(name, outcome)| {
                let destination = download_destination(local_dir, &name, remote_path);
                let result = transfer_result(
                    &name,
                    TransferDirection::Download,
                    destination,
                    remote_path,
                    outcome,
                );
                (name, result)
            })
            .collect())
    }

    /// Past executions, oldest first.
    pub fn history(&self) -> Vec<ExecutionRecord> {
        self.history.snapshot()
    }

    pub fn stats(&self) -> ExecutionStats {
        self.history.stats()
    }

    async fn fan_out(
        &self,
        targets: &[TargetConfig],
        job: Job,
        concurrency_limit: usize,
        timeout: Duration,
    ) -> BTreeMap<String, TargetOutcome> {
        // A zero limit would never admit anyone
        let semaphore = Arc::new(Semaphore::new(concurrency_limit.max(1)));
        let deadline = Instant::now() + timeout;
        let job = Arc::new(job);
        let policy = self.config.retry_policy();

        let mut outcomes = BTreeMap::new();
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        let mut tasks = Vec::new();

        for target in targets {
            if !seen.insert(target.name.as_str()) {
                debug!("Skipping duplicate target '{}'", target.name);
                continue;
            }
            if !target.enabled {
                outcomes.insert(
                    target.name.clone(),
                    TargetOutcome::not_attempted(FailureKind::Disabled, "target is disabled"),
                );
                continue;
            }

            names.push(target.name.clone());
            tasks.push(tokio::spawn(run_on_target(
                Arc::clone(&self.pool),
                Arc::new(target.clone()),
                Arc::clone(&job),
                Arc::clone(&semaphore),
                policy,
                deadline,
                timeout,
            )));
        }

        let results = join_all(tasks).await;
        for (name, result) in names.into_iter().zip(results) {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Task failed for target {}: {}", name, e);
                    TargetOutcome::not_attempted(
                        FailureKind::Internal,
                        format!("Task execution failed: {e}"),
                    )
                }
            };
            outcomes.insert(name, outcome);
        }
        outcomes
    }
}

async fn run_on_target(
    pool: Arc<ConnectionPool>,
    target: Arc<TargetConfig>,
    job: Arc<Job>,
    semaphore: Arc<Semaphore>,
    policy: RetryPolicy,
    deadline: Instant,
    timeout: Duration,
) -> TargetOutcome {
    let clock = Instant::now();
    let attempts = AtomicU32::new(0);

    let work = async {
        let _permit = semaphore
            .acquire()
            .await
            .map_err(|e| FleetError::Internal(format!("Semaphore acquisition failed: {e}")))?;

        let (pool, target, job) = (&*pool, &*target, &*job);
        policy
            .run(&target.name, &attempts, move || attempt(pool, target, job))
            .await
    };

    let result = match tokio::time::timeout_at(deadline, work).await {
        Ok(result) => result,
        Err(_) => {
            debug!("Deadline reached for {}", target.name);
            Err(FleetError::Cancelled(format!(
                "deadline of {timeout:?} elapsed"
            )))
        }
    };

    TargetOutcome {
        result: result.map_err(|e| (FailureKind::of(&e), e.to_string())),
        duration: clock.elapsed(),
        attempts: attempts.load(Ordering::SeqCst),
    }
}

async fn attempt(
    pool: &ConnectionPool,
    target: &TargetConfig,
    job: &Job,
) -> Result<Option<CommandOutput>, FleetError> {
    let lease = pool.acquire(target).await?;
    let transport = Arc::clone(lease.transport());
    let guard = LeaseGuard {
        pool,
        lease: Some(lease),
    };

    let result = match job {
        Job::Command(command) => transport.execute(command).await.map(Some),
        Job::Upload {
            local_path,
            remote_path,
        } => transport
            .upload_file(local_path, remote_path)
            .await
            .map(|_| None),
        Job::Download {
            remote_path,
            local_dir,
        } => {
            let destination = download_destination(local_dir, &target.name, remote_path);
            transport
                .download_file(remote_path, &destination)
                .await
                .map(|_| None)
        }
    };

    match result {
        Ok(output) => {
            guard.release();
            Ok(output)
        }
        Err(e) if e.is_session_fault() => {
            guard.invalidate().await;
            Err(e.into())
        }
        Err(e) => {
            guard.release();
            Err(e.into())
        }
    }
}

/// Hands a lease back exactly once. A lease dropped mid-operation (the
/// deadline fired) is discarded, since the session state is unknown.
struct LeaseGuard<'a> {
    pool: &'a ConnectionPool,
    lease: Option<SessionLease>,
}

impl LeaseGuard<'_> {
    fn release(mut self) {
        if let Some(lease) = self.lease.take() {
            self.pool.release(&lease);
        }
    }

    async fn invalidate(mut self) {
        if let Some(lease) = self.lease.take() {
            self.pool.invalidate(&lease).await;
        }
    }
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            debug!("Discarding interrupted session {}", lease.session_id());
            self.pool.discard(&lease);
        }
    }
}

fn download_destination(local_dir: &Path, target: &str, remote_path: &str) -> PathBuf {
    let file_name = Path::new(remote_path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("download");
    local_dir.join(format!("{target}_{file_name}"))
}

fn transfer_result(
    target: &str,
    direction: TransferDirection,
    local_path: PathBuf,
    remote_path: &str,
    outcome: TargetOutcome,
) -> TransferResult {
    let (failure, error) = match outcome.result {
        Ok(_) => (None, String::new()),
        Err((kind, message)) => (Some(kind), message),
    };
    TransferResult {
        target: target.to_string(),
        direction,
        local_path,
        remote_path: remote_path.to_string(),
        error,
        duration: outcome.duration,
        attempts: outcome.attempts,
        failure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolConfig;
    use crate::target::AuthMethod;
    use crate::transport::{SimulatedBehavior, SimulatedTransportFactory};

    fn target(name: &str) -> TargetConfig {
        TargetConfig::new(name, name, 22, "ops", AuthMethod::with_password("secret"))
    }

    fn executor(factory: SimulatedTransportFactory, config: ExecutorConfig) -> ParallelExecutor {
        let pool = Arc::new(ConnectionPool::new(PoolConfig::default(), Arc::new(factory)));
        ParallelExecutor::new(pool, config)
    }

    #[tokio::test]
    async fn test_every_target_gets_one_result() {
        let factory = SimulatedTransportFactory::new()
            .with_host("down", SimulatedBehavior::unreachable());
        let executor = executor(factory, ExecutorConfig::default().with_retry(0, Duration::ZERO));

        let targets = vec![
            target("up"),
            target("down"),
            target("off").with_enabled(false),
            target("up"),
        ];
        let results = executor
            .execute_on_targets(&targets, "echo hi", 4, Duration::from_secs(5))
            .await;

        assert_eq!(results.len(), 3);
        assert!(results["up"].success);
        assert_eq!(results["up"].output, "hi\n");
        assert_eq!(results["down"].failure, Some(FailureKind::Connection));
        assert_eq!(results["off"].failure, Some(FailureKind::Disabled));
        assert_eq!(results["off"].attempts, 0);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_retried() {
        let factory = SimulatedTransportFactory::new();
        let metrics = factory.metrics();
        let executor = executor(factory, ExecutorConfig::default().with_retry(3, Duration::ZERO));

        let result = executor.execute_on_target(&target("a"), "exit 3").await;

        assert!(!result.success);
        assert_eq!(result.exit_code, 3);
        assert!(result.error.is_empty());
        assert_eq!(result.attempts, 1);
        assert_eq!(metrics.connect_attempts("a"), 1);
    }

    #[tokio::test]
    async fn test_sessions_are_reused_across_fan_outs() {
        let factory = SimulatedTransportFactory::new();
        let metrics = factory.metrics();
        let executor = executor(factory, ExecutorConfig::default());
        let targets = vec![target("a"), target("b")];

        executor.execute(&targets, "true").await;
        executor.execute(&targets, "true").await;

        assert_eq!(metrics.transports_created(), 2);
        assert_eq!(executor.pool().stats().sessions_reused, 2);
        assert_eq!(executor.stats().total, 4);
    }

    #[tokio::test]
    async fn test_upload_and_download() {
        let factory = SimulatedTransportFactory::new();
        let metrics = factory.metrics();
        let executor = executor(factory, ExecutorConfig::default());
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("app.conf");
        tokio::fs::write(&local, b"port=80").await.unwrap();
        let targets = vec![target("a"), target("b")];

        let uploads = executor
            .upload_to_targets(&targets, &local, "/etc/app.conf", 2, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(uploads.values().all(TransferResult::is_success));
        assert_eq!(metrics.remote_file("b", "/etc/app.conf").unwrap(), b"port=80");

        let out = dir.path().join("collected");
        let downloads = executor
            .download_from_targets(&targets, "/etc/app.conf", &out, 2, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(downloads["a"].local_path, out.join("a_app.conf"));
        assert_eq!(tokio::fs::read(out.join("b_app.conf")).await.unwrap(), b"port=80");
    }

    #[tokio::test]
    async fn test_missing_remote_file_is_not_a_connection_failure() {
        let factory = SimulatedTransportFactory::new();
        let metrics = factory.metrics();
        let executor = executor(factory, ExecutorConfig::default().with_retry(3, Duration::ZERO));
        let dir = tempfile::tempdir().unwrap();

        let downloads = executor
            .download_from_targets(&[target("a")], "/missing", dir.path(), 1, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(downloads["a"].failure, Some(FailureKind::Operation));
        assert_eq!(downloads["a"].attempts, 1);
        assert_eq!(metrics.connect_attempts("a"), 1);
        // The healthy session stays pooled
        assert_eq!(executor.pool().size(), 1);
    }

    #[tokio::test]
    async fn test_upload_of_missing_file_is_rejected() {
        let executor = executor(SimulatedTransportFactory::new(), ExecutorConfig::default());
        let err = executor
            .upload_to_targets(
                &[target("a")],
                Path::new("/nonexistent/file"),
                "/tmp/x",
                1,
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Validation(_)));
    }

    #[test]
    fn test_download_destination() {
        assert_eq!(
            download_destination(Path::new("/out"), "web1", "/var/log/syslog"),
            PathBuf::from("/out/web1_syslog")
        );
        assert_eq!(
            download_destination(Path::new("/out"), "web1", "/"),
            PathBuf::from("/out/web1_download")
        );
    }
}
