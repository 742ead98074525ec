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
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::parallel::ParallelExecutor;
use super::result_types::{ExecutionResult, FailureKind};
use crate::shared::error::{FleetResult, ValidationError};
use crate::target::TargetConfig;

/// One named step of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCommand {
    pub name: String,
    pub command: String,
}

impl BatchCommand {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }

    /// Name bare command lines `step-1`, `step-2`, ...
    pub fn numbered<I, S>(lines: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lines
            .into_iter()
            .enumerate()
            .map(|(i, line)| Self::new(format!("step-{}", i + 1), line))
            .collect()
    }
}

/// Ordered commands to run across a fixed set of targets.
#[derive(Debug, Clone)]
pub struct BatchSpec {
    pub name: String,
    pub targets: Vec<TargetConfig>,
    pub commands: Vec<BatchCommand>,
    pub stop_on_failure: bool,
    /// Overrides the executor's default concurrency
    pub concurrency: Option<usize>,
    /// Overrides the executor's default per-command deadline
    pub timeout: Option<Duration>,
}

impl BatchSpec {
    pub fn new(
        name: impl Into<String>,
        targets: Vec<TargetConfig>,
        commands: Vec<BatchCommand>,
    ) -> Self {
        Self {
            name: name.into(),
            targets,
            commands,
            stop_on_failure: false,
            concurrency: None,
            timeout: None,
        }
    }

    /// Build a batch from bare command lines, naming them `step-1`, `step-2`, ...
    pub fn from_command_lines<I, S>(name: impl Into<String>, targets: Vec<TargetConfig>, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(name, targets, BatchCommand::numbered(lines))
    }

    pub fn with_stop_on_failure(mut self, stop: bool) -> Self {
        self.stop_on_failure = stop;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.targets.is_empty() {
            return Err(ValidationError::new("targets", "Batch has no targets"));
        }
        if self.commands.is_empty() {
            return Err(ValidationError::new("commands", "Batch has no commands"));
        }

        let mut seen = HashSet::new();
        for step in &self.commands {
            if step.name.trim().is_empty() {
                return Err(ValidationError::empty("command name"));
            }
            if step.command.trim().is_empty() {
                return Err(ValidationError::new(
                    "command",
                    format!("Command '{}' is empty", step.name),
                ));
            }
            // Names identify the step a batch stopped at
            if !seen.insert(step.name.as_str()) {
                return Err(ValidationError::duplicate("command name", &step.name));
            }
        }
        Ok(())
    }
}

/// Results of one batch step across every target.
#[derive(Debug, Clone)]
pub struct CommandResults {
    pub name: String,
    pub command: String,
    pub results: BTreeMap<String, ExecutionResult>,
}

impl CommandResults {
    pub fn all_successful(&self) -> bool {
        self.results.values().all(ExecutionResult::is_success)
    }

    /// Whether a target that actually ran this command was unsuccessful.
    /// Disabled targets are skipped, not failed.
    pub fn has_failures(&self) -> bool {
        self.results
            .values()
            .any(|r| !r.success && r.failure != Some(FailureKind::Disabled))
    }

    pub fn failed_targets(&self) -> Vec<&str> {
        self.results
            .values()
            .filter(|r| !r.success)
            .map(|r| r.target.as_str())
            .collect()
    }
}

/// Outcome of a batch run.
///
/// `completed` is false only when stop-on-failure ended the batch early;
/// steps after `failed_at` are absent.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub name: String,
    pub results: Vec<CommandResults>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub completed: bool,
    pub failed_at: Option<String>,
}

impl BatchReport {
    pub fn command(&self, name: &str) -> Option<&CommandResults> {
        self.results.iter().find(|step| step.name == name)
    }

    pub fn total_executions(&self) -> usize {
        self.results.iter().map(|step| step.results.len()).sum()
    }

    pub fn successful_executions(&self) -> usize {
        self.results
            .iter()
            .flat_map(|step| step.results.values())
            .filter(|r| r.success)
            .count()
    }

    pub fn all_successful(&self) -> bool {
        self.completed && self.results.iter().all(CommandResults::all_successful)
    }
}

impl ParallelExecutor {
    /// Run each command of `spec` in order across its targets.
    pub async fn execute_batch(&self, spec: &BatchSpec) -> FleetResult<BatchReport> {
        spec.validate()?;

        let concurrency = spec.concurrency.unwrap_or(self.config().concurrency);
        let timeout = spec.timeout.unwrap_or(self.config().timeout);
        let started_at = Utc::now();
        let clock = tokio::time::Instant::now();

        info!(
            "Batch '{}': {} command(s) on {} target(s)",
            spec.name,
            spec.commands.len(),
            spec.targets.len()
        );

        let mut report = BatchReport {
            name: spec.name.clone(),
            results: Vec::with_capacity(spec.commands.len()),
            started_at,
            duration: Duration::ZERO,
            completed: true,
            failed_at: None,
        };

        for step in &spec.commands {
            let results = self
                .execute_on_targets(&spec.targets, &step.command, concurrency, timeout)
                .await;
            let step_results = CommandResults {
                name: step.name.clone(),
                command: step.command.clone(),
                results,
            };
            let failed = step_results.has_failures();
            report.results.push(step_results);

            if failed && spec.stop_on_failure {
                warn!("Batch '{}' stopped at '{}'", spec.name, step.name);
                report.completed = false;
                report.failed_at = Some(step.name.clone());
                break;
            }
        }

        report.duration = clock.elapsed();
        Ok(report)
    }
}
