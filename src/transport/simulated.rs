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

//! In-process transport that simulates remote hosts.
//!
//! Used by the test suite and by `fleetsh --simulate`. Behaviour is
//! configured per host, and the shared [`SimulatedMetrics`] records connect
//! attempts and peak concurrent executions so tests can observe what the
//! pool and executor actually did.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::{CommandOutput, Transport, TransportFactory, TunnelHandle};
use crate::shared::error::TransportError;
use crate::target::TargetConfig;

/// How a simulated host responds.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBehavior {
    pub connect_latency: Duration,
    pub command_latency: Duration,
    /// Every connect attempt fails.
    pub unreachable: bool,
    /// The first N connect attempts to the host fail.
    pub connect_failures: usize,
    /// Commands containing the pattern exit with the given code.
    pub exit_codes: Vec<(String, i32)>,
}

impl SimulatedBehavior {
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Default::default()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.command_latency = latency;
        self
    }

    pub fn with_connect_latency(mut self, latency: Duration) -> Self {
        self.connect_latency = latency;
        self
    }

    pub fn with_connect_failures(mut self, failures: usize) -> Self {
        self.connect_failures = failures;
        self
    }

    pub fn with_exit_code(mut self, pattern: impl Into<String>, exit_code: i32) -> Self {
        self.exit_codes.push((pattern.into(), exit_code));
        self
    }
}

/// Observations shared by every transport a factory creates.
#[derive(Debug, Default)]
pub struct SimulatedMetrics {
    connect_attempts: Mutex<HashMap<String, usize>>,
    files: Mutex<HashMap<(String, String), Vec<u8>>>,
    transports_created: AtomicUsize,
    executions: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl SimulatedMetrics {
    pub fn connect_attempts(&self, host: &str) -> usize {
        self.connect_attempts
            .lock()
            .map(|attempts| attempts.get(host).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn transports_created(&self) -> usize {
        self.transports_created.load(Ordering::SeqCst)
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    /// Highest number of commands that were executing at the same moment.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Contents of a file uploaded to `host`, if any.
    pub fn remote_file(&self, host: &str, path: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .ok()
            .and_then(|files| files.get(&(host.to_string(), path.to_string())).cloned())
    }

    pub fn put_remote_file(&self, host: &str, path: &str, contents: impl Into<Vec<u8>>) {
        if let Ok(mut files) = self.files.lock() {
            files.insert((host.to_string(), path.to_string()), contents.into());
        }
    }

    fn record_connect(&self, host: &str) -> usize {
        match self.connect_attempts.lock() {
            Ok(mut attempts) => {
                let count = attempts.entry(host.to_string()).or_insert(0);
                *count += 1;
                *count
            }
            Err(_) => 0,
        }
    }
}

/// Factory handing out [`SimulatedTransport`]s.
#[derive(Debug, Clone, Default)]
pub struct SimulatedTransportFactory {
    default_behavior: SimulatedBehavior,
    behaviors: HashMap<String, SimulatedBehavior>,
    metrics: Arc<SimulatedMetrics>,
}

impl SimulatedTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Behaviour for hosts without a specific override.
    pub fn with_default_behavior(mut self, behavior: SimulatedBehavior) -> Self {
        self.default_behavior = behavior;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>, behavior: SimulatedBehavior) -> Self {
        self.behaviors.insert(host.into(), behavior);
        self
    }

    pub fn metrics(&self) -> Arc<SimulatedMetrics> {
        Arc::clone(&self.metrics)
    }
}

impl TransportFactory for SimulatedTransportFactory {
    fn create(&self, target: &TargetConfig) -> Arc<dyn Transport> {
        let behavior = self
            .behaviors
            .get(&target.host)
            .cloned()
            .unwrap_or_else(|| self.default_behavior.clone());
        self.metrics.transports_created.fetch_add(1, Ordering::SeqCst);
        Arc::new(SimulatedTransport {
            host: target.host.clone(),
            behavior,
            metrics: Arc::clone(&self.metrics),
            connected: AtomicBool::new(false),
            last_activity: Mutex::new(None),
        })
    }
}

/// Counts an execution as in flight until dropped, even when cancelled.
struct InFlight<'a>(&'a SimulatedMetrics);

impl<'a> InFlight<'a> {
    fn enter(metrics: &'a SimulatedMetrics) -> Self {
        let current = metrics.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        metrics.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        Self(metrics)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A fake session to one simulated host.
#[derive(Debug)]
pub struct SimulatedTransport {
    host: String,
    behavior: SimulatedBehavior,
    metrics: Arc<SimulatedMetrics>,
    connected: AtomicBool,
    last_activity: Mutex<Option<DateTime<Utc>>>,
}

impl SimulatedTransport {
    fn touch(&self) {
        if let Ok(mut last) = self.last_activity.lock() {
            *last = Some(Utc::now());
        }
    }

    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }

    fn respond(&self, command: &str) -> CommandOutput {
        if let Some((_, code)) = self
            .behavior
            .exit_codes
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
        {
            return CommandOutput {
                stdout: String::new(),
                stderr: format!("simulated failure: {command}\n"),
                exit_code: *code,
            };
        }

        let trimmed = command.trim();
        let (stdout, exit_code) = if let Some(text) = trimmed.strip_prefix("echo ") {
            (format!("{}\n", text.trim_matches(|c| c == '"' || c == '\'')), 0)
        } else if let Some(code) = trimmed.strip_prefix("exit ") {
            (String::new(), code.trim().parse().unwrap_or(1))
        } else {
            match trimmed {
                "true" => (String::new(), 0),
                "false" => (String::new(), 1),
                "hostname" => (format!("{}\n", self.host), 0),
                _ => (format!("[simulated {}] {trimmed}\n", self.host), 0),
            }
        };

        CommandOutput {
            stdout,
            stderr: String::new(),
            exit_code,
        }
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn connect(&self, timeout: Duration) -> Result<(), TransportError> {
        let attempt = self.metrics.record_connect(&self.host);

        if self.behavior.connect_latency > timeout {
            tokio::time::sleep(timeout).await;
            return Err(TransportError::Timeout(timeout));
        }
        tokio::time::sleep(self.behavior.connect_latency).await;

        if self.behavior.unreachable || attempt <= self.behavior.connect_failures {
            return Err(TransportError::ConnectFailed {
                target: self.host.clone(),
                reason: "simulated host unreachable".to_string(),
            });
        }

        self.connected.store(true, Ordering::SeqCst);
        self.touch();
        Ok(())
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput, TransportError> {
        self.ensure_connected()?;

        let _in_flight = InFlight::enter(&self.metrics);
        self.metrics.executions.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.behavior.command_latency).await;

        self.touch();
        Ok(self.respond(command))
    }

    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> Result<(), TransportError> {
        self.ensure_connected()?;
        let contents = tokio::fs::read(local_path).await?;
        self.metrics.put_remote_file(&self.host, remote_path, contents);
        self.touch();
        Ok(())
    }

    async fn download_file(
        &self,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<(), TransportError> {
        self.ensure_connected()?;
        let contents = self
            .metrics
            .remote_file(&self.host, remote_path)
            .ok_or_else(|| TransportError::Other(format!("no such remote file: {remote_path}")))?;
        tokio::fs::write(local_path, contents).await?;
        self.touch();
        Ok(())
    }

    async fn create_tunnel(
        &self,
        local_port: u16,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<TunnelHandle, TransportError> {
        self.ensure_connected()?;
        self.touch();
        Ok(TunnelHandle::new(
            SocketAddr::from((Ipv4Addr::LOCALHOST, local_port)),
            remote_host,
            remote_port,
            CancellationToken::new(),
            None,
        ))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_activity.lock().ok().and_then(|last| *last)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
