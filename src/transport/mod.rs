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

//! Transport capability consumed by the pool and executor.
//!
//! The core never names a concrete transport. A [`TransportFactory`] chosen
//! at construction time creates one [`Transport`] per pooled session, so an
//! SSH implementation and the in-process simulator are interchangeable.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::shared::error::TransportError;
use crate::target::TargetConfig;

pub mod simulated;
pub mod ssh;

pub use simulated::{SimulatedBehavior, SimulatedTransport, SimulatedTransportFactory};
pub use ssh::{HostKeyCheck, SshOptions, SshTransport, SshTransportFactory};

/// Raw outcome of one remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A live local-port tunnel through a transport session.
///
/// Dropping the handle does not stop the tunnel; call [`TunnelHandle::close`].
#[derive(Debug)]
pub struct TunnelHandle {
    pub local_addr: SocketAddr,
    pub remote_host: String,
    pub remote_port: u16,
    cancel_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TunnelHandle {
    pub fn new(
        local_addr: SocketAddr,
        remote_host: impl Into<String>,
        remote_port: u16,
        cancel_token: CancellationToken,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            local_addr,
            remote_host: remote_host.into(),
            remote_port,
            cancel_token,
            task,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Stop accepting connections and wait for the listener task to exit.
    pub async fn close(mut self) {
        self.cancel_token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Tunnel task for {} ended abnormally: {}", self.local_addr, e);
            }
        }
    }
}

/// Capability set every transport implementation provides.
///
/// Methods take `&self`; implementations keep connection state behind
/// interior mutability so a session can be shared as `Arc<dyn Transport>`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the session, failing if it takes longer than `timeout`.
    async fn connect(&self, timeout: Duration) -> Result<(), TransportError>;

    /// Run a command and wait for its exit status.
    async fn execute(&self, command: &str) -> Result<CommandOutput, TransportError>;

    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> Result<(), TransportError>;

    async fn download_file(&self, remote_path: &str, local_path: &Path)
        -> Result<(), TransportError>;

    /// Forward `127.0.0.1:local_port` to `remote_host:remote_port` as seen from the target.
    async fn create_tunnel(
        &self,
        local_port: u16,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<TunnelHandle, TransportError>;

    fn is_connected(&self) -> bool;

    /// Time of the last successful operation, if any.
    fn last_activity(&self) -> Option<DateTime<Utc>>;

    async fn close(&self) -> Result<(), TransportError>;
}

/// Creates unconnected transports for targets.
pub trait TransportFactory: Send + Sync {
    fn create(&self, target: &TargetConfig) -> Arc<dyn Transport>;
}
