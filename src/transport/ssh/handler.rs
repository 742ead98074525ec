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

//! Server host key verification.

use std::path::PathBuf;

use russh::client::Handler;
use tracing::warn;

use crate::shared::error::TransportError;

/// How the client verifies the server's host key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HostKeyCheck {
    /// Use `~/.ssh/known_hosts`
    #[default]
    DefaultKnownHosts,
    /// Use a specific known_hosts file
    KnownHostsFile(PathBuf),
    /// Accept any host key (insecure, for lab use only)
    NoCheck,
}

/// russh callback handler for one outgoing connection.
#[derive(Debug, Clone)]
pub struct ClientHandler {
    hostname: String,
    port: u16,
    host_key_check: HostKeyCheck,
}

impl ClientHandler {
    pub fn new(hostname: String, port: u16, host_key_check: HostKeyCheck) -> Self {
        Self {
            hostname,
            port,
            host_key_check,
        }
    }
}

impl Handler for ClientHandler {
    type Error = TransportError;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        let verdict = match &self.host_key_check {
            HostKeyCheck::NoCheck => Ok(true),
            HostKeyCheck::DefaultKnownHosts => {
                russh::keys::check_known_hosts(&self.hostname, self.port, server_public_key)
            }
            HostKeyCheck::KnownHostsFile(path) => russh::keys::check_known_hosts_path(
                &self.hostname,
                self.port,
                server_public_key,
                path,
            ),
        };

        match verdict {
            Ok(true) => Ok(true),
            Ok(false) => {
                warn!("Host key for {}:{} is not in known_hosts", self.hostname, self.port);
                Err(TransportError::HostKeyRejected(self.hostname.clone()))
            }
            Err(e) => {
                warn!("Host key check failed for {}:{}: {}", self.hostname, self.port, e);
                Err(TransportError::HostKeyRejected(self.hostname.clone()))
            }
        }
    }
}
