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

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use super::types::{Config, TargetEntry};
use super::utils::{expand_env_vars, expand_tilde};
use crate::cluster::DEFAULT_HEALTH_COMMAND;
use crate::executor::ExecutorConfig;
use crate::pool::PoolConfig;
use crate::target::{current_username, split_endpoint, AuthMethod, TargetConfig, DEFAULT_SSH_PORT};
use crate::transport::ssh::SshOptions;
use crate::transport::HostKeyCheck;

/// Keys tried, in order, when neither a target nor the defaults name one.
const DEFAULT_KEY_FILES: [&str; 2] = ["~/.ssh/id_ed25519", "~/.ssh/id_rsa"];

impl Config {
    /// Username applied to targets that do not set one.
    pub fn default_user(&self) -> String {
        self.defaults
            .user
            .as_deref()
            .map(expand_env_vars)
            .unwrap_or_else(current_username)
    }

    /// Build every configured target, sorted by name.
    pub fn resolve_targets(&self) -> Result<Vec<TargetConfig>> {
        self.targets
            .iter()
            .map(|(name, entry)| {
                self.resolve_target(name, entry)
                    .with_context(|| format!("Invalid target '{name}' in configuration"))
            })
            .collect()
    }

    fn resolve_target(&self, name: &str, entry: &TargetEntry) -> Result<TargetConfig> {
        let default_port = self.defaults.port.unwrap_or(DEFAULT_SSH_PORT);

        let target = match entry {
            TargetEntry::Simple(endpoint) => {
                let endpoint = expand_env_vars(endpoint);
                let (user, host, port) = split_endpoint(&endpoint)?;
                let username = user.map(str::to_string).unwrap_or_else(|| self.default_user());
                let auth = self.resolve_auth(None, None)?;
                TargetConfig::new(name, host, port.unwrap_or(default_port), username, auth)
            }
            TargetEntry::Detailed {
                host,
                port,
                user,
                ssh_key,
                password,
                tags,
                enabled,
            } => {
                let username = user
                    .as_deref()
                    .map(expand_env_vars)
                    .unwrap_or_else(|| self.default_user());
                let auth = self.resolve_auth(ssh_key.as_deref(), password.as_deref())?;
                TargetConfig::new(
                    name,
                    expand_env_vars(host),
                    port.unwrap_or(default_port),
                    username,
                    auth,
                )
                .with_tags(tags.iter().cloned())
                .with_enabled(enabled.unwrap_or(true))
            }
        };

        target.validate()?;
        Ok(target)
    }

    /// Per-target credentials win over the defaults; with neither, the first
    /// existing default key file is used.
    fn resolve_auth(&self, ssh_key: Option<&str>, password: Option<&str>) -> Result<AuthMethod> {
        let (ssh_key, password) = if ssh_key.is_some() || password.is_some() {
            (ssh_key, password)
        } else {
            (
                self.defaults.ssh_key.as_deref(),
                self.defaults.password.as_deref(),
            )
        };

        if ssh_key.is_none() && password.is_none() {
            let key = DEFAULT_KEY_FILES
                .iter()
                .map(|path| expand_tilde(Path::new(path)))
                .find(|path| path.exists())
                .context("No ssh_key or password configured and no default key found in ~/.ssh")?;
            return Ok(AuthMethod::KeyFile(key));
        }

        let key_path = ssh_key.map(|key| expand_tilde(&PathBuf::from(expand_env_vars(key))));
        let password = password.map(expand_env_vars);
        Ok(AuthMethod::from_parts(key_path, password)?)
    }

    pub fn pool_config(&self) -> PoolConfig {
        let defaults = PoolConfig::default();
        let secs = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_secs).unwrap_or(fallback)
        };

        PoolConfig::new(
            secs(self.pool.max_life, defaults.max_life),
            secs(self.pool.max_idle, defaults.max_idle),
        )
        .with_sweep_interval(secs(self.pool.sweep_interval, defaults.sweep_interval))
        .with_max_sessions_per_target(
            self.pool
                .max_sessions_per_target
                .unwrap_or(defaults.max_sessions_per_target),
        )
        .with_connect_timeout(secs(self.defaults.connect_timeout, defaults.connect_timeout))
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        let defaults = ExecutorConfig::default();
        ExecutorConfig::default()
            .with_concurrency(self.defaults.parallel.unwrap_or(defaults.concurrency))
            .with_timeout(
                self.defaults
                    .timeout
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.timeout),
            )
            .with_retry(
                self.defaults.retry_attempts.unwrap_or(defaults.retry_attempts),
                self.defaults
                    .retry_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry_delay),
            )
    }

    pub fn ssh_options(&self) -> SshOptions {
        let host_key_check = if self.ssh.strict_host_key_checking == Some(false) {
            HostKeyCheck::NoCheck
        } else if let Some(path) = &self.ssh.known_hosts {
            HostKeyCheck::KnownHostsFile(expand_tilde(&PathBuf::from(expand_env_vars(path))))
        } else {
            HostKeyCheck::DefaultKnownHosts
        };

        let defaults = SshOptions::default();
        let keepalive_interval = match self.ssh.keepalive_interval {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.keepalive_interval,
        };

        SshOptions {
            host_key_check,
            keepalive_interval,
            ..defaults
        }
    }

    pub fn health_command(&self) -> String {
        self.health
            .command
            .clone()
            .unwrap_or_else(|| DEFAULT_HEALTH_COMMAND.to_string())
    }

    /// Period of the background health monitor, if enabled.
    pub fn health_interval(&self) -> Option<Duration> {
        self.health
            .interval
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
