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

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub pool: PoolSettings,

    #[serde(default)]
    pub health: HealthSettings,

    #[serde(default)]
    pub ssh: SshSettings,

    #[serde(default)]
    pub targets: BTreeMap<String, TargetEntry>,

    #[serde(default)]
    pub clusters: BTreeMap<String, ClusterEntry>,
}

/// Values applied to every target and fan-out unless overridden.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Defaults {
    pub user: Option<String>,
    pub port: Option<u16>,
    pub ssh_key: Option<String>,
    pub password: Option<String>,
    /// Maximum targets worked on at once
    pub parallel: Option<usize>,
    /// Deadline for one fan-out, in seconds
    pub timeout: Option<u64>,
    /// Time allowed to open one session, in seconds
    pub connect_timeout: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

/// Connection pool limits. Durations are in seconds.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct PoolSettings {
    pub max_life: Option<u64>,
    pub max_idle: Option<u64>,
    pub sweep_interval: Option<u64>,
    pub max_sessions_per_target: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct HealthSettings {
    /// Liveness probe run on every member (default: `echo ok`)
    pub command: Option<String>,
    /// Background check period in seconds; unset disables the monitor
    pub interval: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct SshSettings {
    /// Verify host keys against known_hosts (default: true)
    pub strict_host_key_checking: Option<bool>,
    /// known_hosts file to use instead of `~/.ssh/known_hosts`
    pub known_hosts: Option<String>,
    /// Keepalive interval in seconds; 0 disables keepalives (default: 60)
    pub keepalive_interval: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum TargetEntry {
    Detailed {
        host: String,
        #[serde(default)]
        port: Option<u16>,
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        ssh_key: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default)]
        enabled: Option<bool>,
    },
    /// "[user@]hostname[:port]"
    Simple(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ClusterEntry {
    #[serde(default)]
    pub description: String,
    pub members: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}
