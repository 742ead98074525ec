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

use std::path::Path;
use std::time::Duration;

use super::types::{Config, TargetEntry};
use super::utils::{expand_env_vars, expand_tilde};
use crate::target::AuthMethod;
use crate::transport::HostKeyCheck;

const SAMPLE: &str = r#"
defaults:
  user: admin
  port: 2222
  password: hunter2
  parallel: 4
  timeout: 30
  connect_timeout: 5
  retry_attempts: 1
  retry_delay_ms: 250

pool:
  max_life: 600
  max_idle: 60
  max_sessions_per_target: 2

health:
  command: "true"
  interval: 30

ssh:
  strict_host_key_checking: false

targets:
  web1: deploy@10.0.0.1
  web2: "10.0.0.2:22"
  db1:
    host: db.internal
    ssh_key: /keys/db
    tags: [db, primary]
  old:
    host: old.internal
    enabled: false

clusters:
  web:
    description: Frontends
    members: [web1, web2]
"#;

#[test]
fn test_expand_env_vars() {
    std::env::set_var("FLEETSH_TEST_VALUE", "test_value");

    assert_eq!(
        expand_env_vars("Hello ${FLEETSH_TEST_VALUE}!"),
        "Hello test_value!"
    );
    assert_eq!(
        expand_env_vars("${FLEETSH_UNSET_VARIABLE}"),
        "${FLEETSH_UNSET_VARIABLE}"
    );
    assert_eq!(expand_env_vars("${bad-name}"), "${bad-name}");
    assert_eq!(expand_env_vars("open ${"), "open ${");
    assert_eq!(expand_env_vars("no variables here"), "no variables here");
}

#[test]
fn test_expand_tilde_leaves_plain_paths() {
    assert_eq!(expand_tilde(Path::new("/etc/hosts")), Path::new("/etc/hosts"));
    assert!(!expand_tilde(Path::new("~/.ssh/config")).starts_with("~"));
}

#[test]
fn test_config_parsing() {
    let config = Config::from_yaml(SAMPLE).unwrap();

    assert_eq!(config.defaults.user.as_deref(), Some("admin"));
    assert_eq!(config.targets.len(), 4);
    assert!(matches!(config.targets["web1"], TargetEntry::Simple(_)));
    assert!(matches!(config.targets["db1"], TargetEntry::Detailed { .. }));
    assert_eq!(config.clusters["web"].members, vec!["web1", "web2"]);
    assert_eq!(config.clusters["web"].description, "Frontends");
}

#[test]
fn test_resolve_targets() {
    let config = Config::from_yaml(SAMPLE).unwrap();
    let targets = config.resolve_targets().unwrap();
    let by_name = |name: &str| targets.iter().find(|t| t.name == name).unwrap();

    let web1 = by_name("web1");
    assert_eq!(web1.username, "deploy");
    assert_eq!(web1.port, 2222);
    assert_eq!(web1.auth, AuthMethod::with_password("hunter2"));

    let web2 = by_name("web2");
    assert_eq!(web2.username, "admin");
    assert_eq!(web2.port, 22);

    let db1 = by_name("db1");
    assert_eq!(db1.auth, AuthMethod::with_key_file("/keys/db"));
    assert!(db1.has_tag("primary"));

    assert!(!by_name("old").enabled);
}

#[test]
fn test_invalid_target_is_reported_by_name() {
    let yaml = r#"
defaults:
  password: pw
targets:
  broken: "host:notaport"
"#;
    let config = Config::from_yaml(yaml).unwrap();
    let err = config.resolve_targets().unwrap_err();
    assert!(format!("{err:#}").contains("broken"));
}

#[test]
fn test_target_credentials_must_not_conflict() {
    let yaml = r#"
targets:
  both:
    host: h
    ssh_key: /k
    password: pw
"#;
    let config = Config::from_yaml(yaml).unwrap();
    assert!(config.resolve_targets().is_err());
}

#[test]
fn test_derived_settings() {
    let config = Config::from_yaml(SAMPLE).unwrap();

    let pool = config.pool_config();
    assert_eq!(pool.max_life, Duration::from_secs(600));
    assert_eq!(pool.max_idle, Duration::from_secs(60));
    assert_eq!(pool.sweep_interval, Duration::from_secs(60));
    assert_eq!(pool.max_sessions_per_target, 2);
    assert_eq!(pool.connect_timeout, Duration::from_secs(5));

    let executor = config.executor_config();
    assert_eq!(executor.concurrency, 4);
    assert_eq!(executor.timeout, Duration::from_secs(30));
    assert_eq!(executor.retry_attempts, 1);
    assert_eq!(executor.retry_delay, Duration::from_millis(250));

    assert_eq!(config.ssh_options().host_key_check, HostKeyCheck::NoCheck);
    assert_eq!(config.health_command(), "true");
    assert_eq!(config.health_interval(), Some(Duration::from_secs(30)));
}

#[test]
fn test_empty_config_uses_defaults() {
    let config = Config::from_yaml("{}").unwrap();
    assert!(config.targets.is_empty());
    assert_eq!(config.health_command(), "echo ok");
    assert_eq!(config.health_interval(), None);
    assert_eq!(
        config.ssh_options().host_key_check,
        HostKeyCheck::DefaultKnownHosts
    );
    assert_eq!(config.executor_config().retry_attempts, 3);
}

#[tokio::test]
async fn test_load_and_save_round_trip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("fleetsh.yaml");

    let config = Config::from_yaml(SAMPLE).unwrap();
    config.save(&path).await.unwrap();
    let loaded = Config::load(&path).await.unwrap();
    assert_eq!(loaded, config);

    let explicit = Config::load_with_priority(Some(path.as_path())).await.unwrap();
    assert_eq!(explicit.targets.len(), 4);
}

#[tokio::test]
async fn test_missing_file_yields_defaults() {
    let config = Config::load(Path::new("/nonexistent/fleetsh.yaml"))
        .await
        .unwrap();
    assert_eq!(config, Config::default());
}

#[tokio::test]
async fn test_malformed_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.yaml");
    tokio::fs::write(&path, "targets: [unclosed").await.unwrap();

    let err = Config::load(&path).await.unwrap_err();
    assert!(err.to_string().contains("Failed to parse"));
}
