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

//! Cluster health and fleet construction from configuration.

use std::sync::Arc;
use std::time::Duration;

use fleetsh::cluster::HealthStatus;
use fleetsh::config::Config;
use fleetsh::executor::ExecutorConfig;
use fleetsh::fleet::Fleet;
use fleetsh::pool::PoolConfig;
use fleetsh::target::{AuthMethod, TargetConfig};
use fleetsh::transport::{SimulatedBehavior, SimulatedTransportFactory};
use tempfile::tempdir;

#[tokio::test]
async fn test_three_of_four_online_is_degraded() {
    let factory = SimulatedTransportFactory::new().with_host("n4", SimulatedBehavior::unreachable());
    let fleet = Fleet::new(
        Arc::new(factory),
        PoolConfig::default(),
        ExecutorConfig::default().with_retry(0, Duration::ZERO),
    );
    let mut members = Vec::new();
    for i in 1..=4 {
        let name = format!("n{i}");
        fleet
            .add_target(TargetConfig::new(&name, &name, 22, "ops", AuthMethod::with_password("pw")))
            .unwrap();
        members.push(name);
    }
    fleet.create_cluster("gpu", "training nodes", members, vec![]).unwrap();

    let health = fleet.check_cluster_health("gpu").await.unwrap();

    assert_eq!(health.online, 3);
    assert_eq!(health.offline, 1);
    assert_eq!(health.healthy_percent, 75.0);
    assert_eq!(health.status, HealthStatus::Degraded);
    assert_eq!(health.offline_targets, vec!["n4".to_string()]);
    assert_eq!(
        fleet.get_cluster("gpu").unwrap().health.unwrap().status,
        HealthStatus::Degraded
    );
}

const CONFIG: &str = r#"
defaults:
  user: ops
  password: hunter2
  parallel: 4
  retry_attempts: 1
  retry_delay_ms: 10

health:
  command: "true"

targets:
  web1:
    host: 10.0.0.1
    tags: [web]
  web2: admin@10.0.0.2:2222
  db1:
    host: 10.0.0.3
    enabled: false

clusters:
  web:
    description: frontends
    members: [web1, web2]
"#;

#[tokio::test]
async fn test_fleet_from_config_file() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("fleetsh.yaml");
    tokio::fs::write(&path, CONFIG).await?;

    let config = Config::load(&path).await?;
    let fleet = Fleet::from_config(
        &config,
        Arc::new(SimulatedTransportFactory::new()),
        config.executor_config(),
    )?;

    assert_eq!(fleet.list_targets().len(), 3);
    let web2 = fleet.get_target("web2")?;
    assert_eq!((web2.username.as_str(), web2.port), ("admin", 2222));
    assert!(!fleet.get_target("db1")?.enabled);
    assert_eq!(fleet.executor().config().concurrency, 4);

    let report = fleet.execute_on_cluster("web", "hostname").await?;
    assert_eq!(report.successful_count, 2);
    assert_eq!(report.results["web1"].output, "10.0.0.1\n");

    let health = fleet.check_cluster_health("web").await?;
    assert_eq!(health.status, HealthStatus::Online);

    fleet.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_unknown_cluster_member_in_config_is_rejected() {
    let yaml = r#"
defaults:
  password: pw
targets:
  a: host-a
clusters:
  broken:
    members: [a, ghost]
"#;
    let config = Config::from_yaml(yaml).unwrap();
    let err = Fleet::from_config(
        &config,
        Arc::new(SimulatedTransportFactory::new()),
        ExecutorConfig::default(),
    )
    .err()
    .unwrap();
    assert!(format!("{err:#}").contains("broken"));
}
