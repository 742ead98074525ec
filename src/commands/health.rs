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

use anyhow::Result;
use owo_colors::OwoColorize;

use crate::cluster::HealthStatus;
use crate::fleet::Fleet;
use crate::ui::{create_spinner, OutputFormatter};

/// Check one cluster or all of them; returns whether every checked cluster is online.
pub async fn check_health(fleet: &Fleet, cluster: Option<&str>) -> Result<bool> {
    let spinner = create_spinner("checking health");
    let reports = match cluster {
        Some(name) => fleet.check_cluster_health(name).await.map(|h| vec![h]),
        None => Ok(fleet.check_all_health().await),
    };
    spinner.finish_and_clear();
    let reports = reports?;

    if reports.is_empty() {
        println!("{}", "No clusters configured".dimmed());
        return Ok(true);
    }

    println!("\n{} {}\n", "▶".cyan(), "Cluster health".bold());
    for health in &reports {
        print!("  {}", OutputFormatter::format_health(health));
    }
    println!();

    Ok(reports.iter().all(|h| h.status == HealthStatus::Online))
}
