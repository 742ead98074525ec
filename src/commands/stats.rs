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

use owo_colors::OwoColorize;

use crate::cluster::HealthStatus;
use crate::fleet::Fleet;
use crate::ui::{create_spinner, health_symbol, OutputFormatter};

pub async fn show_stats(fleet: &Fleet) {
    let spinner = create_spinner("probing clusters");
    fleet.check_all_health().await;
    spinner.finish_and_clear();

    let clusters = fleet.cluster_stats();
    println!("{}", OutputFormatter::format_stats(&fleet.connection_stats(), &fleet.execution_stats()));
    println!("{}", "Clusters".cyan().bold());
    println!(
        "  {} clusters, {} memberships",
        clusters.total_clusters, clusters.total_members
    );
    for status in [
        HealthStatus::Online,
        HealthStatus::Degraded,
        HealthStatus::Offline,
        HealthStatus::Unknown,
    ] {
        let count = clusters.count(status);
        if count > 0 {
            println!("  {} {:<9} {}", health_symbol(status), status.to_string(), count);
        }
    }
}
