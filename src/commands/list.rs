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

use crate::fleet::Fleet;
use crate::ui::OutputFormatter;

pub fn list_fleet(fleet: &Fleet) {
    let targets = fleet.list_targets();
    if targets.is_empty() {
        println!("{}", "No targets configured".dimmed());
        return;
    }

    println!("\n{} {}\n", "▶".cyan(), "Targets".bold());
    for target in &targets {
        println!("{}", OutputFormatter::format_target(target));
    }

    let clusters = fleet.list_clusters();
    if !clusters.is_empty() {
        println!("\n{} {}\n", "▶".cyan(), "Clusters".bold());
        for cluster in &clusters {
            println!("{}", OutputFormatter::format_cluster(cluster));
            for member in &cluster.members {
                println!("      {} {}", "•".dimmed(), member.dimmed());
            }
        }
    }
    println!();
}
