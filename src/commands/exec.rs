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

use crate::cli::TargetSelection;
use crate::fleet::Fleet;
use crate::ui::{create_spinner, OutputFormatter};

use super::select_targets;

/// Run `command` on the selection; returns whether every target succeeded.
pub async fn execute_command(
    fleet: &Fleet,
    selection: &TargetSelection,
    command: &str,
    verbose: bool,
) -> Result<bool> {
    if let Some(cluster) = &selection.cluster {
        let members = fleet.get_cluster(cluster)?.members.len();
        println!("{}", OutputFormatter::format_command_header(command, members));

        let spinner = create_spinner(format!("cluster {cluster}"));
        let report = fleet.execute_on_cluster(cluster, command).await;
        spinner.finish_and_clear();
        let report = report?;

        println!("{}", OutputFormatter::format_cluster_report(&report, verbose));
        return Ok(report.failed_count == 0);
    }

    let names = select_targets(fleet, selection)?;
    println!("{}", OutputFormatter::format_command_header(command, names.len()));

    let spinner = create_spinner(format!("{} targets", names.len()));
    let results = fleet.execute_on(&names, command).await;
    spinner.finish_and_clear();
    let results = results?;

    for result in results.values() {
        print!("{}", OutputFormatter::format_result(result, verbose));
    }

    let success_count = results.values().filter(|r| r.is_success()).count();
    let failed_count = results.len() - success_count;
    println!(
        "{}",
        OutputFormatter::format_summary(results.len(), success_count, failed_count)
    );

    Ok(failed_count == 0)
}
