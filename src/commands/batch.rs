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

use anyhow::{bail, Context, Result};

use crate::cli::TargetSelection;
use crate::executor::BatchCommand;
use crate::fleet::Fleet;
use crate::ui::{create_spinner, OutputFormatter};

use super::select_targets;

pub struct BatchParams<'a> {
    pub selection: &'a TargetSelection,
    pub name: &'a str,
    pub stop_on_failure: bool,
    pub file: Option<&'a Path>,
    pub commands: &'a [String],
    pub verbose: bool,
}

/// Non-empty lines of a command file, skipping `#` comments.
pub fn parse_command_file(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub async fn execute_batch(fleet: &Fleet, params: BatchParams<'_>) -> Result<bool> {
    let mut lines = Vec::new();
    if let Some(file) = params.file {
        let content = tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("Failed to read batch file {file:?}"))?;
        lines.extend(parse_command_file(&content));
    }
    lines.extend(params.commands.iter().cloned());
    if lines.is_empty() {
        bail!("No commands given. Pass commands as arguments or with --file");
    }
    let commands = BatchCommand::numbered(lines);

    let names = match &params.selection.cluster {
        Some(_) => Vec::new(),
        None => select_targets(fleet, params.selection)?,
    };

    let spinner = create_spinner(format!("batch {} ({} commands)", params.name, commands.len()));
    let report = match &params.selection.cluster {
        Some(cluster) => {
            fleet
                .execute_batch_on_cluster(cluster, params.name, commands, params.stop_on_failure)
                .await
        }
        None => {
            fleet
                .execute_batch(params.name, &names, commands, params.stop_on_failure)
                .await
        }
    };
    spinner.finish_and_clear();
    let report = report?;

    println!("{}", OutputFormatter::format_batch_report(&report, params.verbose));
    Ok(report.all_successful())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_file() {
        let content = "# prepare\napt-get update\n\n  systemctl restart app  \n# done\n";
        assert_eq!(
            parse_command_file(content),
            vec!["apt-get update", "systemctl restart app"]
        );
    }
}
