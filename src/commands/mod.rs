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

use anyhow::{bail, Result};

use crate::cli::TargetSelection;
use crate::fleet::Fleet;

pub mod batch;
pub mod download;
pub mod exec;
pub mod health;
pub mod list;
pub mod stats;
pub mod tunnel;
pub mod upload;

/// Resolve a selection to target names. No selection means every target.
pub fn select_targets(fleet: &Fleet, selection: &TargetSelection) -> Result<Vec<String>> {
    let names: Vec<String> = if let Some(cluster) = &selection.cluster {
        fleet.get_cluster(cluster)?.members
    } else if let Some(targets) = &selection.targets {
        targets.clone()
    } else if let Some(tag) = &selection.tag {
        let tagged: Vec<String> = fleet
            .list_targets_by_tag(tag)
            .into_iter()
            .map(|t| t.name)
            .collect();
        if tagged.is_empty() {
            bail!("No targets carry the tag '{tag}'");
        }
        tagged
    } else {
        fleet.list_targets().into_iter().map(|t| t.name).collect()
    };

    if names.is_empty() {
        bail!("No targets selected. Define targets in the configuration file or pass --targets");
    }
    Ok(names)
}
