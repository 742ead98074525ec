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

use anyhow::Result;

use crate::cli::TargetSelection;
use crate::fleet::Fleet;
use crate::ui::{create_spinner, OutputFormatter};

use super::select_targets;

pub async fn upload_file(
    fleet: &Fleet,
    selection: &TargetSelection,
    source: &Path,
    destination: &str,
) -> Result<bool> {
    let names = select_targets(fleet, selection)?;

    let spinner = create_spinner(format!("uploading {} to {} targets", source.display(), names.len()));
    let results = fleet.upload(&names, source, destination).await;
    spinner.finish_and_clear();
    let results = results?;

    for result in results.values() {
        println!("{}", OutputFormatter::format_transfer(result));
    }
    let success_count = results.values().filter(|r| r.is_success()).count();
    println!(
        "{}",
        OutputFormatter::format_summary(results.len(), success_count, results.len() - success_count)
    );

    Ok(success_count == results.len())
}
