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

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use crate::cli::ForwardSpec;
use crate::fleet::Fleet;

/// Forward until Ctrl+C.
pub async fn run_tunnel(fleet: &Fleet, target: &str, forward: &str) -> Result<()> {
    let spec = ForwardSpec::parse(forward)?;
    let tunnel = fleet
        .open_tunnel(target, spec.local_port, &spec.remote_host, spec.remote_port)
        .await
        .with_context(|| format!("Failed to open tunnel through '{target}'"))?;

    println!(
        "{} Forwarding {} -> {}:{} via {} (Ctrl+C to stop)",
        "►".cyan().bold(),
        tunnel.local_addr().to_string().bold(),
        spec.remote_host,
        spec.remote_port,
        target.bold()
    );

    let waited = tokio::signal::ctrl_c().await;
    tunnel.close().await;
    waited.context("Failed to listen for Ctrl+C")?;
    println!("{} Tunnel closed", "■".dimmed());
    Ok(())
}
