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

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use fleetsh::{
    cli::{Cli, Commands},
    commands::{
        batch::{execute_batch, BatchParams},
        download::download_file,
        exec::execute_command,
        health::check_health,
        list::list_fleet,
        stats::show_stats,
        tunnel::run_tunnel,
        upload::upload_file,
    },
    config::Config,
    executor::ExecutorConfig,
    fleet::Fleet,
    transport::{
        SimulatedBehavior, SimulatedTransportFactory, SshTransportFactory, TransportFactory,
    },
    utils::init_logging,
};

const SIMULATED_LATENCY_MS: u64 = 50;

fn executor_config(cli: &Cli, config: &Config) -> ExecutorConfig {
    let mut executor = config.executor_config();
    if let Some(parallel) = cli.parallel {
        executor = executor.with_concurrency(parallel);
    }
    if let Some(timeout) = cli.timeout {
        executor = executor.with_timeout(Duration::from_secs(timeout));
    }
    if let Some(retries) = cli.retries {
        let delay = executor.retry_delay;
        executor = executor.with_retry(retries, delay);
    }
    executor
}

fn transport_factory(cli: &Cli, config: &Config) -> Arc<dyn TransportFactory> {
    if cli.simulate {
        tracing::info!("Using simulated transport");
        let behavior = SimulatedBehavior::default()
            .with_latency(Duration::from_millis(SIMULATED_LATENCY_MS));
        Arc::new(SimulatedTransportFactory::new().with_default_behavior(behavior))
    } else {
        Arc::new(SshTransportFactory::new(config.ssh_options()))
    }
}

async fn run(cli: &Cli, fleet: &Fleet) -> Result<bool> {
    let verbose = cli.verbose > 0;
    match &cli.command {
        Commands::Exec { selection, command } => {
            execute_command(fleet, selection, &command.join(" "), verbose).await
        }
        Commands::Batch {
            selection,
            name,
            stop_on_failure,
            file,
            commands,
        } => {
            execute_batch(
                fleet,
                BatchParams {
                    selection,
                    name,
                    stop_on_failure: *stop_on_failure,
                    file: file.as_deref(),
                    commands,
                    verbose,
                },
            )
            .await
        }
        Commands::Health { cluster } => check_health(fleet, cluster.as_deref()).await,
        Commands::List => {
            list_fleet(fleet);
            Ok(true)
        }
        Commands::Stats => {
            show_stats(fleet).await;
            Ok(true)
        }
        Commands::Upload {
            selection,
            source,
            destination,
        } => upload_file(fleet, selection, source, destination).await,
        Commands::Download {
            selection,
            source,
            destination,
        } => download_file(fleet, selection, source, destination).await,
        Commands::Tunnel { target, forward } => {
            fleet.start_background_tasks();
            run_tunnel(fleet, target, forward).await?;
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if let Some(path) = &cli.config {
        if !path.exists() {
            anyhow::bail!("Config file not found: {:?}", path);
        }
    }
    let config = Config::load_with_priority(cli.config.as_deref()).await?;

    let factory = transport_factory(&cli, &config);
    let fleet = Fleet::from_config(&config, factory, executor_config(&cli, &config))
        .context("Failed to build fleet from configuration")?;

    let outcome = run(&cli, &fleet).await;
    fleet.shutdown().await;

    if !outcome? {
        std::process::exit(1);
    }
    Ok(())
}
