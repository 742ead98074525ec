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

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "fleetsh",
    version,
    about = "Parallel command execution across fleets of remote targets",
    long_about = "fleetsh runs commands on many remote targets at once over pooled SSH sessions.\nTargets and clusters are defined in a YAML configuration file. Sessions are reused\nacross commands, failed connections are retried, and clusters can be health-checked.",
    after_help = "EXAMPLES:\n  Run on every target:          fleetsh exec uptime\n  Run on a cluster:             fleetsh exec -c web \"df -h\"\n  Run an ordered batch:         fleetsh batch -c db --stop-on-failure \"systemctl stop app\" \"./migrate\"\n  Check cluster health:         fleetsh health\n  Try without real hosts:       fleetsh --simulate exec hostname"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        long,
        global = true,
        help = "Configuration file path\nLoading priority:\n  1. This flag's value, if the file exists\n  2. Current directory (./fleetsh.yaml)\n  3. User config (~/.config/fleetsh/config.yaml)"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        help = "Use in-process simulated hosts instead of SSH"
    )]
    pub simulate: bool,

    #[arg(
        short = 'p',
        long,
        global = true,
        help = "Maximum parallel targets [default: from config, else 10]"
    )]
    pub parallel: Option<usize>,

    #[arg(
        long,
        global = true,
        help = "Deadline for a whole fan-out in seconds [default: from config, else 300]"
    )]
    pub timeout: Option<u64>,

    #[arg(
        long,
        global = true,
        help = "Retries after a failed connection [default: from config, else 3]"
    )]
    pub retries: Option<u32>,

    #[arg(
        short = 'v',
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,
}

/// Which targets a command runs on. With no selection, every target is used.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetSelection {
    #[arg(
        short = 't',
        long,
        value_delimiter = ',',
        help = "Comma-separated target names"
    )]
    pub targets: Option<Vec<String>>,

    #[arg(short = 'c', long, conflicts_with_all = ["targets", "tag"], help = "Cluster name")]
    pub cluster: Option<String>,

    #[arg(long, conflicts_with = "targets", help = "Only targets carrying this tag")]
    pub tag: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Execute a command on targets",
        long_about = "Executes the command on all selected targets simultaneously and prints\neach target's output once it completes.\n\nExit codes: 0 (all succeed), 1 (any failures)"
    )]
    Exec {
        #[command(flatten)]
        selection: TargetSelection,

        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },

    #[command(
        about = "Run an ordered list of commands",
        long_about = "Runs each command on all selected targets before starting the next one.\nWith --stop-on-failure, the batch ends after the first command that fails on any target.",
        after_help = "Examples:\n  fleetsh batch -c web \"apt-get update\" \"apt-get -y upgrade\"\n  fleetsh batch --file steps.txt --stop-on-failure"
    )]
    Batch {
        #[command(flatten)]
        selection: TargetSelection,

        #[arg(long, default_value = "batch", help = "Name reported for the batch")]
        name: String,

        #[arg(long, help = "Stop after the first command that fails on any target")]
        stop_on_failure: bool,

        #[arg(
            short = 'f',
            long,
            help = "Read commands from a file, one per line (# starts a comment)"
        )]
        file: Option<PathBuf>,

        #[arg(help = "Commands to run in order")]
        commands: Vec<String>,
    },

    #[command(about = "Check cluster health")]
    Health {
        #[arg(help = "Cluster to check [default: all clusters]")]
        cluster: Option<String>,
    },

    #[command(about = "List targets and clusters")]
    List,

    #[command(
        about = "Probe every cluster and show pool and execution statistics"
    )]
    Stats,

    #[command(about = "Upload a file to targets")]
    Upload {
        #[command(flatten)]
        selection: TargetSelection,

        #[arg(help = "Local file path")]
        source: PathBuf,

        #[arg(help = "Remote destination path")]
        destination: String,
    },

    #[command(
        about = "Download a file from targets",
        long_about = "Downloads the remote file from every selected target.\nEach copy is prefixed with the target name (e.g., web1_app.log)."
    )]
    Download {
        #[command(flatten)]
        selection: TargetSelection,

        #[arg(help = "Remote file path")]
        source: String,

        #[arg(help = "Local destination directory")]
        destination: PathBuf,
    },

    #[command(
        about = "Forward a local port through a target",
        after_help = "Example:\n  fleetsh tunnel db1 -L 15432:localhost:5432"
    )]
    Tunnel {
        #[arg(help = "Target to tunnel through")]
        target: String,

        #[arg(
            short = 'L',
            long = "local",
            value_name = "LOCAL_PORT:HOST:PORT",
            help = "Forward spec: local port, then the host and port to reach from the target"
        )]
        forward: String,
    },
}

/// A parsed `-L local_port:host:port` forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardSpec {
    pub local_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
}

impl ForwardSpec {
    pub fn parse(spec: &str) -> anyhow::Result<Self> {
        let (local, rest) = spec
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("Invalid forward '{spec}', expected LOCAL_PORT:HOST:PORT"))?;
        let (host, remote) = rest
            .rsplit_once(':')
            .ok_or_else(|| anyhow::anyhow!("Invalid forward '{spec}', expected LOCAL_PORT:HOST:PORT"))?;

        let local_port = local
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid local port '{local}'"))?;
        let remote_port: u16 = remote
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid remote port '{remote}'"))?;
        let remote_host = host.trim_start_matches('[').trim_end_matches(']');
        if remote_host.is_empty() || remote_port == 0 {
            anyhow::bail!("Invalid forward '{spec}', expected LOCAL_PORT:HOST:PORT");
        }

        Ok(Self {
            local_port,
            remote_host: remote_host.to_string(),
            remote_port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_exec_with_globals() {
        let cli = Cli::try_parse_from([
            "fleetsh", "exec", "-c", "web", "-p", "4", "--retries", "1", "uptime", "-a",
        ])
        .unwrap();
        assert_eq!(cli.parallel, Some(4));
        assert_eq!(cli.retries, Some(1));
        match cli.command {
            Commands::Exec { selection, command } => {
                assert_eq!(selection.cluster.as_deref(), Some("web"));
                assert_eq!(command, vec!["uptime", "-a"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cluster_conflicts_with_targets() {
        assert!(Cli::try_parse_from(["fleetsh", "exec", "-c", "web", "-t", "a,b", "true"]).is_err());
    }

    #[test]
    fn test_forward_spec() {
        let spec = ForwardSpec::parse("15432:localhost:5432").unwrap();
        assert_eq!(spec.local_port, 15432);
        assert_eq!(spec.remote_host, "localhost");
        assert_eq!(spec.remote_port, 5432);

        let v6 = ForwardSpec::parse("8080:[::1]:80").unwrap();
        assert_eq!(v6.remote_host, "::1");

        assert!(ForwardSpec::parse("8080").is_err());
        assert!(ForwardSpec::parse("x:host:80").is_err());
        assert!(ForwardSpec::parse("8080::80").is_err());
    }
}
