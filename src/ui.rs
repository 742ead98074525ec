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

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::cluster::{Cluster, ClusterExecutionReport, ClusterHealth, HealthStatus};
use crate::executor::{BatchReport, ExecutionResult, ExecutionStats, TransferResult};
use crate::fleet::ConnectionStats;
use crate::target::TargetConfig;

fn terminal_width() -> usize {
    terminal_size::terminal_size()
        .map(|(w, _)| w.0 as usize)
        .unwrap_or(80)
}

pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{millis}ms")
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

pub fn health_symbol(status: HealthStatus) -> String {
    match status {
        HealthStatus::Online => "●".green().to_string(),
        HealthStatus::Degraded => "◐".yellow().to_string(),
        HealthStatus::Offline => "●".red().to_string(),
        HealthStatus::Unknown => "○".dimmed().to_string(),
    }
}

const SPINNER_TICK_RATE_MS: u64 = 80;

/// Spinner on stderr shown while a fan-out is in flight.
pub fn create_spinner(message: impl Into<String>) -> ProgressBar {
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg} {elapsed:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let spinner = ProgressBar::new_spinner().with_style(style);
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(SPINNER_TICK_RATE_MS));
    spinner
}

pub struct OutputFormatter;

impl OutputFormatter {
    pub fn format_header(title: &str) -> String {
        let width = terminal_width();
        let border = "─".repeat(width);
        let title_styled = format!(" {title} ").cyan().bold().to_string();
        let padding = width.saturating_sub(title.width() + 2) / 2;

        format!(
            "{}\n{}{}\n{}",
            border.dimmed(),
            " ".repeat(padding),
            title_styled,
            border.dimmed()
        )
    }

    pub fn format_command_header(command: &str, target_count: usize) -> String {
        format!(
            "\n{} {} on {} {}:\n{}\n",
            "►".cyan().bold(),
            "Executing".cyan(),
            target_count.to_string().bold(),
            if target_count == 1 { "target" } else { "targets" },
            format!("  {command}").dimmed()
        )
    }

    pub fn format_result(result: &ExecutionResult, verbose: bool) -> String {
        let mut output = String::new();

        let status_symbol = if result.is_success() {
            "✓".green().to_string()
        } else {
            "✗".red().to_string()
        };
        output.push_str(&format!(
            "\n{} {} {}\n",
            status_symbol,
            result.target.bold(),
            format!("({})", format_duration(result.duration)).dimmed()
        ));

        if let Some(kind) = result.failure {
            output.push_str(&format!(
                "{} {}: {}\n",
                "✗".red(),
                kind.to_string().red(),
                result.error.red()
            ));
            if result.attempts > 1 {
                output.push_str(&format!("  {}\n", format!("after {} attempts", result.attempts).dimmed()));
            }
            return output;
        }

        if !result.is_success() {
            output.push_str(&format!(
                "{} Exit code: {}\n",
                "⚠".yellow(),
                result.exit_code.to_string().yellow()
            ));
        }

        if !result.output.is_empty() {
            output.push_str(&Self::format_output_box(&result.output, false));
        }

        if !result.stderr.is_empty() && (verbose || !result.is_success()) {
            let label = if result.is_success() {
                "stderr:".yellow().to_string()
            } else {
                "stderr:".red().to_string()
            };
            output.push_str(&format!("\n{label}\n"));
            output.push_str(&Self::format_output_box(&result.stderr, true));
        }

        output
    }

    fn format_output_box(content: &str, is_error: bool) -> String {
        let mut output = String::new();
        let indent = "  ";
        let max_width = terminal_width().saturating_sub(4).max(1);

        let mut push_line = |line: &str| {
            if is_error {
                output.push_str(&format!("{}{}\n", indent, line.dimmed()));
            } else {
                output.push_str(&format!("{indent}{line}\n"));
            }
        };

        for line in content.lines() {
            let mut remaining = line;
            while remaining.width() > max_width {
                let (chunk, rest) = Self::split_at_width(remaining, max_width);
                if chunk.is_empty() {
                    break;
                }
                push_line(chunk);
                remaining = rest;
            }
            push_line(remaining);
        }

        output
    }

    fn split_at_width(s: &str, max_width: usize) -> (&str, &str) {
        let mut width = 0;
        let mut split_pos = 0;

        for (i, ch) in s.char_indices() {
            let ch_width = ch.width().unwrap_or(0);
            if width + ch_width > max_width {
                break;
            }
            width += ch_width;
            split_pos = i + ch.len_utf8();
        }

        s.split_at(split_pos)
    }

    pub fn format_summary(total: usize, success: usize, failed: usize) -> String {
        let mut parts = vec![format!("{} targets", total.to_string().bold())];

        if success > 0 {
            parts.push(format!(
                "{} {}",
                success.to_string().green().bold(),
                "successful".green()
            ));
        }
        if failed > 0 {
            parts.push(format!("{} {}", failed.to_string().red().bold(), "failed".red()));
        }

        let rule = "═".repeat(terminal_width());
        format!(
            "\n{}\n{}\n{}\n",
            rule.dimmed(),
            format!(" Summary: {} ", parts.join(" • ")).bold(),
            rule.dimmed()
        )
    }

    pub fn format_cluster_report(report: &ClusterExecutionReport, verbose: bool) -> String {
        let mut output = Self::format_header(&format!("cluster {}", report.cluster));
        output.push('\n');
        for result in report.results.values() {
            output.push_str(&Self::format_result(result, verbose));
        }
        output.push_str(&Self::format_summary(
            report.results.len(),
            report.successful_count,
            report.failed_count,
        ));
        output.push_str(&format!(
            "  {} {:.1}%  {} {}  {} {}\n",
            "success rate".dimmed(),
            report.success_rate(),
            "total".dimmed(),
            format_duration(report.total_duration),
            "average".dimmed(),
            format_duration(report.average_duration)
        ));
        output
    }

    pub fn format_batch_report(report: &BatchReport, verbose: bool) -> String {
        let mut output = Self::format_header(&format!("batch {}", report.name));
        output.push('\n');

        for step in &report.results {
            let symbol = if step.all_successful() {
                "✓".green().to_string()
            } else {
                "✗".red().to_string()
            };
            output.push_str(&format!(
                "\n{} {} {}\n",
                symbol,
                step.name.bold(),
                format!("$ {}", step.command).dimmed()
            ));
            for result in step.results.values() {
                if verbose || !result.is_success() {
                    output.push_str(&Self::format_result(result, verbose));
                }
            }
        }

        if let Some(failed_at) = &report.failed_at {
            output.push_str(&format!(
                "\n{} stopped after '{}' failed\n",
                "■".red(),
                failed_at.red()
            ));
        }

        let total = report.total_executions();
        let successful = report.successful_executions();
        output.push_str(&Self::format_summary(total, successful, total - successful));
        output.push_str(&format!(
            "  {} {}\n",
            "elapsed".dimmed(),
            format_duration(report.duration)
        ));
        output
    }

    pub fn format_transfer(result: &TransferResult) -> String {
        if result.is_success() {
            format!(
                "{} {} {} {}",
                "✓".green(),
                result.target.bold(),
                result.remote_path,
                format!("({})", format_duration(result.duration)).dimmed()
            )
        } else {
            format!("{} {} {}", "✗".red(), result.target.bold(), result.error.red())
        }
    }

    pub fn format_health(health: &ClusterHealth) -> String {
        let mut output = format!(
            "{} {} {}/{} online ({:.1}%) {} {}\n",
            health_symbol(health.status),
            health.cluster.bold(),
            health.online,
            health.total,
            health.healthy_percent,
            health.status,
            format!("in {}", format_duration(health.response_time)).dimmed()
        );
        for target in &health.offline_targets {
            output.push_str(&format!("    {} {}\n", "✗".red(), target.red()));
        }
        output
    }

    pub fn format_target(target: &TargetConfig) -> String {
        let mut line = format!(
            "  {} {}",
            target.name.bold(),
            format!("{}@{}:{}", target.username, target.host, target.port).dimmed()
        );
        if !target.tags.is_empty() {
            line.push_str(&format!(" [{}]", target.tags.join(", ")));
        }
        if !target.enabled {
            line.push_str(&format!(" {}", "(disabled)".yellow()));
        }
        line
    }

    pub fn format_cluster(cluster: &Cluster) -> String {
        let mut line = format!(
            "  {} {} {}",
            health_symbol(cluster.status()),
            cluster.name.bold(),
            format!("({} members)", cluster.members.len()).dimmed()
        );
        if !cluster.description.is_empty() {
            line.push_str(&format!(" {}", cluster.description));
        }
        line
    }

    pub fn format_stats(connections: &ConnectionStats, executions: &ExecutionStats) -> String {
        let pool = &connections.pool;
        let mut output = Self::format_header("statistics");
        output.push('\n');
        output.push_str(&format!("{}\n", "Connections".cyan().bold()));
        output.push_str(&format!("  targets            {}\n", connections.total_targets));
        output.push_str(&format!("  pooled sessions    {}\n", connections.pool_size));
        output.push_str(&format!("  active sessions    {}\n", connections.active_sessions));
        output.push_str(&format!(
            "  created / reused   {} / {} ({:.1}% reuse)\n",
            pool.sessions_created,
            pool.sessions_reused,
            pool.reuse_rate()
        ));
        output.push_str(&format!("  connect failures   {}\n", pool.connect_failures));
        output.push_str(&format!(
            "  evictions          {} expired, {} idle, {} disconnected\n",
            pool.expired_evictions, pool.idle_evictions, pool.disconnected_evictions
        ));

        output.push_str(&format!("{}\n", "Executions".cyan().bold()));
        output.push_str(&format!("  total              {}\n", executions.total));
        output.push_str(&format!(
            "  successful         {} ({:.1}%)\n",
            executions.successful,
            executions.success_rate()
        ));
        output.push_str(&format!("  failed             {}\n", executions.failed));
        output.push_str(&format!(
            "  average duration   {}\n",
            format_duration(executions.average_duration)
        ));
        if let Some(last) = executions.last_execution {
            output.push_str(&format!("  last execution     {}\n", last.to_rfc3339()));
        }
        output
    }
}
