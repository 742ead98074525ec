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

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::shared::error::FleetError;
use crate::transport::CommandOutput;

/// Exit code recorded when a command never produced one.
pub const NO_EXIT_CODE: i32 = -1;

/// Why a target has no command outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Attempted but could not reach the target, after all retries
    Connection,
    /// The target was reached but the operation itself failed
    Operation,
    /// The shared deadline elapsed first
    Cancelled,
    /// The target is disabled and was not attempted
    Disabled,
    /// The worker task failed
    Internal,
}

impl FailureKind {
    pub(crate) fn of(error: &FleetError) -> Self {
        match error {
            FleetError::Connection(_) => FailureKind::Connection,
            FleetError::Transport(e) if e.is_session_fault() => FailureKind::Connection,
            FleetError::Transport(_) => FailureKind::Operation,
            FleetError::Cancelled(_) => FailureKind::Cancelled,
            _ => FailureKind::Internal,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FailureKind::Connection => "connection failed",
            FailureKind::Operation => "operation failed",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Disabled => "disabled",
            FailureKind::Internal => "internal error",
        };
        f.write_str(label)
    }
}

/// Outcome of one command on one target.
///
/// `success` holds exactly when the command exited with 0 and `error` is
/// empty. `error` only describes why no command outcome was obtained; the
/// command's own diagnostics are in `stderr`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub target: String,
    pub command: String,
    pub output: String,
    pub stderr: String,
    pub error: String,
    pub exit_code: i32,
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    /// Connection attempts made, including the successful one
    pub attempts: u32,
    pub failure: Option<FailureKind>,
}

impl ExecutionResult {
    pub fn completed(
        target: impl Into<String>,
        command: impl Into<String>,
        output: CommandOutput,
        duration: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            target: target.into(),
            command: command.into(),
            success: output.is_success(),
            output: output.stdout,
            stderr: output.stderr,
            error: String::new(),
            exit_code: output.exit_code,
            duration,
            timestamp: Utc::now(),
            attempts,
            failure: None,
        }
    }

    pub fn failed(
        target: impl Into<String>,
        command: impl Into<String>,
        kind: FailureKind,
        error: impl Into<String>,
        duration: Duration,
        attempts: u32,
    ) -> Self {
        let mut error = error.into();
        if error.is_empty() {
            error = kind.to_string();
        }
        Self {
            target: target.into(),
            command: command.into(),
            output: String::new(),
            stderr: String::new(),
            error,
            exit_code: NO_EXIT_CODE,
            duration,
            timestamp: Utc::now(),
            success: false,
            attempts,
            failure: Some(kind),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn is_cancelled(&self) -> bool {
        self.failure == Some(FailureKind::Cancelled)
    }

    /// True when the target was reached and the command ran to completion.
    pub fn was_executed(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Upload,
    Download,
}

/// Outcome of one file transfer on one target.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferResult {
    pub target: String,
    pub direction: TransferDirection,
    pub local_path: PathBuf,
    pub remote_path: String,
    pub error: String,
    pub duration: Duration,
    pub attempts: u32,
    pub failure: Option<FailureKind>,
}

impl TransferResult {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::error::TransportError;

    fn output(exit_code: i32) -> CommandOutput {
        CommandOutput {
            stdout: "out\n".to_string(),
            stderr: String::new(),
            exit_code,
        }
    }

    #[test]
    fn test_success_iff_zero_exit_and_no_error() {
        let ok = ExecutionResult::completed("t", "true", output(0), Duration::ZERO, 1);
        assert!(ok.success && ok.error.is_empty() && ok.exit_code == 0);

        let nonzero = ExecutionResult::completed("t", "false", output(2), Duration::ZERO, 1);
        assert!(!nonzero.success);
        assert!(nonzero.was_executed());

        let failed = ExecutionResult::failed(
            "t",
            "true",
            FailureKind::Connection,
            "refused",
            Duration::ZERO,
            4,
        );
        assert!(!failed.success);
        assert_eq!(failed.exit_code, NO_EXIT_CODE);
        assert_eq!(failed.error, "refused");
    }

    #[test]
    fn test_stderr_does_not_fail_a_zero_exit() {
        let mut out = output(0);
        out.stderr = "warning: deprecated flag\n".to_string();
        let result = ExecutionResult::completed("t", "cmd", out, Duration::ZERO, 1);
        assert!(result.success);
    }

    #[test]
    fn test_failure_without_message_uses_kind() {
        let result =
            ExecutionResult::failed("t", "c", FailureKind::Cancelled, "", Duration::ZERO, 0);
        assert_eq!(result.error, "cancelled");
        assert!(result.is_cancelled());
    }

    #[test]
    fn test_failure_kind_of_error() {
        assert_eq!(
            FailureKind::of(&FleetError::Connection("x".into())),
            FailureKind::Connection
        );
        assert_eq!(
            FailureKind::of(&FleetError::Cancelled("x".into())),
            FailureKind::Cancelled
        );
        assert_eq!(
            FailureKind::of(&FleetError::Transport(TransportError::NotConnected)),
            FailureKind::Connection
        );
        assert_eq!(
            FailureKind::of(&FleetError::Transport(TransportError::Other("x".into()))),
            FailureKind::Operation
        );
        assert_eq!(
            FailureKind::of(&FleetError::Internal("x".into())),
            FailureKind::Internal
        );
    }
}
