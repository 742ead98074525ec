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

//! Parallel fan-out of commands and file transfers over pooled sessions.

mod batch;
mod config;
mod history;
mod parallel;
mod result_types;
mod retry;

pub use batch::{BatchCommand, BatchReport, BatchSpec, CommandResults};
pub use config::ExecutorConfig;
pub use history::{ExecutionHistory, ExecutionRecord, ExecutionStats};
pub use parallel::ParallelExecutor;
pub use result_types::{
    ExecutionResult, FailureKind, TransferDirection, TransferResult, NO_EXIT_CODE,
};
pub use retry::RetryPolicy;
