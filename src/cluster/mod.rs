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

//! Named groups of targets with execution reports and health snapshots.

mod registry;
mod report;
mod stats;
mod types;

pub use registry::{ClusterRegistry, DEFAULT_HEALTH_COMMAND};
pub use report::ClusterExecutionReport;
pub use stats::ClusterStats;
pub use types::{Cluster, ClusterHealth, HealthStatus};
