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

//! Session pool shared by every fan-out.
//!
//! The pool caches live transport sessions keyed by `(username, host, port)`,
//! hands each one out to at most one caller at a time through a
//! [`SessionLease`], and evicts sessions that outlive their lifetime or sit
//! idle for too long.

mod config;
mod entry;
mod maintenance;
mod manager;
mod stats;

pub use config::PoolConfig;
pub use maintenance::SweepReport;
pub use manager::{ConnectionPool, SessionLease};
pub use stats::PoolStats;
