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

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::manager::ConnectionPool;
use super::entry::Eviction;

/// Sessions removed by one sweep, by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub idle: usize,
    pub disconnected: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.expired + self.idle + self.disconnected
    }
}

impl ConnectionPool {
    /// Close and evict every free session past its lifetime or idle limit,
    /// or whose transport is gone. Leased sessions are left alone.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let mut to_close = Vec::new();

        {
            let mut state = self.lock_state();
            for (key, sessions) in state.sessions.iter_mut() {
                let mut index = 0;
                while index < sessions.len() {
                    let session = &sessions[index];
                    let reason = if session.in_use {
                        None
                    } else {
                        session.eviction(self.config.max_life, self.config.max_idle)
                    };
                    match reason {
                        Some(reason) => {
                            let session = sessions.swap_remove(index);
                            debug!("Sweeping {:?} session {} for {}", reason, session.id, key);
                            self.counters.record_eviction(reason);
                            match reason {
                                Eviction::Expired => report.expired += 1,
                                Eviction::Idle => report.idle += 1,
                                Eviction::Disconnected => report.disconnected += 1,
                            }
                            to_close.push(session.transport);
                        }
                        None => index += 1,
                    }
                }
            }
            state.sessions.retain(|_, sessions| !sessions.is_empty());
        } // Lock is dropped here

        if report.total() > 0 {
            debug!(
                "Pool sweep: removed {} expired, {} idle, {} disconnected session(s)",
                report.expired, report.idle, report.disconnected
            );
            self.close_sessions(to_close).await;
            self.slot_freed.notify_waiters();
        }
        report
    }

    /// Run [`sweep`](Self::sweep) every `period` until `cancel_token` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        period: Duration,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        info!("Pool sweeper stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        pool.sweep().await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolConfig;
    use crate::target::{AuthMethod, TargetConfig};
    use crate::transport::SimulatedTransportFactory;

    fn target(name: &str, host: &str) -> TargetConfig {
        TargetConfig::new(name, host, 22, "ops", AuthMethod::with_password("secret"))
    }

    fn pool(max_life: u64, max_idle: u64) -> Arc<ConnectionPool> {
        Arc::new(ConnectionPool::new(
            PoolConfig::new(Duration::from_secs(max_life), Duration::from_secs(max_idle)),
            Arc::new(SimulatedTransportFactory::new()),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_idle_free_sessions() {
        let pool = pool(3600, 10);
        let lease = pool.acquire(&target("a", "h1")).await.unwrap();
        pool.release(&lease);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(pool.sweep().await.total(), 0);

        tokio::time::advance(Duration::from_secs(6)).await;
        let report = pool.sweep().await;
        assert_eq!(report.idle, 1);
        assert_eq!(pool.size(), 0);
        assert!(!lease.transport().is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_never_evicts_leased_sessions() {
        let pool = pool(10, 10);
        let lease = pool.acquire(&target("a", "h1")).await.unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(pool.sweep().await.total(), 0);
        assert_eq!(pool.size(), 1);

        pool.release(&lease);
        let report = pool.sweep().await;
        assert_eq!(report.expired, 1);
        assert_eq!(pool.size(), 0);
    }

    #[tokio::test]
    async fn test_sweep_evicts_disconnected_sessions() {
        let pool = pool(3600, 3600);
        let lease = pool.acquire(&target("a", "h1")).await.unwrap();
        pool.release(&lease);
        lease.transport().close().await.unwrap();

        let report = pool.sweep().await;
        assert_eq!(report.disconnected, 1);
        assert_eq!(pool.stats().disconnected_evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_until_cancelled() {
        let pool = pool(3600, 10);
        let lease = pool.acquire(&target("a", "h1")).await.unwrap();
        pool.release(&lease);

        let token = CancellationToken::new();
        let handle = pool.spawn_sweeper(Duration::from_secs(60), token.clone());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(pool.size(), 0);

        token.cancel();
        handle.await.unwrap();
    }
}
