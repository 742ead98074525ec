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

use tokio::time::Instant;
use uuid::Uuid;

use crate::transport::Transport;

/// Why a session left the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Eviction {
    Expired,
    Idle,
    Disconnected,
}

pub(super) struct PooledSession {
    /// Identity of the underlying transport session
    pub(super) id: Uuid,
    pub(super) transport: Arc<dyn Transport>,
    pub(super) created_at: Instant,
    pub(super) last_used: Instant,
    pub(super) use_count: u64,
    pub(super) in_use: bool,
    /// Lease generation; bumped on every checkout
    pub(super) generation: u64,
}

impl PooledSession {
    pub(super) fn new(transport: Arc<dyn Transport>) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            transport,
            created_at: now,
            last_used: now,
            use_count: 0,
            in_use: false,
            generation: 0,
        }
    }

    pub(super) fn checkout(&mut self, generation: u64) {
        self.in_use = true;
        self.generation = generation;
        self.use_count += 1;
        self.last_used = Instant::now();
    }

    pub(super) fn checkin(&mut self) {
        self.in_use = false;
        self.last_used = Instant::now();
    }

    /// Eviction reason for a free session, or `None` if it may be handed out.
    pub(super) fn eviction(&self, max_life: Duration, max_idle: Duration) -> Option<Eviction> {
        if self.created_at.elapsed() > max_life {
            Some(Eviction::Expired)
        } else if self.last_used.elapsed() > max_idle {
            Some(Eviction::Idle)
        } else if !self.transport.is_connected() {
            Some(Eviction::Disconnected)
        } else {
            None
        }
    }

    pub(super) fn holds(&self, id: Uuid, generation: u64) -> bool {
        self.id == id && self.in_use && self.generation == generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{AuthMethod, TargetConfig};
    use crate::transport::{SimulatedTransportFactory, TransportFactory};

    async fn connected_session() -> PooledSession {
        let target = TargetConfig::new("t", "h", 22, "u", AuthMethod::with_password("p"));
        let transport = SimulatedTransportFactory::new().create(&target);
        transport.connect(Duration::from_secs(1)).await.unwrap();
        PooledSession::new(transport)
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_reasons() {
        let session = connected_session().await;
        let life = Duration::from_secs(100);
        let idle = Duration::from_secs(10);
        assert_eq!(session.eviction(life, idle), None);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(session.eviction(life, idle), Some(Eviction::Idle));

        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(session.eviction(life, idle), Some(Eviction::Expired));
    }

    #[tokio::test]
    async fn test_disconnected_session_is_evictable() {
        let session = connected_session().await;
        session.transport.close().await.unwrap();
        assert_eq!(
            session.eviction(Duration::from_secs(60), Duration::from_secs(60)),
            Some(Eviction::Disconnected)
        );
    }

    #[tokio::test]
    async fn test_checkout_generation() {
        let mut session = connected_session().await;
        session.checkout(7);
        assert!(session.holds(session.id, 7));
        assert!(!session.holds(session.id, 6));
        assert_eq!(session.use_count, 1);

        session.checkin();
        assert!(!session.holds(session.id, 7));
    }
}
