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

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::config::PoolConfig;
use super::entry::PooledSession;
use super::stats::{PoolCounters, PoolStats};
use crate::shared::error::{FleetError, FleetResult};
use crate::target::{TargetConfig, TargetKey};
use crate::transport::{Transport, TransportFactory};

/// Exclusive claim on one pooled session.
///
/// Leases are handed back with [`ConnectionPool::release`]. Each checkout gets
/// a fresh generation, so a stale lease can never release a session that has
/// since been handed to someone else.
pub struct SessionLease {
    id: Uuid,
    key: TargetKey,
    generation: u64,
    transport: Arc<dyn Transport>,
}

impl SessionLease {
    /// Identity of the underlying session; stable across reuse.
    pub fn session_id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &TargetKey {
        &self.key
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}

impl fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLease")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("generation", &self.generation)
            .finish()
    }
}

#[derive(Default)]
pub(super) struct PoolState {
    pub(super) sessions: HashMap<TargetKey, Vec<PooledSession>>,
    /// Slots reserved by connects still in flight
    pub(super) connecting: HashMap<TargetKey, usize>,
}

impl PoolState {
    fn occupied_slots(&self, key: &TargetKey) -> usize {
        self.sessions.get(key).map_or(0, Vec::len) + self.connecting.get(key).copied().unwrap_or(0)
    }

    fn release_connecting_slot(&mut self, key: &TargetKey) {
        if let Some(count) = self.connecting.get_mut(key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.connecting.remove(key);
            }
        }
    }
}

enum Claim {
    Reused(SessionLease),
    Connect,
    Full,
}

/// Pool of live transport sessions keyed by endpoint.
pub struct ConnectionPool {
    pub(super) config: PoolConfig,
    factory: Arc<dyn TransportFactory>,
    pub(super) state: Mutex<PoolState>,
    /// Signalled whenever a slot may have become free
    pub(super) slot_freed: Notify,
    next_generation: AtomicU64,
    pub(super) counters: PoolCounters,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            config,
            factory,
            state: Mutex::new(PoolState::default()),
            slot_freed: Notify::new(),
            next_generation: AtomicU64::new(1),
            counters: PoolCounters::default(),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Bookkeeping is never held across an await, and no update can panic
    /// halfway through, so a poisoned lock still guards consistent state.
    pub(super) fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lease a session for `target`, reusing a free one when possible.
    ///
    /// When every slot for the endpoint is leased out, waits for a release
    /// until the connect timeout elapses.
    pub async fn acquire(&self, target: &TargetConfig) -> FleetResult<SessionLease> {
        let key = target.key();
        let deadline = Instant::now() + self.config.connect_timeout;

        loop {
            let notified = self.slot_freed.notified();
            tokio::pin!(notified);
            // Register before inspecting state so a release in between is not missed
            notified.as_mut().enable();

            let (claim, stale) = self.try_claim(&key);
            self.close_sessions(stale).await;

            match claim {
                Claim::Reused(lease) => return Ok(lease),
                Claim::Connect => return self.open_session(target, key).await,
                Claim::Full => {
                    trace!("All {} slots for {} are busy", self.config.max_sessions_per_target, key);
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Err(FleetError::Connection(format!(
                            "no free session for {} within {:?}",
                            key, self.config.connect_timeout
                        )));
                    }
                }
            }
        }
    }

    /// Pick a free live session or reserve a connect slot. Stale free
    /// sessions found on the way are removed and returned for closing.
    fn try_claim(&self, key: &TargetKey) -> (Claim, Vec<Arc<dyn Transport>>) {
        let mut state = self.lock_state();
        let mut stale = Vec::new();

        if let Some(sessions) = state.sessions.get_mut(key) {
            let mut index = 0;
            while index < sessions.len() {
                let session = &sessions[index];
                if session.in_use {
                    index += 1;
                    continue;
                }
                match session.eviction(self.config.max_life, self.config.max_idle) {
                    Some(reason) => {
                        let session = sessions.swap_remove(index);
                        debug!("Evicting {:?} session {} for {}", reason, session.id, key);
                        self.counters.record_eviction(reason);
                        stale.push(session.transport);
                    }
                    None => {
                        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                        let session = &mut sessions[index];
                        session.checkout(generation);
                        self.counters.reused.fetch_add(1, Ordering::Relaxed);
                        debug!(
                            "Reusing session {} for {} (use #{})",
                            session.id, key, session.use_count
                        );
                        let lease = SessionLease {
                            id: session.id,
                            key: key.clone(),
                            generation,
                            transport: Arc::clone(&session.transport),
                        };
                        return (Claim::Reused(lease), stale);
                    }
                }
            }
            if sessions.is_empty() {
                state.sessions.remove(key);
            }
        }

        if state.occupied_slots(key) >= self.config.max_sessions_per_target {
            return (Claim::Full, stale);
        }
        *state.connecting.entry(key.clone()).or_insert(0) += 1;
        (Claim::Connect, stale)
    }

    async fn open_session(&self, target: &TargetConfig, key: TargetKey) -> FleetResult<SessionLease> {
        let reservation = SlotReservation {
            pool: self,
            key,
            committed: false,
        };
        let transport = self.factory.create(target);

        if let Err(e) = transport.connect(self.config.connect_timeout).await {
            self.counters.connect_failures.fetch_add(1, Ordering::Relaxed);
            return Err(FleetError::Connection(format!("{}: {}", target.key(), e)));
        }

        let mut session = PooledSession::new(Arc::clone(&transport));
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        session.checkout(generation);
        let id = session.id;

        let key = reservation.commit(session);
        self.counters.created.fetch_add(1, Ordering::Relaxed);
        debug!("Opened session {} for {}", id, key);

        Ok(SessionLease {
            id,
            key,
            generation,
            transport,
        })
    }

    /// Return a leased session to the pool.
    ///
    /// Returns `false` and changes nothing if the lease was already released
    /// or its session was evicted in the meantime. The transport is never closed.
    pub fn release(&self, lease: &SessionLease) -> bool {
        let released = {
            let mut state = self.lock_state();
            state
                .sessions
                .get_mut(&lease.key)
                .and_then(|sessions| {
                    sessions
                        .iter_mut()
                        .find(|s| s.holds(lease.id, lease.generation))
                })
                .map(PooledSession::checkin)
                .is_some()
        };

        if released {
            trace!("Released session {} for {}", lease.id, lease.key);
            self.slot_freed.notify_waiters();
        } else {
            trace!("Ignoring stale release of session {}", lease.id);
        }
        released
    }

    /// Drop a session whose transport failed mid-use and close it.
    pub async fn invalidate(&self, lease: &SessionLease) {
        if let Some(transport) = self.detach(lease) {
            self.close_sessions(vec![transport]).await;
        }
    }

    /// Like [`invalidate`](Self::invalidate) but closes in the background.
    /// Usable from `Drop`.
    pub(crate) fn discard(&self, lease: &SessionLease) {
        if let Some(transport) = self.detach(lease) {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move {
                        if let Err(e) = transport.close().await {
                            debug!("Error closing discarded session: {}", e);
                        }
                    });
                }
                Err(_) => warn!("No runtime to close discarded session {}", lease.id),
            }
        }
    }

    fn detach(&self, lease: &SessionLease) -> Option<Arc<dyn Transport>> {
        let detached = {
            let mut state = self.lock_state();
            let sessions = state.sessions.get_mut(&lease.key)?;
            let index = sessions
                .iter()
                .position(|s| s.holds(lease.id, lease.generation))?;
            let session = sessions.swap_remove(index);
            if sessions.is_empty() {
                state.sessions.remove(&lease.key);
            }
            session.transport
        };

        self.counters.invalidated.fetch_add(1, Ordering::Relaxed);
        debug!("Invalidated session {} for {}", lease.id, lease.key);
        self.slot_freed.notify_waiters();
        Some(detached)
    }

    /// Close every session for one endpoint, leased or not.
    pub async fn close_target(&self, target: &TargetConfig) -> usize {
        let key = target.key();
        let removed = self.lock_state().sessions.remove(&key).unwrap_or_default();
        let count = removed.len();
        if count > 0 {
            debug!("Closing {} session(s) for {}", count, key);
        }
        self.close_sessions(removed.into_iter().map(|s| s.transport).collect())
            .await;
        self.slot_freed.notify_waiters();
        count
    }

    /// Close every session regardless of lease state and empty the pool.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut state = self.lock_state();
            state
                .sessions
                .drain()
                .flat_map(|(_, sessions)| sessions)
                .map(|s| s.transport)
                .collect()
        };
        let count = drained.len();
        debug!("Closing all {} pooled session(s)", count);
        self.close_sessions(drained).await;
        self.slot_freed.notify_waiters();
        count
    }

    pub(super) async fn close_sessions(&self, transports: Vec<Arc<dyn Transport>>) {
        for transport in transports {
            if let Err(e) = transport.close().await {
                warn!("Error closing pooled session: {}", e);
            }
        }
    }

    /// Number of sessions held, free or leased.
    pub fn size(&self) -> usize {
        self.lock_state().sessions.values().map(Vec::len).sum()
    }

    pub fn stats(&self) -> PoolStats {
        let mut stats = {
            let state = self.lock_state();
            PoolStats {
                pooled_sessions: state.sessions.values().map(Vec::len).sum(),
                in_use_sessions: state
                    .sessions
                    .values()
                    .flatten()
                    .filter(|s| s.in_use)
                    .count(),
                endpoints: state.sessions.len(),
                ..Default::default()
            }
        };
        self.counters.fill(&mut stats);
        stats
    }
}

/// Connect slot held while a new session is being opened. Dropping it
/// without committing (failure or cancellation) frees the slot.
struct SlotReservation<'a> {
    pool: &'a ConnectionPool,
    key: TargetKey,
    committed: bool,
}

impl SlotReservation<'_> {
    fn commit(mut self, session: PooledSession) -> TargetKey {
        let mut state = self.pool.lock_state();
        state.release_connecting_slot(&self.key);
        state
            .sessions
            .entry(self.key.clone())
            .or_default()
            .push(session);
        drop(state);

        self.committed = true;
        self.key.clone()
    }
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.pool.lock_state().release_connecting_slot(&self.key);
            self.pool.slot_freed.notify_waiters();
        }
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.config)
            .field("size", &self.size())
            .finish()
    }
}
