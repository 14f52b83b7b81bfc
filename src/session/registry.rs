//! Session bookkeeping: join, leave, publish

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, trace};

use super::{Deliver, Delivery};
use crate::types::{IndexedRecord, SessionKey};

/// Backlog handed to a session when it joins.
#[derive(Debug, Clone, Default)]
pub struct ReplaySnapshot {
    /// Up to `M` most recent records, oldest first
    pub records: Vec<Arc<IndexedRecord>>,
    /// False when the session was already joined
    pub created: bool,
}

/// What one `publish` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Sessions the record was queued for
    pub delivered: usize,
    /// Deliveries that evicted an older queued record
    pub overflowed: usize,
    /// Sessions removed because their target was gone
    pub removed: usize,
}

#[derive(Debug)]
struct SessionState {
    /// Frame index of the newest record this session has been given
    last_delivered: Option<u64>,
    delivered: u64,
    /// Bumped on every join so a stale `Gone` cannot remove a re-joined session
    generation: u64,
}

#[derive(Debug)]
struct RegistryState {
    sessions: HashMap<SessionKey, SessionState>,
    replay: VecDeque<Arc<IndexedRecord>>,
}

/// Tracks joined sessions and fans records out to them.
///
/// The lock covers only the session map, markers and the replay ring. All
/// calls into [`Deliver`] happen after it is released, so a slow target
/// cannot hold up joins, leaves, or other sessions.
#[derive(Debug)]
pub struct SessionRegistry<D> {
    state: Mutex<RegistryState>,
    replay_capacity: usize,
    delivery: D,
}

impl<D: Deliver> SessionRegistry<D> {
    /// Create a registry keeping `replay_capacity` records for late joiners.
    pub fn new(replay_capacity: usize, delivery: D) -> Self {
        let replay_capacity = replay_capacity.max(1);
        Self {
            state: Mutex::new(RegistryState {
                sessions: HashMap::new(),
                replay: VecDeque::with_capacity(replay_capacity),
            }),
            replay_capacity,
            delivery,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join a session, creating it if absent, and return the current backlog.
    ///
    /// A new session's marker starts at the newest backlog record, so it
    /// receives every later publish exactly once and nothing from the backlog
    /// twice. Joining an existing session leaves its marker untouched.
    pub fn join(&self, key: SessionKey) -> ReplaySnapshot {
        let mut state = self.lock();
        let records: Vec<_> = state.replay.iter().cloned().collect();
        let newest = state.replay.back().map(|r| r.frame_index);

        let created = match state.sessions.get_mut(&key) {
            Some(session) => {
                session.generation += 1;
                debug!(session = %key, "Session re-joined");
                false
            }
            None => {
                state.sessions.insert(
                    key.clone(),
                    SessionState { last_delivered: newest, delivered: 0, generation: 0 },
                );
                info!(session = %key, backlog = records.len(), "Session joined");
                true
            }
        };

        ReplaySnapshot { records, created }
    }

    /// Remove a session. Unknown keys are ignored; returns whether it existed.
    pub fn leave(&self, key: &SessionKey) -> bool {
        let removed = self.lock().sessions.remove(key);
        match removed {
            Some(session) => {
                info!(session = %key, delivered = session.delivered, "Session left");
                true
            }
            None => {
                debug!(session = %key, "Leave for unknown session ignored");
                false
            }
        }
    }

    /// Retain a record for replay and push it to every session that has not
    /// yet been given it.
    pub fn publish(&self, record: Arc<IndexedRecord>) -> PublishOutcome {
        let frame_index = record.frame_index;

        let targets: Vec<(SessionKey, u64)> = {
            let mut state = self.lock();

            if state.replay.len() >= self.replay_capacity {
                state.replay.pop_front();
            }
            state.replay.push_back(Arc::clone(&record));

            state
                .sessions
                .iter_mut()
                .filter(|(_, session)| session.last_delivered.is_none_or(|m| m < frame_index))
                .map(|(key, session)| {
                    session.last_delivered = Some(frame_index);
                    session.delivered += 1;
                    (key.clone(), session.generation)
                })
                .collect()
        };

        let mut outcome = PublishOutcome::default();
        let mut gone = Vec::new();

        for (key, generation) in targets {
            match self.delivery.deliver(&key, &record) {
                Delivery::Delivered => outcome.delivered += 1,
                Delivery::Overflowed => {
                    outcome.delivered += 1;
                    outcome.overflowed += 1;
                }
                Delivery::Gone => gone.push((key, generation)),
            }
        }

        if !gone.is_empty() {
            let mut state = self.lock();
            for (key, generation) in gone {
                if state.sessions.get(&key).is_some_and(|s| s.generation == generation) {
                    state.sessions.remove(&key);
                    outcome.removed += 1;
                    debug!(session = %key, "Delivery target gone, session removed");
                }
            }
        }

        trace!(frame = frame_index, delivered = outcome.delivered, "Record published");
        outcome
    }

    /// Whether `key` is currently joined.
    pub fn contains(&self, key: &SessionKey) -> bool {
        self.lock().sessions.contains_key(key)
    }

    /// Number of joined sessions.
    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Records currently retained for replay.
    pub fn replay_len(&self) -> usize {
        self.lock().replay.len()
    }

    /// Frame index of the newest record published.
    pub fn last_published(&self) -> Option<u64> {
        self.lock().replay.back().map(|r| r.frame_index)
    }

    /// Frame index of the last record handed to `key`.
    pub fn last_delivered(&self, key: &SessionKey) -> Option<u64> {
        self.lock().sessions.get(key).and_then(|s| s.last_delivered)
    }

    pub fn delivery(&self) -> &D {
        &self.delivery
    }
}
