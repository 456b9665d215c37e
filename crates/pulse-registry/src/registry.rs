//! The session registry implementation.
//!
//! All mutation happens under one write lock: a mutator clones the
//! session, edits the clone, and swaps it back in, so readers holding
//! earlier snapshots never observe partial updates. Persistence is
//! best-effort after the in-memory commit; a store failure is logged and
//! never unwinds a mutation.

use crate::error::{RegistryError, RegistryResult};
use chrono::Utc;
use parking_lot::RwLock;
use pulse_core::{
    EventBus, Participant, ParticipantStatus, PipelineEvent, Session, SessionConfig, SessionStatus,
};
use pulse_persistence::{
    parse_config_json, DurableStore, ParticipantRow, SessionRow, StoreResult,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub max_participants: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_participants: 10,
        }
    }
}

struct RegistryInner {
    /// Session ids in creation order; fan-out iterates this order.
    order: Vec<String>,
    sessions: HashMap<String, Session>,
}

/// Single owner of session/participant state.
pub struct SessionRegistry {
    config: RegistryConfig,
    inner: RwLock<RegistryInner>,
    store: Option<Arc<dyn DurableStore>>,
    events: EventBus,
}

impl SessionRegistry {
    pub fn new(
        config: RegistryConfig,
        store: Option<Arc<dyn DurableStore>>,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            inner: RwLock::new(RegistryInner {
                order: Vec::new(),
                sessions: HashMap::new(),
            }),
            store,
            events,
        }
    }

    /// Create a PENDING session and return its snapshot.
    pub async fn create_session(&self, config: SessionConfig, admin_id: &str) -> Session {
        let session = Session::new(Uuid::new_v4().to_string(), config, admin_id);
        {
            let mut inner = self.inner.write();
            inner.order.push(session.id.clone());
            inner.sessions.insert(session.id.clone(), session.clone());
        }
        info!(session_id = %session.id, "session created");
        self.persist_session(&session).await;
        session
    }

    /// Deep snapshot of one session.
    pub fn get(&self, id: &str) -> Option<Session> {
        self.inner.read().sessions.get(id).cloned()
    }

    /// Deep snapshots of every session, in registry order.
    pub fn sessions(&self) -> Vec<Session> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.sessions.get(id).cloned())
            .collect()
    }

    /// RUNNING sessions that trade the given market, in registry order.
    pub fn running_sessions_for_market(&self, market: &str) -> Vec<Session> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.sessions.get(id))
            .filter(|s| s.status == SessionStatus::Running && s.config.allows_market(market))
            .cloned()
            .collect()
    }

    /// Sessions the risk fan-out evaluates for a market: RUNNING plus
    /// PAUSED (the guard rejects the latter with SESSION_PAUSED), in
    /// registry order.
    pub fn sessions_for_market(&self, market: &str) -> Vec<Session> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.sessions.get(id))
            .filter(|s| {
                matches!(s.status, SessionStatus::Running | SessionStatus::Paused)
                    && s.config.allows_market(market)
            })
            .cloned()
            .collect()
    }

    /// Apply a status transition, enforcing the successor table.
    ///
    /// Entering ACTIVE stamps `started_at`, COMPLETED stamps
    /// `completed_at`; PAUSED/RUNNING toggle the config pause flag so the
    /// risk guard sees paused sessions in its snapshot.
    pub async fn transition(&self, id: &str, next: SessionStatus) -> RegistryResult<Session> {
        let updated = {
            let mut inner = self.inner.write();
            let current = inner
                .sessions
                .get(id)
                .ok_or_else(|| RegistryError::UnknownSession(id.to_string()))?;

            if !current.status.can_transition_to(next) {
                return Err(RegistryError::InvalidTransition {
                    from: current.status,
                    to: next,
                });
            }

            let mut session = current.clone();
            session.status = next;
            match next {
                SessionStatus::Active => session.started_at = Some(Utc::now()),
                SessionStatus::Completed => session.completed_at = Some(Utc::now()),
                SessionStatus::Paused => session.config.is_paused = true,
                SessionStatus::Running => session.config.is_paused = false,
                SessionStatus::Pending => {}
            }
            inner.sessions.insert(id.to_string(), session.clone());
            session
        };

        debug!(session_id = id, status = %next, "session transition");
        self.events.publish(PipelineEvent::SessionStatusUpdate {
            session_id: id.to_string(),
            status: next,
        });
        self.persist_session(&updated).await;
        Ok(updated)
    }

    /// Enroll a user. Seats are bounded; tombstoned seats stay occupied
    /// by their history but free the capacity they held.
    pub async fn add_participant(&self, id: &str, user_id: &str) -> RegistryResult<Participant> {
        let (session, participant) = {
            let mut inner = self.inner.write();
            let current = inner
                .sessions
                .get(id)
                .ok_or_else(|| RegistryError::UnknownSession(id.to_string()))?;

            if let Some(existing) = current.participant(user_id) {
                if existing.status != ParticipantStatus::Removed {
                    return Ok(existing.clone());
                }
            }
            if current.seat_count() >= self.config.max_participants {
                return Err(RegistryError::SessionFull {
                    max: self.config.max_participants,
                });
            }

            let mut session = current.clone();
            let participant = match session.participant_position(user_id) {
                // Revive a tombstoned seat in place.
                Some(pos) => {
                    session.participants[pos].status = ParticipantStatus::Active;
                    session.participants[pos].clone()
                }
                None => {
                    let participant = Participant::new(user_id);
                    session.participants.push(participant.clone());
                    participant
                }
            };
            inner.sessions.insert(id.to_string(), session.clone());
            (session, participant)
        };

        debug!(session_id = id, user_id, "participant added");
        self.persist_participant(&session.id, &participant).await;
        Ok(participant)
    }

    /// Tombstone a participant. The row is marked REMOVED, never deleted.
    pub async fn remove_participant(&self, id: &str, user_id: &str) -> RegistryResult<()> {
        let (session, participant) = {
            let mut inner = self.inner.write();
            let current = inner
                .sessions
                .get(id)
                .ok_or_else(|| RegistryError::UnknownSession(id.to_string()))?;

            let mut session = current.clone();
            if !session.tombstone_participant(user_id) {
                return Err(RegistryError::UnknownParticipant {
                    session_id: id.to_string(),
                    user_id: user_id.to_string(),
                });
            }
            let participant = session.participant(user_id).cloned().expect("just updated");
            inner.sessions.insert(id.to_string(), session.clone());
            (session, participant)
        };

        debug!(session_id = id, user_id, "participant removed");
        self.persist_participant(&session.id, &participant).await;
        Ok(())
    }

    /// Additively update a participant's PnL and the session aggregate.
    pub async fn update_pnl(&self, id: &str, user_id: &str, delta: Decimal) -> RegistryResult<()> {
        let (session, participant) = {
            let mut inner = self.inner.write();
            let current = inner
                .sessions
                .get(id)
                .ok_or_else(|| RegistryError::UnknownSession(id.to_string()))?;

            let mut session = current.clone();
            if !session.apply_pnl(user_id, delta) {
                return Err(RegistryError::UnknownParticipant {
                    session_id: id.to_string(),
                    user_id: user_id.to_string(),
                });
            }
            let participant = session.participant(user_id).cloned().expect("just updated");
            inner.sessions.insert(id.to_string(), session.clone());
            (session, participant)
        };

        self.persist_session(&session).await;
        self.persist_participant(&session.id, &participant).await;
        Ok(())
    }

    /// Pause every RUNNING session trading `market` (empty allow-list
    /// means every market). Returns the ids paused.
    pub async fn pause_sessions_by_market(&self, market: &str) -> Vec<String> {
        let candidates: Vec<String> = {
            let inner = self.inner.read();
            inner
                .order
                .iter()
                .filter_map(|id| inner.sessions.get(id))
                .filter(|s| {
                    s.status == SessionStatus::Running
                        && (s.config.allowed_markets.is_empty()
                            || s.config.allowed_markets.contains(market))
                })
                .map(|s| s.id.clone())
                .collect()
        };

        let mut paused = Vec::new();
        for id in candidates {
            match self.transition(&id, SessionStatus::Paused).await {
                Ok(_) => paused.push(id),
                Err(e) => warn!(session_id = %id, error = %e, "pause failed"),
            }
        }
        if !paused.is_empty() {
            info!(market, count = paused.len(), "sessions paused by market event");
        }
        paused
    }

    /// Resume PAUSED sessions trading `market` back to RUNNING.
    pub async fn resume_sessions_by_market(&self, market: &str) -> Vec<String> {
        let candidates: Vec<String> = {
            let inner = self.inner.read();
            inner
                .order
                .iter()
                .filter_map(|id| inner.sessions.get(id))
                .filter(|s| {
                    s.status == SessionStatus::Paused
                        && (s.config.allowed_markets.is_empty()
                            || s.config.allowed_markets.contains(market))
                })
                .map(|s| s.id.clone())
                .collect()
        };

        let mut resumed = Vec::new();
        for id in candidates {
            match self.transition(&id, SessionStatus::Running).await {
                Ok(_) => resumed.push(id),
                Err(e) => warn!(session_id = %id, error = %e, "resume failed"),
            }
        }
        if !resumed.is_empty() {
            info!(market, count = resumed.len(), "sessions resumed by market event");
        }
        resumed
    }

    /// Rebuild the in-memory map from the durable store.
    ///
    /// Individually corrupt rows are logged and skipped; recovery never
    /// fails the whole startup over one bad session.
    pub async fn recover(&self, store: &dyn DurableStore) -> StoreResult<usize> {
        let rows = store.load_recoverable_sessions().await?;
        let mut recovered = 0;

        for row in rows {
            let status: SessionStatus = match row.status.parse() {
                Ok(status) => status,
                Err(e) => {
                    warn!(session_id = %row.id, error = %e, "skipping session with bad status");
                    continue;
                }
            };
            let config = match parse_config_json(&row.config_json) {
                Ok(config) => config,
                Err(e) => {
                    warn!(session_id = %row.id, error = %e, "skipping session with bad config");
                    continue;
                }
            };

            let mut session = Session::new(row.id.clone(), config, row.admin_id.clone());
            session.status = status;
            session.created_at = row.created_at;
            session.started_at = row.started_at;
            session.completed_at = row.completed_at;
            session.current_pnl = row.current_pnl;
            session.config.is_paused = status == SessionStatus::Paused;

            for p in store.load_participants(&row.id).await? {
                let p_status: ParticipantStatus = match p.status.parse() {
                    Ok(status) => status,
                    Err(e) => {
                        warn!(session_id = %row.id, user_id = %p.user_id, error = %e,
                              "skipping participant with bad status");
                        continue;
                    }
                };
                if p_status == ParticipantStatus::Removed {
                    continue;
                }
                session.participants.push(Participant {
                    user_id: p.user_id,
                    status: p_status,
                    pnl: p.pnl,
                    joined_at: p.joined_at,
                });
            }

            let mut inner = self.inner.write();
            if !inner.sessions.contains_key(&session.id) {
                inner.order.push(session.id.clone());
            }
            inner.sessions.insert(session.id.clone(), session);
            recovered += 1;
        }

        info!(recovered, "session registry recovered");
        Ok(recovered)
    }

    async fn persist_session(&self, session: &Session) {
        let Some(store) = &self.store else { return };
        let row = SessionRow {
            id: session.id.clone(),
            status: session.status.to_string(),
            config_json: serde_json::to_value(&session.config).unwrap_or_default(),
            admin_id: session.admin_id.clone(),
            created_at: session.created_at,
            started_at: session.started_at,
            completed_at: session.completed_at,
            current_pnl: session.current_pnl,
        };
        if let Err(e) = store.upsert_session(&row).await {
            warn!(session_id = %session.id, error = %e, "session persist failed");
        }
    }

    async fn persist_participant(&self, session_id: &str, participant: &Participant) {
        let Some(store) = &self.store else { return };
        let row = ParticipantRow {
            session_id: session_id.to_string(),
            user_id: participant.user_id.clone(),
            status: participant.status.to_string(),
            pnl: participant.pnl,
            joined_at: participant.joined_at,
        };
        if let Err(e) = store.upsert_participant(&row).await {
            warn!(session_id, user_id = %participant.user_id, error = %e,
                  "participant persist failed");
        }
    }
}
