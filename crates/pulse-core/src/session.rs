//! Sessions: multi-participant trading contexts with shared configuration.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    Pending,
    Active,
    Running,
    Paused,
    Completed,
}

impl SessionStatus {
    /// Allowed successor statuses.
    pub fn successors(&self) -> &'static [SessionStatus] {
        match self {
            Self::Pending => &[Self::Active],
            Self::Active => &[Self::Running, Self::Paused, Self::Completed],
            Self::Running => &[Self::Paused, Self::Completed],
            Self::Paused => &[Self::Running, Self::Completed],
            Self::Completed => &[],
        }
    }

    /// Whether `next` is a legal transition target from this status.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        self.successors().contains(&next)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Running => write!(f, "RUNNING"),
            Self::Paused => write!(f, "PAUSED"),
            Self::Completed => write!(f, "COMPLETED"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "ACTIVE" => Ok(Self::Active),
            "RUNNING" => Ok(Self::Running),
            "PAUSED" => Ok(Self::Paused),
            "COMPLETED" => Ok(Self::Completed),
            other => Err(crate::error::CoreError::InvalidConfig(format!(
                "unknown session status {other}"
            ))),
        }
    }
}

/// Participant lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParticipantStatus {
    Pending,
    Active,
    Failed,
    Removed,
    OptedOut,
}

impl std::fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Failed => write!(f, "FAILED"),
            Self::Removed => write!(f, "REMOVED"),
            Self::OptedOut => write!(f, "OPTED_OUT"),
        }
    }
}

impl std::str::FromStr for ParticipantStatus {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "ACTIVE" => Ok(Self::Active),
            "FAILED" => Ok(Self::Failed),
            "REMOVED" => Ok(Self::Removed),
            "OPTED_OUT" => Ok(Self::OptedOut),
            other => Err(crate::error::CoreError::InvalidConfig(format!(
                "unknown participant status {other}"
            ))),
        }
    }
}

/// Risk appetite tier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskProfile {
    Low,
    Medium,
    High,
}

/// Parameters a risk profile resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskProfileParams {
    /// Multiplier applied to session max stake and recommended stake.
    pub stake_multiplier: Decimal,
    /// Confidence floor layered over the session's own floor.
    pub min_confidence: f64,
}

impl RiskProfile {
    /// Built-in parameter table. The config envelope may override these.
    pub fn params(&self) -> RiskProfileParams {
        match self {
            Self::Low => RiskProfileParams {
                stake_multiplier: Decimal::new(5, 1), // 0.5
                min_confidence: 0.8,
            },
            Self::Medium => RiskProfileParams {
                stake_multiplier: Decimal::ONE,
                min_confidence: 0.65,
            },
            Self::High => RiskProfileParams {
                stake_multiplier: Decimal::new(15, 1), // 1.5
                min_confidence: 0.5,
            },
        }
    }
}

/// Session-wide trading configuration.
///
/// Immutable after creation except `is_paused`; aggregated PnL lives on
/// the session itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub risk_profile: RiskProfile,
    pub max_stake: Decimal,
    pub min_confidence: f64,
    /// Markets this session trades. Empty means all markets.
    #[serde(default)]
    pub allowed_markets: HashSet<String>,
    /// Session stops trading once aggregated PnL drops below the negation
    /// of this threshold.
    pub global_loss_threshold: Decimal,
    #[serde(default)]
    pub is_paused: bool,
}

impl SessionConfig {
    /// Whether this session trades the given market.
    pub fn allows_market(&self, market: &str) -> bool {
        self.allowed_markets.is_empty() || self.allowed_markets.contains(market)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            risk_profile: RiskProfile::Medium,
            max_stake: Decimal::from(100),
            min_confidence: 0.6,
            allowed_markets: HashSet::new(),
            global_loss_threshold: Decimal::from(500),
            is_paused: false,
        }
    }
}

/// A user enrolled in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: String,
    pub status: ParticipantStatus,
    pub pnl: Decimal,
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            status: ParticipantStatus::Active,
            pnl: Decimal::ZERO,
            joined_at: Utc::now(),
        }
    }
}

/// A scoped multi-participant trading context.
///
/// Participants are kept in join order; the risk fan-out iterates that
/// order. The registry is the only writer; everyone else sees clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub status: SessionStatus,
    pub config: SessionConfig,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub participants: Vec<Participant>,
    pub admin_id: String,
    /// Aggregated PnL across participants.
    pub current_pnl: Decimal,
}

impl Session {
    pub fn new(id: impl Into<String>, config: SessionConfig, admin_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: SessionStatus::Pending,
            config,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            participants: Vec::new(),
            admin_id: admin_id.into(),
            current_pnl: Decimal::ZERO,
        }
    }

    /// Look up a participant by user id.
    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    /// Position of a participant in join order.
    pub fn participant_position(&self, user_id: &str) -> Option<usize> {
        self.participants.iter().position(|p| p.user_id == user_id)
    }

    pub(crate) fn participant_mut(&mut self, user_id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.user_id == user_id)
    }

    /// Participants eligible for trade evaluation, in join order.
    pub fn active_participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants
            .iter()
            .filter(|p| p.status == ParticipantStatus::Active)
    }

    /// Count of participants that still occupy a seat (everything but
    /// REMOVED tombstones).
    pub fn seat_count(&self) -> usize {
        self.participants
            .iter()
            .filter(|p| p.status != ParticipantStatus::Removed)
            .count()
    }

    /// Mark a participant removed (tombstone, never deleted).
    pub fn tombstone_participant(&mut self, user_id: &str) -> bool {
        match self.participant_mut(user_id) {
            Some(p) => {
                p.status = ParticipantStatus::Removed;
                true
            }
            None => false,
        }
    }

    /// Additively update a participant's PnL and the session aggregate.
    pub fn apply_pnl(&mut self, user_id: &str, delta: Decimal) -> bool {
        match self.participant_mut(user_id) {
            Some(p) => {
                p.pnl += delta;
                self.current_pnl += delta;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_transition_table() {
        use SessionStatus::*;
        assert!(Pending.can_transition_to(Active));
        assert!(!Pending.can_transition_to(Running));
        assert!(Active.can_transition_to(Running));
        assert!(Running.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Running));
        assert!(Paused.can_transition_to(Completed));
        assert!(Completed.successors().is_empty());
        assert!(!Completed.can_transition_to(Pending));
    }

    #[test]
    fn test_allows_market() {
        let mut config = SessionConfig::default();
        assert!(config.allows_market("R_100"));

        config.allowed_markets.insert("R_100".to_string());
        assert!(config.allows_market("R_100"));
        assert!(!config.allows_market("R_50"));
    }

    #[test]
    fn test_apply_pnl_is_additive() {
        let mut session = Session::new("s1", SessionConfig::default(), "admin");
        session.participants.push(Participant::new("u1"));

        assert!(session.apply_pnl("u1", dec!(12.5)));
        assert!(session.apply_pnl("u1", dec!(-4.5)));
        assert_eq!(session.participant("u1").unwrap().pnl, dec!(8.0));
        assert_eq!(session.current_pnl, dec!(8.0));
        assert!(!session.apply_pnl("ghost", dec!(1)));
    }

    #[test]
    fn test_tombstone_keeps_participant() {
        let mut session = Session::new("s1", SessionConfig::default(), "admin");
        session.participants.push(Participant::new("u1"));
        assert!(session.tombstone_participant("u1"));
        assert_eq!(session.participants.len(), 1);
        assert_eq!(
            session.participant("u1").unwrap().status,
            ParticipantStatus::Removed
        );
        assert_eq!(session.seat_count(), 0);
    }

    #[test]
    fn test_profile_params() {
        assert_eq!(RiskProfile::Low.params().stake_multiplier, dec!(0.5));
        assert_eq!(RiskProfile::Medium.params().min_confidence, 0.65);
        assert_eq!(RiskProfile::High.params().stake_multiplier, dec!(1.5));
    }
}
