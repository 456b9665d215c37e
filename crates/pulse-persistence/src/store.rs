//! Durable relational store interface.
//!
//! Tables: `sessions`, `participants`, `trades`. Trades are written at
//! submission (status OPEN) and updated at settlement.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use pulse_core::SessionConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One row in the `sessions` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: String,
    pub status: String,
    /// The session config. Some store drivers hand back a JSON string,
    /// others a parsed value; `parse_config_json` accepts both.
    pub config_json: serde_json::Value,
    pub admin_id: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub current_pnl: Decimal,
}

/// One row in the `participants` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantRow {
    pub session_id: String,
    pub user_id: String,
    pub status: String,
    pub pnl: Decimal,
    pub joined_at: DateTime<Utc>,
}

/// One row in the `trades` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRow {
    pub trade_id: String,
    pub user_id: String,
    pub session_id: String,
    pub market: String,
    /// OPEN, WON or LOST.
    pub status: String,
    pub stake: Decimal,
    pub entry_price: Option<Decimal>,
    pub exit_price: Option<Decimal>,
    pub pnl: Decimal,
    pub contract_id: Option<String>,
    pub broker_ref: Option<String>,
    pub executed_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

/// Parse a `config_json` column whether the driver returned a JSON string
/// or an already-parsed value.
pub fn parse_config_json(value: &serde_json::Value) -> StoreResult<SessionConfig> {
    match value {
        serde_json::Value::String(s) => Ok(serde_json::from_str(s)?),
        other => Ok(serde_json::from_value(other.clone())?),
    }
}

/// The durable store capability.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn upsert_session(&self, row: &SessionRow) -> StoreResult<()>;
    async fn upsert_participant(&self, row: &ParticipantRow) -> StoreResult<()>;

    /// Sessions with status in {ACTIVE, RUNNING, PAUSED}, for recovery.
    async fn load_recoverable_sessions(&self) -> StoreResult<Vec<SessionRow>>;
    async fn load_participants(&self, session_id: &str) -> StoreResult<Vec<ParticipantRow>>;

    async fn insert_trade(&self, row: &TradeRow) -> StoreResult<()>;
    async fn settle_trade(
        &self,
        trade_id: &str,
        status: &str,
        pnl: Decimal,
        exit_price: Option<Decimal>,
        settled_at: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn open_trades_for_user(&self, user_id: &str) -> StoreResult<Vec<TradeRow>>;
}

/// In-memory store for tests and single-node runs.
#[derive(Default)]
pub struct InMemoryStore {
    sessions: RwLock<HashMap<String, SessionRow>>,
    participants: RwLock<Vec<ParticipantRow>>,
    trades: RwLock<HashMap<String, TradeRow>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trade(&self, trade_id: &str) -> Option<TradeRow> {
        self.trades.read().get(trade_id).cloned()
    }

    pub fn trade_count(&self) -> usize {
        self.trades.read().len()
    }
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn upsert_session(&self, row: &SessionRow) -> StoreResult<()> {
        self.sessions.write().insert(row.id.clone(), row.clone());
        Ok(())
    }

    async fn upsert_participant(&self, row: &ParticipantRow) -> StoreResult<()> {
        let mut participants = self.participants.write();
        match participants
            .iter_mut()
            .find(|p| p.session_id == row.session_id && p.user_id == row.user_id)
        {
            Some(existing) => *existing = row.clone(),
            None => participants.push(row.clone()),
        }
        Ok(())
    }

    async fn load_recoverable_sessions(&self) -> StoreResult<Vec<SessionRow>> {
        Ok(self
            .sessions
            .read()
            .values()
            .filter(|row| matches!(row.status.as_str(), "ACTIVE" | "RUNNING" | "PAUSED"))
            .cloned()
            .collect())
    }

    async fn load_participants(&self, session_id: &str) -> StoreResult<Vec<ParticipantRow>> {
        Ok(self
            .participants
            .read()
            .iter()
            .filter(|p| p.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn insert_trade(&self, row: &TradeRow) -> StoreResult<()> {
        self.trades.write().insert(row.trade_id.clone(), row.clone());
        Ok(())
    }

    async fn settle_trade(
        &self,
        trade_id: &str,
        status: &str,
        pnl: Decimal,
        exit_price: Option<Decimal>,
        settled_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut trades = self.trades.write();
        let row = trades
            .get_mut(trade_id)
            .ok_or_else(|| StoreError::NotFound(trade_id.to_string()))?;
        row.status = status.to_string();
        row.pnl = pnl;
        row.exit_price = exit_price;
        row.settled_at = Some(settled_at);
        Ok(())
    }

    async fn open_trades_for_user(&self, user_id: &str) -> StoreResult<Vec<TradeRow>> {
        Ok(self
            .trades
            .read()
            .values()
            .filter(|t| t.user_id == user_id && t.status == "OPEN")
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade_row(id: &str, status: &str) -> TradeRow {
        TradeRow {
            trade_id: id.to_string(),
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            market: "R_100".to_string(),
            status: status.to_string(),
            stake: dec!(10),
            entry_price: Some(dec!(1234.5)),
            exit_price: None,
            pnl: Decimal::ZERO,
            contract_id: Some("c-1".to_string()),
            broker_ref: None,
            executed_at: Utc::now(),
            settled_at: None,
        }
    }

    #[test]
    fn test_parse_config_json_accepts_string_and_value() {
        let object = serde_json::json!({
            "risk_profile": "MEDIUM",
            "max_stake": "50",
            "min_confidence": 0.7,
            "allowed_markets": ["R_100"],
            "global_loss_threshold": "200"
        });
        let from_value = parse_config_json(&object).unwrap();
        assert_eq!(from_value.min_confidence, 0.7);

        let as_string = serde_json::Value::String(object.to_string());
        let from_string = parse_config_json(&as_string).unwrap();
        assert_eq!(from_string, from_value);
    }

    #[tokio::test]
    async fn test_trade_lifecycle_rows() {
        let store = InMemoryStore::new();
        store.insert_trade(&trade_row("t1", "OPEN")).await.unwrap();
        assert_eq!(store.open_trades_for_user("u1").await.unwrap().len(), 1);

        store
            .settle_trade("t1", "WON", dec!(8.5), Some(dec!(1240.0)), Utc::now())
            .await
            .unwrap();
        let row = store.trade("t1").unwrap();
        assert_eq!(row.status, "WON");
        assert_eq!(row.pnl, dec!(8.5));
        assert!(row.settled_at.is_some());
        assert!(store.open_trades_for_user("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_settle_unknown_trade_errors() {
        let store = InMemoryStore::new();
        let result = store
            .settle_trade("ghost", "WON", dec!(1), None, Utc::now())
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_recoverable_sessions_filter() {
        let store = InMemoryStore::new();
        for (id, status) in [
            ("s1", "ACTIVE"),
            ("s2", "RUNNING"),
            ("s3", "PAUSED"),
            ("s4", "COMPLETED"),
            ("s5", "PENDING"),
        ] {
            store
                .upsert_session(&SessionRow {
                    id: id.to_string(),
                    status: status.to_string(),
                    config_json: serde_json::json!({}),
                    admin_id: "admin".to_string(),
                    created_at: Utc::now(),
                    started_at: None,
                    completed_at: None,
                    current_pnl: Decimal::ZERO,
                })
                .await
                .unwrap();
        }
        let mut ids: Vec<String> = store
            .load_recoverable_sessions()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["s1", "s2", "s3"]);
    }
}
