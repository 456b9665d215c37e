//! Application configuration.
//!
//! TOML envelope with serde-default fields. The broker app id is the one
//! mandatory setting: the process refuses to start without it.

use crate::error::{AppError, AppResult};
use pulse_core::{ContractDuration, DurationUnit, RiskProfile, RiskProfileParams};
use pulse_executor::{ExecutorConfig, StakePolicy};
use pulse_feed::FeedConfig;
use pulse_registry::RegistryConfig;
use pulse_risk::RiskProfileTable;
use pulse_ws::BrokerConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSettings {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Mandatory; validated non-empty at load.
    pub app_id: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
    #[serde(default = "default_circuit_window_ms")]
    pub circuit_window_ms: u64,
    #[serde(default = "default_circuit_threshold")]
    pub circuit_threshold: usize,
}

fn default_ws_url() -> String {
    "wss://ws.derivws.com/websockets/v3".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_heartbeat_interval_ms() -> u64 {
    10_000
}
fn default_heartbeat_timeout_ms() -> u64 {
    15_000
}
fn default_reconnect_base_ms() -> u64 {
    1_000
}
fn default_reconnect_max_ms() -> u64 {
    30_000
}
fn default_circuit_window_ms() -> u64 {
    30_000
}
fn default_circuit_threshold() -> usize {
    5
}

/// Market data pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSettings {
    #[serde(default = "default_tick_queue_capacity")]
    pub tick_queue_capacity: usize,
    #[serde(default = "default_tick_overflow_drop")]
    pub tick_overflow_drop: usize,
    #[serde(default = "default_batch_interval_ms")]
    pub batch_interval_ms: u64,
    #[serde(default = "default_volatility_window")]
    pub volatility_window: usize,
}

fn default_tick_queue_capacity() -> usize {
    100
}
fn default_tick_overflow_drop() -> usize {
    10
}
fn default_batch_interval_ms() -> u64 {
    50
}
fn default_volatility_window() -> usize {
    20
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            tick_queue_capacity: default_tick_queue_capacity(),
            tick_overflow_drop: default_tick_overflow_drop(),
            batch_interval_ms: default_batch_interval_ms(),
            volatility_window: default_volatility_window(),
        }
    }
}

/// Default stake policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakeSettings {
    #[serde(default = "default_stake_base")]
    pub base: Decimal,
    #[serde(default = "default_stake_min")]
    pub min: Decimal,
    #[serde(default = "default_stake_max")]
    pub max: Decimal,
    #[serde(default = "default_confidence_mult")]
    pub confidence_mult: bool,
}

fn default_stake_base() -> Decimal {
    Decimal::from(10)
}
fn default_stake_min() -> Decimal {
    Decimal::ONE
}
fn default_stake_max() -> Decimal {
    Decimal::from(100)
}
fn default_confidence_mult() -> bool {
    true
}

impl Default for StakeSettings {
    fn default() -> Self {
        Self {
            base: default_stake_base(),
            min: default_stake_min(),
            max: default_stake_max(),
            confidence_mult: default_confidence_mult(),
        }
    }
}

/// Default contract duration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurationSettings {
    #[serde(default = "default_duration_value")]
    pub value: u32,
    /// One of t/s/m/h/d.
    #[serde(default = "default_duration_unit")]
    pub unit: String,
}

fn default_duration_value() -> u32 {
    3
}
fn default_duration_unit() -> String {
    "m".to_string()
}

impl Default for DurationSettings {
    fn default() -> Self {
        Self {
            value: default_duration_value(),
            unit: default_duration_unit(),
        }
    }
}

impl DurationSettings {
    fn to_duration(&self) -> AppResult<ContractDuration> {
        let unit = match self.unit.as_str() {
            "t" => DurationUnit::Tick,
            "s" => DurationUnit::Second,
            "m" => DurationUnit::Minute,
            "h" => DurationUnit::Hour,
            "d" => DurationUnit::Day,
            other => {
                return Err(AppError::MissingConfig(format!(
                    "unknown duration unit {other}"
                )))
            }
        };
        Ok(ContractDuration {
            value: self.value,
            unit,
        })
    }
}

/// Execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorSettings {
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_idempotency_ttl_s")]
    pub idempotency_ttl_s: u64,
    #[serde(default = "default_settlement_timeout_s")]
    pub settlement_timeout_s: u64,
    #[serde(default)]
    pub default_stake: StakeSettings,
    #[serde(default)]
    pub default_duration: DurationSettings,
}

fn default_currency() -> String {
    "USD".to_string()
}
fn default_idempotency_ttl_s() -> u64 {
    3_600
}
fn default_settlement_timeout_s() -> u64 {
    300
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            idempotency_ttl_s: default_idempotency_ttl_s(),
            settlement_timeout_s: default_settlement_timeout_s(),
            default_stake: StakeSettings::default(),
            default_duration: DurationSettings::default(),
        }
    }
}

/// One risk profile override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSettings {
    pub stake_mult: Decimal,
    pub min_conf: f64,
}

/// Risk guard settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskSettings {
    /// Overrides by profile name (LOW/MEDIUM/HIGH).
    #[serde(default)]
    pub profiles: HashMap<String, ProfileSettings>,
}

/// Session registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySettings {
    #[serde(default = "default_max_participants")]
    pub max_participants: usize,
}

fn default_max_participants() -> usize {
    10
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            max_participants: default_max_participants(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub broker: BrokerSettings,
    #[serde(default)]
    pub feed: FeedSettings,
    #[serde(default)]
    pub executor: ExecutorSettings,
    #[serde(default)]
    pub risk: RiskSettings,
    #[serde(default)]
    pub registry: RegistrySettings,
    /// Markets the shared ticker client subscribes to at startup.
    #[serde(default)]
    pub markets: Vec<String>,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Fatal-at-startup validation.
    pub fn validate(&self) -> AppResult<()> {
        if self.broker.app_id.trim().is_empty() {
            return Err(AppError::MissingConfig("broker.app_id".to_string()));
        }
        self.executor.default_duration.to_duration()?;
        Ok(())
    }

    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            url: self.broker.ws_url.clone(),
            app_id: self.broker.app_id.clone(),
            connect_timeout_ms: self.broker.connect_timeout_ms,
            request_timeout_ms: self.broker.request_timeout_ms,
            heartbeat_interval_ms: self.broker.heartbeat_interval_ms,
            heartbeat_timeout_ms: self.broker.heartbeat_timeout_ms,
            reconnect_base_ms: self.broker.reconnect_base_ms,
            reconnect_max_ms: self.broker.reconnect_max_ms,
            circuit_window_ms: self.broker.circuit_window_ms,
            circuit_threshold: self.broker.circuit_threshold,
            reconnect: true,
        }
    }

    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            queue_capacity: self.feed.tick_queue_capacity,
            overflow_drop: self.feed.tick_overflow_drop,
            batch_interval_ms: self.feed.batch_interval_ms,
            volatility_window: self.feed.volatility_window,
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            currency: self.executor.currency.clone(),
            stake: StakePolicy {
                base: self.executor.default_stake.base,
                min: self.executor.default_stake.min,
                max: self.executor.default_stake.max,
                confidence_mult: self.executor.default_stake.confidence_mult,
            },
            default_duration: self
                .executor
                .default_duration
                .to_duration()
                .expect("validated at load"),
            settlement_timeout: Duration::from_secs(self.executor.settlement_timeout_s),
            idempotency_ttl: Duration::from_secs(self.executor.idempotency_ttl_s),
        }
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            max_participants: self.registry.max_participants,
        }
    }

    /// Built-in profile table with config overrides layered on top.
    pub fn profile_table(&self) -> RiskProfileTable {
        let mut table = RiskProfileTable::default();
        for (name, settings) in &self.risk.profiles {
            let profile = match name.to_uppercase().as_str() {
                "LOW" => RiskProfile::Low,
                "MEDIUM" => RiskProfile::Medium,
                "HIGH" => RiskProfile::High,
                _ => continue,
            };
            table = table.with_override(
                profile,
                RiskProfileParams {
                    stake_multiplier: settings.stake_mult,
                    min_confidence: settings.min_conf,
                },
            );
        }
        table
    }
}
