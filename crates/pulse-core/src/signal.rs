//! Trade signals produced by the signal engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Signal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalKind {
    /// Price expected to rise over the contract duration.
    Call,
    /// Price expected to fall.
    Put,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "CALL"),
            Self::Put => write!(f, "PUT"),
        }
    }
}

/// Contract duration unit, matching the broker's wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Tick,
    Second,
    Minute,
    Hour,
    Day,
}

impl DurationUnit {
    /// Single-letter wire code.
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::Tick => "t",
            Self::Second => "s",
            Self::Minute => "m",
            Self::Hour => "h",
            Self::Day => "d",
        }
    }
}

/// A contract duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDuration {
    pub value: u32,
    pub unit: DurationUnit,
}

impl ContractDuration {
    pub fn minutes(value: u32) -> Self {
        Self {
            value,
            unit: DurationUnit::Minute,
        }
    }
}

/// Snapshot of the indicator state at signal time.
///
/// Carried inside signal metadata so downstream consumers (risk audit,
/// external fan-out) see what the engine saw.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub rsi: f64,
    pub fast_ema: f64,
    pub slow_ema: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub bollinger_upper: f64,
    pub bollinger_middle: f64,
    pub bollinger_lower: f64,
    pub bollinger_width: f64,
    pub atr: f64,
    pub adx: f64,
    pub stochastic_k: f64,
    pub stochastic_d: f64,
    pub momentum: f64,
    pub volatility: f64,
}

/// Heterogeneous signal metadata.
///
/// Well-known fields are typed; anything else rides in `extra` and is
/// never interpreted by the core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalMetadata {
    /// Indicator state at signal time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indicators: Option<IndicatorSnapshot>,
    /// Opaque ML-overlay payload, carried through untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_inference: Option<serde_json::Value>,
    /// Unknown fields, carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A candidate trade intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub market: String,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Which rule fired and why.
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<ContractDuration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stake_multiplier: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SignalMetadata>,
}

impl Signal {
    /// Create a signal, clamping confidence into [0, 1].
    pub fn new(
        kind: SignalKind,
        market: impl Into<String>,
        confidence: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            market: market.into(),
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.into(),
            timestamp: Utc::now(),
            duration: None,
            stake_multiplier: None,
            metadata: None,
        }
    }

    pub fn with_duration(mut self, duration: ContractDuration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_metadata(mut self, metadata: SignalMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
