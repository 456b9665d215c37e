//! Broker wire frames.
//!
//! Outbound requests are plain serde structs; each carries a `req_id` the
//! broker echoes back. Inbound frames are routed by `msg_type`: ticks,
//! settlement updates, and pongs are stream frames, everything else
//! resolves a pending request.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// Outbound requests
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct TicksRequest {
    pub ticks: String,
    pub subscribe: u8,
    pub req_id: u64,
}

impl TicksRequest {
    pub fn new(market: &str, req_id: u64) -> Self {
        Self {
            ticks: market.to_string(),
            subscribe: 1,
            req_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ForgetRequest {
    /// Subscription id returned when the stream was opened.
    pub forget: String,
    pub req_id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizeRequest {
    pub authorize: String,
    pub req_id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProposalRequest {
    pub proposal: u8,
    pub amount: Decimal,
    pub basis: String,
    pub contract_type: String,
    pub currency: String,
    pub duration: u32,
    pub duration_unit: String,
    pub symbol: String,
    pub req_id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuyRequest {
    /// Proposal id from a preceding successful `proposal`.
    pub buy: String,
    pub price: Decimal,
    pub req_id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SellRequest {
    pub sell: String,
    pub price: Decimal,
    pub req_id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelRequest {
    pub cancel: String,
    pub req_id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenContractRequest {
    pub proposal_open_contract: u8,
    pub contract_id: String,
    pub subscribe: u8,
    pub req_id: u64,
}

impl OpenContractRequest {
    pub fn new(contract_id: &str, req_id: u64) -> Self {
        Self {
            proposal_open_contract: 1,
            contract_id: contract_id.to_string(),
            subscribe: 1,
            req_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PingRequest {
    pub ping: u8,
    pub req_id: u64,
}

// ============================================================================
// Inbound payloads
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct TickPayload {
    pub symbol: String,
    pub quote: f64,
    #[serde(default)]
    pub bid: Option<f64>,
    #[serde(default)]
    pub ask: Option<f64>,
    pub epoch: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposalPayload {
    pub id: String,
    pub ask_price: f64,
    pub payout: f64,
    #[serde(default)]
    pub longcode: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuyPayload {
    pub contract_id: u64,
    pub buy_price: f64,
    pub transaction_id: u64,
    #[serde(default)]
    pub payout: Option<f64>,
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub longcode: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenContractPayload {
    pub contract_id: u64,
    /// 0/1 on the wire.
    #[serde(default)]
    pub is_sold: u8,
    #[serde(default)]
    pub profit: f64,
    #[serde(default)]
    pub sell_price: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
}

impl OpenContractPayload {
    /// Whether the contract has settled.
    pub fn sold(&self) -> bool {
        self.is_sold != 0
    }

    /// Win when the broker reports status "won", otherwise fall back to
    /// the sign of the profit.
    pub fn is_win(&self) -> bool {
        match self.status.as_deref() {
            Some("won") => true,
            Some("lost") => false,
            _ => self.profit > 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

// ============================================================================
// Frame routing
// ============================================================================

/// An inbound frame after routing by `msg_type`.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    Tick {
        payload: TickPayload,
        subscription_id: Option<String>,
    },
    OpenContract {
        payload: OpenContractPayload,
    },
    Pong {
        req_id: Option<u64>,
    },
    /// A correlated response: the full frame on success, the broker error
    /// payload on failure.
    Response {
        req_id: u64,
        body: Result<serde_json::Value, ErrorPayload>,
    },
    /// Anything we do not recognize.
    Other(serde_json::Value),
}

fn frame_req_id(value: &serde_json::Value) -> Option<u64> {
    value
        .get("req_id")
        .and_then(|v| v.as_u64())
        .or_else(|| value.pointer("/echo_req/req_id").and_then(|v| v.as_u64()))
}

/// Parse one text frame and route it.
pub fn parse_frame(text: &str) -> Result<InboundFrame, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let msg_type = value.get("msg_type").and_then(|v| v.as_str());

    match msg_type {
        Some("tick") => {
            let payload: TickPayload =
                serde_json::from_value(value.get("tick").cloned().unwrap_or_default())?;
            let subscription_id = value
                .pointer("/subscription/id")
                .and_then(|v| v.as_str())
                .map(ToString::to_string);
            Ok(InboundFrame::Tick {
                payload,
                subscription_id,
            })
        }
        Some("proposal_open_contract") => {
            let payload: OpenContractPayload = serde_json::from_value(
                value
                    .get("proposal_open_contract")
                    .cloned()
                    .unwrap_or_default(),
            )?;
            Ok(InboundFrame::OpenContract { payload })
        }
        Some("ping") | Some("pong") => Ok(InboundFrame::Pong {
            req_id: frame_req_id(&value),
        }),
        _ => {
            let req_id = frame_req_id(&value);
            if let Some(error) = value.get("error") {
                let payload: ErrorPayload = serde_json::from_value(error.clone())?;
                match req_id {
                    Some(req_id) => Ok(InboundFrame::Response {
                        req_id,
                        body: Err(payload),
                    }),
                    None => Ok(InboundFrame::Other(value)),
                }
            } else if let Some(req_id) = req_id {
                Ok(InboundFrame::Response {
                    req_id,
                    body: Ok(value),
                })
            } else {
                Ok(InboundFrame::Other(value))
            }
        }
    }
}
