//! Signal engine: per-market state, strategy evaluation, confidence gate.

use crate::history::MarketHistory;
use crate::state::{IndicatorParams, IndicatorState};
use crate::strategies::{default_registry, Strategy, StrategyContext};
use dashmap::DashMap;
use pulse_core::{
    EventBus, MarketClass, PipelineEvent, SessionConfig, Signal, SignalMetadata, Tick,
};
use tracing::{debug, trace};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct SignalEngineConfig {
    pub params: IndicatorParams,
    /// Extra quotes required past the slow EMA before any evaluation.
    pub warmup_margin: usize,
}

impl Default for SignalEngineConfig {
    fn default() -> Self {
        Self {
            params: IndicatorParams::default(),
            warmup_margin: 5,
        }
    }
}

impl SignalEngineConfig {
    /// Quotes required before a market is evaluated at all.
    pub fn min_history(&self) -> usize {
        self.params.slow_ema_period + self.warmup_margin
    }
}

/// The signal engine.
///
/// Indicator state is exclusively owned here: each market's state is
/// touched by exactly one task at a time (the dashmap entry guard
/// serializes per market), while distinct markets process in parallel.
pub struct SignalEngine {
    config: SignalEngineConfig,
    states: DashMap<String, IndicatorState>,
    histories: DashMap<String, MarketHistory>,
    strategies: Vec<Box<dyn Strategy>>,
    events: EventBus,
}

impl SignalEngine {
    pub fn new(config: SignalEngineConfig, events: EventBus) -> Self {
        Self::with_strategies(config, events, default_registry())
    }

    /// Construct with an explicit registry (tests swap in stubs).
    pub fn with_strategies(
        config: SignalEngineConfig,
        events: EventBus,
        strategies: Vec<Box<dyn Strategy>>,
    ) -> Self {
        Self {
            config,
            states: DashMap::new(),
            histories: DashMap::new(),
            strategies,
            events,
        }
    }

    /// Fold one tick into the market's state and evaluate.
    ///
    /// Emits `SignalEmitted` and returns the signal only when a strategy
    /// fires with confidence at or above the session's floor.
    pub fn process_tick(&self, tick: &Tick, session: Option<&SessionConfig>) -> Option<Signal> {
        let candidate = {
            let mut state = self
                .states
                .entry(tick.market.clone())
                .or_insert_with(IndicatorState::new);
            state.update(tick.quote, &self.config.params);

            if state.len() < self.config.min_history() {
                trace!(market = %tick.market, len = state.len(), "warming up");
                return None;
            }
            self.evaluate(&tick.market, &state)
        }?;

        self.gate_and_publish(candidate, session)
    }

    /// Evaluate a standalone quote series without touching shared state.
    pub fn generate_signal(&self, ticks: &[Tick], session: Option<&SessionConfig>) -> Option<Signal> {
        let market = &ticks.first()?.market;
        let mut state = IndicatorState::new();
        for tick in ticks {
            state.update(tick.quote, &self.config.params);
        }
        if state.len() < self.config.min_history() {
            return None;
        }
        let candidate = self.evaluate(market, &state)?;
        self.gate_and_publish(candidate, session)
    }

    fn gate_and_publish(&self, signal: Signal, session: Option<&SessionConfig>) -> Option<Signal> {
        let floor = session.map(|c| c.min_confidence).unwrap_or(0.0);
        if signal.confidence < floor {
            debug!(
                market = %signal.market,
                confidence = signal.confidence,
                floor,
                "candidate below session confidence floor"
            );
            return None;
        }
        self.events
            .publish(PipelineEvent::SignalEmitted(signal.clone()));
        Some(signal)
    }

    /// Run the registry: best confidence wins, ties keep registry order.
    fn evaluate(&self, market: &str, state: &IndicatorState) -> Option<Signal> {
        let class = MarketClass::of(market);
        let history = self.histories.get(market).map(|h| *h);
        let cx = StrategyContext {
            market,
            class,
            prices: state.prices(),
            state,
            history: history.as_ref(),
        };

        let mut best: Option<Signal> = None;
        for strategy in &self.strategies {
            if !strategy.applies_to(class) {
                continue;
            }
            let Some(candidate) = strategy.evaluate(&cx) else {
                continue;
            };
            if candidate.confidence < strategy.min_confidence() {
                continue;
            }
            // Strictly greater keeps the earlier strategy on ties.
            if best
                .as_ref()
                .map_or(true, |b| candidate.confidence > b.confidence)
            {
                best = Some(candidate);
            }
        }

        let mut signal = best?;
        signal.metadata = Some(SignalMetadata {
            indicators: Some(state.snapshot()),
            ..Default::default()
        });
        Some(signal)
    }

    /// Record a settlement outcome for the adaptive strategy.
    pub fn record_outcome(&self, market: &str, won: bool) {
        self.histories
            .entry(market.to_string())
            .or_default()
            .record(won);
    }

    /// Observed win rate for a market.
    pub fn win_rate(&self, market: &str) -> Option<f64> {
        self.histories.get(market).and_then(|h| h.win_rate())
    }

    /// Quotes currently held for a market.
    pub fn history_len(&self, market: &str) -> usize {
        self.states.get(market).map(|s| s.len()).unwrap_or(0)
    }
}
