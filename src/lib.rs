//! # TRC Engine - streaming market-structure detection
//!
//! Tracks swing structure bar by bar, reports Break of Structure (BOS) and Change of
//! Character (CHOCH) events, and arms a time-limited retest zone after a CHOCH that agrees
//! with an externally supplied higher-timeframe bias. A later bar trading back into the zone
//! fires an entry.
//!
//! One [`StructureEngine`] handles one symbol/timeframe. It is synchronous and owns all of
//! its state; run several engines side by side for several feeds.
//!
//! ## Quick Start
//!
//! ```rust
//! use trc_engine::prelude::*;
//!
//! let mut engine = EngineBuilder::new().max_retest_bars(10).build().unwrap();
//!
//! let bars = [
//!     Bar::new(1, 100.0, 100.0, 98.0, 98.5).unwrap(),
//!     Bar::new(2, 98.5, 99.0, 97.0, 97.5).unwrap(),
//!     Bar::new(3, 97.5, 106.0, 97.5, 105.0).unwrap(),
//!     Bar::new(4, 105.0, 105.5, 103.0, 104.0).unwrap(),
//! ];
//!
//! let mut kinds = Vec::new();
//! for bar in &bars {
//!     // +1 bullish, -1 bearish, 0 neutral
//!     for event in engine.process(bar, 1) {
//!         kinds.push(event.kind);
//!     }
//! }
//!
//! assert_eq!(
//!     kinds,
//!     [EventType::BosDown, EventType::ChochUp, EventType::TrcLongEntry]
//! );
//! ```

pub mod config;
pub mod retest;
pub mod structure;

pub mod prelude {
    pub use crate::{
        // Config
        config::{EngineConfig, ParamMeta, ParamType},
        // Parallel
        replay_parallel,
        // Sub-states
        retest::{RetestSetup, RetestState, Side},
        structure::{StructureBreak, StructureState},
        // Types
        Bar,
        Bias,
        // Engine
        EngineBuilder,
        EngineState,
        Event,
        EventInfo,
        EventType,
        OHLCVExt,
        Period,
        ReplayError,
        ReplayResult,
        Result,
        StructureEngine,
        Trend,
        // Errors
        ValidationError,
        OHLCV,
    };
}

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use config::EngineConfig;
use retest::{RetestState, Side};
use structure::StructureState;

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Errors raised when constructing inputs or configuration.
///
/// Bar processing itself never fails; everything here is rejected before it reaches the
/// state machine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid bar at index {index}: {reason}")]
    InvalidBar { index: usize, reason: &'static str },

    #[error("Feed length mismatch: {bars} bars, {biases} biases")]
    LengthMismatch { bars: usize, biases: usize },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(ValidationError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait.
///
/// Implement it for your own bar type to feed the engine without copying into [`Bar`].
/// Bars without a timestamp are stamped with their bar index in emitted events.
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    fn timestamp(&self) -> Option<i64> {
        None
    }
}

impl<T: OHLCV + ?Sized> OHLCV for &T {
    fn open(&self) -> f64 {
        (**self).open()
    }

    fn high(&self) -> f64 {
        (**self).high()
    }

    fn low(&self) -> f64 {
        (**self).low()
    }

    fn close(&self) -> f64 {
        (**self).close()
    }

    fn volume(&self) -> f64 {
        (**self).volume()
    }

    fn timestamp(&self) -> Option<i64> {
        (**self).timestamp()
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    /// Validate OHLCV data consistency: finite values and `low <= high`
    fn validate(&self) -> Result<()> {
        let prices = [self.open(), self.high(), self.low(), self.close()];
        if prices.iter().any(|p| p.is_nan()) {
            return Err(ValidationError::InvalidBar {
                index: 0,
                reason: "NaN in OHLC",
            });
        }
        if prices.iter().any(|p| p.is_infinite()) {
            return Err(ValidationError::InvalidBar {
                index: 0,
                reason: "Infinite value in OHLC",
            });
        }
        if !self.volume().is_finite() {
            return Err(ValidationError::InvalidBar {
                index: 0,
                reason: "Non-finite volume",
            });
        }
        if self.high() < self.low() {
            return Err(ValidationError::InvalidBar {
                index: 0,
                reason: "high < low",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV + ?Sized> OHLCVExt for T {}

// ============================================================
// BAR
// ============================================================

/// One validated OHLCV sample.
///
/// The timestamp is an opaque ordering token: a bar index, epoch seconds, anything
/// monotonically increasing within one feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBar")]
pub struct Bar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Create a bar with zero volume
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64) -> Result<Self> {
        Self::with_volume(timestamp, open, high, low, close, 0.0)
    }

    pub fn with_volume(
        timestamp: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self> {
        let bar = Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        };
        bar.validate()?;
        Ok(bar)
    }
}

impl OHLCV for Bar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.timestamp)
    }
}

#[derive(Deserialize)]
struct RawBar {
    timestamp: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

impl TryFrom<RawBar> for Bar {
    type Error = ValidationError;

    fn try_from(raw: RawBar) -> Result<Self> {
        Bar::with_volume(raw.timestamp, raw.open, raw.high, raw.low, raw.close, raw.volume)
    }
}

// ============================================================
// TREND & BIAS
// ============================================================

/// Prevailing structure direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    /// Only before the first bar
    #[default]
    None,
    Bull,
    Bear,
}

/// Higher-timeframe bias gating which CHOCHs arm a retest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bias {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

impl From<i32> for Bias {
    /// `+1` bullish, `-1` bearish; any other value is neutral.
    fn from(sign: i32) -> Self {
        match sign {
            1 => Bias::Bullish,
            -1 => Bias::Bearish,
            _ => Bias::Neutral,
        }
    }
}

impl Bias {
    #[inline]
    pub fn sign(self) -> i32 {
        match self {
            Bias::Bullish => 1,
            Bias::Bearish => -1,
            Bias::Neutral => 0,
        }
    }

    /// Retest side armed by `kind` under this bias, if any
    pub fn aligned_side(self, kind: EventType) -> Option<Side> {
        match (kind, self) {
            (EventType::ChochUp, Bias::Bullish) => Some(Side::Long),
            (EventType::ChochDown, Bias::Bearish) => Some(Side::Short),
            _ => None,
        }
    }
}

// ============================================================
// EVENTS
// ============================================================

/// Kind of emitted event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    BosUp,
    BosDown,
    ChochUp,
    ChochDown,
    TrcLongEntry,
    TrcShortEntry,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::BosUp => "BOS_UP",
            EventType::BosDown => "BOS_DOWN",
            EventType::ChochUp => "CHOCH_UP",
            EventType::ChochDown => "CHOCH_DOWN",
            EventType::TrcLongEntry => "TRC_LONG_ENTRY",
            EventType::TrcShortEntry => "TRC_SHORT_ENTRY",
        }
    }

    /// BOS or CHOCH
    #[inline]
    pub fn is_structural(self) -> bool {
        !self.is_entry()
    }

    #[inline]
    pub fn is_entry(self) -> bool {
        matches!(self, EventType::TrcLongEntry | EventType::TrcShortEntry)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Auxiliary payload of an event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventInfo {
    /// New extreme (BOS) or violated pivot (CHOCH)
    Level { level: f64 },
    /// Zone that was revisited, and the setup it belonged to
    EntryZone { entry_zone: (f64, f64), setup_seq: u64 },
}

/// Event emitted by the engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Copied from the triggering bar
    pub timestamp: i64,
    pub bar_index: u64,
    #[serde(rename = "type")]
    pub kind: EventType,
    pub info: EventInfo,
}

impl Event {
    pub fn level(&self) -> Option<f64> {
        match self.info {
            EventInfo::Level { level } => Some(level),
            EventInfo::EntryZone { .. } => None,
        }
    }

    pub fn entry_zone(&self) -> Option<(f64, f64)> {
        match self.info {
            EventInfo::EntryZone { entry_zone, .. } => Some(entry_zone),
            EventInfo::Level { .. } => None,
        }
    }
}

// ============================================================
// STRUCTURE ENGINE
// ============================================================

/// Complete mutable state of one engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub structure: StructureState,
    pub retest: RetestState,
    /// Bars processed so far; the first bar is 1
    pub bar_index: u64,
    pub last_timestamp: Option<i64>,
}

/// Stateful BOS/CHOCH/retest detector for one symbol and timeframe.
///
/// Bars must arrive in strictly increasing time order, one call per bar. Out-of-order or
/// repeated bars are logged but otherwise produce undefined structure. State is mutated in
/// place without locking; use one engine per feed.
#[derive(Debug, Clone, Default)]
pub struct StructureEngine {
    config: EngineConfig,
    state: EngineState,
}

impl StructureEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: EngineState::default(),
        }
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    #[inline]
    pub fn bar_index(&self) -> u64 {
        self.state.bar_index
    }

    /// Forget all history, keeping the configuration.
    pub fn reset(&mut self) {
        self.state = EngineState::default();
    }

    /// Process one new bar.
    ///
    /// `htf_bias`: `+1` bullish, `-1` bearish, `0` neutral (other values act as neutral).
    ///
    /// Returns 0, 1 or 2 events. The first bar only bootstraps and never emits. A structural
    /// event, if any, always precedes the entry event.
    pub fn process<B: OHLCV>(&mut self, bar: &B, htf_bias: i32) -> Vec<Event> {
        self.state.bar_index += 1;
        let bar_index = self.state.bar_index;
        let timestamp = bar.timestamp().unwrap_or(bar_index as i64);
        self.track_timestamp(timestamp);

        let mut events = Vec::with_capacity(2);

        if bar_index == 1 {
            self.state.structure.bootstrap(bar);
            return events;
        }

        let close_beyond = self.config.require_close_beyond_structure;
        if let Some(brk) = self.state.structure.update(bar, close_beyond) {
            if let Some(side) = Bias::from(htf_bias).aligned_side(brk.kind) {
                self.state
                    .retest
                    .arm(bar, side, self.config.max_retest_bars, bar_index);
            }
            events.push(Event {
                timestamp,
                bar_index,
                kind: brk.kind,
                info: EventInfo::Level { level: brk.level },
            });
        }

        if let Some(entry) = self.state.retest.check(bar, bar_index) {
            events.push(Event {
                timestamp,
                bar_index,
                kind: entry.side.entry_kind(),
                info: EventInfo::EntryZone {
                    entry_zone: entry.zone,
                    setup_seq: entry.seq,
                },
            });
        }

        events
    }

    /// Feed a slice of bars, one call per bar, and collect every event.
    ///
    /// `biases[i]` is the HTF bias for `bars[i]`. With `validate_bars` set, the whole feed is
    /// checked before any bar reaches the engine.
    pub fn replay<B: OHLCV>(&mut self, bars: &[B], biases: &[i32]) -> Result<Vec<Event>> {
        if bars.len() != biases.len() {
            return Err(ValidationError::LengthMismatch {
                bars: bars.len(),
                biases: biases.len(),
            });
        }
        if self.config.validate_bars {
            validate_feed(bars)?;
        }

        let mut events = Vec::new();
        for (bar, &bias) in bars.iter().zip(biases) {
            events.extend(self.process(bar, bias));
        }
        debug!(bars = bars.len(), events = events.len(), "replay finished");
        Ok(events)
    }

    fn track_timestamp(&mut self, timestamp: i64) {
        if let Some(prev) = self.state.last_timestamp {
            if timestamp <= prev {
                warn!(prev, timestamp, bar_index = self.state.bar_index, "bar timestamp did not advance");
            }
        }
        self.state.last_timestamp = Some(timestamp);
    }
}

fn validate_feed<B: OHLCV>(bars: &[B]) -> Result<()> {
    for (i, bar) in bars.iter().enumerate() {
        bar.validate().map_err(|e| match e {
            ValidationError::InvalidBar { reason, .. } => {
                ValidationError::InvalidBar { index: i, reason }
            }
            other => other,
        })?;
    }
    Ok(())
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for [`StructureEngine`]
#[derive(Debug, Clone)]
pub struct EngineBuilder {
    max_retest_bars: usize,
    require_close_beyond_structure: bool,
    validate_bars: bool,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::from_config(EngineConfig::default())
    }

    /// Start from an existing configuration
    pub fn from_config(config: EngineConfig) -> Self {
        Self {
            max_retest_bars: config.max_retest_bars.get(),
            require_close_beyond_structure: config.require_close_beyond_structure,
            validate_bars: config.validate_bars,
        }
    }

    /// Retest zone time-to-live, in bars (must be > 0)
    pub fn max_retest_bars(mut self, bars: usize) -> Self {
        self.max_retest_bars = bars;
        self
    }

    pub fn require_close_beyond_structure(mut self, enable: bool) -> Self {
        self.require_close_beyond_structure = enable;
        self
    }

    /// Enable/disable bar validation in the replay helpers
    pub fn validate_bars(mut self, enable: bool) -> Self {
        self.validate_bars = enable;
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<StructureEngine> {
        let config = EngineConfig {
            max_retest_bars: Period::new(self.max_retest_bars)?,
            require_close_beyond_structure: self.require_close_beyond_structure,
            validate_bars: self.validate_bars,
        };
        Ok(StructureEngine::new(config))
    }
}

// ============================================================
// PARALLEL REPLAY
// ============================================================

use rayon::prelude::*;

/// Events of a single instrument
#[derive(Debug)]
pub struct ReplayResult {
    pub symbol: String,
    pub events: Vec<Event>,
}

/// Error from replaying a single instrument
#[derive(Debug)]
pub struct ReplayError {
    pub symbol: String,
    pub error: ValidationError,
}

/// Replay several instruments in parallel, each through its own fresh engine.
///
/// Instruments share nothing but the configuration; results come back in input order,
/// split into successes and failures.
pub fn replay_parallel<'a, B, I>(
    config: &EngineConfig,
    instruments: I,
) -> (Vec<ReplayResult>, Vec<ReplayError>)
where
    B: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [B], &'a [i32])>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, bars, biases)| {
            StructureEngine::new(config.clone())
                .replay(bars, biases)
                .map(|events| ReplayResult {
                    symbol: symbol.to_string(),
                    events,
                })
                .map_err(|error| ReplayError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================
