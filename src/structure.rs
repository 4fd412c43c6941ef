//! Swing-structure tracking (BOS / CHOCH)
//!
//! Keeps the prevailing trend and the last confirmed swing extremes, and decides per bar
//! whether the trend continued (Break of Structure) or was invalidated (Change of Character).
//!
//! All comparisons are strict: a close exactly on the pivot, or a high/low exactly on the
//! current extreme, changes nothing.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{EventType, OHLCVExt, Trend, OHLCV};

/// Structural levels tracked between bars.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureState {
    pub trend: Trend,
    /// Most recent swing high since the last opposing break
    pub last_high: Option<f64>,
    /// Most recent swing low since the last opposing break
    pub last_low: Option<f64>,
    /// Last Higher Low; only consulted while bullish
    pub last_hl: Option<f64>,
    /// Last Lower High; only consulted while bearish
    pub last_lh: Option<f64>,
}

/// A structural event detected on one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StructureBreak {
    pub kind: EventType,
    /// New extreme for BOS, violated pivot for CHOCH
    pub level: f64,
}

#[inline]
fn opening_trend<B: OHLCV>(bar: &B) -> Trend {
    if bar.is_bullish() {
        Trend::Bull
    } else {
        Trend::Bear
    }
}

impl StructureState {
    /// Seed trend and extremes from the very first bar.
    pub fn bootstrap<B: OHLCV>(&mut self, bar: &B) {
        self.trend = opening_trend(bar);
        self.last_high = Some(bar.high());
        self.last_low = Some(bar.low());
        debug!(trend = ?self.trend, high = bar.high(), low = bar.low(), "structure bootstrapped");
    }

    /// Advance structure by one bar.
    ///
    /// Returns at most one event. CHOCH is checked first; when it fires the BOS branch is
    /// skipped for this bar. With `close_beyond` unset the pivot is tested against the wick
    /// (`low` / `high`) instead of the close.
    pub fn update<B: OHLCV>(&mut self, bar: &B, close_beyond: bool) -> Option<StructureBreak> {
        if self.trend == Trend::None {
            self.trend = opening_trend(bar);
        }

        match self.trend {
            Trend::Bull => self.update_bull(bar, close_beyond),
            Trend::Bear => self.update_bear(bar, close_beyond),
            Trend::None => None,
        }
    }

    fn update_bull<B: OHLCV>(&mut self, bar: &B, close_beyond: bool) -> Option<StructureBreak> {
        if let Some(hl) = self.last_hl {
            let probe = if close_beyond { bar.close() } else { bar.low() };
            if probe < hl {
                self.trend = Trend::Bear;
                self.last_lh = Some(bar.high());
                self.last_high = Some(bar.high());
                self.last_low = Some(bar.low());
                debug!(level = hl, close = bar.close(), "CHOCH down");
                return Some(StructureBreak {
                    kind: EventType::ChochDown,
                    level: hl,
                });
            }
        }

        let mut event = None;

        if self.last_high.map_or(true, |high| bar.high() > high) {
            // The low since the previous impulse becomes the new HL pivot.
            if let Some(low) = self.last_low {
                self.last_hl = Some(low);
            }
            self.last_high = Some(bar.high());
            trace!(level = bar.high(), last_hl = ?self.last_hl, "BOS up");
            event = Some(StructureBreak {
                kind: EventType::BosUp,
                level: bar.high(),
            });
        }

        if self.last_low.map_or(true, |low| bar.low() < low) {
            self.last_low = Some(bar.low());
            trace!(low = bar.low(), "running low");
        }

        event
    }

    fn update_bear<B: OHLCV>(&mut self, bar: &B, close_beyond: bool) -> Option<StructureBreak> {
        if let Some(lh) = self.last_lh {
            let probe = if close_beyond { bar.close() } else { bar.high() };
            if probe > lh {
                self.trend = Trend::Bull;
                self.last_hl = Some(bar.low());
                self.last_low = Some(bar.low());
                self.last_high = Some(bar.high());
                debug!(level = lh, close = bar.close(), "CHOCH up");
                return Some(StructureBreak {
                    kind: EventType::ChochUp,
                    level: lh,
                });
            }
        }

        let mut event = None;

        if self.last_low.map_or(true, |low| bar.low() < low) {
            if let Some(high) = self.last_high {
                self.last_lh = Some(high);
            }
            self.last_low = Some(bar.low());
            trace!(level = bar.low(), last_lh = ?self.last_lh, "BOS down");
            event = Some(StructureBreak {
                kind: EventType::BosDown,
                level: bar.low(),
            });
        }

        if self.last_high.map_or(true, |high| bar.high() > high) {
            self.last_high = Some(bar.high());
            trace!(high = bar.high(), "running high");
        }

        event
    }
}

// ============================================================
// TESTS
// ============================================================
