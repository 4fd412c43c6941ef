//! Retest zone monitoring
//!
//! After an HTF-aligned CHOCH the engine arms a single retest zone built from the CHOCH
//! bar. The zone lives for a fixed number of bars; the first later bar that trades back
//! into it produces an entry and consumes the zone.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{EventType, Period, OHLCV};

/// Side of a pending retest setup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Boundary sign convention: `+1` long, `-1` short.
    #[inline]
    pub fn sign(self) -> i32 {
        match self {
            Side::Long => 1,
            Side::Short => -1,
        }
    }

    #[inline]
    pub fn entry_kind(self) -> EventType {
        match self {
            Side::Long => EventType::TrcLongEntry,
            Side::Short => EventType::TrcShortEntry,
        }
    }
}

/// The single pending retest zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetestSetup {
    pub side: Side,
    pub zone_low: f64,
    pub zone_high: f64,
    /// Remaining bars before silent expiry
    pub bars_left: usize,
    /// Bar index of the CHOCH that armed this zone
    pub armed_at: u64,
    /// Sequence number, unique per engine
    pub seq: u64,
}

impl RetestSetup {
    /// Inclusive zone membership.
    #[inline]
    pub fn contains(&self, price: f64) -> bool {
        self.zone_low <= price && price <= self.zone_high
    }
}

/// Entry fired when price revisits a pending zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetestEntry {
    pub side: Side,
    pub zone: (f64, f64),
    pub seq: u64,
}

/// Retest sub-state: at most one pending setup plus the sequence counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetestState {
    pub setup: Option<RetestSetup>,
    /// Number of setups armed so far
    pub setup_seq: u64,
}

impl RetestState {
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.setup.is_some()
    }

    /// Arm a zone from the CHOCH bar.
    ///
    /// Long zones span `[low, close]`, short zones `[close, high]`. An already pending
    /// setup is replaced.
    pub fn arm<B: OHLCV>(&mut self, bar: &B, side: Side, ttl: Period, bar_index: u64) {
        let (a, b) = match side {
            Side::Long => (bar.low(), bar.close()),
            Side::Short => (bar.close(), bar.high()),
        };

        if let Some(prev) = &self.setup {
            debug!(seq = prev.seq, side = ?prev.side, bars_left = prev.bars_left, "pending setup replaced");
        }

        self.setup_seq += 1;
        let setup = RetestSetup {
            side,
            zone_low: a.min(b),
            zone_high: a.max(b),
            bars_left: ttl.get(),
            armed_at: bar_index,
            seq: self.setup_seq,
        };
        debug!(
            seq = setup.seq,
            side = ?side,
            zone_low = setup.zone_low,
            zone_high = setup.zone_high,
            ttl = setup.bars_left,
            "retest setup armed"
        );
        self.setup = Some(setup);
    }

    /// Test one bar against the pending zone.
    ///
    /// Does nothing on the arming bar itself. Otherwise spends one bar of the
    /// countdown, then fires on a touch (long: `low` in zone, short: `high` in zone) or
    /// clears the setup once the countdown is exhausted.
    pub fn check<B: OHLCV>(&mut self, bar: &B, bar_index: u64) -> Option<RetestEntry> {
        let setup = self.setup.as_mut()?;
        if setup.bars_left == 0 || bar_index <= setup.armed_at {
            return None;
        }

        setup.bars_left -= 1;

        let probe = match setup.side {
            Side::Long => bar.low(),
            Side::Short => bar.high(),
        };

        if setup.contains(probe) {
            let entry = RetestEntry {
                side: setup.side,
                zone: (setup.zone_low, setup.zone_high),
                seq: setup.seq,
            };
            self.setup = None;
            debug!(seq = entry.seq, side = ?entry.side, price = probe, "retest entry");
            return Some(entry);
        }

        if setup.bars_left == 0 {
            let seq = setup.seq;
            self.setup = None;
            debug!(seq, "retest setup expired");
        }

        None
    }

    /// Drop any pending setup without emitting.
    pub fn clear(&mut self) {
        self.setup = None;
    }
}

// ============================================================
// TESTS
// ============================================================
