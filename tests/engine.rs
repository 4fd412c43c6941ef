//! Scenario tests for the structure engine.
//!
//! Each scenario walks a short hand-built feed through a fresh engine and checks the
//! exact events emitted per bar.

use trc_engine::prelude::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn bar(t: i64, o: f64, h: f64, l: f64, c: f64) -> Bar {
    Bar::new(t, o, h, l, c).unwrap()
}

fn kinds(events: &[Event]) -> Vec<EventType> {
    events.iter().map(|e| e.kind).collect()
}

fn engine(max_retest_bars: usize) -> StructureEngine {
    init_tracing();
    EngineBuilder::new()
        .max_retest_bars(max_retest_bars)
        .build()
        .unwrap()
}

/// Bearish start, BOS down confirming LH = 100
fn bear_with_lh(engine: &mut StructureEngine) {
    assert!(engine.process(&bar(1, 100.0, 100.0, 98.0, 98.5), 0).is_empty());
    let e = engine.process(&bar(2, 98.5, 99.0, 97.0, 97.5), 0);
    assert_eq!(kinds(&e), [EventType::BosDown]);
    assert_eq!(engine.state().structure.last_lh, Some(100.0));
}

/// Bullish start, BOS up confirming HL = 100
fn bull_with_hl(engine: &mut StructureEngine) {
    assert!(engine.process(&bar(1, 100.0, 102.0, 100.0, 101.5), 0).is_empty());
    let e = engine.process(&bar(2, 101.5, 103.0, 101.0, 102.5), 0);
    assert_eq!(kinds(&e), [EventType::BosUp]);
    assert_eq!(engine.state().structure.last_hl, Some(100.0));
}

// ============================================================
// STRUCTURE
// ============================================================

#[test]
fn test_bootstrap_ignores_bias() {
    for bias in [-1, 0, 1, 5] {
        let mut engine = engine(20);
        assert!(engine.process(&bar(1, 100.0, 110.0, 90.0, 95.0), bias).is_empty());
        assert_eq!(engine.state().structure.trend, Trend::Bear);
        assert!(!engine.state().retest.is_pending());
    }
}

#[test]
fn test_rising_highs_emit_bos_only() {
    let mut engine = engine(20);
    let mut all = Vec::new();

    for i in 0..10 {
        let base = 100.0 + i as f64;
        let events = engine.process(&bar(i, base, base + 1.0, base - 1.0, base + 0.5), 1);
        if i == 0 {
            assert!(events.is_empty());
        } else {
            assert_eq!(kinds(&events), [EventType::BosUp]);
            assert_eq!(events[0].level(), Some(base + 1.0));
        }
        all.extend(events);
    }

    assert_eq!(all.len(), 9);
    assert_eq!(engine.state().structure.trend, Trend::Bull);
}

#[test]
fn test_inside_bar_is_silent() {
    let mut engine = engine(20);
    bull_with_hl(&mut engine);

    // Close exactly on HL, high exactly on the extreme
    let e = engine.process(&bar(3, 101.0, 103.0, 100.0, 100.0), -1);
    assert!(e.is_empty());
    assert_eq!(engine.state().structure.trend, Trend::Bull);
}

#[test]
fn test_wick_choch_when_close_not_required() {
    init_tracing();
    let mut engine = EngineBuilder::new()
        .require_close_beyond_structure(false)
        .build()
        .unwrap();
    bull_with_hl(&mut engine);

    let e = engine.process(&bar(3, 101.0, 102.0, 99.5, 100.5), -1);
    assert_eq!(kinds(&e), [EventType::ChochDown]);
    assert_eq!(e[0].level(), Some(100.0));
    assert!(engine.state().retest.is_pending());
}

// ============================================================
// CHOCH + RETEST
// ============================================================

#[test]
fn test_choch_up_retest_long_entry() {
    let mut engine = engine(20);
    bear_with_lh(&mut engine);

    let e = engine.process(&bar(3, 97.5, 106.0, 97.5, 105.0), 1);
    assert_eq!(kinds(&e), [EventType::ChochUp]);
    assert_eq!(e[0].level(), Some(100.0));

    let setup = engine.state().retest.setup.unwrap();
    assert_eq!(setup.side, Side::Long);
    assert_eq!((setup.zone_low, setup.zone_high), (97.5, 105.0));
    assert_eq!(setup.armed_at, 3);

    let e = engine.process(&bar(4, 105.0, 105.5, 103.0, 104.0), 1);
    assert_eq!(kinds(&e), [EventType::TrcLongEntry]);
    assert_eq!(e[0].entry_zone(), Some((97.5, 105.0)));
    assert_eq!(
        e[0].info,
        EventInfo::EntryZone {
            entry_zone: (97.5, 105.0),
            setup_seq: 1
        }
    );
    assert_eq!(e[0].timestamp, 4);
    assert!(!engine.state().retest.is_pending());

    // Zone consumed: another visit does nothing
    let e = engine.process(&bar(5, 104.0, 105.0, 102.0, 104.5), 1);
    assert!(e.is_empty());
}

#[test]
fn test_choch_down_retest_short_entry() {
    let mut engine = engine(20);
    bull_with_hl(&mut engine);

    let e = engine.process(&bar(3, 102.5, 103.0, 94.0, 95.0), -1);
    assert_eq!(kinds(&e), [EventType::ChochDown]);
    assert_eq!(e[0].level(), Some(100.0));

    let e = engine.process(&bar(4, 96.0, 99.0, 95.5, 97.0), -1);
    assert_eq!(kinds(&e), [EventType::TrcShortEntry]);
    assert_eq!(e[0].entry_zone(), Some((95.0, 103.0)));
}

#[test]
fn test_misaligned_choch_arms_nothing() {
    for bias in [0, -1, 3] {
        let mut engine = engine(20);
        bear_with_lh(&mut engine);

        let e = engine.process(&bar(3, 97.5, 106.0, 97.5, 105.0), bias);
        assert_eq!(kinds(&e), [EventType::ChochUp]);
        assert!(!engine.state().retest.is_pending());

        let e = engine.process(&bar(4, 105.0, 105.5, 103.0, 104.0), bias);
        assert!(e.is_empty());
    }
}

#[test]
fn test_structure_event_precedes_entry() {
    let mut engine = engine(20);
    bear_with_lh(&mut engine);
    engine.process(&bar(3, 97.5, 106.0, 97.5, 105.0), 1);

    // New high and a dip into the zone on the same bar
    let e = engine.process(&bar(4, 105.0, 107.0, 103.0, 106.0), 1);
    assert_eq!(kinds(&e), [EventType::BosUp, EventType::TrcLongEntry]);
    assert_eq!(e[0].level(), Some(107.0));
}

#[test]
fn test_zone_bounds_inclusive() {
    for low in [97.5, 105.0] {
        let mut engine = engine(20);
        bear_with_lh(&mut engine);
        engine.process(&bar(3, 97.5, 106.0, 97.5, 105.0), 1);

        let e = engine.process(&bar(4, 105.0, 105.5, low, 105.2), 1);
        assert_eq!(kinds(&e), [EventType::TrcLongEntry]);
    }
}

// ============================================================
// EXPIRY
// ============================================================

#[test]
fn test_setup_expires_silently() {
    let mut engine = engine(2);
    bear_with_lh(&mut engine);
    engine.process(&bar(3, 97.5, 106.0, 97.5, 105.0), 1);

    // Two bars that stay above the zone
    let e = engine.process(&bar(4, 106.0, 108.0, 105.5, 107.0), 1);
    assert!(!kinds(&e).contains(&EventType::TrcLongEntry));
    assert_eq!(engine.state().retest.setup.unwrap().bars_left, 1);

    let e = engine.process(&bar(5, 107.0, 109.0, 106.0, 108.0), 1);
    assert!(!kinds(&e).contains(&EventType::TrcLongEntry));
    assert!(!engine.state().retest.is_pending());

    // Third bar visits the old zone: nothing
    let e = engine.process(&bar(6, 108.0, 108.5, 104.0, 105.0), 1);
    assert!(e.is_empty());
}

#[test]
fn test_entry_on_last_live_bar() {
    let mut engine = engine(2);
    bear_with_lh(&mut engine);
    engine.process(&bar(3, 97.5, 106.0, 97.5, 105.0), 1);

    engine.process(&bar(4, 106.0, 108.0, 105.5, 107.0), 1);
    let e = engine.process(&bar(5, 107.0, 107.5, 104.0, 105.0), 1);
    assert_eq!(kinds(&e), [EventType::TrcLongEntry]);
}

// ============================================================
// PENDING SETUP ACROSS FLIPS
// ============================================================

#[test]
fn test_pending_setup_survives_misaligned_flip() {
    let mut engine = engine(20);
    bear_with_lh(&mut engine);
    engine.process(&bar(3, 97.5, 106.0, 97.5, 105.0), 1);

    // Close below HL 97.5 flips to bear; bias still bullish so no new setup
    let e = engine.process(&bar(4, 100.0, 104.0, 96.0, 97.0), 1);
    assert_eq!(kinds(&e), [EventType::ChochDown]);
    assert_eq!(engine.state().structure.trend, Trend::Bear);

    let setup = engine.state().retest.setup.unwrap();
    assert_eq!(setup.side, Side::Long);
    assert_eq!(setup.bars_left, 19);

    // Old long zone still fires in the bear trend
    let e = engine.process(&bar(5, 98.5, 99.0, 98.0, 98.8), 1);
    assert_eq!(kinds(&e), [EventType::TrcLongEntry]);
}

#[test]
fn test_aligned_flip_replaces_setup() {
    let mut engine = engine(20);
    bear_with_lh(&mut engine);
    engine.process(&bar(3, 97.5, 106.0, 97.5, 105.0), 1);

    let e = engine.process(&bar(4, 100.0, 104.0, 96.0, 97.0), -1);
    assert_eq!(kinds(&e), [EventType::ChochDown]);

    let setup = engine.state().retest.setup.unwrap();
    assert_eq!(setup.side, Side::Short);
    assert_eq!((setup.zone_low, setup.zone_high), (97.0, 104.0));
    assert_eq!(setup.seq, 2);

    let e = engine.process(&bar(5, 98.0, 100.0, 97.5, 99.0), -1);
    assert_eq!(kinds(&e), [EventType::TrcShortEntry]);
    assert_eq!(
        e[0].info,
        EventInfo::EntryZone {
            entry_zone: (97.0, 104.0),
            setup_seq: 2
        }
    );
}

// ============================================================
// REPLAY
// ============================================================

#[test]
fn test_replay_matches_process() {
    let bars = [
        bar(1, 100.0, 100.0, 98.0, 98.5),
        bar(2, 98.5, 99.0, 97.0, 97.5),
        bar(3, 97.5, 106.0, 97.5, 105.0),
        bar(4, 105.0, 105.5, 103.0, 104.0),
    ];
    let biases = [1, 1, 1, 1];

    let mut stepped = engine(20);
    let mut expected = Vec::new();
    for (b, &bias) in bars.iter().zip(&biases) {
        expected.extend(stepped.process(b, bias));
    }

    let mut replayed = engine(20);
    let events = replayed.replay(&bars, &biases).unwrap();

    assert_eq!(events, expected);
    assert_eq!(replayed.state(), stepped.state());
    assert_eq!(
        kinds(&events),
        [EventType::BosDown, EventType::ChochUp, EventType::TrcLongEntry]
    );
}

#[test]
fn test_state_snapshot_serializes() {
    let mut engine = engine(20);
    bear_with_lh(&mut engine);
    engine.process(&bar(3, 97.5, 106.0, 97.5, 105.0), 1);

    let json = serde_json::to_string(engine.state()).unwrap();
    let back: EngineState = serde_json::from_str(&json).unwrap();
    assert_eq!(&back, engine.state());
}
