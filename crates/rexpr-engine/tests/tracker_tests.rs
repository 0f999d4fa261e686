//! Integration tests for change tracking and playback.

use std::cell::RefCell;
use std::rc::Rc;

use rexpr_engine::{
    BoundExpression, ChangeBatch, ChangeTracker, Engine, EngineOptions, Key, Obj, PlaybackError,
    PlaybackTarget, Value,
};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

struct Fixture {
    engine: Engine,
    ctx: Obj,
    expr: BoundExpression,
    tracker: ChangeTracker,
}

fn fixture_with(options: EngineOptions, source: &str) -> Fixture {
    let engine = Engine::with_options(options);
    let ctx = Obj::record();
    ctx.set(&Key::name("a"), Value::from(1));
    ctx.set(&Key::name("b"), Value::from(2));
    let expr = engine.create_expression(&ctx, source).unwrap();
    let tracker = engine.create_change_tracker(&expr).unwrap();
    Fixture {
        engine,
        ctx,
        expr,
        tracker,
    }
}

fn fixture() -> Fixture {
    fixture_with(EngineOptions::default(), "a + b")
}

/// `(label, old, new)` for every record of one batch.
fn summary(batch: &ChangeBatch) -> Vec<(String, Value, Value)> {
    batch
        .changes
        .iter()
        .map(|c| (c.identifier.label.to_string(), c.old.clone(), c.new.clone()))
        .collect()
}

fn n(value: i32) -> Value {
    Value::from(value)
}

// ══════════════════════════════════════════════════════════════════════════════
// Recording
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_each_commit_records_one_batch() {
    let f = fixture();
    f.engine.set_value(&f.ctx, "a", 5);
    f.engine.batch(|| {
        f.engine.set_value(&f.ctx, "a", 6);
        f.engine.set_value(&f.ctx, "b", 7);
    });

    let history = f.tracker.history();
    assert_eq!(history.len(), 2);
    assert_eq!(summary(&history.batches()[0]), vec![("a".into(), n(1), n(5))]);
    assert_eq!(
        summary(&history.batches()[1]),
        vec![("a".into(), n(5), n(6)), ("b".into(), n(2), n(7))]
    );
    assert_eq!(history.batches()[0].index, 0);
    assert_eq!(history.batches()[1].index, 1);
    assert!(history.batches()[0].timestamp_ms <= history.batches()[1].timestamp_ms);
}

#[test]
fn test_repeated_writes_collapse_to_one_record() {
    let f = fixture();
    f.engine.batch(|| {
        f.engine.set_value(&f.ctx, "a", 2);
        f.engine.set_value(&f.ctx, "a", 3);
        f.engine.set_value(&f.ctx, "a", 4);
    });

    let history = f.tracker.history();
    assert_eq!(history.len(), 1);
    assert_eq!(summary(&history.batches()[0]), vec![("a".into(), n(1), n(4))]);
}

#[test]
fn test_round_trip_within_batch_records_nothing() {
    let f = fixture();
    f.engine.batch(|| {
        f.engine.set_value(&f.ctx, "a", 9);
        f.engine.set_value(&f.ctx, "a", 1);
    });
    assert!(f.tracker.history().is_empty());
}

#[test]
fn test_subscribers_receive_batches() {
    let f = fixture();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let _sub = f
        .tracker
        .subscribe(move |batch| sink.borrow_mut().push(batch.index))
        .unwrap();

    f.engine.set_value(&f.ctx, "a", 2);
    f.engine.set_value(&f.ctx, "b", 3);
    assert_eq!(*seen.borrow(), vec![0, 1]);
}

#[test]
fn test_pause_skips_recording() {
    let f = fixture();
    f.tracker.pause();
    assert!(f.tracker.is_paused());
    f.engine.set_value(&f.ctx, "a", 2);
    assert!(f.tracker.history().is_empty());
    assert_eq!(f.expr.value(), Some(n(4)));

    f.tracker.resume();
    f.engine.set_value(&f.ctx, "a", 3);
    let history = f.tracker.history();
    assert_eq!(history.len(), 1);
    assert_eq!(summary(&history.batches()[0]), vec![("a".into(), n(2), n(3))]);
}

#[test]
fn test_member_hops_are_recorded_by_key() {
    let engine = Engine::new();
    let user = Obj::record();
    user.set(&Key::name("name"), Value::from("Ada"));
    let ctx = Obj::record();
    ctx.set(&Key::name("user"), Value::Object(user.clone()));
    let expr = engine.create_expression(&ctx, "user.name").unwrap();
    let tracker = engine.create_change_tracker(&expr).unwrap();

    engine.set_value(&user, "name", "Grace");

    let history = tracker.history();
    assert_eq!(history.len(), 1);
    let record = &history.batches()[0].changes[0];
    assert!(record.identifier.context.ptr_eq(&user));
    assert_eq!(record.identifier.key, Key::name("name"));
    assert_eq!(record.new, Value::from("Grace"));
}

#[test]
fn test_history_limit_drops_oldest() {
    let f = fixture_with(
        EngineOptions {
            history_limit: Some(2),
            ..EngineOptions::default()
        },
        "a + b",
    );
    for value in 2..=4 {
        f.engine.set_value(&f.ctx, "a", value);
    }
    let indices: Vec<usize> = f.tracker.history().iter().map(|b| b.index).collect();
    assert_eq!(indices, vec![1, 2]);
}

#[test]
fn test_disposed_tracker_stops_recording() {
    let f = fixture();
    f.engine.set_value(&f.ctx, "a", 2);
    f.tracker.dispose();
    f.engine.set_value(&f.ctx, "a", 3);
    assert_eq!(f.tracker.history().len(), 1);
}

// ══════════════════════════════════════════════════════════════════════════════
// Playback
// ══════════════════════════════════════════════════════════════════════════════

/// Three batches: a 1→5, then a 5→6 with b 2→7, then b 7→8.
fn recorded() -> Fixture {
    let f = fixture();
    f.engine.set_value(&f.ctx, "a", 5);
    f.engine.batch(|| {
        f.engine.set_value(&f.ctx, "a", 6);
        f.engine.set_value(&f.ctx, "b", 7);
    });
    f.engine.set_value(&f.ctx, "b", 8);
    assert_eq!(f.tracker.history().len(), 3);
    f
}

fn slots(f: &Fixture) -> (Value, Value) {
    (f.ctx.get(&Key::name("a")), f.ctx.get(&Key::name("b")))
}

#[test]
fn test_play_backward_restores_earlier_states() {
    let f = recorded();

    assert_eq!(f.tracker.play_backward(PlaybackTarget::Index(2)).unwrap(), 2);
    assert_eq!(slots(&f), (n(6), n(7)));
    assert_eq!(f.expr.value(), Some(n(13)));

    f.tracker.play_backward(PlaybackTarget::Index(1)).unwrap();
    assert_eq!(slots(&f), (n(5), n(2)));

    f.tracker.play_backward(PlaybackTarget::Index(0)).unwrap();
    assert_eq!(slots(&f), (n(1), n(2)));
    assert_eq!(f.expr.value(), Some(n(3)));
}

#[test]
fn test_play_forward_reapplies_recorded_states() {
    let f = recorded();
    f.tracker.play_backward(PlaybackTarget::Index(0)).unwrap();

    f.tracker.play_forward(PlaybackTarget::Index(0)).unwrap();
    assert_eq!(slots(&f), (n(5), n(2)));

    f.tracker.play_forward(PlaybackTarget::Index(1)).unwrap();
    assert_eq!(slots(&f), (n(6), n(7)));

    f.tracker.play_forward(PlaybackTarget::Index(2)).unwrap();
    assert_eq!(slots(&f), (n(6), n(8)));
    assert_eq!(f.expr.value(), Some(n(14)));
}

#[test]
fn test_playback_is_not_recorded() {
    let f = recorded();
    f.tracker.play_backward(PlaybackTarget::Index(0)).unwrap();
    f.tracker.play_forward(PlaybackTarget::Index(2)).unwrap();
    assert_eq!(f.tracker.history().len(), 3);
    assert!(!f.tracker.is_paused());

    // Recording picks up again afterwards.
    f.engine.set_value(&f.ctx, "a", 100);
    assert_eq!(f.tracker.history().len(), 4);
}

#[test]
fn test_playback_settles_once() {
    let f = recorded();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let _sub = f.expr.subscribe(move |v| sink.borrow_mut().push(v.clone())).unwrap();

    f.tracker.play_backward(PlaybackTarget::Index(0)).unwrap();
    assert_eq!(*seen.borrow(), vec![n(14), n(3)]);
}

#[test]
fn test_playback_by_timestamp() {
    let f = recorded();
    f.tracker.play_backward(PlaybackTarget::Timestamp(0)).unwrap();
    assert_eq!(slots(&f), (n(1), n(2)));

    f.tracker.play_forward(PlaybackTarget::Timestamp(u64::MAX)).unwrap();
    assert_eq!(slots(&f), (n(6), n(8)));

    assert!(matches!(
        f.tracker.play_forward(PlaybackTarget::Timestamp(0)),
        Err(PlaybackError::TimestampOutOfRange(0))
    ));
}

#[test]
fn test_playback_out_of_range() {
    let f = recorded();
    assert!(matches!(
        f.tracker.play_forward(PlaybackTarget::Index(3)),
        Err(PlaybackError::IndexOutOfRange { index: 3, len: 3 })
    ));
    assert_eq!(slots(&f), (n(6), n(8)));
}

#[test]
fn test_engine_plays_detached_history() {
    let f = recorded();
    let history = f.tracker.history();
    f.tracker.dispose();

    let written = f
        .engine
        .play_backward(PlaybackTarget::Index(0), &history)
        .unwrap();
    assert_eq!(written, 2);
    assert_eq!(f.expr.value(), Some(n(3)));
}

#[test]
fn test_engine_playback_pauses_live_trackers() {
    let f = recorded();
    let history = f.tracker.history();
    f.tracker.pause();

    f.engine
        .play_backward(PlaybackTarget::Index(0), &history)
        .unwrap();
    assert_eq!(f.expr.value(), Some(n(3)));
    assert_eq!(f.tracker.history().len(), 3);
    // A tracker paused by its owner stays paused.
    assert!(f.tracker.is_paused());

    f.tracker.resume();
    f.engine
        .play_forward(PlaybackTarget::Index(2), &history)
        .unwrap();
    assert_eq!(f.tracker.history().len(), 3);
    assert!(!f.tracker.is_paused());

    f.engine.set_value(&f.ctx, "a", 100);
    assert_eq!(f.tracker.history().len(), 4);
}

#[test]
fn test_disposed_tracker_cannot_play() {
    let f = recorded();
    f.tracker.dispose();
    assert!(matches!(
        f.tracker.play_backward(PlaybackTarget::Index(0)),
        Err(PlaybackError::Lifecycle(_))
    ));
}
