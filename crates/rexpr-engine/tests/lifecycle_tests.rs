//! Integration tests for caching, disposal and error isolation.

use std::cell::Cell;
use std::rc::Rc;

use rexpr_engine::{
    Engine, EngineError, EngineOptions, EvalError, Key, LifecycleError, NativeFunction, Obj, Value,
};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

const SOURCE: &str = "a + 1*(2+3)";

fn context_with_a(a: i32) -> Obj {
    let ctx = Obj::record();
    ctx.set(&Key::name("a"), Value::from(a));
    ctx
}

// ══════════════════════════════════════════════════════════════════════════════
// Reference Counting
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_same_pair_binds_independent_instances() {
    let engine = Engine::new();
    let ctx = context_with_a(1);
    let first = engine.create_expression(&ctx, SOURCE).unwrap();
    let second = engine.create_expression(&ctx, SOURCE).unwrap();

    assert_ne!(first.id(), second.id());
    assert_eq!(engine.binding_ref_count(&ctx, SOURCE), 2);
    assert_eq!(engine.parse_ref_count(SOURCE), 2);
    assert_eq!(engine.bound_context_count(), 1);
    assert_eq!(first.value(), Some(Value::from(6)));
    assert!(!first.can_dispose());

    first.dispose();
    assert_eq!(engine.binding_ref_count(&ctx, SOURCE), 1);
    assert_eq!(engine.parse_ref_count(SOURCE), 1);
    assert!(second.can_dispose());
    assert_eq!(second.value(), Some(Value::from(6)));

    engine.set_value(&ctx, "a", 4);
    assert_eq!(second.value(), Some(Value::from(9)));

    second.dispose();
    assert_eq!(engine.binding_ref_count(&ctx, SOURCE), 0);
    assert_eq!(engine.parse_ref_count(SOURCE), 0);
    assert_eq!(engine.bound_context_count(), 0);
}

#[test]
fn test_each_binding_keeps_its_own_watch_predicate() {
    let engine = Engine::new();
    let list = Obj::list([Value::from(1), Value::from(2)]);
    let ctx = Obj::record();
    ctx.set(&Key::name("items"), Value::Object(list.clone()));

    let shallow = engine
        .create_expression_with(&ctx, "items", |_, _| false)
        .unwrap();
    let deep = engine.create_expression(&ctx, "items").unwrap();
    let shallow_hits = Rc::new(Cell::new(0));
    let deep_hits = Rc::new(Cell::new(0));
    let counter = Rc::clone(&shallow_hits);
    let _shallow_sub = shallow.subscribe(move |_| counter.set(counter.get() + 1)).unwrap();
    let counter = Rc::clone(&deep_hits);
    let _deep_sub = deep.subscribe(move |_| counter.set(counter.get() + 1)).unwrap();

    engine.set_value(&list, 0usize, 100);
    assert_eq!(shallow_hits.get(), 1);
    assert_eq!(deep_hits.get(), 2);
}

#[test]
fn test_parse_entry_outlives_first_context() {
    let engine = Engine::new();
    let one = context_with_a(1);
    let two = context_with_a(2);
    let a = engine.create_expression(&one, SOURCE).unwrap();
    let b = engine.create_expression(&two, SOURCE).unwrap();

    assert_ne!(a.id(), b.id());
    assert_eq!(engine.parse_ref_count(SOURCE), 2);
    assert_eq!(engine.bound_context_count(), 2);

    a.dispose();
    assert_eq!(engine.parse_ref_count(SOURCE), 1);
    assert_eq!(engine.bound_context_count(), 1);
    assert_eq!(b.value(), Some(Value::from(7)));
}

#[test]
fn test_dispose_is_idempotent() {
    let engine = Engine::new();
    let ctx = context_with_a(1);
    let first = engine.create_expression(&ctx, SOURCE).unwrap();
    let _second = engine.create_expression(&ctx, SOURCE).unwrap();

    first.dispose();
    first.dispose();
    assert!(first.is_disposed());
    assert_eq!(engine.binding_ref_count(&ctx, SOURCE), 1);
}

#[test]
fn test_clone_takes_its_own_lease() {
    let engine = Engine::new();
    let ctx = context_with_a(1);
    let expr = engine.create_expression(&ctx, "a").unwrap();
    let copy = expr.clone();
    assert_eq!(engine.binding_ref_count(&ctx, "a"), 2);

    drop(expr);
    assert_eq!(engine.binding_ref_count(&ctx, "a"), 1);
    assert!(!copy.is_disposed());

    drop(copy);
    assert_eq!(engine.binding_ref_count(&ctx, "a"), 0);
    assert_eq!(engine.state().watched_slot_count(), 0);
}

#[test]
fn test_rebinding_after_release_starts_fresh() {
    let engine = Engine::new();
    let ctx = context_with_a(1);
    let first = engine.create_expression(&ctx, "a").unwrap();
    let first_id = first.id();
    first.dispose();

    engine.set_value(&ctx, "a", 5);
    let second = engine.create_expression(&ctx, "a").unwrap();
    assert_ne!(second.id(), first_id);
    assert_eq!(second.value(), Some(Value::from(5)));
}

// ══════════════════════════════════════════════════════════════════════════════
// Misuse
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_disposed_expression_rejects_use() {
    let engine = Engine::new();
    let ctx = context_with_a(1);
    let expr = engine.create_expression(&ctx, "a").unwrap();
    expr.dispose();

    assert!(matches!(
        expr.set_value(Value::from(2)),
        Err(EngineError::Lifecycle(LifecycleError::Disposed(_)))
    ));
    assert!(matches!(
        engine.create_change_tracker(&expr),
        Err(EngineError::Lifecycle(LifecycleError::Disposed(_)))
    ));
}

#[test]
fn test_double_tracking_is_rejected() {
    let engine = Engine::new();
    let ctx = context_with_a(1);
    let expr = engine.create_expression(&ctx, "a").unwrap();
    let tracker = engine.create_change_tracker(&expr).unwrap();

    match engine.create_change_tracker(&expr) {
        Err(EngineError::Lifecycle(LifecycleError::AlreadyTracked(id))) => assert_eq!(id, expr.id()),
        other => panic!("expected AlreadyTracked, got {other:?}"),
    }

    tracker.dispose();
    assert!(engine.create_change_tracker(&expr).is_ok());
}

#[test]
fn test_trackers_share_one_hub_per_root() {
    let engine = Engine::new();
    let ctx = context_with_a(1);
    let expr = engine.create_expression(&ctx, "a").unwrap();
    let copy = expr.clone();

    let first = engine.create_change_tracker(&expr).unwrap();
    let second = engine.create_change_tracker(&copy).unwrap();
    assert_eq!(engine.tracked_root_count(), 1);

    first.dispose();
    assert_eq!(engine.tracked_root_count(), 1);
    drop(second);
    assert_eq!(engine.tracked_root_count(), 0);
}

#[test]
fn test_disposed_tracker_rejects_subscribers() {
    let engine = Engine::new();
    let ctx = context_with_a(1);
    let expr = engine.create_expression(&ctx, "a").unwrap();
    let tracker = engine.create_change_tracker(&expr).unwrap();
    tracker.dispose();
    tracker.dispose();

    assert!(tracker.is_disposed());
    assert!(matches!(
        tracker.subscribe(|_| {}),
        Err(LifecycleError::Disposed(_))
    ));
}

// ══════════════════════════════════════════════════════════════════════════════
// Error Isolation
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_failing_expression_does_not_block_others() {
    let engine = Engine::new();
    let ctx = context_with_a(1);
    ctx.set(
        &Key::name("check"),
        Value::Function(NativeFunction::new("check", |_, args| {
            match args.first().and_then(Value::as_number) {
                Some(n) if n > 5.0 => Err(EvalError::Native {
                    name: "check".into(),
                    message: format!("{n} is too large"),
                }),
                Some(n) => Ok(Value::Number(n)),
                None => Ok(Value::Undefined),
            }
        })),
    );
    let checked = engine.create_expression(&ctx, "check(a)").unwrap();
    let doubled = engine.create_expression(&ctx, "a * 2").unwrap();
    assert_eq!(checked.value(), Some(Value::from(1)));

    engine.set_value(&ctx, "a", 10);

    assert_eq!(doubled.value(), Some(Value::from(20)));
    assert_eq!(checked.value(), Some(Value::from(1)));
    let errors = engine.take_errors();
    assert!(
        matches!(errors.as_slice(), [EngineError::Eval(EvalError::Native { name, .. })] if name == "check"),
        "{errors:?}"
    );

    engine.set_value(&ctx, "a", 3);
    assert_eq!(checked.value(), Some(Value::from(3)));
    assert!(engine.take_errors().is_empty());
}

#[test]
fn test_oversized_list_write_is_reported() {
    let engine = Engine::new();
    let list = Obj::list([Value::from(1)]);
    let ctx = Obj::record();
    ctx.set(&Key::name("items"), Value::Object(list.clone()));
    let expr = engine.create_expression(&ctx, "items.length").unwrap();

    engine.set_value(&list, 1usize << 40, 2);
    engine.set_value(&list, Key::length(), 1e15);

    assert_eq!(list.len(), 1);
    assert_eq!(expr.value(), Some(Value::from(1)));
    let errors = engine.take_errors();
    assert_eq!(errors.len(), 2, "{errors:?}");
    assert!(errors
        .iter()
        .all(|error| matches!(error, EngineError::Eval(EvalError::ListTooLong { .. }))));

    engine.set_value(&list, 1usize, 2);
    assert_eq!(expr.value(), Some(Value::from(2)));
}

#[test]
fn test_not_callable_is_reported_per_commit() {
    let engine = Engine::new();
    let ctx = context_with_a(1);
    let broken = engine.create_expression(&ctx, "a()").unwrap();
    let fine = engine.create_expression(&ctx, "a + 1").unwrap();
    assert_eq!(engine.take_errors().len(), 1);

    engine.set_value(&ctx, "a", 2);
    assert_eq!(fine.value(), Some(Value::from(3)));
    assert_eq!(broken.value(), None);
    assert!(matches!(
        engine.take_errors().as_slice(),
        [EngineError::Eval(EvalError::NotCallable(_))]
    ));
}

// ══════════════════════════════════════════════════════════════════════════════
// Suspension
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_suspend_defers_settling() {
    let engine = Engine::new();
    let ctx = context_with_a(1);
    let expr = engine.create_expression(&ctx, "a * 10").unwrap();
    let hits = Rc::new(Cell::new(0));
    let counter = Rc::clone(&hits);
    let _sub = expr.subscribe(move |_| counter.set(counter.get() + 1)).unwrap();

    engine.suspend();
    assert!(engine.is_suspended());
    engine.set_value(&ctx, "a", 2);
    engine.set_value(&ctx, "a", 3);
    assert_eq!(expr.value(), Some(Value::from(10)));

    engine.resume().unwrap();
    assert!(!engine.is_suspended());
    assert_eq!(expr.value(), Some(Value::from(30)));
    assert_eq!(hits.get(), 2);
}

#[test]
fn test_options_round_trip_through_json() {
    let options = EngineOptions {
        history_limit: Some(3),
        deep_observation: false,
        ..EngineOptions::default()
    };
    let parsed = EngineOptions::from_json(&options.to_json()).unwrap();
    assert_eq!(parsed, options);
    assert!(EngineOptions::from_json(r#"{ "unknown": 1 }"#).is_err());
}

#[test]
fn test_deep_observation_can_be_disabled() {
    let engine = Engine::with_options(EngineOptions {
        deep_observation: false,
        ..EngineOptions::default()
    });
    let ctx = Obj::record();
    ctx.set(&Key::name("items"), Value::list([Value::from(1), Value::from(2)]));
    let _expr = engine.create_expression(&ctx, "items").unwrap();
    assert_eq!(engine.state().watched_slot_count(), 1);
}
