//! Error containment around a compiled game.

use std::cell::RefCell;
use std::rc::Rc;

use cardscript::compiler::{compile_game, CompileOptions, RuntimeSchema};
use cardscript::{ActionError, GameDefinition};
use serde_json::{json, Value};

fn definition() -> GameDefinition {
    serde_json::from_value(json!({
        "events": [
            {
                "eventId": "e1",
                "name": "score",
                "inputType": "number",
                "code": "define(function(state, n) state.properties.score = state.properties.score + n return state.properties.score end)"
            },
            {
                "eventId": "e2",
                "name": "cheat",
                "inputType": {"amount": "number"},
                "code": "define(function(state, p) state.properties.score = p.amount error('caught cheating') end)"
            }
        ]
    }))
    .unwrap()
}

#[test]
fn test_failure_is_contained_and_reported() {
    let schema = RuntimeSchema::new(2).with_global("score", json!(0));
    let game = compile_game(&schema, &definition(), CompileOptions::new()).unwrap();
    let safe = game.fail_safe();

    let failures = Rc::new(RefCell::new(Vec::new()));
    let sub = {
        let failures = Rc::clone(&failures);
        safe.subscribe_errors(move |failure| {
            failures
                .borrow_mut()
                .push((failure.action.clone(), failure.error.clone()))
        })
    };

    assert_eq!(safe.perform_action("score", json!(3)), Some(json!(3)));
    let before = safe.state();

    assert_eq!(safe.perform_action("cheat", json!({"amount": 99})), None);

    assert!(Rc::ptr_eq(&before, &safe.state()));
    assert_eq!(safe.state().global("score"), Some(&json!(3)));
    {
        let failures = failures.borrow();
        assert_eq!(failures.len(), 1);
        let (action, error) = &failures[0];
        assert_eq!(action.name, "cheat");
        assert_eq!(action.payload, json!({"amount": 99}));
        assert!(matches!(error, ActionError::Script { message, .. } if message.contains("caught cheating")));
    }

    sub.unsubscribe();
    assert_eq!(safe.perform_action("missing", Value::Null), None);
    assert_eq!(failures.borrow().len(), 1);
}

#[test]
fn test_state_listeners_skip_failures() {
    let schema = RuntimeSchema::new(1).with_global("score", json!(0));
    let game = compile_game(&schema, &definition(), CompileOptions::new()).unwrap();
    let safe = game.fail_safe();
    let commits = Rc::new(RefCell::new(0));
    let _sub = {
        let commits = Rc::clone(&commits);
        safe.subscribe(move |_| *commits.borrow_mut() += 1)
    };

    safe.perform_action("cheat", json!({"amount": 1}));
    safe.perform_action("score", json!("not a number"));
    assert_eq!(*commits.borrow(), 0);

    safe.perform_action("score", json!(1));
    assert_eq!(*commits.borrow(), 1);
}

#[test]
fn test_disposed_game_reports_disposed() {
    let schema = RuntimeSchema::new(1).with_global("score", json!(0));
    let game = compile_game(&schema, &definition(), CompileOptions::new()).unwrap();
    let safe = game.fail_safe();
    let last = Rc::new(RefCell::new(None));
    let _sub = {
        let last = Rc::clone(&last);
        safe.subscribe_errors(move |failure| *last.borrow_mut() = Some(failure.error.clone()))
    };

    game.dispose().unwrap();

    assert_eq!(safe.perform_action("score", json!(1)), None);
    assert!(matches!(*last.borrow(), Some(ActionError::Disposed)));
}
