//! End-to-end digest convergence scenarios.
//!
//! These exercise the digest loop's cross-watcher behavior:
//!
//! 1. Cascades settle within a single `digest()` call, whatever the
//!    registration order of the dependent watchers.
//! 2. Mutually-dirtying watchers make `digest()` fail; it never returns
//!    `Ok` for a non-convergent graph.
//! 3. The last-dirty short-circuit bounds evaluation counts: 2N for the
//!    first digest of N independent watchers, N+1 after one value changes.
//! 4. Watchers registered by a listener mid-digest run in that same digest.

use std::cell::Cell;
use std::rc::Rc;

use quiesce::{Scope, Value};

#[test]
fn chained_watchers_settle_in_one_digest() {
    let scope = Scope::new();
    scope.set("name", "Jane");

    // Registered first, but depends on a property the *second* watcher
    // derives: convergence needs a second pass.
    scope.watch(
        |s| s.get("name_upper"),
        |new, _, s| {
            if let Some(upper) = new.as_str() {
                s.set("initial", format!("{}.", &upper[..1]));
            }
        },
    );

    scope.watch(
        |s| s.get("name"),
        |new, _, s| {
            if let Some(name) = new.as_str() {
                s.set("name_upper", name.to_uppercase());
            }
        },
    );

    scope.digest().unwrap();
    assert_eq!(scope.get("initial").as_str(), Some("J."));

    scope.set("name", "Bob");
    scope.digest().unwrap();
    assert_eq!(scope.get("initial").as_str(), Some("B."));
}

#[test]
fn gives_up_on_mutually_dirtying_watchers() {
    let scope = Scope::new();
    scope.set("counter_a", 0);
    scope.set("counter_b", 0);

    scope.watch(
        |s| s.get("counter_a"),
        |_, _, s| {
            s.set("counter_b", s.get("counter_b").as_f64().unwrap() + 1.0);
        },
    );
    scope.watch(
        |s| s.get("counter_b"),
        |_, _, s| {
            s.set("counter_a", s.get("counter_a").as_f64().unwrap() + 1.0);
        },
    );

    let err = scope.digest().unwrap_err();
    let message = err.to_string();
    assert!(message.contains("did not converge"), "got: {message}");
}

#[test]
fn short_circuits_when_the_last_watch_is_clean() {
    let scope = Scope::new();
    scope.set("array", Value::array((0..100).map(Value::from)));

    let executions = Rc::new(Cell::new(0u32));
    for i in 0..100usize {
        let executions = Rc::clone(&executions);
        scope.watch(
            move |s| {
                executions.set(executions.get() + 1);
                s.get("array").index(i)
            },
            |_, _, _| {},
        );
    }

    // First digest: one dirty sweep plus one confirming sweep.
    scope.digest().unwrap();
    assert_eq!(executions.get(), 200);

    // Dirty the first watcher only: a full sweep, then re-confirming the
    // short-circuit point costs a single extra evaluation.
    scope
        .get("array")
        .as_array()
        .unwrap()
        .borrow_mut()[0] = Value::from(420);
    scope.digest().unwrap();
    assert_eq!(executions.get(), 301);
}

#[test]
fn watcher_registered_by_listener_runs_in_same_digest() {
    let scope = Scope::new();
    scope.set("a_value", "abc");
    let inner_calls = Rc::new(Cell::new(0u32));

    let inner_calls_out = Rc::clone(&inner_calls);
    scope.watch(
        |s| s.get("a_value"),
        move |_, _, s| {
            let inner_calls = Rc::clone(&inner_calls_out);
            s.watch(
                |s| s.get("a_value"),
                move |_, _, _| inner_calls.set(inner_calls.get() + 1),
            );
        },
    );

    scope.digest().unwrap();
    assert_eq!(inner_calls.get(), 1);
}

#[test]
fn listener_mutations_are_visible_to_later_watchers_in_the_same_pass() {
    let scope = Scope::new();
    scope.set("source", 1);
    let derived_seen = Rc::new(Cell::new(f64::NAN));

    scope.watch(
        |s| s.get("source"),
        |new, _, s| {
            s.set("derived", new.as_f64().unwrap() * 10.0);
        },
    );
    let derived_out = Rc::clone(&derived_seen);
    scope.watch(
        |s| s.get("derived"),
        move |new, _, _| derived_out.set(new.as_f64().unwrap()),
    );

    scope.digest().unwrap();
    assert_eq!(derived_seen.get(), 10.0);

    scope.set("source", 7);
    scope.digest().unwrap();
    assert_eq!(derived_seen.get(), 70.0);
}

#[test]
fn converging_cascade_within_budget_still_succeeds() {
    // A chain that needs several passes but does terminate.
    let scope = Scope::new();
    scope.set("a", 0);

    scope.watch(
        |s| s.get("a"),
        |new, _, s| {
            let a = new.as_f64().unwrap();
            if a < 5.0 {
                s.set("a", a + 1.0);
            }
        },
    );

    scope.digest().unwrap();
    assert_eq!(scope.get("a").as_f64(), Some(5.0));
}

#[test]
fn failed_digest_leaves_scope_usable() {
    let scope = Scope::new();
    scope.set("ping", 0);
    scope.set("pong", 0);
    scope.set("steady", 1);
    let steady_calls = Rc::new(Cell::new(0u32));

    scope.watch(
        |s| s.get("ping"),
        |_, _, s| s.set("pong", s.get("pong").as_f64().unwrap() + 1.0),
    );
    scope.watch(
        |s| s.get("pong"),
        |_, _, s| s.set("ping", s.get("ping").as_f64().unwrap() + 1.0),
    );
    let steady_out = Rc::clone(&steady_calls);
    scope.watch(
        |s| s.get("steady"),
        move |_, _, _| steady_out.set(steady_out.get() + 1),
    );

    assert!(scope.digest().is_err());

    // Property reads and writes still work after the failure.
    scope.set("steady", 2);
    assert_eq!(scope.get("steady").as_f64(), Some(2.0));
}
