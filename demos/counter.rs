//! Self-contained example demonstrating slices, middleware, listeners, and
//! the builder-based `Store` API.
//!
//! Run with: `cargo run --example counter`

use std::cell::Cell;
use std::rc::Rc;

use statefold::{ActionLogger, Slice, Store};

// ---------------------------------------------------------------------------
// Counter slice
// ---------------------------------------------------------------------------

/// A simple counter that can be incremented, decremented, or bumped by an
/// arbitrary amount.
#[derive(Debug, Clone, Default, PartialEq)]
struct Counter {
    value: i64,
}

fn counter_slice() -> Slice {
    Slice::builder("counter", Counter::default())
        .case("increment", |state: &mut Counter, _: ()| state.value += 1)
        .case("decrement", |state: &mut Counter, _: ()| state.value -= 1)
        .case(
            "increment_by_amount",
            |state: &mut Counter, amount: i64| state.value += amount,
        )
        .build()
}

// ---------------------------------------------------------------------------
// Status slice (reacts to counter actions via an extra case)
// ---------------------------------------------------------------------------

/// Tracks how many counter updates have been observed.
#[derive(Debug, Clone, Default, PartialEq)]
struct Status {
    updates: u64,
}

fn status_slice() -> Slice {
    Slice::builder("status", Status::default())
        .extra_case("counter/increment", |state: &mut Status, _: ()| {
            state.updates += 1;
        })
        .extra_case(
            "counter/increment_by_amount",
            |state: &mut Status, _amount: i64| state.updates += 1,
        )
        .build()
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let counter = counter_slice();
    let increment = counter.action("increment").unwrap().clone();
    let by_amount = counter.action("increment_by_amount").unwrap().clone();

    let store = Store::builder()
        .slice(counter)
        .slice(status_slice())
        .middleware(ActionLogger)
        .build();

    // Count committed dispatches through a listener.
    let commits = Rc::new(Cell::new(0u32));
    let seen = Rc::clone(&commits);
    let subscription = store.subscribe(move || seen.set(seen.get() + 1));

    store.dispatch(increment.action())?;
    store.dispatch(by_amount.action_with(5i64)?)?;

    let state = store.state()?;
    let value = state.get::<Counter>("counter").unwrap().value;
    let updates = state.get::<Status>("status").unwrap().updates;

    println!("counter = {value}");
    println!("updates = {updates}");
    println!("commits = {}", commits.get());

    // Verify expected values.
    assert_eq!(value, 6, "counter should be 6 (inc, then +5)");
    assert_eq!(updates, 2, "status should have seen both counter actions");
    assert_eq!(commits.get(), 2, "listener should fire once per dispatch");

    subscription.cancel();
    println!("all assertions passed");

    Ok(())
}
