#![forbid(unsafe_code)]

//! Property-based invariant tests for results and the `when` combinator.
//!
//! 1. Settlement is monotonic: the first resolve/reject wins, the state never
//!    changes afterwards, and exactly one of done/fail runs, once.
//! 2. Late done/fail listeners observe the same settlement as early ones.
//! 3. Progress observed before settlement is exactly the notify sequence
//!    issued while pending; nothing is observed after.
//! 4. `when` fulfills with inputs in positional order regardless of the
//!    order in which they settle.
//! 5. `when` rejects with the arguments of the first input to reject.
//! 6. A pipe with a value handler applies it exactly once to the settlement.

use deferral_core::{Args, AsyncResult, Handlers, Input, ResultView, State, Step, when};
use proptest::prelude::*;
use serde_json::{Value, json};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy)]
enum Op {
    Resolve(i64),
    Reject(i64),
    Notify(i64),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<i64>().prop_map(Op::Resolve),
        any::<i64>().prop_map(Op::Reject),
        any::<i64>().prop_map(Op::Notify),
    ]
}

type Log = Rc<RefCell<Vec<(&'static str, Value)>>>;

fn record(view: &ResultView, log: &Log) {
    let (d, f, p) = (Rc::clone(log), Rc::clone(log), Rc::clone(log));
    view.done(move |a: &Args<Value>| d.borrow_mut().push(("done", a[0].clone())));
    view.fail(move |a: &Args<Value>| f.borrow_mut().push(("fail", a[0].clone())));
    view.progress(move |a: &Args<Value>| p.borrow_mut().push(("progress", a[0].clone())));
}

/// What a sequence of operations should produce: the final state, the
/// settlement event and the notifications issued while pending.
fn model(ops: &[Op]) -> (State, Option<(&'static str, Value)>, Vec<Value>) {
    let mut notes = Vec::new();
    for op in ops {
        match *op {
            Op::Resolve(v) => return (State::Fulfilled, Some(("done", json!(v))), notes),
            Op::Reject(v) => return (State::Rejected, Some(("fail", json!(v))), notes),
            Op::Notify(v) => notes.push(json!(v)),
        }
    }
    (State::Pending, None, notes)
}

fn apply(result: &AsyncResult, ops: &[Op]) {
    for op in ops {
        match *op {
            Op::Resolve(v) => result.resolve(json!(v)),
            Op::Reject(v) => result.reject(json!(v)),
            Op::Notify(v) => result.notify(json!(v)),
        };
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 1–3. Settlement monotonicity, replay and progress window
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn settlement_follows_first_decisive_op(ops in proptest::collection::vec(arb_op(), 0..24)) {
        let result: AsyncResult = AsyncResult::new();
        let early: Log = Rc::default();
        record(result.view(), &early);

        let mut states = Vec::new();
        for op in &ops {
            apply(&result, std::slice::from_ref(op));
            states.push(result.state());
        }

        let (state, settlement, notes) = model(&ops);
        prop_assert_eq!(result.state(), state);

        // Once settled, the state never changes.
        if let Some(first) = states.iter().position(|s| *s != State::Pending) {
            prop_assert!(states[first..].iter().all(|s| *s == state));
        }

        let mut expected: Vec<(&'static str, Value)> =
            notes.into_iter().map(|n| ("progress", n)).collect();
        expected.extend(settlement.clone());
        prop_assert_eq!(&*early.borrow(), &expected);

        let late: Log = Rc::default();
        record(result.view(), &late);
        let replayed: Vec<_> = settlement.into_iter().collect();
        if state == State::Pending {
            // A pending result replays only its latest notification.
            prop_assert!(late.borrow().iter().all(|(kind, _)| *kind == "progress"));
            prop_assert!(late.borrow().len() <= 1);
        } else {
            prop_assert_eq!(&*late.borrow(), &replayed);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Positional fan-in
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn when_orders_by_position(
        order in Just((0..8usize).collect::<Vec<_>>()).prop_shuffle(),
        plain in proptest::collection::vec(any::<bool>(), 8),
    ) {
        let results: Vec<AsyncResult> = (0..8).map(|_| AsyncResult::new()).collect();
        let inputs: Vec<Input> = (0..8)
            .map(|i| {
                if plain[i] {
                    Input::from(json!(i))
                } else {
                    Input::from(&results[i])
                }
            })
            .collect();
        let joined = when(inputs);

        let seen: Rc<RefCell<Option<Vec<Value>>>> = Rc::default();
        let s = Rc::clone(&seen);
        joined.done(move |a: &Args<Value>| *s.borrow_mut() = Some(a.clone().into_vec()));

        let mut outstanding = plain.iter().filter(|p| !**p).count();
        prop_assert_eq!(seen.borrow().is_some(), outstanding == 0);
        for &i in &order {
            results[i].resolve(json!(i));
            if !plain[i] {
                outstanding -= 1;
            }
            prop_assert_eq!(seen.borrow().is_some(), outstanding == 0);
        }

        let expected: Vec<Value> = (0..8).map(|i| json!(i)).collect();
        prop_assert_eq!(seen.borrow().clone(), Some(expected));
        prop_assert_eq!(joined.state(), State::Fulfilled);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. First rejection wins
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn when_rejects_with_first_failure(
        order in Just((0..6usize).collect::<Vec<_>>()).prop_shuffle(),
        failing in proptest::collection::btree_set(0..6usize, 1..6),
    ) {
        let results: Vec<AsyncResult> = (0..6).map(|_| AsyncResult::new()).collect();
        let joined = when(results.iter().map(Input::from));

        let failures: Rc<RefCell<Vec<Value>>> = Rc::default();
        let f = Rc::clone(&failures);
        joined.fail(move |a: &Args<Value>| f.borrow_mut().push(a[0].clone()));

        for &i in &order {
            if failing.contains(&i) {
                results[i].reject(json!(i));
            } else {
                results[i].resolve(json!(i));
            }
        }

        let first = order.iter().find(|i| failing.contains(i)).copied();
        prop_assert_eq!(joined.state(), State::Rejected);
        prop_assert_eq!(&*failures.borrow(), &vec![json!(first)]);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 6. Pipe applies the handler once
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn pipe_maps_settlement_once(ops in proptest::collection::vec(arb_op(), 1..12)) {
        let source: AsyncResult = AsyncResult::new();
        let calls = Rc::new(RefCell::new(0usize));
        let c = Rc::clone(&calls);
        let derived = source.pipe(Handlers::new().done(move |a: &Args<Value>| {
            *c.borrow_mut() += 1;
            Step::Value(json!(a[0].as_i64().unwrap_or(0).wrapping_neg()))
        }));
        apply(&source, &ops);

        let (state, settlement, _) = model(&ops);
        prop_assert_eq!(derived.state(), state);
        match settlement {
            Some(("done", v)) => {
                prop_assert_eq!(*calls.borrow(), 1);
                let log: Log = Rc::default();
                record(&derived, &log);
                let n = v.as_i64().unwrap_or(0).wrapping_neg();
                prop_assert_eq!(&*log.borrow(), &vec![("done", json!(n))]);
            }
            _ => prop_assert_eq!(*calls.borrow(), 0),
        }
    }
}
