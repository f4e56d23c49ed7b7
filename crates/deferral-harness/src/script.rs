#![forbid(unsafe_code)]

//! Scripted operation sequences against a single [`AsyncResult`].
//!
//! A script is a flat list of [`Op`]s: settlement calls interleaved with
//! listener registrations. [`observed`] runs it against the real
//! implementation, [`expected`] against a small reference model, and
//! [`check`] compares the two. When a script fails, [`minimize`] shrinks it
//! with delta debugging to a minimal reproducer.
//!
//! Listener tags are `"<kind>#<index>"`, where `index` is the position of the
//! registering op in the script.

use deferral_core::{AsyncResult, State};
use serde_json::{Value, json};
use thiserror::Error;

use crate::recorder::Recorder;

/// One scripted operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Resolve(i64),
    Reject(i64),
    Notify(i64),
    Done,
    Fail,
    Progress,
    Always,
}

/// A divergence between the implementation and the reference model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Violation {
    #[error("invocation {index} diverged: expected {expected:?}, observed {observed:?}")]
    Diverged {
        index: usize,
        expected: Option<(String, Value)>,
        observed: Option<(String, Value)>,
    },
    #[error("final state {observed} does not match expected {expected}")]
    State { expected: State, observed: State },
}

/// Run `ops` against a fresh result.
///
/// Returns the recorded `(tag, value)` log and the final state.
#[must_use]
pub fn observed(ops: &[Op]) -> (Vec<(String, Value)>, State) {
    let result: AsyncResult = AsyncResult::new();
    let recorder = Recorder::new();
    for (index, op) in ops.iter().enumerate() {
        match *op {
            Op::Resolve(v) => {
                result.resolve(json!(v));
            }
            Op::Reject(v) => {
                result.reject(json!(v));
            }
            Op::Notify(v) => {
                result.notify(json!(v));
            }
            Op::Done => {
                result.add_done(recorder.listener(format!("done#{index}")));
            }
            Op::Fail => {
                result.add_fail(recorder.listener(format!("fail#{index}")));
            }
            Op::Progress => {
                result.add_progress(recorder.listener(format!("progress#{index}")));
            }
            Op::Always => {
                let listener = recorder.listener(format!("always#{index}"));
                result.add_done(listener.clone());
                result.add_fail(listener);
            }
        }
    }
    (recorder.entries(), result.state())
}

#[derive(Clone, Copy)]
enum ModelState {
    Pending,
    Fulfilled(i64),
    Rejected(i64),
}

fn emit(out: &mut Vec<(String, Value)>, tags: &[String], v: i64) {
    out.extend(tags.iter().map(|tag| (tag.clone(), json!(v))));
}

/// Run `ops` against the reference model.
#[must_use]
pub fn expected(ops: &[Op]) -> (Vec<(String, Value)>, State) {
    let mut out = Vec::new();
    let mut state = ModelState::Pending;
    let mut done: Vec<String> = Vec::new();
    let mut fail: Vec<String> = Vec::new();
    let mut progress: Vec<String> = Vec::new();
    let mut last_note: Option<i64> = None;

    for (index, op) in ops.iter().enumerate() {
        match (*op, state) {
            (Op::Resolve(v), ModelState::Pending) => {
                state = ModelState::Fulfilled(v);
                emit(&mut out, &done, v);
            }
            (Op::Reject(v), ModelState::Pending) => {
                state = ModelState::Rejected(v);
                emit(&mut out, &fail, v);
            }
            (Op::Notify(v), ModelState::Pending) => {
                last_note = Some(v);
                emit(&mut out, &progress, v);
            }
            (Op::Resolve(_) | Op::Reject(_) | Op::Notify(_), _) => {}
            (Op::Done, ModelState::Pending) => done.push(format!("done#{index}")),
            (Op::Done, ModelState::Fulfilled(v)) => out.push((format!("done#{index}"), json!(v))),
            (Op::Fail, ModelState::Pending) => fail.push(format!("fail#{index}")),
            (Op::Fail, ModelState::Rejected(v)) => out.push((format!("fail#{index}"), json!(v))),
            (Op::Done | Op::Fail, _) => {}
            (Op::Always, ModelState::Pending) => {
                let tag = format!("always#{index}");
                done.push(tag.clone());
                fail.push(tag);
            }
            (Op::Always, ModelState::Fulfilled(v) | ModelState::Rejected(v)) => {
                out.push((format!("always#{index}"), json!(v)));
            }
            (Op::Progress, ModelState::Pending) => {
                let tag = format!("progress#{index}");
                if let Some(n) = last_note {
                    out.push((tag.clone(), json!(n)));
                }
                progress.push(tag);
            }
            (Op::Progress, _) => {}
        }
    }

    let state = match state {
        ModelState::Pending => State::Pending,
        ModelState::Fulfilled(_) => State::Fulfilled,
        ModelState::Rejected(_) => State::Rejected,
    };
    (out, state)
}

/// Compare the implementation against the model on `ops`.
pub fn check(ops: &[Op]) -> Result<(), Violation> {
    let (want, want_state) = expected(ops);
    let (got, got_state) = observed(ops);
    if let Some(index) = (0..want.len().max(got.len())).find(|&i| want.get(i) != got.get(i)) {
        return Err(Violation::Diverged {
            index,
            expected: want.get(index).cloned(),
            observed: got.get(index).cloned(),
        });
    }
    if want_state != got_state {
        return Err(Violation::State {
            expected: want_state,
            observed: got_state,
        });
    }
    Ok(())
}

/// Shrink `input` to a minimal sub-sequence on which `failing` still holds.
///
/// Uses ddmin: remove chunks (halves, quarters, ...) while the failure
/// reproduces, then try keeping single chunks. If `failing` does not hold on
/// `input`, it is returned unchanged.
pub fn minimize<T, F>(input: Vec<T>, failing: F) -> Vec<T>
where
    T: Clone,
    F: Fn(&[T]) -> bool,
{
    if !failing(&input) {
        return input;
    }
    let mut current = input;
    let mut n = 2usize;

    while current.len() >= 2 {
        let len = current.len();
        let chunk = len.div_ceil(n);
        let bounds: Vec<(usize, usize)> = (0..n)
            .map(|i| (i * chunk, ((i + 1) * chunk).min(len)))
            .filter(|(start, _)| *start < len)
            .collect();

        // Complements first: drop one chunk.
        let smaller = bounds.iter().find_map(|&(start, end)| {
            let candidate: Vec<T> = current[..start]
                .iter()
                .chain(&current[end..])
                .cloned()
                .collect();
            failing(&candidate).then_some(candidate)
        });
        if let Some(candidate) = smaller {
            current = candidate;
            n = (n - 1).max(2);
            continue;
        }

        // Then subsets: keep one chunk.
        let subset = bounds.iter().find_map(|&(start, end)| {
            let candidate = current[start..end].to_vec();
            (candidate.len() < len && failing(&candidate)).then_some(candidate)
        });
        if let Some(candidate) = subset {
            current = candidate;
            n = 2;
            continue;
        }

        if n >= len {
            break;
        }
        n = (n * 2).min(len);
    }

    if current.len() == 1 && failing(&[]) {
        current.clear();
    }
    current
}
