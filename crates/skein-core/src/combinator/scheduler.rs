// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! The residual frontier and the drive loop.
//!
//! Every combinator that consumes input suspends by pushing a [`Residual`]
//! into the frontier and returning; everything else runs synchronously.
//! The loop here repeatedly extracts the residual with the smallest
//! (position, depth) key (position ascending, cache depth *descending*)
//! and invokes both its error thunk and its continuation. Alternatives
//! therefore advance in lockstep by input position, and at a shared
//! position the paths deeper in cache frames finish first so a cache can
//! merge its outputs before any outer path consumes them.
//!
//! Scheduling is single-threaded and cooperative; the "parallelism" is
//! logical interleaving at lexeme granularity.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use super::cont::{Cont, ErrFn, KRaw, LazyVal, RunFn, Step, Val};
use super::env::Env;

/// A suspended parse path waiting in the frontier.
pub(crate) struct Residual {
    pub(crate) env: Env,
    pub(crate) cont: Cont,
    pub(crate) err: ErrFn,
    pub(crate) value: LazyVal,
}

/// Residuals ordered by (position ascending, cache depth descending),
/// FIFO within one key.
#[derive(Default)]
pub(crate) struct Frontier {
    queue: BTreeMap<(u32, Reverse<u32>), VecDeque<Residual>>,
}

impl Frontier {
    pub(crate) fn push(&mut self, residual: Residual) {
        let key = (residual.env.off, Reverse(residual.env.depth));
        self.queue.entry(key).or_default().push_back(residual);
    }

    pub(crate) fn pop(&mut self) -> Option<Residual> {
        let mut entry = self.queue.first_entry()?;
        let residual = entry.get_mut().pop_front();
        if entry.get().is_empty() {
            entry.remove();
        }
        residual
    }
}

/// A no-op failure continuation.
pub(crate) fn quiet() -> ErrFn {
    Rc::new(|| Step::Continue)
}

/// Pushes a residual resuming `cont` with `value` at `env`'s position.
pub(crate) fn suspend(env: &Env, cont: Cont, err: ErrFn, value: LazyVal) {
    let frontier = env.frontier.clone();
    frontier.borrow_mut().push(Residual {
        env: env.clone(),
        cont,
        err,
        value,
    });
}

/// Runs a grammar to completion, returning every recorded result with the
/// environment it finished in.
///
/// The terminal continuation forces the final lazy value (converting a
/// rejection into a furthest-progress update), records the result, and —
/// when `all` is false — raises the stop signal that unwinds the loop.
/// Exploration otherwise continues until the frontier drains.
pub(crate) fn run_parse(run: &RunFn, env: &Env, all: bool) -> Vec<(Val, Env)> {
    let results: Rc<RefCell<Vec<(Val, Env)>>> = Rc::new(RefCell::new(Vec::new()));
    let terminal: KRaw = {
        let results = results.clone();
        Rc::new(move |env: &Env, value: LazyVal, _err: &ErrFn| match value.force() {
            Ok(v) => {
                results.borrow_mut().push((v, env.clone()));
                if all { Step::Continue } else { Step::Stop }
            }
            Err(rej) => {
                env.report_reject(&rej);
                Step::Continue
            }
        })
    };
    let k = Cont::new(terminal);
    let err = quiet();

    let mut step = run(env, &k, &err);
    while step != Step::Stop {
        let next = env.frontier.borrow_mut().pop();
        let Some(residual) = next else { break };
        // Error thunk first, then the continuation: untried alternatives
        // may still park continuations in a cache slot this residual's
        // continuation is about to finalize.
        step = (residual.err)();
        if step == Step::Stop {
            break;
        }
        step = residual.cont.call(&residual.env, residual.value, &err);
    }
    results.take()
}
