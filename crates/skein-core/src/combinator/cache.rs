// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Position-indexed memoization.
//!
//! `cache(g)` memoizes `g` per input position. The first path to arrive at
//! a position runs `g` under an incremented merge depth; later arrivals
//! park their continuation in the slot's waiting list and fall back to
//! their alternatives. When `g` completes at some end position, every
//! parked continuation is resumed — not inline, but as a residual at the
//! waiter's own (shallower) depth, so the frontier's depth-descending order
//! guarantees all same-position inner results land before any waiter runs.
//!
//! With a merge function, results sharing an end position are folded into
//! one combined lazy value; the combined value flips a too-late flag when
//! first forced, and a result arriving after that is a programming error
//! (an empty-matching cached grammar) and asserts.
//!
//! Slots live in the input buffer's own table, so memoization is keyed by
//! buffer identity for free; a parse identifier separates successive
//! parses over one buffer.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::Reject;

use super::cont::{Cont, ErrFn, KRaw, LazyVal, Step, Val};
use super::env::{Env, fresh_id};
use super::scheduler::{quiet, suspend};
use super::{Grammar, downcast, rc_val};

type MergeFn = Rc<dyn Fn(Val, Val) -> Val>;

struct CacheSlot {
    parse_id: u64,
    /// Continuations parked at this position, with the merge depth each
    /// arrived at.
    waiting: Vec<(Cont, u32)>,
    /// Per end-position merge state (merge-configured caches only).
    merged: HashMap<u32, MergeEntry>,
}

#[derive(Clone)]
struct MergeEntry {
    values: Rc<RefCell<Vec<LazyVal>>>,
    too_late: Rc<Cell<bool>>,
}

/// Memoizes `g` at each input position. Transparent: yields the same
/// results as `g` itself, but runs `g` at most once per position per parse.
#[must_use]
pub fn cache<T: 'static>(g: &Grammar<T>) -> Grammar<T> {
    cache_impl(g, None)
}

/// Memoizes `g`, folding results that share an end position with `merge`.
#[must_use]
pub fn cache_merge<T: Clone + 'static>(
    g: &Grammar<T>,
    merge: impl Fn(T, T) -> T + 'static,
) -> Grammar<T> {
    let merge: MergeFn = Rc::new(move |a, b| rc_val(merge(downcast::<T>(&a), downcast::<T>(&b))));
    cache_impl(g, Some(merge))
}

fn cache_impl<T>(g: &Grammar<T>, merge: Option<MergeFn>) -> Grammar<T> {
    let id = fresh_id();
    let r = g.run.clone();
    Grammar::from_raw(Rc::new(move |env: &Env, k: &Cont, err: &ErrFn| {
        let p = env.off;
        let existing = env
            .input
            .table_get(id, p)
            .and_then(|any| any.downcast::<RefCell<CacheSlot>>().ok());
        if let Some(slot) = &existing {
            if slot.borrow().parse_id == env.parse_id {
                // Subsequent arrival: park the continuation and let the
                // alternatives proceed; the cache will resume it.
                slot.borrow_mut().waiting.push((k.clone(), env.depth));
                return err();
            }
        }
        let slot = Rc::new(RefCell::new(CacheSlot {
            parse_id: env.parse_id,
            waiting: vec![(k.clone(), env.depth)],
            merged: HashMap::new(),
        }));
        env.input.table_insert(id, p, slot.clone());

        let mut env_in = env.clone();
        env_in.depth += 1;
        let k0: KRaw = {
            let slot = slot.clone();
            let merge = merge.clone();
            Rc::new(move |env_q: &Env, value: LazyVal, err_q: &ErrFn| {
                let q = env_q.off;
                let Some(merge_fn) = &merge else {
                    // No merging: deliver this result to every waiter
                    // independently.
                    let waiting = slot.borrow().waiting.clone();
                    for (kw, dw) in waiting {
                        resume(env_q, dw, kw, value.clone());
                    }
                    return Step::Continue;
                };
                let entry = slot.borrow().merged.get(&q).cloned();
                if let Some(entry) = entry {
                    assert!(
                        !entry.too_late.get(),
                        "cache: a result at offset {q} arrived after the merge was forced"
                    );
                    entry.values.borrow_mut().push(value);
                    return err_q();
                }
                let values = Rc::new(RefCell::new(vec![value]));
                let too_late = Rc::new(Cell::new(false));
                slot.borrow_mut().merged.insert(
                    q,
                    MergeEntry {
                        values: values.clone(),
                        too_late: too_late.clone(),
                    },
                );
                let combined = {
                    let merge_fn = merge_fn.clone();
                    LazyVal::thunk(move || {
                        too_late.set(true);
                        let pending: Vec<LazyVal> = values.borrow().clone();
                        let mut acc: Option<Val> = None;
                        for lazy in &pending {
                            if let Ok(v) = lazy.force() {
                                acc = Some(match acc {
                                    None => v,
                                    Some(prev) => merge_fn(prev, v),
                                });
                            }
                        }
                        acc.ok_or(Reject::NoParse)
                    })
                };
                let waiting = slot.borrow().waiting.clone();
                for (kw, dw) in waiting {
                    resume(env_q, dw, kw, combined.clone());
                }
                Step::Continue
            })
        };
        r(&env_in, &Cont::new(k0), err)
    }))
}

/// Schedules a parked continuation at the waiter's own merge depth.
fn resume(env_q: &Env, depth: u32, cont: Cont, value: LazyVal) {
    let mut env_w = env_q.clone();
    env_w.depth = depth;
    suspend(&env_w, cont, quiet(), value);
}
