// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Left-recursion elimination.
//!
//! `lr(g, key, gf)` parses the language of `g gf*` without descending into
//! itself: after `g` yields a value, the value is staged in the
//! environment's key store under `key` and `gf` is attempted; each success
//! of `gf` re-stages and repeats, and the outer continuation receives the
//! last staged value. Inside `gf`, [`read_tbl`] retrieves the staged value
//! — it must appear before `gf`'s first lexeme, because the key store is
//! cleared on every lexeme success.
//!
//! Because lexeme residuals carry their error thunk into the scheduler,
//! both the "stop here" and the "extend once more" paths are explored; on
//! ambiguous grammars every fold depth is a distinct path.
//!
//! `gf` must consume input; an empty-matching `gf` would re-stage forever.

use std::rc::Rc;

use crate::input::Pos;

use super::cont::{Cont, ErrFn, KRaw, LazyVal, RunFn, Step};
use super::env::{Env, Key, PosKey};
use super::{Fun, Grammar, empty, seq_map};

/// Parses `g gf*` left-associatively; see the module docs for the
/// protocol.
#[must_use]
pub fn lr<T: Clone + 'static>(g: &Grammar<T>, key: Key<T>, gf: &Grammar<T>) -> Grammar<T> {
    lr_impl(g, key.id(), None, gf)
}

/// Like [`lr`], additionally staging the left position of the whole
/// expression under `pos_key` for retrieval with [`read_pos`].
#[must_use]
pub fn lr_pos<T: Clone + 'static>(
    g: &Grammar<T>,
    key: Key<T>,
    pos_key: PosKey,
    gf: &Grammar<T>,
) -> Grammar<T> {
    lr_impl(g, key.id(), Some(pos_key.id()), gf)
}

fn lr_impl<T>(g: &Grammar<T>, id: u64, pos_id: Option<u64>, gf: &Grammar<T>) -> Grammar<T> {
    let r1 = g.run.clone();
    let rf = gf.run.clone();
    Grammar::from_raw(Rc::new(move |env: &Env, k: &Cont, err: &ErrFn| {
        let staged_pos = pos_id.map(|pid| (pid, env.current_pos()));
        let rf = rf.clone();
        let k = k.clone();
        let kraw: KRaw = Rc::new(move |env1: &Env, value: LazyVal, err1: &ErrFn| {
            lr_step(&rf, id, staged_pos.clone(), env1, value, &k, err1)
        });
        r1(env, &Cont::new(kraw), err)
    }))
}

/// Delivers `value` to the outer continuation with a fallback that stages
/// it and attempts one more round of `gf`.
fn lr_step(
    rf: &RunFn,
    id: u64,
    staged_pos: Option<(u64, Pos)>,
    env: &Env,
    value: LazyVal,
    k: &Cont,
    err: &ErrFn,
) -> Step {
    let extend: ErrFn = {
        let rf = rf.clone();
        let env = env.clone();
        let value = value.clone();
        let k = k.clone();
        let err = err.clone();
        let staged_pos = staged_pos.clone();
        Rc::new(move || {
            let mut env2 = env.clone();
            env2.keys = env.keys.insert(id, value.clone());
            if let Some((pid, pos)) = &staged_pos {
                env2.keys = env2.keys.insert(*pid, LazyVal::of(pos.clone()));
            }
            let kraw: KRaw = {
                let rf = rf.clone();
                let k = k.clone();
                let staged_pos = staged_pos.clone();
                Rc::new(move |env3: &Env, next: LazyVal, err3: &ErrFn| {
                    lr_step(&rf, id, staged_pos.clone(), env3, next, &k, err3)
                })
            };
            rf(&env2, &Cont::new(kraw), &err)
        })
    };
    k.call(env, value, &extend)
}

/// Retrieves the value staged by an enclosing [`lr`].
///
/// # Panics
///
/// Panics if no enclosing `lr` staged `key` — including when a lexeme
/// inside `gf` already cleared the key store.
#[must_use]
pub fn read_tbl<T: Clone + 'static>(key: &Key<T>) -> Grammar<T> {
    let id = key.id();
    Grammar::from_raw(Rc::new(move |env: &Env, k: &Cont, err: &ErrFn| {
        let value = env
            .keys
            .lookup(id)
            .expect("read_tbl: key is not staged by an enclosing lr");
        k.call(env, value, err)
    }))
}

/// Retrieves the position staged by an enclosing [`lr_pos`] and applies
/// `g`'s function value to it.
///
/// # Panics
///
/// Panics if no enclosing `lr_pos` staged `key`.
#[must_use]
pub fn read_pos<T: 'static>(key: &PosKey, g: &Grammar<Fun<Pos, T>>) -> Grammar<T> {
    let id = key.id();
    let r = g.run.clone();
    Grammar::from_raw(Rc::new(move |env: &Env, k: &Cont, err: &ErrFn| {
        let staged = env
            .keys
            .lookup(id)
            .expect("read_pos: key is not staged by an enclosing lr_pos");
        match staged.force() {
            Ok(pos) => r(env, &k.arg(pos), err),
            Err(rej) => {
                env.report_reject(&rej);
                err()
            }
        }
    }))
}

/// Zero or more `g`, folded left-associatively into a `Vec`.
#[must_use]
pub fn star<T: Clone + 'static>(g: &Grammar<T>) -> Grammar<Vec<T>> {
    let key: Key<Vec<T>> = Key::new();
    let step = seq_map(&read_tbl(&key), g, |mut items: Vec<T>, item| {
        items.push(item);
        items
    });
    lr(&empty(Vec::new()), key, &step)
}

/// One or more `g`, folded left-associatively into a `Vec`.
#[must_use]
pub fn plus<T: Clone + 'static>(g: &Grammar<T>) -> Grammar<Vec<T>> {
    let key: Key<Vec<T>> = Key::new();
    let head = super::app(g, |item| vec![item]);
    let step = seq_map(&read_tbl(&key), g, |mut items: Vec<T>, item| {
        items.push(item);
        items
    });
    lr(&head, key, &step)
}
