// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Grammar values and the core combinators.
//!
//! A [`Grammar<T>`] is a first-class value describing a parser that yields
//! `T`. Grammars are built once from the constructors in this module and
//! run many times through the [`driver`](crate::driver). Internally the
//! engine is continuation-passing over type-erased values; the typed
//! surface here restores static guarantees at every construction site, so
//! a well-typed grammar never misapplies a value at run time.
//!
//! Combinators that consume input suspend into the scheduler's frontier at
//! every lexeme success; see [`scheduler`] for the ordering rules. Grammars
//! yielding *functions* (consumed by [`seq`] and [`dseq`]) are typed
//! `Grammar<Fun<A, B>>` and built with [`empty_fun`] / [`fun_of`].
//!
//! Recursive grammars use [`declare`]/[`Grammar::set`]; left-recursive ones
//! use [`lr`]/[`lr_pos`] which parse `g gf*` iteratively instead of
//! descending forever.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use ecow::EcoString;

use crate::charset::CharSet;
use crate::error::Reject;
use crate::input::{Input, Pos};
use crate::lex::Terminal;

mod cache;
pub(crate) mod cont;
mod declare;
pub(crate) mod env;
mod layout;
mod left_rec;
pub(crate) mod scheduler;

#[cfg(test)]
mod tests;

pub use cache::{cache, cache_merge};
pub use declare::{GrammarFamily, declare};
pub use env::{Key, PosKey};
pub use layout::{LayoutConfig, change_layout};
pub use left_rec::{lr, lr_pos, plus, read_pos, read_tbl, star};

use cont::{Cont, ErasedFn, ErrFn, KRaw, LazyVal, PosCell, RunFn, Step, Val};
use env::{Env, KeyChain};
use scheduler::suspend;

/// A first-class grammar yielding values of type `T`.
///
/// Cheap to clone; clones share the same underlying combinator graph (and,
/// for cached grammars, the same cache).
pub struct Grammar<T> {
    pub(crate) run: RunFn,
    pub(crate) slot: Option<Rc<declare::DeclSlot>>,
    pub(crate) _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Grammar<T> {
    fn clone(&self) -> Self {
        Self {
            run: self.run.clone(),
            slot: self.slot.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Grammar<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.slot {
            Some(slot) => write!(f, "Grammar({})", slot.name),
            None => write!(f, "Grammar"),
        }
    }
}

impl<T> Grammar<T> {
    pub(crate) fn from_raw(run: RunFn) -> Self {
        Self {
            run,
            slot: None,
            _marker: PhantomData,
        }
    }

    /// Installs the definition of a grammar created by [`declare`].
    ///
    /// # Panics
    ///
    /// Panics if this grammar was not created by [`declare`], or if it was
    /// already set.
    pub fn set(&self, definition: &Self) {
        let slot = self
            .slot
            .as_ref()
            .expect("set: grammar was not created by declare");
        let mut def = slot.def.borrow_mut();
        assert!(
            def.is_none(),
            "set: grammar '{}' is already defined",
            slot.name
        );
        *def = Some(definition.run.clone());
    }
}

/// The marker type of function-valued grammars.
///
/// `Grammar<Fun<A, B>>` yields a function from `A` to `B`; such grammars
/// are consumed by [`seq`] and [`dseq`] and built with [`empty_fun`] and
/// [`fun_of`]. `Fun` itself is never constructed.
pub struct Fun<A, B> {
    _marker: PhantomData<fn(A) -> B>,
}

// ============================================================================
// Erasure helpers
// ============================================================================

pub(crate) fn rc_val<T: 'static>(value: T) -> Val {
    Rc::new(value)
}

pub(crate) fn downcast<T: Clone + 'static>(value: &Val) -> T {
    value
        .downcast_ref::<T>()
        .expect("engine: semantic value of unexpected type")
        .clone()
}

fn erased_pure<A: Clone + 'static, B: 'static>(f: impl Fn(A) -> B + 'static) -> ErasedFn {
    Rc::new(move |value: Val| Ok(rc_val(f(downcast::<A>(&value)))))
}

fn erased_try<A: Clone + 'static, B: 'static>(
    f: impl Fn(A) -> Result<B, Reject> + 'static,
) -> ErasedFn {
    Rc::new(move |value: Val| f(downcast::<A>(&value)).map(rc_val))
}

// ============================================================================
// Core combinators
// ============================================================================

/// The grammar that matches nothing.
#[must_use]
pub fn fail<T>() -> Grammar<T> {
    Grammar::from_raw(Rc::new(|env: &Env, _k: &Cont, err: &ErrFn| {
        env.report(env.off, None);
        err()
    }))
}

/// Matches nothing, contributing `msg` as an expectation at the current
/// position.
#[must_use]
pub fn error<T>(msg: impl Into<EcoString>) -> Grammar<T> {
    let msg: EcoString = msg.into();
    Grammar::from_raw(Rc::new(move |env: &Env, _k: &Cont, err: &ErrFn| {
        env.report(env.off, Some(msg.clone()));
        err()
    }))
}

/// Matches the empty string, yielding `value`.
#[must_use]
pub fn empty<T: Clone + 'static>(value: T) -> Grammar<T> {
    Grammar::from_raw(Rc::new(move |env: &Env, k: &Cont, err: &ErrFn| {
        k.call(env, LazyVal::of(value.clone()), err)
    }))
}

/// A constant function-valued grammar for use with [`seq`] / [`dseq`].
#[must_use]
pub fn empty_fun<A: Clone + 'static, B: 'static>(
    f: impl Fn(A) -> B + 'static,
) -> Grammar<Fun<A, B>> {
    let f = erased_pure(f);
    Grammar::from_raw(Rc::new(move |env: &Env, k: &Cont, err: &ErrFn| {
        k.call(env, LazyVal::ready(rc_val(f.clone())), err)
    }))
}

/// Runs a terminal. This is the engine's only synchronization point: on
/// success the environment advances past the match and the following
/// blanks, pending lazy arguments are forced, the key store is cleared, and
/// the path suspends into the frontier.
#[must_use]
pub fn lexeme<T: Clone + 'static>(terminal: Terminal<T>) -> Grammar<T> {
    Grammar::from_raw(Rc::new(move |env: &Env, k: &Cont, err: &ErrFn| {
        match terminal.run(&env.input, env.off) {
            Err(failure) => {
                let msg = failure.expected.or_else(|| terminal.name().cloned());
                env.report(failure.offset, msg);
                err()
            }
            Ok((value, end)) => {
                let off = (env.blank)(&env.input, end);
                let mut env2 = env.clone();
                env2.pre_off = end;
                env2.off = off;
                env2.keys = KeyChain::default();
                match k.eagerized() {
                    Err(rej) => {
                        env.report(env.off, rej.message().cloned());
                        err()
                    }
                    Ok(k2) => {
                        suspend(&env2, k2, err.clone(), LazyVal::of(value));
                        Step::Continue
                    }
                }
            }
        }
    }))
}

/// Sequences two grammars; the second yields a function applied to the
/// first's value. Evaluation of the application is deferred to the next
/// lexeme boundary.
#[must_use]
pub fn seq<A: 'static, B: 'static>(g1: &Grammar<A>, g2: &Grammar<Fun<A, B>>) -> Grammar<B> {
    let r1 = g1.run.clone();
    let r2 = g2.run.clone();
    Grammar::from_raw(Rc::new(move |env: &Env, k: &Cont, err: &ErrFn| {
        let r2 = r2.clone();
        let k = k.clone();
        let kraw: KRaw = Rc::new(move |env1: &Env, value: LazyVal, err1: &ErrFn| {
            r2(env1, &k.lazy_arg(value), err1)
        });
        r1(env, &Cont::new(kraw), err)
    }))
}

/// Dependent sequence: `g1` yields a pair whose first component is forced
/// immediately to *select* the second grammar; the second component is
/// passed to the selected grammar's function value as a regular argument.
///
/// This is the only way to branch on a parsed value without duplicating
/// the grammar.
#[must_use]
pub fn dseq<A, B, C>(
    g1: &Grammar<(A, B)>,
    select: impl Fn(&A) -> Grammar<Fun<B, C>> + 'static,
) -> Grammar<C>
where
    A: Clone + 'static,
    B: Clone + 'static,
    C: 'static,
{
    let r1 = g1.run.clone();
    let select = Rc::new(select);
    Grammar::from_raw(Rc::new(move |env: &Env, k: &Cont, err: &ErrFn| {
        let select = select.clone();
        let k = k.clone();
        let kraw: KRaw = Rc::new(move |env1: &Env, value: LazyVal, err1: &ErrFn| {
            match value.force() {
                Err(rej) => {
                    env1.report_reject(&rej);
                    err1()
                }
                Ok(v) => {
                    let (a, b) = downcast::<(A, B)>(&v);
                    let g2 = select(&a);
                    (g2.run)(env1, &k.arg(rc_val(b)), err1)
                }
            }
        });
        r1(env, &Cont::new(kraw), err)
    }))
}

/// Alternation with explicit predict sets.
///
/// The next input byte selects the branch: if it belongs to only one set,
/// only that branch runs; if to both, the first runs with an error
/// continuation that starts the second, and the scheduler explores both.
/// At end of input both branches run.
#[must_use]
pub fn alt<T>(cs1: CharSet, g1: &Grammar<T>, cs2: CharSet, g2: &Grammar<T>) -> Grammar<T> {
    let r1 = g1.run.clone();
    let r2 = g2.run.clone();
    Grammar::from_raw(Rc::new(move |env: &Env, k: &Cont, err: &ErrFn| {
        let (in1, in2) = match env.input.byte_at(env.off) {
            Some(b) => (cs1.contains(b), cs2.contains(b)),
            None => (true, true),
        };
        match (in1, in2) {
            (false, false) => {
                env.report(env.off, None);
                err()
            }
            (true, false) => r1(env, k, err),
            (false, true) => r2(env, k, err),
            (true, true) => {
                let r2 = r2.clone();
                let env2 = env.clone();
                let k2 = k.clone();
                let err2 = err.clone();
                let second: ErrFn = Rc::new(move || r2(&env2, &k2, &err2));
                r1(env, k, &second)
            }
        }
    }))
}

/// Alternation without predict-set pruning.
#[must_use]
pub fn either<T>(g1: &Grammar<T>, g2: &Grammar<T>) -> Grammar<T> {
    alt(CharSet::any(), g1, CharSet::any(), g2)
}

/// Runs `g` when the next byte is in `cs`, with `default` as the fallback
/// value; yields `default` directly otherwise (and at end of input).
#[must_use]
pub fn option<T: Clone + 'static>(default: T, cs: CharSet, g: &Grammar<T>) -> Grammar<T> {
    let r = g.run.clone();
    Grammar::from_raw(Rc::new(move |env: &Env, k: &Cont, err: &ErrFn| {
        match env.input.byte_at(env.off) {
            Some(b) if cs.contains(b) => {
                let env2 = env.clone();
                let k2 = k.clone();
                let err2 = err.clone();
                let value = default.clone();
                let fallback: ErrFn =
                    Rc::new(move || k2.call(&env2, LazyVal::of(value.clone()), &err2));
                r(env, k, &fallback)
            }
            _ => k.call(env, LazyVal::of(default.clone()), err),
        }
    }))
}

/// Applies a pure function to the grammar's value; evaluation is deferred
/// to the next lexeme boundary.
#[must_use]
pub fn app<A: Clone + 'static, B: 'static>(
    g: &Grammar<A>,
    f: impl Fn(A) -> B + 'static,
) -> Grammar<B> {
    let r = g.run.clone();
    let f = erased_pure(f);
    Grammar::from_raw(Rc::new(move |env: &Env, k: &Cont, err: &ErrFn| {
        r(env, &k.app(f.clone()), err)
    }))
}

/// Like [`app`], but the action may reject the parse with a
/// [`Reject`]; rejection converts to a furthest-progress update on the
/// path that forced it.
#[must_use]
pub fn try_app<A: Clone + 'static, B: 'static>(
    g: &Grammar<A>,
    f: impl Fn(A) -> Result<B, Reject> + 'static,
) -> Grammar<B> {
    let r = g.run.clone();
    let f = erased_try(f);
    Grammar::from_raw(Rc::new(move |env: &Env, k: &Cont, err: &ErrFn| {
        r(env, &k.app(f.clone()), err)
    }))
}

/// Runs `g` only if the predicate holds over (pre-blank offset, current
/// offset) at entry.
#[must_use]
pub fn test_before<T>(
    pred: impl Fn(&Input, u32, u32) -> bool + 'static,
    g: &Grammar<T>,
) -> Grammar<T> {
    let r = g.run.clone();
    Grammar::from_raw(Rc::new(move |env: &Env, k: &Cont, err: &ErrFn| {
        if pred(&env.input, env.pre_off, env.off) {
            r(env, k, err)
        } else {
            env.report(env.off, None);
            err()
        }
    }))
}

/// Runs `g`, then checks the predicate over (pre-blank offset, current
/// offset) when `g`'s continuation is entered.
#[must_use]
pub fn test_after<T>(
    pred: impl Fn(&Input, u32, u32) -> bool + 'static,
    g: &Grammar<T>,
) -> Grammar<T> {
    let r = g.run.clone();
    let pred = Rc::new(pred);
    Grammar::from_raw(Rc::new(move |env: &Env, k: &Cont, err: &ErrFn| {
        let pred = pred.clone();
        let k = k.clone();
        let kraw: KRaw = Rc::new(move |env1: &Env, value: LazyVal, err1: &ErrFn| {
            if pred(&env1.input, env1.pre_off, env1.off) {
                k.call(env1, value, err1)
            } else {
                env1.report(env1.off, None);
                err1()
            }
        });
        r(env, &Cont::new(kraw), err)
    }))
}

/// Captures the position before `g` and applies `g`'s function value to it.
#[must_use]
pub fn left_pos<T: 'static>(g: &Grammar<Fun<Pos, T>>) -> Grammar<T> {
    let r = g.run.clone();
    Grammar::from_raw(Rc::new(move |env: &Env, k: &Cont, err: &ErrFn| {
        r(env, &k.arg(rc_val(env.current_pos())), err)
    }))
}

/// Captures the position after `g` (pre-blank, at the next lexeme success)
/// and applies `g`'s function value to it.
#[must_use]
pub fn right_pos<T: 'static>(g: &Grammar<Fun<Pos, T>>) -> Grammar<T> {
    let r = g.run.clone();
    Grammar::from_raw(Rc::new(move |env: &Env, k: &Cont, err: &ErrFn| {
        let cell: PosCell = Rc::new(RefCell::new(None));
        r(env, &k.capture_right_pos(cell), err)
    }))
}

// ============================================================================
// Derived combinators
// ============================================================================

/// Wraps `g`'s value into a function of the preceding sequence item.
#[must_use]
pub fn fun_of<A, B, C>(g: &Grammar<B>, f: impl Fn(A, B) -> C + 'static) -> Grammar<Fun<A, C>>
where
    A: Clone + 'static,
    B: Clone + 'static,
    C: 'static,
{
    let r = g.run.clone();
    let f = Rc::new(f);
    let wrap: ErasedFn = Rc::new(move |b_val: Val| {
        let b = downcast::<B>(&b_val);
        let f = f.clone();
        let applied: ErasedFn = Rc::new(move |a_val: Val| {
            let a = downcast::<A>(&a_val);
            Ok(rc_val(f(a, b.clone())))
        });
        Ok(rc_val(applied))
    });
    Grammar::from_raw(Rc::new(move |env: &Env, k: &Cont, err: &ErrFn| {
        r(env, &k.app(wrap.clone()), err)
    }))
}

/// Sequences two grammars and combines their values with `f`.
#[must_use]
pub fn seq_map<A, B, C>(
    g1: &Grammar<A>,
    g2: &Grammar<B>,
    f: impl Fn(A, B) -> C + 'static,
) -> Grammar<C>
where
    A: Clone + 'static,
    B: Clone + 'static,
    C: 'static,
{
    seq(g1, &fun_of(g2, f))
}

/// Sequences two grammars, yielding both values.
#[must_use]
pub fn pair<A, B>(g1: &Grammar<A>, g2: &Grammar<B>) -> Grammar<(A, B)>
where
    A: Clone + 'static,
    B: Clone + 'static,
{
    seq_map(g1, g2, |a, b| (a, b))
}

/// Sequences two grammars, keeping the first value.
#[must_use]
pub fn first<A, B>(g1: &Grammar<A>, g2: &Grammar<B>) -> Grammar<A>
where
    A: Clone + 'static,
    B: Clone + 'static,
{
    seq_map(g1, g2, |a, _| a)
}

/// Sequences two grammars, keeping the second value.
#[must_use]
pub fn second<A, B>(g1: &Grammar<A>, g2: &Grammar<B>) -> Grammar<B>
where
    A: Clone + 'static,
    B: Clone + 'static,
{
    seq_map(g1, g2, |_, b| b)
}

/// Captures the span of `g`, combining left position, value and right
/// position with `f`.
#[must_use]
pub fn with_span<T, U>(g: &Grammar<T>, f: impl Fn(Pos, T, Pos) -> U + 'static) -> Grammar<U>
where
    T: Clone + 'static,
    U: 'static,
{
    let r = g.run.clone();
    let f = Rc::new(f);
    // The value is curried into right-position, then left-position
    // applications; both ride the transformer chain so evaluation stays at
    // lexeme boundaries.
    let wrap: ErasedFn = Rc::new(move |t_val: Val| {
        let value = downcast::<T>(&t_val);
        let f = f.clone();
        let right_fn: ErasedFn = Rc::new(move |right_val: Val| {
            let right = downcast::<Pos>(&right_val);
            let f = f.clone();
            let value = value.clone();
            let left_fn: ErasedFn = Rc::new(move |left_val: Val| {
                let left = downcast::<Pos>(&left_val);
                Ok(rc_val(f(left, value.clone(), right.clone())))
            });
            Ok(rc_val(left_fn))
        });
        Ok(rc_val(right_fn))
    });
    Grammar::from_raw(Rc::new(move |env: &Env, k: &Cont, err: &ErrFn| {
        let cell: PosCell = Rc::new(RefCell::new(None));
        let k2 = k
            .arg(rc_val(env.current_pos()))
            .capture_right_pos(cell)
            .app(wrap.clone());
        r(env, &k2, err)
    }))
}
