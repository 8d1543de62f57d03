// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Continuations and deferred semantic actions.
//!
//! Calling a continuation does *not* run the semantic actions accumulated
//! along a parse path. Instead each continuation carries a [`Trans`] chain —
//! a small algebraic description of the pending work — and extension
//! operations push onto that chain in O(1). The chain is evaluated in two
//! places only: pending lazy arguments are forced when a lexeme succeeds
//! (see [`Cont::eagerized`]), and the whole chain runs when a final result
//! is recorded. This decouples grammar descent depth from action evaluation
//! and keeps right recursion linear.
//!
//! Values flow through the engine type-erased as `Rc<dyn Any>`; the typed
//! [`Grammar`](super::Grammar) surface restores static types at the edges.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Reject;
use crate::input::Pos;

use super::env::Env;

/// A type-erased semantic value.
pub(crate) type Val = Rc<dyn Any>;

/// The result of running a semantic action: a value or a rejection.
pub(crate) type SemRes = Result<Val, Reject>;

/// A type-erased, fallible semantic function.
///
/// Function-valued grammar results are stored in this concrete form so the
/// transformer evaluator can apply them without knowing their types.
pub(crate) type ErasedFn = Rc<dyn Fn(Val) -> SemRes>;

/// A shared cell written with the right position of a grammar when its
/// continuation is invoked.
pub(crate) type PosCell = Rc<RefCell<Option<Pos>>>;

/// The scheduler-visible outcome of driving a parse path.
///
/// Every combinator invocation returns exactly one `Step`: either the path
/// ran to completion (failed, suspended into the frontier, or recorded a
/// result) and exploration continues, or the driver requested a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub(crate) enum Step {
    /// Keep draining the frontier.
    Continue,
    /// A result was recorded and the driver wants no more.
    Stop,
}

/// A failure continuation.
pub(crate) type ErrFn = Rc<dyn Fn() -> Step>;

/// The raw consumer at the base of a continuation.
pub(crate) type KRaw = Rc<dyn Fn(&Env, LazyVal, &ErrFn) -> Step>;

/// The erased runner of a grammar.
pub(crate) type RunFn = Rc<dyn Fn(&Env, &Cont, &ErrFn) -> Step>;

// ============================================================================
// Lazy values
// ============================================================================

/// A memoizing lazy semantic value.
///
/// Forcing runs the underlying thunk at most once; rejection is cached the
/// same way as success so a shared lazy behaves identically on every path
/// that forces it.
#[derive(Clone)]
pub(crate) struct LazyVal(Rc<RefCell<LazyState>>);

enum LazyState {
    Ready(Val),
    Failed(Reject),
    Thunk(Rc<dyn Fn() -> SemRes>),
}

impl LazyVal {
    pub(crate) fn ready(value: Val) -> Self {
        Self(Rc::new(RefCell::new(LazyState::Ready(value))))
    }

    pub(crate) fn of<T: 'static>(value: T) -> Self {
        Self::ready(Rc::new(value))
    }

    pub(crate) fn thunk(f: impl Fn() -> SemRes + 'static) -> Self {
        Self(Rc::new(RefCell::new(LazyState::Thunk(Rc::new(f)))))
    }

    pub(crate) fn force(&self) -> SemRes {
        let thunk = match &*self.0.borrow() {
            LazyState::Ready(v) => return Ok(v.clone()),
            LazyState::Failed(rej) => return Err(rej.clone()),
            LazyState::Thunk(f) => f.clone(),
        };
        let result = thunk();
        *self.0.borrow_mut() = match &result {
            Ok(v) => LazyState::Ready(v.clone()),
            Err(rej) => LazyState::Failed(rej.clone()),
        };
        result
    }
}

// ============================================================================
// Transformers
// ============================================================================

/// A deferred semantic action chain. The empty chain is the identity.
#[derive(Clone, Default)]
pub(crate) struct Trans(Option<Rc<TransNode>>);

impl std::fmt::Debug for Trans {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Trans").field(&self.0.is_some()).finish()
    }
}

pub(crate) struct TransNode {
    op: TransOp,
    inner: Trans,
    /// True when no `LazyArg` remains in this node or below it; eagerization
    /// stops at eager nodes, which keeps shared tails shared.
    eager: bool,
}

enum TransOp {
    /// Apply the (function-valued) result to a stored value.
    Arg(Val),
    /// Same, but the argument is a thunk forced at evaluation time.
    LazyArg(LazyVal),
    /// The argument is a position read from a shared cell.
    PosArg(PosCell),
    /// Compose a pure function before the inner chain.
    App(ErasedFn),
}

// Deep chains are dropped iteratively: a 10k-lexeme right recursion builds a
// chain of the same depth, and the default recursive drop would exhaust the
// stack.
impl Drop for TransNode {
    fn drop(&mut self) {
        let mut next = self.inner.0.take();
        while let Some(node) = next {
            match Rc::try_unwrap(node) {
                Ok(mut node) => next = node.inner.0.take(),
                Err(_) => break,
            }
        }
    }
}

impl Trans {
    pub(crate) fn is_identity(&self) -> bool {
        self.0.is_none()
    }

    fn is_eager(&self) -> bool {
        self.0.as_ref().is_none_or(|node| node.eager)
    }

    fn push(&self, op: TransOp, eager: bool) -> Self {
        Self(Some(Rc::new(TransNode {
            op,
            inner: self.clone(),
            eager,
        })))
    }

    pub(crate) fn arg(&self, value: Val) -> Self {
        let eager = self.is_eager();
        self.push(TransOp::Arg(value), eager)
    }

    pub(crate) fn lazy_arg(&self, value: LazyVal) -> Self {
        self.push(TransOp::LazyArg(value), false)
    }

    pub(crate) fn pos_arg(&self, cell: PosCell) -> Self {
        let eager = self.is_eager();
        self.push(TransOp::PosArg(cell), eager)
    }

    pub(crate) fn app(&self, f: ErasedFn) -> Self {
        let eager = self.is_eager();
        self.push(TransOp::App(f), eager)
    }

    /// Forces every pending lazy argument, turning it into an eager one.
    ///
    /// Stops at the first eager node, so after each lexeme only the nodes
    /// added since the previous lexeme are rebuilt; the rest is shared.
    pub(crate) fn eagerized(&self) -> Result<Self, Reject> {
        if self.is_eager() {
            return Ok(self.clone());
        }
        let mut prefix = Vec::new();
        let mut cur = self.clone();
        let tail = loop {
            match cur.0 {
                None => break Self(None),
                Some(node) if node.eager => break Self(Some(node)),
                Some(node) => {
                    cur = node.inner.clone();
                    prefix.push(node);
                }
            }
        };
        let mut out = tail;
        for node in prefix.iter().rev() {
            out = match &node.op {
                TransOp::Arg(v) => out.arg(v.clone()),
                TransOp::LazyArg(l) => out.arg(l.force()?),
                TransOp::PosArg(c) => out.pos_arg(c.clone()),
                TransOp::App(f) => out.app(f.clone()),
            };
        }
        Ok(out)
    }
}

/// Runs a transformer chain on a value. Iterative: chain depth is bounded
/// only by input length, never by the call stack.
pub(crate) fn eval(value: Val, trans: &Trans) -> SemRes {
    let mut value = value;
    let mut cur = trans.clone();
    while let Some(node) = cur.0 {
        value = match &node.op {
            TransOp::Arg(x) => apply(&value, x.clone())?,
            TransOp::LazyArg(l) => apply(&value, l.force()?)?,
            TransOp::PosArg(cell) => {
                let pos = cell
                    .borrow()
                    .clone()
                    .expect("engine: position cell read before capture");
                apply(&value, Rc::new(pos))?
            }
            TransOp::App(f) => f(value)?,
        };
        cur = node.inner.clone();
    }
    Ok(value)
}

fn apply(fun: &Val, arg: Val) -> SemRes {
    let f = fun
        .downcast_ref::<ErasedFn>()
        .expect("engine: applied value is not a function")
        .clone();
    f(arg)
}

// ============================================================================
// Continuations
// ============================================================================

/// A continuation: pending transformer chain, position cells to write on
/// invocation, and the raw consumer underneath.
#[derive(Clone)]
pub(crate) struct Cont {
    cells: Vec<PosCell>,
    trans: Trans,
    k: KRaw,
}

impl Cont {
    pub(crate) fn new(k: KRaw) -> Self {
        Self {
            cells: Vec::new(),
            trans: Trans::default(),
            k,
        }
    }

    /// Extends with an eager argument (Apply-Arg).
    pub(crate) fn arg(&self, value: Val) -> Self {
        Self {
            cells: self.cells.clone(),
            trans: self.trans.arg(value),
            k: self.k.clone(),
        }
    }

    /// Extends with a lazy argument (Apply-LazyArg).
    pub(crate) fn lazy_arg(&self, value: LazyVal) -> Self {
        Self {
            cells: self.cells.clone(),
            trans: self.trans.lazy_arg(value),
            k: self.k.clone(),
        }
    }

    /// Extends with a pure function (Apply-Function).
    pub(crate) fn app(&self, f: ErasedFn) -> Self {
        Self {
            cells: self.cells.clone(),
            trans: self.trans.app(f),
            k: self.k.clone(),
        }
    }

    /// Extends with a position argument whose cell is written when this
    /// continuation is invoked (Apply-Position).
    pub(crate) fn capture_right_pos(&self, cell: PosCell) -> Self {
        let mut cells = self.cells.clone();
        cells.push(cell.clone());
        Self {
            cells,
            trans: self.trans.pos_arg(cell),
            k: self.k.clone(),
        }
    }

    /// Forces pending lazy arguments; performed exactly on lexeme success.
    pub(crate) fn eagerized(&self) -> Result<Self, Reject> {
        Ok(Self {
            cells: self.cells.clone(),
            trans: self.trans.eagerized()?,
            k: self.k.clone(),
        })
    }

    /// Invokes the continuation: writes captured right positions, folds the
    /// pending transformer into the lazy value, and hands both to the raw
    /// consumer. The fold keeps evaluation deferred until the next lexeme
    /// boundary or final result.
    pub(crate) fn call(&self, env: &Env, value: LazyVal, err: &ErrFn) -> Step {
        for cell in &self.cells {
            *cell.borrow_mut() = Some(env.right_pos());
        }
        let folded = if self.trans.is_identity() {
            value
        } else {
            let trans = self.trans.clone();
            LazyVal::thunk(move || eval(value.force()?, &trans))
        };
        (self.k)(env, folded, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn erased<A: Clone + 'static, B: 'static>(f: impl Fn(A) -> B + 'static) -> ErasedFn {
        Rc::new(move |v: Val| {
            let a = v.downcast_ref::<A>().expect("test value type").clone();
            Ok(Rc::new(f(a)) as Val)
        })
    }

    fn fun_val<A: Clone + 'static, B: 'static>(f: impl Fn(A) -> B + 'static) -> Val {
        Rc::new(erased::<A, B>(f))
    }

    fn get<T: Clone + 'static>(res: SemRes) -> T {
        res.unwrap().downcast_ref::<T>().unwrap().clone()
    }

    #[test]
    fn identity_passes_value_through() {
        let v = eval(Rc::new(42i64), &Trans::default());
        assert_eq!(get::<i64>(v), 42);
    }

    #[test]
    fn arg_applies_head_first() {
        // Result value is a function; the most recent extension is applied
        // first, then the older App.
        let t = Trans::default()
            .app(erased::<i64, i64>(|n| n * 10))
            .arg(Rc::new(5i64));
        let f = fun_val::<i64, i64>(|n| n + 1);
        assert_eq!(get::<i64>(eval(f, &t)), 60);
    }

    #[test]
    fn lazy_arg_forced_at_eval() {
        let t = Trans::default().lazy_arg(LazyVal::of(3i64));
        let f = fun_val::<i64, i64>(|n| n * 2);
        assert_eq!(get::<i64>(eval(f, &t)), 6);
    }

    #[test]
    fn eagerize_forces_and_shares_tail() {
        let forced = Rc::new(RefCell::new(0));
        let tally = forced.clone();
        let lazy = LazyVal::thunk(move || {
            *tally.borrow_mut() += 1;
            Ok(Rc::new(7i64) as Val)
        });
        let t = Trans::default().lazy_arg(lazy);
        let e1 = t.eagerized().unwrap();
        assert_eq!(*forced.borrow(), 1);
        // Already eager: no new forcing, shared as-is.
        let _e2 = e1.eagerized().unwrap();
        assert_eq!(*forced.borrow(), 1);
        let f = fun_val::<i64, i64>(|n| n);
        assert_eq!(get::<i64>(eval(f, &e1)), 7);
        assert_eq!(*forced.borrow(), 1);
    }

    #[test]
    fn eagerize_surfaces_rejection() {
        let lazy = LazyVal::thunk(|| Err(Reject::give_up("nope")));
        let t = Trans::default().lazy_arg(lazy);
        assert_eq!(t.eagerized().unwrap_err(), Reject::give_up("nope"));
    }

    #[test]
    fn lazy_memoizes_success_and_failure() {
        let runs = Rc::new(RefCell::new(0));
        let tally = runs.clone();
        let ok = LazyVal::thunk(move || {
            *tally.borrow_mut() += 1;
            Ok(Rc::new(1i64) as Val)
        });
        let _ = ok.force();
        let _ = ok.force();
        assert_eq!(*runs.borrow(), 1);

        let runs = Rc::new(RefCell::new(0));
        let tally = runs.clone();
        let bad = LazyVal::thunk(move || {
            *tally.borrow_mut() += 1;
            Err(Reject::NoParse)
        });
        assert!(bad.force().is_err());
        assert!(bad.force().is_err());
        assert_eq!(*runs.borrow(), 1);
    }

    #[test]
    fn deep_chain_drops_without_overflow() {
        let mut t = Trans::default();
        for _ in 0..200_000 {
            t = t.app(erased::<i64, i64>(|n| n));
        }
        drop(t);
    }

    #[test]
    fn deep_chain_evals_iteratively() {
        let mut t = Trans::default();
        for _ in 0..100_000 {
            t = t.app(erased::<i64, i64>(|n| n + 1));
        }
        let v = eval(Rc::new(0i64), &t);
        assert_eq!(get::<i64>(v), 100_000);
    }
}
