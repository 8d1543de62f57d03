// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Per-parse environments, typed keys, and furthest-progress tracking.
//!
//! An [`Env`] is cheap to clone: combinators never mutate one in place but
//! produce shallow copies with specific fields replaced. Two pieces of
//! state are deliberately shared across all branches of a parse: the
//! furthest-progress tracker (so every alternative converges on the same
//! best error) and the scheduler's frontier (so suspension points can
//! insert residuals from anywhere).

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use ecow::EcoString;

use crate::error::Reject;
use crate::input::{Blank, Input, Pos};

use super::cont::LazyVal;
use super::scheduler::Frontier;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates an identity no other key, cache or parse will ever share.
pub(crate) fn fresh_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// A typed key for values staged by the left-recursion combinators.
///
/// Each key is a fresh witness: inserting a `T` under a key and looking the
/// key up returns a `T`, with the identity tag standing in for a type-level
/// proof. Two keys created separately never compare equal.
pub struct Key<T> {
    id: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Key<T> {
    /// Creates a fresh key.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: fresh_id(),
            _marker: PhantomData,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

impl<T> Default for Key<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Key<T> {}

/// A key for staged positions (see `lr_pos` / `read_pos`).
pub type PosKey = Key<Pos>;

/// A persistent chain of (key, value) pairs.
///
/// Lookup is linear; the chain is cleared on every lexeme success, so its
/// depth is bounded by the number of left-recursion frames active between
/// two lexemes (typically at most a handful).
#[derive(Clone, Default)]
pub(crate) struct KeyChain(Option<Rc<ChainNode>>);

struct ChainNode {
    id: u64,
    value: LazyVal,
    next: KeyChain,
}

impl KeyChain {
    pub(crate) fn insert(&self, id: u64, value: LazyVal) -> Self {
        Self(Some(Rc::new(ChainNode {
            id,
            value,
            next: self.clone(),
        })))
    }

    pub(crate) fn lookup(&self, id: u64) -> Option<LazyVal> {
        let mut cur = self;
        while let Some(node) = &cur.0 {
            if node.id == id {
                return Some(node.value.clone());
            }
            cur = &node.next;
        }
        None
    }
}

/// The shared furthest-progress tracker.
///
/// Progress is monotone: the expectation list resets when the position
/// strictly advances and accumulates when it ties.
#[derive(Debug, Default)]
pub(crate) struct Progress {
    pub(crate) offset: u32,
    pub(crate) expected: Vec<EcoString>,
}

impl Progress {
    pub(crate) fn record(&mut self, offset: u32, msg: Option<EcoString>) {
        if offset > self.offset {
            self.offset = offset;
            self.expected.clear();
        } else if offset < self.offset {
            return;
        }
        if let Some(msg) = msg {
            self.expected.push(msg);
        }
    }
}

/// Per-parse state threaded through every combinator.
#[derive(Clone)]
pub(crate) struct Env {
    /// The input buffer.
    pub(crate) input: Input,
    /// Current position (blanks already skipped).
    pub(crate) off: u32,
    /// End of the last consumed lexeme (never beyond `off`).
    pub(crate) pre_off: u32,
    /// The active blank function.
    pub(crate) blank: Blank,
    /// Furthest-progress tracker, shared by all branches.
    pub(crate) progress: Rc<RefCell<Progress>>,
    /// Staged left-recursion values; cleared on lexeme success.
    pub(crate) keys: KeyChain,
    /// Number of cache frames active on this path.
    pub(crate) depth: u32,
    /// The scheduler's frontier of suspended residuals.
    pub(crate) frontier: Rc<RefCell<Frontier>>,
    /// Distinguishes cache state of separate parses over one buffer.
    pub(crate) parse_id: u64,
}

impl Env {
    /// Builds the initial environment for a parse, skipping leading blanks.
    pub(crate) fn new(input: Input, blank: Blank) -> Self {
        let off = blank(&input, 0);
        Self {
            input,
            off,
            pre_off: 0,
            blank,
            progress: Rc::new(RefCell::new(Progress::default())),
            keys: KeyChain::default(),
            depth: 0,
            frontier: Rc::new(RefCell::new(Frontier::default())),
            parse_id: fresh_id(),
        }
    }

    /// Records an attempt at `offset`, optionally with an expectation.
    pub(crate) fn report(&self, offset: u32, msg: Option<EcoString>) {
        self.progress.borrow_mut().record(offset, msg);
    }

    /// Records a rejection signalled at the current position.
    pub(crate) fn report_reject(&self, rej: &Reject) {
        self.report(self.off, rej.message().cloned());
    }

    /// The current position as a resolved [`Pos`].
    pub(crate) fn current_pos(&self) -> Pos {
        Pos::new(self.input.clone(), self.off)
    }

    /// The pre-blank position (right edge of the last lexeme).
    pub(crate) fn right_pos(&self) -> Pos {
        if self.pre_off == 0 && self.off == 0 {
            Pos::phantom(self.input.clone(), 0)
        } else {
            Pos::new(self.input.clone(), self.pre_off)
        }
    }

    /// The furthest position reached so far.
    pub(crate) fn best_pos(&self) -> Pos {
        Pos::new(self.input.clone(), self.progress.borrow().offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_keys_never_collide() {
        let a: Key<u32> = Key::new();
        let b: Key<u32> = Key::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn chain_lookup_prefers_newest() {
        let a: Key<u32> = Key::new();
        let chain = KeyChain::default()
            .insert(a.id(), LazyVal::of(1u32))
            .insert(a.id(), LazyVal::of(2u32));
        let found = chain.lookup(a.id()).unwrap().force().unwrap();
        assert_eq!(*found.downcast_ref::<u32>().unwrap(), 2);
    }

    #[test]
    fn chain_lookup_misses_unknown_key() {
        let a: Key<u32> = Key::new();
        let b: Key<u32> = Key::new();
        let chain = KeyChain::default().insert(a.id(), LazyVal::of(1u32));
        assert!(chain.lookup(b.id()).is_none());
    }

    #[test]
    fn progress_resets_on_advance_appends_on_tie() {
        let mut p = Progress::default();
        p.record(3, Some("a".into()));
        p.record(3, Some("b".into()));
        assert_eq!(p.offset, 3);
        assert_eq!(p.expected, ["a", "b"]);
        p.record(2, Some("stale".into()));
        assert_eq!(p.expected, ["a", "b"]);
        p.record(5, Some("c".into()));
        assert_eq!(p.offset, 5);
        assert_eq!(p.expected, ["c"]);
        p.record(5, None);
        assert_eq!(p.expected, ["c"]);
    }
}
