// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Declared (recursive) grammars and parametric grammar families.
//!
//! Cyclic grammar graphs are never realized as actual cycles: [`declare`]
//! materializes a named mutable slot that is dereferenced at invocation
//! time, and [`Grammar::set`] installs the definition once. Until set, the
//! slot behaves as a failing grammar whose expectation message is its
//! name.

use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;
use std::rc::Rc;

use ecow::EcoString;

use super::Grammar;
use super::cont::{Cont, ErrFn, RunFn};
use super::env::Env;

/// The mutable slot behind a declared grammar.
pub(crate) struct DeclSlot {
    pub(crate) name: EcoString,
    pub(crate) def: RefCell<Option<RunFn>>,
}

/// Creates a named grammar whose definition is installed later with
/// [`Grammar::set`], enabling self-reference.
#[must_use]
pub fn declare<T>(name: impl Into<EcoString>) -> Grammar<T> {
    let slot = Rc::new(DeclSlot {
        name: name.into(),
        def: RefCell::new(None),
    });
    let deref = slot.clone();
    let run: RunFn = Rc::new(move |env: &Env, k: &Cont, err: &ErrFn| {
        let def = deref.def.borrow().clone();
        match def {
            Some(r) => r(env, k, err),
            None => {
                env.report(env.off, Some(deref.name.clone()));
                err()
            }
        }
    });
    Grammar {
        run,
        slot: Some(slot),
        _marker: PhantomData,
    }
}

/// A family of grammars indexed by a parameter, memoizing one declared
/// grammar per distinct parameter value.
///
/// Request members with [`GrammarFamily::grammar`] (usable before the
/// family is defined, so members may reference each other recursively) and
/// install the shared definition once with [`GrammarFamily::define`].
pub struct GrammarFamily<P, T> {
    name: EcoString,
    slots: Rc<RefCell<HashMap<P, Grammar<T>>>>,
    definition: Rc<RefCell<Option<DefFn<P, T>>>>,
}

type DefFn<P, T> = Rc<dyn Fn(&P) -> Grammar<T>>;

impl<P, T> Clone for GrammarFamily<P, T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            slots: self.slots.clone(),
            definition: self.definition.clone(),
        }
    }
}

impl<P, T> GrammarFamily<P, T>
where
    P: Clone + Eq + Hash + 'static,
    T: 'static,
{
    /// Creates an empty, undefined family.
    #[must_use]
    pub fn new(name: impl Into<EcoString>) -> Self {
        Self {
            name: name.into(),
            slots: Rc::new(RefCell::new(HashMap::new())),
            definition: Rc::new(RefCell::new(None)),
        }
    }

    /// The member grammar for `param`, declaring it on first request.
    #[must_use]
    pub fn grammar(&self, param: &P) -> Grammar<T> {
        if let Some(g) = self.slots.borrow().get(param) {
            return g.clone();
        }
        let g: Grammar<T> = declare(self.name.clone());
        // Registered before the definition runs, so a recursive definition
        // asking for the same parameter gets the declared slot back.
        self.slots.borrow_mut().insert(param.clone(), g.clone());
        let def = self.definition.borrow().clone();
        if let Some(f) = def {
            g.set(&f(param));
        }
        g
    }

    /// Installs the family definition, filling every member already
    /// requested.
    ///
    /// # Panics
    ///
    /// Panics if the family is already defined.
    pub fn define(&self, f: impl Fn(&P) -> Grammar<T> + 'static) {
        let f: DefFn<P, T> = Rc::new(f);
        {
            let mut def = self.definition.borrow_mut();
            assert!(
                def.is_none(),
                "define: family '{}' is already defined",
                self.name
            );
            *def = Some(f.clone());
        }
        let requested: Vec<(P, Grammar<T>)> = self
            .slots
            .borrow()
            .iter()
            .map(|(p, g)| (p.clone(), g.clone()))
            .collect();
        for (param, g) in requested {
            g.set(&f(&param));
        }
    }
}
