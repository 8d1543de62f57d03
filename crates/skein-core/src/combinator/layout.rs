// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Scoped replacement of the blank function.

use std::rc::Rc;

use crate::input::Blank;

use super::Grammar;
use super::cont::{Cont, ErrFn, KRaw, LazyVal};
use super::env::Env;

/// Boundary policy for [`change_layout`].
///
/// At entry the engine rewinds to the pre-blank position and applies the
/// enabled `*_before` blanks in order (old, then new); at exit it rewinds
/// to the inner grammar's pre-blank end and applies the enabled `*_after`
/// blanks (new, then old).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutConfig {
    /// Apply the surrounding blank before the inner grammar.
    pub old_blanks_before: bool,
    /// Apply the new blank before the inner grammar.
    pub new_blanks_before: bool,
    /// Keep the new blank's skip after the inner grammar's last lexeme.
    pub new_blanks_after: bool,
    /// Apply the surrounding blank after the inner grammar.
    pub old_blanks_after: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            old_blanks_before: true,
            new_blanks_before: false,
            new_blanks_after: false,
            old_blanks_after: true,
        }
    }
}

impl LayoutConfig {
    /// Applies every blank at both boundaries.
    #[must_use]
    pub fn all() -> Self {
        Self {
            old_blanks_before: true,
            new_blanks_before: true,
            new_blanks_after: true,
            old_blanks_after: true,
        }
    }
}

/// Runs `g` with `blank` as its blank function, restoring the surrounding
/// blank on the continuation edge.
///
/// The restoration survives suspension: the continuation closes over the
/// outer blank, so it is reinstated even when `g`'s last lexeme parks the
/// path in the frontier.
#[must_use]
pub fn change_layout<T: 'static>(
    blank: Blank,
    config: LayoutConfig,
    g: &Grammar<T>,
) -> Grammar<T> {
    let r = g.run.clone();
    Grammar::from_raw(Rc::new(move |env: &Env, k: &Cont, err: &ErrFn| {
        let mut entry = env.pre_off;
        if config.old_blanks_before {
            entry = (env.blank)(&env.input, entry);
        }
        if config.new_blanks_before {
            entry = blank(&env.input, entry);
        }
        let mut env_in = env.clone();
        env_in.blank = blank.clone();
        env_in.off = entry;

        let outer_blank = env.blank.clone();
        let kraw: KRaw = {
            let k = k.clone();
            let new_blank = blank.clone();
            Rc::new(move |env2: &Env, value: LazyVal, err2: &ErrFn| {
                let mut exit = env2.pre_off;
                if config.new_blanks_after {
                    exit = new_blank(&env2.input, exit);
                }
                if config.old_blanks_after {
                    exit = outer_blank(&env2.input, exit);
                }
                let mut env_out = env2.clone();
                env_out.blank = outer_blank.clone();
                env_out.off = exit;
                k.call(&env_out, value, err2)
            })
        };
        r(&env_in, &Cont::new(kraw), err)
    }))
}
