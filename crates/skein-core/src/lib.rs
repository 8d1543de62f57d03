// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Skein combinator engine core.
//!
//! This crate contains the evaluation engine of a scannerless, context-free
//! parser combinator library:
//! - Grammar values and core combinators (sequencing, alternation,
//!   left-recursion elimination, memoization, layout changes)
//! - The lexeme-synchronous scheduler that explores alternatives in
//!   parallel, ordered by input position
//! - Deferred semantic actions evaluated only at lexeme boundaries
//! - Drivers returning one value, all values, or a position-bearing error
//!
//! Ambiguous grammars are supported; on non-ambiguous grammars the cache
//! combinator gives polynomial time. The engine is single-threaded:
//! grammars sharing a cache must not be parsed from multiple threads.

#![doc = include_str!("../../../README.md")]

pub mod charset;
pub mod combinator;
pub mod driver;
pub mod error;
pub mod input;
pub mod lex;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::charset::CharSet;
    pub use crate::combinator::{
        Fun, Grammar, GrammarFamily, Key, LayoutConfig, PosKey, alt, app, cache, cache_merge,
        change_layout, declare, dseq, either, empty, empty_fun, error, fail, first, fun_of,
        left_pos, lexeme, lr, lr_pos, option, pair, plus, read_pos, read_tbl, right_pos, second,
        seq, seq_map, star, test_after, test_before, try_app, with_span,
    };
    pub use crate::driver::{parse, parse_all, parse_file, parse_reader, parse_str, partial_parse};
    pub use crate::error::{ErrorStyle, ParseError, ParseErrorKind, Reject};
    pub use crate::input::{Blank, Input, Pos, blank_char_set, no_blank};
    pub use crate::lex::{Terminal, char_in, eof, float, keyword};
}
