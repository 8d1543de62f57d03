// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Entry points for running grammars.
//!
//! All entry points construct a fresh environment, skip leading blanks,
//! drive the scheduler until its frontier drains, and either return
//! results or surface a [`ParseError`] carrying the furthest position any
//! terminal reached together with the expectations accumulated there.
//!
//! - [`parse`] appends an end-of-input lexeme and returns the first
//!   complete value.
//! - [`parse_all`] returns every value the grammar yields from the start
//!   position, in distinct-execution-path order; sequence an
//!   [`eof`](crate::lex::eof) lexeme into the grammar to require full
//!   consumption.
//! - [`partial_parse`] returns the single value plus its end offset, and
//!   fails if the grammar matched zero or more than one way.

use std::io::{self, Read};

use camino::Utf8Path;
use ecow::EcoString;
use miette::Diagnostic;
use thiserror::Error;

use crate::combinator::env::Env;
use crate::combinator::scheduler::run_parse;
use crate::combinator::{Grammar, downcast, first, lexeme};
use crate::error::ParseError;
use crate::input::{Blank, Input, Pos};
use crate::lex::eof;

/// Failure of a convenience wrapper that also performs I/O.
#[derive(Debug, Error, Diagnostic)]
pub enum FileParseError {
    /// The source could not be read.
    #[error("cannot read {name}")]
    Io {
        /// The path or reader name.
        name: EcoString,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The source was read but did not parse.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),
}

/// Parses the whole input, returning the first complete value.
pub fn parse<T: Clone + 'static>(
    g: &Grammar<T>,
    blank: &Blank,
    input: &Input,
) -> Result<T, ParseError> {
    let to_end = first(g, &lexeme(eof()));
    let env = Env::new(input.clone(), blank.clone());
    let mut results = run_parse(&to_end.run, &env, false);
    match results.pop() {
        Some((value, _)) => Ok(downcast::<T>(&value)),
        None => Err(best_error(&env)),
    }
}

/// Returns every value the grammar yields, or the best error if there are
/// none.
pub fn parse_all<T: Clone + 'static>(
    g: &Grammar<T>,
    blank: &Blank,
    input: &Input,
) -> Result<Vec<T>, ParseError> {
    let env = Env::new(input.clone(), blank.clone());
    let results = run_parse(&g.run, &env, true);
    if results.is_empty() {
        return Err(best_error(&env));
    }
    Ok(results.iter().map(|(v, _)| downcast::<T>(v)).collect())
}

/// Parses a prefix of the input, returning the value and its end offset.
///
/// `blank_after` selects whether the returned offset is past the blanks
/// following the match (`true`) or the exact end of the last lexeme
/// (`false`). Fails if the grammar matched zero or more than one way.
pub fn partial_parse<T: Clone + 'static>(
    g: &Grammar<T>,
    blank: &Blank,
    input: &Input,
    blank_after: bool,
) -> Result<(T, u32), ParseError> {
    let env = Env::new(input.clone(), blank.clone());
    let mut results = run_parse(&g.run, &env, true);
    if results.len() > 1 {
        let (_, end_env) = &results[0];
        let pos = Pos::new(input.clone(), end_env.pre_off);
        return Err(ParseError::ambiguous(&pos, results.len()));
    }
    match results.pop() {
        Some((value, end_env)) => {
            let end = if blank_after {
                end_env.off
            } else {
                end_env.pre_off
            };
            Ok((downcast::<T>(&value), end))
        }
        None => Err(best_error(&env)),
    }
}

/// Parses a string to the end.
pub fn parse_str<T: Clone + 'static>(
    g: &Grammar<T>,
    blank: &Blank,
    text: &str,
) -> Result<T, ParseError> {
    parse(g, blank, &Input::from_str(text))
}

/// Reads a file and parses it to the end.
pub fn parse_file<T: Clone + 'static>(
    g: &Grammar<T>,
    blank: &Blank,
    path: &Utf8Path,
) -> Result<T, FileParseError> {
    let input = Input::from_file(path).map_err(|source| FileParseError::Io {
        name: path.as_str().into(),
        source,
    })?;
    Ok(parse(g, blank, &input)?)
}

/// Reads a stream to end and parses it.
pub fn parse_reader<T: Clone + 'static>(
    g: &Grammar<T>,
    blank: &Blank,
    name: impl Into<EcoString>,
    reader: impl Read,
) -> Result<T, FileParseError> {
    let name = name.into();
    let input =
        Input::from_reader(name.clone(), reader).map_err(|source| FileParseError::Io {
            name,
            source,
        })?;
    Ok(parse(g, blank, &input)?)
}

fn best_error(env: &Env) -> ParseError {
    let expected = env.progress.borrow().expected.clone();
    ParseError::syntax(&env.best_pos(), expected)
}
