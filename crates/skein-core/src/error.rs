// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Error types for the combinator engine.
//!
//! Two layers of failure exist. [`Reject`] is the *recoverable* layer:
//! terminals and semantic actions use it to refuse a match, and the engine
//! converts every rejection into a furthest-progress update before moving
//! on to other alternatives. [`ParseError`] is the *final* layer: the
//! driver raises exactly one per failed parse, carrying the best position
//! reached and the deduplicated expectation messages accumulated there.
//! It integrates with [`miette`] for diagnostic rendering.

// Spurious warnings from miette derive macro expansion
#![allow(unused_assignments)]

use ecow::EcoString;
use miette::Diagnostic;
use thiserror::Error;

use crate::input::Pos;

/// A recoverable rejection signal from a terminal or semantic action.
///
/// Rejections never escape the engine: they are caught at every lexeme
/// call, action invocation and dependent-sequence selector, converted into
/// a furthest-progress update, and the rejecting path is abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reject {
    /// No match here; contributes no message.
    NoParse,
    /// No match here, with an expectation message for error reporting.
    GiveUp(EcoString),
}

impl Reject {
    /// Creates a `GiveUp` rejection with the given message.
    #[must_use]
    pub fn give_up(msg: impl Into<EcoString>) -> Self {
        Self::GiveUp(msg.into())
    }

    /// The message contributed at the failure position, if any.
    #[must_use]
    pub fn message(&self) -> Option<&EcoString> {
        match self {
            Self::NoParse => None,
            Self::GiveUp(msg) => Some(msg),
        }
    }
}

/// The final error of a failed parse.
///
/// Carries the furthest position any terminal reached and the expectation
/// messages accumulated there, sorted and deduplicated.
#[derive(Debug, Clone, Error, Diagnostic)]
#[error("{kind}")]
#[diagnostic()]
pub struct ParseError {
    /// The kind of parse failure.
    #[source]
    pub kind: ParseErrorKind,
    /// The buffer name (file name or `<string>`).
    pub name: EcoString,
    /// Byte offset of the failure.
    pub offset: u32,
    /// 1-based line number.
    pub line: u32,
    /// 0-based byte column.
    pub column: u32,
    /// 0-based character column.
    pub utf8_column: u32,
    /// The failure location for diagnostic rendering.
    #[label("here")]
    pub span: miette::SourceSpan,
}

/// The kind of parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    /// No complete parse was found.
    #[error("parse error")]
    Syntax {
        /// Sorted, deduplicated expectation messages.
        expected: Vec<EcoString>,
    },

    /// A partial parse was requested but the grammar matched more than once.
    #[error("ambiguous parse ({count} results)")]
    Ambiguous {
        /// Number of distinct results found.
        count: usize,
    },
}

/// Rendering style for [`ParseError::render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStyle {
    /// `File "name", line 1, character 2:` on its own line.
    OCaml,
    /// `name:1:2:` prefix, gcc-like.
    Gcc,
}

impl ParseError {
    /// Builds a syntax error at `pos` expecting `expected`.
    ///
    /// Messages are sorted lexicographically and deduplicated here, so
    /// callers may pass them in accumulation order.
    #[must_use]
    pub fn syntax(pos: &Pos, mut expected: Vec<EcoString>) -> Self {
        expected.sort();
        expected.dedup();
        Self::at(pos, ParseErrorKind::Syntax { expected })
    }

    /// Builds an ambiguity error at `pos`.
    #[must_use]
    pub fn ambiguous(pos: &Pos, count: usize) -> Self {
        Self::at(pos, ParseErrorKind::Ambiguous { count })
    }

    fn at(pos: &Pos, kind: ParseErrorKind) -> Self {
        Self {
            kind,
            name: pos.name().clone(),
            offset: pos.offset(),
            line: pos.line(),
            column: pos.column(),
            utf8_column: pos.utf8_column(),
            span: (pos.offset() as usize, 0).into(),
        }
    }

    /// The expectation messages, if this is a syntax error.
    #[must_use]
    pub fn expected(&self) -> &[EcoString] {
        match &self.kind {
            ParseErrorKind::Syntax { expected } => expected,
            ParseErrorKind::Ambiguous { .. } => &[],
        }
    }

    /// Renders the error as a human-readable message in the given style.
    #[must_use]
    pub fn render(&self, style: ErrorStyle) -> String {
        let mut out = match style {
            ErrorStyle::OCaml => format!(
                "File \"{}\", line {}, character {}:\nParse error",
                self.name, self.line, self.utf8_column
            ),
            ErrorStyle::Gcc => {
                format!("{}:{}:{}: Parse error", self.name, self.line, self.utf8_column)
            }
        };
        let expected = self.expected();
        if !expected.is_empty() {
            out.push_str("\nexpecting:");
            for msg in expected {
                out.push_str("\n  ");
                out.push_str(msg);
            }
        }
        if let ParseErrorKind::Ambiguous { count } = self.kind {
            out.push_str(&format!("\n{count} distinct parses"));
        }
        out
    }
}
