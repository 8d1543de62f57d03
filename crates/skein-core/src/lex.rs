// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! The terminal contract and a minimal set of terminals.
//!
//! A [`Terminal`] matches raw bytes at a position, producing a value and the
//! position just past the match (blanks not yet skipped), or a
//! [`TermFail`] naming where inside the attempt it stopped and what was
//! expected there. Terminals also carry a predict set used by alternation
//! for one-character lookahead.
//!
//! The full lexeme library (identifiers, strings, regex-driven lexemes) is
//! deliberately not part of this crate; the constructors here are the small
//! set the engine itself and its tests need.

use std::rc::Rc;

use ecow::EcoString;

use crate::charset::CharSet;
use crate::input::Input;

/// A failed terminal match.
///
/// `offset` is where the attempt stopped — for a multi-character terminal
/// this may be past where it started, and furthest-progress reporting uses
/// exactly this offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermFail {
    /// Byte offset the attempt reached.
    pub offset: u32,
    /// What was expected, overriding the terminal's name when present.
    pub expected: Option<EcoString>,
}

impl TermFail {
    /// A failure at `offset` with no message of its own.
    #[must_use]
    pub fn at(offset: u32) -> Self {
        Self {
            offset,
            expected: None,
        }
    }
}

type TermFn<T> = Rc<dyn Fn(&Input, u32) -> Result<(T, u32), TermFail>>;

/// A terminal: a byte-level matcher with a predict set and an expectation
/// name.
pub struct Terminal<T> {
    name: Option<EcoString>,
    predict: CharSet,
    run: TermFn<T>,
}

impl<T> Clone for Terminal<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            predict: self.predict,
            run: self.run.clone(),
        }
    }
}

impl<T> Terminal<T> {
    /// Creates a terminal from a raw matching function.
    pub fn new(
        name: Option<EcoString>,
        predict: CharSet,
        run: impl Fn(&Input, u32) -> Result<(T, u32), TermFail> + 'static,
    ) -> Self {
        Self {
            name,
            predict,
            run: Rc::new(run),
        }
    }

    /// The expectation name reported when this terminal fails.
    #[must_use]
    pub fn name(&self) -> Option<&EcoString> {
        self.name.as_ref()
    }

    /// The set of bytes this terminal can start with.
    #[must_use]
    pub fn predict(&self) -> CharSet {
        self.predict
    }

    /// Attempts a match at `offset`.
    pub fn run(&self, input: &Input, offset: u32) -> Result<(T, u32), TermFail> {
        (self.run)(input, offset)
    }
}

/// Matches a single character whose leading byte is in `set`.
#[must_use]
pub fn char_in(name: impl Into<EcoString>, set: CharSet) -> Terminal<char> {
    Terminal::new(Some(name.into()), set, move |input, offset| {
        match input.char_at(offset) {
            Some(c) if set.contains(input.byte_at(offset).unwrap_or(0)) => {
                Ok((c, offset + c.len_utf8() as u32))
            }
            _ => Err(TermFail::at(offset)),
        }
    })
}

/// Matches the exact string `word`, yielding `()`.
///
/// On mismatch the failure offset points at the first byte that differs,
/// and the expectation message is the whole word.
#[must_use]
pub fn keyword(word: impl Into<EcoString>) -> Terminal<()> {
    let word = word.into();
    let predict = word
        .as_bytes()
        .first()
        .map_or_else(CharSet::any, |&b| CharSet::empty().with(b));
    let pattern = word.clone();
    Terminal::new(Some(word), predict, move |input, offset| {
        for (i, expected) in pattern.bytes().enumerate() {
            let at = offset + i as u32;
            if input.byte_at(at) != Some(expected) {
                return Err(TermFail::at(at));
            }
        }
        Ok(((), offset + pattern.len() as u32))
    })
}

/// Matches a floating-point literal: optional sign, digits, optional
/// fraction and exponent.
#[must_use]
pub fn float() -> Terminal<f64> {
    let predict = CharSet::range(b'0', b'9').with(b'-').with(b'.');
    Terminal::new(Some("number".into()), predict, move |input, offset| {
        let mut end = offset;
        if input.byte_at(end) == Some(b'-') {
            end += 1;
        }
        let digits_start = end;
        while input.byte_at(end).is_some_and(|b| b.is_ascii_digit()) {
            end += 1;
        }
        if input.byte_at(end) == Some(b'.') {
            end += 1;
            while input.byte_at(end).is_some_and(|b| b.is_ascii_digit()) {
                end += 1;
            }
        }
        if end == digits_start {
            return Err(TermFail::at(end));
        }
        if matches!(input.byte_at(end), Some(b'e' | b'E')) {
            let mut exp = end + 1;
            if matches!(input.byte_at(exp), Some(b'+' | b'-')) {
                exp += 1;
            }
            let exp_digits = exp;
            while input.byte_at(exp).is_some_and(|b| b.is_ascii_digit()) {
                exp += 1;
            }
            if exp > exp_digits {
                end = exp;
            }
        }
        let text = &input.text()[offset as usize..end as usize];
        match text.parse::<f64>() {
            Ok(value) => Ok((value, end)),
            Err(_) => Err(TermFail::at(end)),
        }
    })
}

/// Matches only at end of input, yielding `()`.
#[must_use]
pub fn eof() -> Terminal<()> {
    Terminal::new(Some("end of input".into()), CharSet::empty(), |input, offset| {
        if offset >= input.len() {
            Ok(((), offset))
        } else {
            Err(TermFail::at(offset))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(text: &str) -> Input {
        Input::from_str(text)
    }

    #[test]
    fn char_in_matches_and_advances() {
        let digit = char_in("digit", CharSet::range(b'0', b'9'));
        let buf = input("7x");
        assert_eq!(digit.run(&buf, 0), Ok(('7', 1)));
        assert_eq!(digit.run(&buf, 1), Err(TermFail::at(1)));
    }

    #[test]
    fn keyword_reports_mismatch_offset() {
        let abc = keyword("abc");
        let buf = input("abd");
        let err = abc.run(&buf, 0).unwrap_err();
        assert_eq!(err.offset, 2);
        assert_eq!(abc.name().map(EcoString::as_str), Some("abc"));
        assert_eq!(abc.run(&input("abc!"), 0), Ok(((), 3)));
    }

    #[test]
    fn keyword_predict_is_first_byte() {
        let kw = keyword("let");
        assert!(kw.predict().contains(b'l'));
        assert!(!kw.predict().contains(b'x'));
    }

    #[test]
    fn float_forms() {
        let num = float();
        assert_eq!(num.run(&input("42"), 0), Ok((42.0, 2)));
        assert_eq!(num.run(&input("-1.5 "), 0), Ok((-1.5, 4)));
        assert_eq!(num.run(&input("2e3"), 0), Ok((2000.0, 3)));
        assert_eq!(num.run(&input("3.14e-2"), 0), Ok((0.0314, 7)));
        // A bare 'e' with no exponent digits is not consumed.
        assert_eq!(num.run(&input("5elephants"), 0), Ok((5.0, 1)));
        assert!(num.run(&input("x"), 0).is_err());
    }

    #[test]
    fn eof_only_at_end() {
        let end = eof();
        assert_eq!(end.run(&input(""), 0), Ok(((), 0)));
        assert_eq!(end.run(&input("ab"), 2), Ok(((), 2)));
        assert!(end.run(&input("ab"), 0).is_err());
    }
}
