// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Fuzz target for engine crash safety.
//!
//! This target feeds arbitrary byte sequences to a representative grammar
//! (summations of numbers and parenthesized groups, with left recursion,
//! alternation and a cache) and asserts the engine never panics. Any input
//! must produce either a value or a `ParseError`.
//!
//! Invalid UTF-8 bytes are converted via lossy conversion (U+FFFD
//! replacement) so the byte-level machinery still gets exercised with
//! unusual character sequences.

#![no_main]

use libfuzzer_sys::fuzz_target;
use skein_core::prelude::*;

fn grammar() -> Grammar<f64> {
    let expr: Grammar<f64> = declare("expr");
    let number = lexeme(float());
    let parens = second(
        &lexeme(keyword("(")),
        &first(&expr, &lexeme(keyword(")"))),
    );
    let atom = cache(&alt(
        CharSet::range(b'0', b'9').with(b'-').with(b'.'),
        &number,
        CharSet::of_str("("),
        &parens,
    ));
    let key: Key<f64> = Key::new();
    let step = seq_map(
        &first(&read_tbl(&key), &lexeme(keyword("+"))),
        &atom,
        |a, b| a + b,
    );
    expr.set(&lr(&atom, key, &step));
    expr
}

fuzz_target!(|data: &[u8]| {
    // Convert to UTF-8 using lossy conversion so invalid bytes become
    // U+FFFD replacement characters rather than being skipped entirely.
    let source = String::from_utf8_lossy(data);

    let blank = blank_char_set(CharSet::of_str(" \t\r\n"));

    // Success = no panic. We don't care whether the input parses.
    let _ = parse_str(&grammar(), &blank, &source);
});
