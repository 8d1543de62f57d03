// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Engine-level scenario tests: grammars exercising the scheduler, the
//! continuation machinery, left recursion, the cache, and layout changes
//! through the public driver API.

use ecow::EcoString;

use super::*;
use crate::charset::CharSet;
use crate::driver::{parse_all, parse_str, partial_parse};
use crate::error::{ParseErrorKind, Reject};
use crate::input::{Blank, Input, Pos, blank_char_set, no_blank};
use crate::lex::{char_in, eof, float, keyword};

fn spaces() -> Blank {
    blank_char_set(CharSet::of_str(" "))
}

fn kw(word: &str) -> Grammar<()> {
    lexeme(keyword(word))
}

fn num() -> Grammar<f64> {
    lexeme(float())
}

/// Appends an end-of-input lexeme so `parse_all` sees only full parses.
fn to_end<T: Clone + 'static>(g: &Grammar<T>) -> Grammar<T> {
    first(g, &lexeme(eof()))
}

// ============================================================================
// Arithmetic with priorities (left recursion + predict sets)
// ============================================================================

fn arithmetic() -> Grammar<f64> {
    let expr: Grammar<f64> = declare("expression");
    let parens = second(&kw("("), &first(&expr, &kw(")")));
    let atom = alt(
        CharSet::range(b'0', b'9').with(b'-').with(b'.'),
        &num(),
        CharSet::of_str("("),
        &parens,
    );

    let product_key: Key<f64> = Key::new();
    let product_step = seq_map(&first(&read_tbl(&product_key), &kw("*")), &atom, |a, b| {
        a * b
    });
    let product = lr(&atom, product_key, &product_step);

    let sum_key: Key<f64> = Key::new();
    let sum_step = seq_map(&first(&read_tbl(&sum_key), &kw("+")), &product, |a, b| a + b);
    let sum = lr(&product, sum_key, &sum_step);

    expr.set(&sum);
    expr
}

#[test]
fn arithmetic_respects_priorities() {
    let g = arithmetic();
    assert_eq!(parse_str(&g, &spaces(), "1+2*3").unwrap(), 7.0);
    assert_eq!(parse_str(&g, &spaces(), "2*3+1").unwrap(), 7.0);
    assert_eq!(parse_str(&g, &spaces(), "(1+2)*3").unwrap(), 9.0);
    assert_eq!(parse_str(&g, &spaces(), "1 + 2 * 3").unwrap(), 7.0);
}

#[test]
fn arithmetic_is_unambiguous() {
    let g = to_end(&arithmetic());
    let all = parse_all(&g, &spaces(), &Input::from_str("1+2*3")).unwrap();
    assert_eq!(all, [7.0]);
}

#[test]
fn sum_folds_left_associatively() {
    // Left associativity is observable with a non-associative action.
    let key: Key<f64> = Key::new();
    let step = seq_map(&first(&read_tbl(&key), &kw("-")), &num(), |a, b| a - b);
    let g = lr(&num(), key, &step);
    assert_eq!(parse_str(&g, &spaces(), "10-2-3").unwrap(), 5.0);
}

// ============================================================================
// S-expressions (recursion + repetition)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum SExpr {
    Atom(char),
    List(Vec<SExpr>),
}

/// Total number of children across all lists.
fn size(e: &SExpr) -> usize {
    match e {
        SExpr::Atom(_) => 0,
        SExpr::List(items) => items.len() + items.iter().map(size).sum::<usize>(),
    }
}

fn sexpr() -> Grammar<SExpr> {
    let s: Grammar<SExpr> = declare("sexpr");
    let atom = app(
        &lexeme(char_in("atom", CharSet::range(b'a', b'z'))),
        SExpr::Atom,
    );
    let list = app(&second(&kw("("), &first(&star(&s), &kw(")"))), SExpr::List);
    s.set(&alt(
        CharSet::range(b'a', b'z'),
        &atom,
        CharSet::of_str("("),
        &list,
    ));
    s
}

#[test]
fn sexpr_counts_children() {
    let g = sexpr();
    let tree = parse_str(&g, &spaces(), "(a (b c) d)").unwrap();
    assert_eq!(size(&tree), 5);
    match &tree {
        SExpr::List(items) => {
            assert_eq!(items.len(), 3);
            assert_eq!(items[1], SExpr::List(vec![SExpr::Atom('b'), SExpr::Atom('c')]));
        }
        SExpr::Atom(_) => panic!("expected a list"),
    }
}

#[test]
fn star_and_plus_fold_left() {
    let letters = star(&lexeme(char_in("letter", CharSet::range(b'a', b'z'))));
    assert_eq!(parse_str(&letters, &spaces(), "a b c").unwrap(), ['a', 'b', 'c']);
    assert_eq!(parse_str(&letters, &spaces(), "").unwrap(), Vec::<char>::new());

    let some = plus(&lexeme(char_in("letter", CharSet::range(b'a', b'z'))));
    assert_eq!(parse_str(&some, &spaces(), "x y").unwrap(), ['x', 'y']);
    assert!(parse_str(&some, &spaces(), "").is_err());
}

// ============================================================================
// Right recursion at depth (deferred transformers)
// ============================================================================

#[test]
fn right_recursion_is_deep_and_single() {
    let items: Grammar<usize> = declare("items");
    let nonempty = seq_map(&kw("a"), &items, |(), n| n + 1);
    items.set(&either(&empty(0usize), &nonempty));

    let text = "a ".repeat(10_000);
    assert_eq!(parse_str(&items, &spaces(), &text).unwrap(), 10_000);

    let all = parse_all(&to_end(&items), &spaces(), &Input::from_str(&text)).unwrap();
    assert_eq!(all, [10_000]);
}

// ============================================================================
// Cache and merge
// ============================================================================

#[test]
fn ambiguous_grammar_with_cache_merge_yields_one_value() {
    let first_a = app(&kw("a"), |()| "first");
    let second_a = app(&kw("a"), |()| "second");
    let g = cache_merge(&either(&first_a, &second_a), |x, _| x);
    let all = parse_all(&g, &no_blank(), &Input::from_str("a")).unwrap();
    assert_eq!(all, ["first"]);
}

#[test]
fn cache_without_merge_is_transparent() {
    let ambiguous = || {
        let one = app(&kw("a"), |()| 1usize);
        let two = app(&pair(&kw("a"), &kw("a")), |_| 2usize);
        either(&one, &two)
    };
    let input = Input::from_str("aa");
    let mut plain = parse_all(&ambiguous(), &no_blank(), &input).unwrap();
    let mut cached = parse_all(&cache(&ambiguous()), &no_blank(), &input).unwrap();
    plain.sort_unstable();
    cached.sort_unstable();
    assert_eq!(plain, [1, 2]);
    assert_eq!(cached, plain);
}

#[test]
fn cache_runs_grammar_once_per_position() {
    use std::cell::Cell;
    let runs = std::rc::Rc::new(Cell::new(0));
    let tally = runs.clone();
    let counted = try_app(&kw("a"), move |()| {
        tally.set(tally.get() + 1);
        Ok(())
    });
    let shared = cache(&counted);
    // Two alternatives both start with the cached grammar at offset 0.
    let g = either(&pair(&shared, &kw("x")), &pair(&shared, &kw("y")));
    parse_str(&g, &spaces(), "a y").unwrap();
    assert_eq!(runs.get(), 1);
}

// ============================================================================
// Furthest-position error reporting
// ============================================================================

#[test]
fn error_reports_furthest_position_and_expectation() {
    let err = parse_str(&kw("abc"), &no_blank(), "abd").unwrap_err();
    assert_eq!(err.line, 1);
    assert_eq!(err.column, 2);
    assert!(err.expected().iter().any(|m| m.as_str() == "abc"));
}

#[test]
fn expectations_accumulate_at_the_same_position() {
    let g = either(&kw("ab"), &kw("ax"));
    let err = parse_str(&g, &no_blank(), "aq").unwrap_err();
    let expected: Vec<&str> = err.expected().iter().map(EcoString::as_str).collect();
    assert_eq!(err.column, 1);
    assert_eq!(expected, ["ab", "ax"]);
}

#[test]
fn only_the_furthest_expectation_survives() {
    // "left" dies at offset 2, "lost" at offset 1; the deeper attempt wins.
    let g = either(&kw("left"), &kw("lost"));
    let err = parse_str(&g, &no_blank(), "lexx").unwrap_err();
    assert_eq!(err.column, 2);
    let expected: Vec<&str> = err.expected().iter().map(EcoString::as_str).collect();
    assert_eq!(expected, ["left"]);
}

#[test]
fn error_combinator_contributes_a_message() {
    let g: Grammar<()> = either(&kw("x"), &error("a thing"));
    let err = parse_str(&g, &no_blank(), "y").unwrap_err();
    let expected: Vec<&str> = err.expected().iter().map(EcoString::as_str).collect();
    assert_eq!(expected, ["a thing", "x"]);
}

#[test]
fn action_rejection_abandons_the_path() {
    let small = try_app(&num(), |n| {
        if n < 10.0 {
            Ok(n)
        } else {
            Err(Reject::give_up("small number"))
        }
    });
    assert_eq!(parse_str(&small, &spaces(), "5").unwrap(), 5.0);
    let err = parse_str(&small, &spaces(), "42").unwrap_err();
    assert!(err.expected().iter().any(|m| m.as_str() == "small number"));
}

// ============================================================================
// Layout changes
// ============================================================================

#[test]
fn layout_change_is_scoped_to_the_inner_grammar() {
    let tabs = blank_char_set(CharSet::of_str("\t"));
    let inner = change_layout(tabs, LayoutConfig::all(), &kw("a"));
    let braced = second(&kw("{"), &first(&inner, &kw("}")));
    let g = first(&braced, &kw("x"));
    // Tabs are blanks only inside the braces; the trailing space before 'x'
    // is consumed by the restored outer blank.
    parse_str(&g, &spaces(), "{\ta\t} x").unwrap();
    // Outside the braces tabs are not blanks.
    assert!(parse_str(&g, &spaces(), "{\ta\t}\tx").is_err());
}

#[test]
fn default_layout_keeps_old_blanks_at_boundaries() {
    let tabs = blank_char_set(CharSet::of_str("\t"));
    let inner = change_layout(tabs, LayoutConfig::default(), &kw("a"));
    let g = second(&kw("{"), &first(&inner, &kw("}")));
    // No new blanks before the inner grammar: 'a' must follow '{ ' directly.
    parse_str(&g, &spaces(), "{ a}").unwrap();
    assert!(parse_str(&g, &spaces(), "{\ta}").is_err());
}

// ============================================================================
// Alternation, option, ambiguity
// ============================================================================

#[test]
fn alt_prunes_with_predict_sets() {
    let g = alt(
        CharSet::of_str("a"),
        &app(&kw("alpha"), |()| 1),
        CharSet::of_str("b"),
        &app(&kw("beta"), |()| 2),
    );
    assert_eq!(parse_str(&g, &spaces(), "beta").unwrap(), 2);
    let err = parse_str(&g, &spaces(), "gamma").unwrap_err();
    assert_eq!(err.column, 0);
}

#[test]
fn alt_order_does_not_change_the_result_multiset() {
    let one = app(&kw("a"), |()| 1);
    let two = app(&kw("a"), |()| 2);
    let input = Input::from_str("a");
    let mut fwd = parse_all(&either(&one, &two), &no_blank(), &input).unwrap();
    let mut rev = parse_all(&either(&two, &one), &no_blank(), &input).unwrap();
    fwd.sort_unstable();
    rev.sort_unstable();
    assert_eq!(fwd, rev);
    assert_eq!(fwd, [1, 2]);
}

#[test]
fn all_tilings_of_an_ambiguous_grammar_are_found() {
    let g = either(
        &app(&kw("ab"), |()| "whole"),
        &app(&pair(&kw("a"), &kw("b")), |_| "split"),
    );
    let mut all = parse_all(&to_end(&g), &no_blank(), &Input::from_str("ab")).unwrap();
    all.sort_unstable();
    assert_eq!(all, ["split", "whole"]);
}

#[test]
fn option_takes_the_branch_or_the_default() {
    let sign = option(1.0, CharSet::of_str("-"), &app(&kw("-"), |()| -1.0));
    let g = seq_map(&sign, &num(), |s, n| s * n);
    assert_eq!(parse_str(&g, &spaces(), "- 5").unwrap(), -5.0);
    assert_eq!(parse_str(&g, &spaces(), "7").unwrap(), 7.0);
}

// ============================================================================
// Dependent sequencing
// ============================================================================

#[test]
fn dseq_branches_on_the_parsed_value() {
    let tag = app(&lexeme(char_in("tag", CharSet::of_str("ns"))), |c| (c, ()));
    let g = dseq(&tag, |&c| {
        if c == 'n' {
            fun_of(&lexeme(float()), |(), n| format!("number {n}"))
        } else {
            fun_of(
                &lexeme(char_in("letter", CharSet::range(b'a', b'z'))),
                |(), c| format!("letter {c}"),
            )
        }
    });
    assert_eq!(parse_str(&g, &spaces(), "n 42").unwrap(), "number 42");
    assert_eq!(parse_str(&g, &spaces(), "s x").unwrap(), "letter x");
}

// ============================================================================
// Positions
// ============================================================================

#[test]
fn span_captures_pre_blank_right_edge() {
    let g = second(&kw("x"), &with_span(&kw("abc"), |l, (), r| (l.offset(), r.offset())));
    let (left, right) = parse_str(&g, &spaces(), "x abc").unwrap();
    assert_eq!(left, 2);
    assert_eq!(right, 5);
}

#[test]
fn left_pos_feeds_the_function_value() {
    let g = left_pos(&empty_fun(|p: Pos| p.column()));
    let wrapped = second(&kw("ab"), &first(&g, &kw("c")));
    assert_eq!(parse_str(&wrapped, &no_blank(), "abc").unwrap(), 2);
}

#[test]
fn lr_pos_stages_the_expression_start() {
    let key: Key<(f64, u32)> = Key::new();
    let pkey: PosKey = Key::new();
    let head = app(&num(), |n| (n, u32::MAX));
    let folded = seq_map(
        &first(&read_tbl(&key), &kw("+")),
        &num(),
        |(acc, _), b| acc + b,
    );
    let step = read_pos(&pkey, &fun_of(&folded, |p: Pos, sum| (sum, p.offset())));
    let g = second(&kw("x"), &lr_pos(&head, key, pkey, &step));
    let (sum, start) = parse_str(&g, &spaces(), "x 1+2+3").unwrap();
    assert_eq!(sum, 6.0);
    // The staged position is the left edge of the whole expression.
    assert_eq!(start, 2);
}

// ============================================================================
// Predicates
// ============================================================================

#[test]
fn test_before_sees_the_blank_gap() {
    let glued = test_before(|_, pre, off| pre == off, &kw("b"));
    let g = second(&kw("a"), &glued);
    parse_str(&g, &spaces(), "ab").unwrap();
    assert!(parse_str(&g, &spaces(), "a b").is_err());
}

#[test]
fn test_after_checks_on_continuation_entry() {
    let at_end = test_after(|input, pre, _| pre == input.len(), &num());
    let input = Input::from_str("42x");
    assert!(partial_parse(&at_end, &no_blank(), &input, false).is_err());
    assert_eq!(
        partial_parse(&num(), &no_blank(), &input, false).unwrap(),
        (42.0, 2)
    );
}

// ============================================================================
// Partial parses
// ============================================================================

#[test]
fn partial_parse_reports_both_end_offsets() {
    let input = Input::from_str("ab  rest");
    let g = kw("ab");
    assert_eq!(partial_parse(&g, &spaces(), &input, false).unwrap(), ((), 2));
    assert_eq!(partial_parse(&g, &spaces(), &input, true).unwrap(), ((), 4));
}

#[test]
fn partial_parse_rejects_ambiguity() {
    let one = app(&kw("a"), |()| 1usize);
    let two = app(&pair(&kw("a"), &kw("a")), |_| 2usize);
    let err = partial_parse(&either(&one, &two), &no_blank(), &Input::from_str("aa"), false)
        .unwrap_err();
    assert!(matches!(err.kind, ParseErrorKind::Ambiguous { count: 2 }));
}

// ============================================================================
// Declared grammars and families
// ============================================================================

#[test]
fn unset_declared_grammar_fails_with_its_name() {
    let g: Grammar<()> = declare("widget");
    let err = parse_str(&g, &no_blank(), "x").unwrap_err();
    assert!(err.expected().iter().any(|m| m.as_str() == "widget"));
}

#[test]
#[should_panic(expected = "already defined")]
fn setting_a_grammar_twice_panics() {
    let g: Grammar<()> = declare("twice");
    g.set(&kw("a"));
    g.set(&kw("b"));
}

#[test]
fn grammar_family_memoizes_per_parameter() {
    let family: GrammarFamily<u32, u32> = GrammarFamily::new("letters");
    // Requested before the family is defined.
    let two = family.grammar(&2);
    family.define(|&n| {
        (0..n).fold(empty(0u32), |g, _| seq_map(&g, &kw("a"), |k, ()| k + 1))
    });
    assert_eq!(parse_str(&two, &spaces(), "a a").unwrap(), 2);
    let three = family.grammar(&3);
    assert_eq!(parse_str(&three, &spaces(), "a a a").unwrap(), 3);
    assert!(parse_str(&three, &spaces(), "a a").is_err());
}

// ============================================================================
// Key store scoping
// ============================================================================

#[test]
#[should_panic(expected = "read_tbl")]
fn key_store_is_cleared_by_lexeme_success() {
    let key: Key<f64> = Key::new();
    // The staged value is read after a lexeme inside gf: by then the key
    // store has been cleared, which is a programming error.
    let step = second(&kw("+"), &read_tbl(&key));
    let g = lr(&num(), key, &step);
    let _ = parse_str(&g, &spaces(), "1+2");
}
