// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Input buffers and source positions.
//!
//! An [`Input`] is an immutable, byte-addressed buffer shared by every
//! branch of a parse. The pair (buffer, byte offset) is the authoritative
//! position; line, column and UTF-8 column are derived on demand through a
//! precomputed line index. The buffer also hosts a heterogeneous,
//! position-keyed table used by the memoizing cache combinator — keying the
//! table by the buffer itself is what makes cache entries specific to one
//! input's identity.
//!
//! Blank functions advance past insignificant characters between lexemes;
//! see [`Blank`].

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read};
use std::rc::Rc;

use camino::Utf8Path;
use ecow::EcoString;

use crate::charset::CharSet;

/// Advances past insignificant characters, returning the new offset.
///
/// Applied by the engine after every successful lexeme and once before the
/// parse starts. A blank function must be deterministic and must not move
/// backwards.
pub type Blank = Rc<dyn Fn(&Input, u32) -> u32>;

/// An immutable input buffer with position bookkeeping.
///
/// Cheap to clone (reference counted). Two `Input` values are the *same
/// buffer* only if they were cloned from one another; see [`Input::same`].
#[derive(Clone)]
pub struct Input {
    inner: Rc<InputInner>,
}

struct InputInner {
    name: EcoString,
    text: String,
    /// Byte offset of the start of each line.
    line_starts: Vec<u32>,
    /// Heterogeneous table keyed by (owner id, byte offset); values are
    /// supplied by the cache combinator.
    table: RefCell<HashMap<(u64, u32), Rc<dyn Any>>>,
}

impl Input {
    /// Creates a buffer from a string, named `<string>`.
    #[must_use]
    pub fn from_str(text: impl Into<String>) -> Self {
        Self::with_name("<string>", text)
    }

    /// Creates a named buffer (the name appears in error positions).
    #[must_use]
    pub fn with_name(name: impl Into<EcoString>, text: impl Into<String>) -> Self {
        let text = text.into();
        let line_starts = line_starts(&text);
        Self {
            inner: Rc::new(InputInner {
                name: name.into(),
                text,
                line_starts,
                table: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Reads a buffer from a file.
    pub fn from_file(path: &Utf8Path) -> io::Result<Self> {
        let text = std::fs::read_to_string(path.as_std_path())?;
        Ok(Self::with_name(path.as_str(), text))
    }

    /// Reads a buffer to end from any reader.
    pub fn from_reader(name: impl Into<EcoString>, mut reader: impl Read) -> io::Result<Self> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Ok(Self::with_name(name, text))
    }

    /// The buffer's name.
    #[must_use]
    pub fn name(&self) -> &EcoString {
        &self.inner.name
    }

    /// The full text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.inner.text
    }

    /// Total length in bytes.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "inputs over 4GB are not supported"
    )]
    pub fn len(&self) -> u32 {
        self.inner.text.len() as u32
    }

    /// Returns true for an empty buffer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.text.is_empty()
    }

    /// The byte at `offset`, or `None` at end of input.
    #[must_use]
    pub fn byte_at(&self, offset: u32) -> Option<u8> {
        self.inner.text.as_bytes().get(offset as usize).copied()
    }

    /// The character starting at `offset`, or `None` at end of input.
    ///
    /// `offset` must fall on a character boundary; positions produced by
    /// terminals always do.
    #[must_use]
    pub fn char_at(&self, offset: u32) -> Option<char> {
        self.inner.text.get(offset as usize..)?.chars().next()
    }

    /// The remaining text from `offset`.
    #[must_use]
    pub fn rest(&self, offset: u32) -> &str {
        self.inner.text.get(offset as usize..).unwrap_or("")
    }

    /// Identity comparison: true if both values share one buffer.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// 1-based line number at `offset`.
    #[must_use]
    pub fn line_of(&self, offset: u32) -> u32 {
        self.line_index(offset) + 1
    }

    /// 0-based byte column at `offset`.
    #[must_use]
    pub fn column_of(&self, offset: u32) -> u32 {
        offset - self.line_start(offset)
    }

    /// 0-based character column at `offset` (counts UTF-8 characters).
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "inputs over 4GB are not supported"
    )]
    pub fn utf8_column_of(&self, offset: u32) -> u32 {
        let start = self.line_start(offset) as usize;
        self.inner
            .text
            .get(start..offset as usize)
            .map_or(0, |s| s.chars().count() as u32)
    }

    fn line_index(&self, offset: u32) -> u32 {
        match self.inner.line_starts.binary_search(&offset) {
            Ok(i) => u32::try_from(i).unwrap_or(u32::MAX),
            Err(i) => u32::try_from(i - 1).unwrap_or(u32::MAX),
        }
    }

    fn line_start(&self, offset: u32) -> u32 {
        self.inner.line_starts[self.line_index(offset) as usize]
    }

    pub(crate) fn table_get(&self, owner: u64, offset: u32) -> Option<Rc<dyn Any>> {
        self.inner.table.borrow().get(&(owner, offset)).cloned()
    }

    pub(crate) fn table_insert(&self, owner: u64, offset: u32, value: Rc<dyn Any>) {
        self.inner.table.borrow_mut().insert((owner, offset), value);
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Input")
            .field("name", &self.inner.name)
            .field("len", &self.inner.text.len())
            .finish()
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "inputs over 4GB are not supported"
)]
fn line_starts(text: &str) -> Vec<u32> {
    let mut starts = vec![0];
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i as u32 + 1);
        }
    }
    starts
}

/// A resolved source position.
///
/// Carries the buffer and byte offset; line/column information is derived
/// lazily. A *phantom* position is synthetic: it stands for the location of
/// a match that consumed no input.
#[derive(Clone)]
pub struct Pos {
    input: Input,
    offset: u32,
    phantom: bool,
}

impl Pos {
    /// A position at `offset` in `input`.
    #[must_use]
    pub fn new(input: Input, offset: u32) -> Self {
        Self {
            input,
            offset,
            phantom: false,
        }
    }

    /// A synthetic position for an empty match.
    #[must_use]
    pub fn phantom(input: Input, offset: u32) -> Self {
        Self {
            input,
            offset,
            phantom: true,
        }
    }

    /// The buffer this position points into.
    #[must_use]
    pub fn input(&self) -> &Input {
        &self.input
    }

    /// Byte offset in the buffer.
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// The buffer's name.
    #[must_use]
    pub fn name(&self) -> &EcoString {
        self.input.name()
    }

    /// 1-based line number.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.input.line_of(self.offset)
    }

    /// 0-based byte column.
    #[must_use]
    pub fn column(&self) -> u32 {
        self.input.column_of(self.offset)
    }

    /// 0-based character column.
    #[must_use]
    pub fn utf8_column(&self) -> u32 {
        self.input.utf8_column_of(self.offset)
    }

    /// True for synthetic empty-match positions.
    #[must_use]
    pub fn is_phantom(&self) -> bool {
        self.phantom
    }
}

impl fmt::Debug for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pos")
            .field("name", self.name())
            .field("offset", &self.offset)
            .field("line", &self.line())
            .field("column", &self.column())
            .field("phantom", &self.phantom)
            .finish()
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.name(), self.line(), self.column())
    }
}

impl PartialEq for Pos {
    fn eq(&self, other: &Self) -> bool {
        self.input.same(&other.input) && self.offset == other.offset && self.phantom == other.phantom
    }
}

/// A blank function that skips nothing.
#[must_use]
pub fn no_blank() -> Blank {
    Rc::new(|_, offset| offset)
}

/// A blank function that skips any run of bytes in `set`.
#[must_use]
pub fn blank_char_set(set: CharSet) -> Blank {
    Rc::new(move |input, mut offset| {
        while input.byte_at(offset).is_some_and(|b| set.contains(b)) {
            offset += 1;
        }
        offset
    })
}
