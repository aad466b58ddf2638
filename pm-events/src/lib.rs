//! Event handle algebra, symbol tables, and the binding data model shared by
//! the program table and the runtime state machine.
//!
//! An [`EventHandle`] is the 32-bit tagged identifier used throughout the
//! automaton: every term observed by the tokenizer, every synthetic
//! expression created by `push_expression`, and every named pattern
//! reference shares this one handle space, partitioned by [`EventKind`].
//! Internally the packed `u32` form is what the program table and state
//! machine hash on; the public surface keeps the tagged enum so callers
//! cannot accidentally compare a `Term` handle against a `Reference` handle
//! of the same numeric id.

use std::collections::HashMap;
use std::fmt;

pub mod binding;

/// Number of bits reserved for the identifier within a [`EventHandle`].
/// Identifiers must fit in the remaining 30 bits; the top two bits encode
/// [`EventKind`].
const IDX_BITS: u32 = 30;
const IDX_MASK: u32 = (1 << IDX_BITS) - 1;
const KIND_SHIFT: u32 = IDX_BITS;

/// Discriminates the three disjoint event namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// An input token observed by the tokenizer.
    Term,
    /// A synthetic event created by a compiled expression (`push_expression`).
    Expression,
    /// A named pattern reference (`push_pattern` / `define_pattern`).
    Reference,
}

impl EventKind {
    fn tag(self) -> u32 {
        match self {
            EventKind::Term => 0,
            EventKind::Expression => 1,
            EventKind::Reference => 2,
        }
    }

    fn from_tag(tag: u32) -> Self {
        match tag {
            0 => EventKind::Term,
            1 => EventKind::Expression,
            _ => EventKind::Reference,
        }
    }
}

/// Raised when an identifier does not fit within the 30 bits available to
/// it. Mirrors `patternMatcher.cpp`'s `eventHandle()` range check, which
/// throws when `idx >= (1<<30)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleOverflow {
    pub idx: u32,
}

impl fmt::Display for HandleOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "event handle identifier {} out of range (must be < 2^30)",
            self.idx
        )
    }
}

impl std::error::Error for HandleOverflow {}

/// Tagged 32-bit event identifier: `idx | (kind << 30)`.
///
/// The handle `0` (i.e. `Term(0)`) is never produced by a [`SymbolTable`]
/// (ids start at 1), which lets callers treat a raw `0` as "no event" in
/// contexts such as [`binding::EventData::subdataref`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventHandle {
    Term(u32),
    Expression(u32),
    Reference(u32),
}

impl EventHandle {
    /// Construct a handle, checking that `idx` fits in 30 bits.
    pub fn new(kind: EventKind, idx: u32) -> Result<Self, HandleOverflow> {
        if idx > IDX_MASK {
            return Err(HandleOverflow { idx });
        }
        Ok(match kind {
            EventKind::Term => EventHandle::Term(idx),
            EventKind::Expression => EventHandle::Expression(idx),
            EventKind::Reference => EventHandle::Reference(idx),
        })
    }

    pub fn kind(self) -> EventKind {
        match self {
            EventHandle::Term(_) => EventKind::Term,
            EventHandle::Expression(_) => EventKind::Expression,
            EventHandle::Reference(_) => EventKind::Reference,
        }
    }

    pub fn idx(self) -> u32 {
        match self {
            EventHandle::Term(i) | EventHandle::Expression(i) | EventHandle::Reference(i) => i,
        }
    }

    /// Packed representation used for dense hash-map keys in the program
    /// table and state machine's trigger indices.
    pub fn packed(self) -> u32 {
        self.idx() | (self.kind().tag() << KIND_SHIFT)
    }

    /// Inverse of [`EventHandle::packed`].
    pub fn from_packed(value: u32) -> Self {
        let idx = value & IDX_MASK;
        let kind = EventKind::from_tag(value >> KIND_SHIFT);
        match kind {
            EventKind::Term => EventHandle::Term(idx),
            EventKind::Expression => EventHandle::Expression(idx),
            EventKind::Reference => EventHandle::Reference(idx),
        }
    }
}

impl fmt::Display for EventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventHandle::Term(i) => write!(f, "Term({i})"),
            EventHandle::Expression(i) => write!(f, "Expression({i})"),
            EventHandle::Reference(i) => write!(f, "Reference({i})"),
        }
    }
}

/// Case-preserving string-to-id intern table. Three independent instances
/// back the term, pattern-name, and variable-name namespaces; ids are
/// 1-based so `0` remains available as a sentinel "no symbol" value.
#[derive(Debug, Default)]
pub struct SymbolTable {
    by_name: HashMap<String, u32>,
    names: Vec<String>, // names[id - 1] == name
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the existing id for `name`, or allocate a new one.
    ///
    /// Returns `Err` only if the table has exhausted the 30-bit id space,
    /// which in practice requires interning over a billion distinct names.
    pub fn get_or_create(&mut self, name: &str) -> Result<u32, HandleOverflow> {
        if let Some(&id) = self.by_name.get(name) {
            return Ok(id);
        }
        let next_idx = self.names.len() as u32;
        if next_idx > IDX_MASK - 1 {
            return Err(HandleOverflow { idx: next_idx });
        }
        let id = next_idx + 1;
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), id);
        tracing::trace!(target: "pm.events", name, id, "symbol_interned");
        Ok(id)
    }

    /// Look up an id without creating one.
    pub fn get(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    /// Reverse lookup: the name behind a previously allocated id.
    pub fn key(&self, id: u32) -> Option<&str> {
        if id == 0 {
            return None;
        }
        self.names.get((id - 1) as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

pub use binding::{EventData, EventItem, EventItemArena};
