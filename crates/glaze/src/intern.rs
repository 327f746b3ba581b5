//! Identifier interning.
//!
//! Every textual name (variables, parameters, field names) is interned once
//! per run and referred to by a compact [`Identifier`]. Comparison and
//! hashing work on the id, so environment lookups and field lookups never
//! touch string contents. The interner is populated during parsing and keeps
//! growing at runtime when computed field names are turned into identifiers.

use std::rc::Rc;

use ahash::AHashMap;

/// Index into the interner's storage.
///
/// Uses `u32` to save space (4 bytes vs 8 for `usize`), which limits a run
/// to ~4 billion unique names. Equality on `Identifier` is equality of the
/// underlying names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct Identifier(u32);

impl Identifier {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Maps names to [`Identifier`]s and back.
#[derive(Debug, Clone, Default)]
pub(crate) struct Interner {
    names: Vec<Rc<str>>,
    ids: AHashMap<Rc<str>, Identifier>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `name`, creating one on first use.
    pub fn intern(&mut self, name: &str) -> Identifier {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = Identifier(u32::try_from(self.names.len()).unwrap_or_else(|_| {
            unreachable!("interner overflowed u32 identifier space")
        }));
        let name: Rc<str> = Rc::from(name);
        self.names.push(Rc::clone(&name));
        self.ids.insert(name, id);
        id
    }

    /// The textual name behind an id.
    pub fn name(&self, id: Identifier) -> &str {
        &self.names[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let mut interner = Interner::new();
        let a = interner.intern("x");
        let b = interner.intern("x");
        let c = interner.intern("y");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(interner.name(a), "x");
        assert_eq!(interner.name(c), "y");
    }

    #[test]
    fn clones_share_the_same_ids() {
        let mut interner = Interner::new();
        let a = interner.intern("alpha");
        let mut cloned = interner.clone();
        assert_eq!(cloned.intern("alpha"), a);
        assert_eq!(cloned.name(a), "alpha");
    }
}
