//! Collision-free identifiers for exported prims.
//!
//! Source names can contain anything and repeat freely; prim names must be
//! valid identifiers and unique among siblings. Collisions are resolved by
//! suffixing `_` until the name is free, so the same input always produces
//! the same names.

use std::collections::BTreeSet;

/// Normalize an arbitrary string into a valid identifier.
///
/// Every character that is not an ASCII letter, digit or `_` becomes `_`,
/// a leading digit is prefixed with `_`, and an empty string becomes `_`.
pub fn make_valid_identifier(candidate: &str) -> String {
    let mut name = String::with_capacity(candidate.len() + 1);
    if candidate.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        name.push('_');
    }
    name.extend(
        candidate
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }),
    );
    name
}

/// Allocate a name for `candidate` that is not in `exclusions`.
///
/// The exclusion set is not modified; the caller inserts the returned name
/// before allocating the next sibling.
pub fn allocate(candidate: &str, exclusions: &BTreeSet<String>) -> String {
    let mut name = make_valid_identifier(candidate);
    while exclusions.contains(&name) {
        name.push('_');
    }
    name
}

/// The names already taken below one parent prim.
#[derive(Clone, Debug, Default)]
pub struct NameScope {
    used: BTreeSet<String>,
}

impl NameScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a free name and reserve it.
    pub fn claim(&mut self, candidate: &str) -> String {
        let name = allocate(candidate, &self.used);
        self.used.insert(name.clone());
        name
    }

    /// Reserve a name that was chosen elsewhere (e.g. a fixed child name).
    pub fn reserve(&mut self, name: &str) {
        self.used.insert(name.to_string());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.used.contains(name)
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    pub fn names(&self) -> &BTreeSet<String> {
        &self.used
    }
}
