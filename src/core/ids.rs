//! Identifiers for runtime entities and card types.
//!
//! ## Instance vs Type
//!
//! A card *type* (`CardTypeId`) is the definition's `cardId`: "Fireball".
//! A card *instance* (`CardInstanceId`) is one physical copy of that type in a
//! running game. Cloning a card at dispatch time creates a new instance of the
//! same type.
//!
//! Instance and player ids are allocated from per-compile counters, so two
//! compiles of the same definition produce identical ids.
//!
//! ```
//! use cardscript::core::{CardInstanceId, IdAllocator};
//!
//! let ids = IdAllocator::new();
//! let first = CardInstanceId(ids.next());
//! let second = CardInstanceId(ids.next());
//!
//! assert_ne!(first, second);
//! assert_eq!(first.raw(), 1);
//! ```

use std::cell::Cell;

use serde::{Deserialize, Serialize};

/// Unique identifier for a card instance within one compiled runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardInstanceId(pub u64);

impl CardInstanceId {
    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CardInstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Card#{}", self.0)
    }
}

/// Unique identifier for a player within one compiled runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerEntityId(pub u64);

impl PlayerEntityId {
    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for PlayerEntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Player#{}", self.0)
    }
}

/// Card type identifier: the `cardId` of a card definition.
///
/// Each instance compiles its own effect table from the type's script, but
/// reactions are deduplicated by type: a type reacts once per event.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardTypeId(pub String);

impl CardTypeId {
    /// Create a new card type ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw ID value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CardTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CardTypeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Monotonic id counter, starting at 1.
///
/// Shared by reference between the compile pass and script callbacks that
/// create entities at dispatch time.
#[derive(Debug)]
pub struct IdAllocator {
    next: Cell<u64>,
}

impl IdAllocator {
    /// Create an allocator whose first id is 1.
    #[must_use]
    pub fn new() -> Self {
        Self { next: Cell::new(1) }
    }

    /// Allocate the next id.
    pub fn next(&self) -> u64 {
        let id = self.next.get();
        self.next.set(id + 1);
        id
    }

    /// Number of ids handed out so far.
    #[must_use]
    pub fn allocated(&self) -> u64 {
        self.next.get() - 1
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_is_monotonic() {
        let ids = IdAllocator::new();
        let drawn: Vec<_> = (0..5).map(|_| ids.next()).collect();

        assert_eq!(drawn, vec![1, 2, 3, 4, 5]);
        assert_eq!(ids.allocated(), 5);
    }

    #[test]
    fn test_allocators_are_independent() {
        let a = IdAllocator::new();
        let b = IdAllocator::new();

        a.next();
        a.next();

        assert_eq!(b.next(), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", CardInstanceId(7)), "Card#7");
        assert_eq!(format!("{}", PlayerEntityId(2)), "Player#2");
        assert_eq!(format!("{}", CardTypeId::new("fireball")), "fireball");
    }

    #[test]
    fn test_serialization_is_transparent() {
        let json = serde_json::to_string(&CardInstanceId(123)).unwrap();
        assert_eq!(json, "123");

        let ty: CardTypeId = serde_json::from_str("\"goblin\"").unwrap();
        assert_eq!(ty, CardTypeId::from("goblin"));
    }
}
