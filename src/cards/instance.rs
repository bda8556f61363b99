//! Card instances and decks at runtime.
//!
//! `RuntimeCard` is one copy of a card type in a running game. Its
//! behavior is not stored here: the compiled effect table is kept by the
//! game, keyed by the instance `id`.

use im::OrdMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::ids::{CardInstanceId, CardTypeId};
use crate::zones::Pile;

/// A card instance in a game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuntimeCard {
    /// Unique per instance, stable for the card's lifetime.
    pub id: CardInstanceId,

    /// Back-reference to the card definition.
    pub type_id: CardTypeId,

    pub name: String,

    /// Property values, defaulted from the schema and the card's overrides.
    #[serde(default)]
    pub properties: OrdMap<String, Value>,
}

impl RuntimeCard {
    /// Get a property value.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Name used in error messages.
    #[must_use]
    pub fn label(&self) -> String {
        format!("card '{}' ({})", self.name, self.id)
    }
}

/// A named, ordered collection of cards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuntimeDeck {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub cards: Pile<RuntimeCard>,
}

impl RuntimeDeck {
    /// Create an empty deck.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            cards: Pile::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_property_and_label() {
        let mut card = RuntimeCard {
            id: CardInstanceId(5),
            type_id: CardTypeId::new("orc"),
            name: "Orc".into(),
            properties: OrdMap::new(),
        };
        card.properties.insert("power".into(), json!(3));

        assert_eq!(card.property("power"), Some(&json!(3)));
        assert_eq!(card.label(), "card 'Orc' (Card#5)");
    }

    #[test]
    fn test_deck_roundtrip_keeps_order() {
        let mut deck = RuntimeDeck::new("d1", "Starter");
        for i in 1..=3 {
            deck.cards.add(RuntimeCard {
                id: CardInstanceId(i),
                type_id: CardTypeId::new("orc"),
                name: "Orc".into(),
                properties: OrdMap::new(),
            });
        }

        let json = serde_json::to_value(&deck).unwrap();
        let back: RuntimeDeck = serde_json::from_value(json).unwrap();

        assert_eq!(back, deck);
        assert_eq!(back.cards.map(|c| c.id.raw()), vec![1, 2, 3]);
    }
}
