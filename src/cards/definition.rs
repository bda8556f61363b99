//! Game definition documents.
//!
//! A `GameDefinition` is the persisted, author-controlled description of a
//! game. It is static: compiling it produces a fresh runtime, and nothing
//! at runtime writes back into it.
//!
//! ## Example
//!
//! ```
//! use cardscript::cards::GameDefinition;
//! use serde_json::json;
//!
//! let def: GameDefinition = serde_json::from_value(json!({
//!     "decks": [{"deckId": "d1", "name": "Starter"}],
//!     "cards": [{"cardId": "bolt", "deckId": "d1", "name": "Bolt"}],
//!     "properties": [
//!         {"propertyId": "hp", "entityId": "player", "name": "health", "type": "number", "defaultValue": 10}
//!     ],
//!     "events": [{"eventId": "e1", "name": "play", "inputType": {"player": "number"}}],
//!     "middlewares": []
//! })).unwrap();
//!
//! assert_eq!(def.cards[0].code, "");
//! assert!(def.card("bolt").is_some());
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::types::TypeDescriptor;

/// Which kind of entity owns a property.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Player,
    Card,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckDefinition {
    pub deck_id: String,
    pub name: String,
}

/// A card type: its deck, behavior script and property overrides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDefinition {
    pub card_id: String,
    pub deck_id: String,
    pub name: String,
    /// Script registering an effect table (event name → handler).
    #[serde(default)]
    pub code: String,
    /// Overrides keyed by property id (or name).
    #[serde(default)]
    pub property_defaults: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDefinition {
    pub property_id: String,
    pub entity_id: EntityKind,
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,
    /// Falls back to the type's zero value when absent.
    #[serde(default)]
    pub default_value: Option<Value>,
}

/// A global event: one effect in the primary action table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDefinition {
    pub event_id: String,
    pub name: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub input_type: TypeDescriptor,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiddlewareDefinition {
    pub middleware_id: String,
    pub name: String,
    #[serde(default)]
    pub code: String,
}

/// The complete authored game.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameDefinition {
    pub decks: Vec<DeckDefinition>,
    pub cards: Vec<CardDefinition>,
    pub properties: Vec<PropertyDefinition>,
    pub events: Vec<EventDefinition>,
    pub middlewares: Vec<MiddlewareDefinition>,
}

impl GameDefinition {
    /// Card definition by `cardId`.
    #[must_use]
    pub fn card(&self, card_id: &str) -> Option<&CardDefinition> {
        self.cards.iter().find(|card| card.card_id == card_id)
    }

    /// Deck definition by `deckId`.
    #[must_use]
    pub fn deck(&self, deck_id: &str) -> Option<&DeckDefinition> {
        self.decks.iter().find(|deck| deck.deck_id == deck_id)
    }

    /// Event names in definition order.
    pub fn event_names(&self) -> impl Iterator<Item = &str> {
        self.events.iter().map(|event| event.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_document() {
        let def: GameDefinition = serde_json::from_value(json!({})).unwrap();
        assert!(def.cards.is_empty());
        assert!(def.events.is_empty());
    }

    #[test]
    fn test_camel_case_fields() {
        let card: CardDefinition = serde_json::from_value(json!({
            "cardId": "orc",
            "deckId": "d1",
            "name": "Orc",
            "code": "define({})",
            "propertyDefaults": {"power": 3}
        }))
        .unwrap();

        assert_eq!(card.card_id, "orc");
        assert_eq!(card.property_defaults.get("power"), Some(&json!(3)));
    }

    #[test]
    fn test_event_input_defaults_to_void() {
        let event: EventDefinition =
            serde_json::from_value(json!({"eventId": "e", "name": "endTurn"})).unwrap();
        assert_eq!(event.input_type, TypeDescriptor::default());
    }

    #[test]
    fn test_unknown_entity_kind_rejected() {
        let result = serde_json::from_value::<PropertyDefinition>(json!({
            "propertyId": "x", "entityId": "deck", "name": "x", "type": "number"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_lookups() {
        let def: GameDefinition = serde_json::from_value(json!({
            "decks": [{"deckId": "d1", "name": "One"}],
            "events": [{"eventId": "a", "name": "draw"}, {"eventId": "b", "name": "play"}]
        }))
        .unwrap();

        assert_eq!(def.deck("d1").unwrap().name, "One");
        assert!(def.deck("d2").is_none());
        assert_eq!(def.event_names().collect::<Vec<_>>(), vec!["draw", "play"]);
    }
}
