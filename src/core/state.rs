//! Runtime game state.
//!
//! ## RuntimeState
//!
//! Everything a dispatched action can change:
//! - Decks (cards not yet dealt to anyone)
//! - Players, each with properties and draw/hand/discard piles
//! - Global properties
//!
//! Uses `im` persistent data structures, so taking a draft is O(1) and an
//! untouched subtree stays shared with the committed snapshot.
//!
//! Scripts see the same shape as a Lua table:
//! `state.players[1].hand[1].properties.power`.

use im::{OrdMap, Vector};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{CardInstanceId, IdAllocator, PlayerEntityId};
use super::properties::PropertySchema;
use crate::cards::{EntityKind, RuntimeCard, RuntimeDeck};
use crate::zones::Pile;

/// One player: properties and three card piles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuntimePlayer {
    pub id: PlayerEntityId,
    #[serde(default)]
    pub properties: OrdMap<String, Value>,
    #[serde(default)]
    pub draw: Pile<RuntimeCard>,
    #[serde(default)]
    pub hand: Pile<RuntimeCard>,
    #[serde(default)]
    pub discard: Pile<RuntimeCard>,
}

impl RuntimePlayer {
    /// Get a property value.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Iterate all cards this player holds: draw, then hand, then discard.
    pub fn cards(&self) -> impl Iterator<Item = &RuntimeCard> {
        self.draw.iter().chain(self.hand.iter()).chain(self.discard.iter())
    }
}

/// Complete game state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuntimeState {
    #[serde(default)]
    pub decks: Vector<RuntimeDeck>,
    #[serde(default)]
    pub players: Vector<RuntimePlayer>,
    #[serde(default)]
    pub properties: OrdMap<String, Value>,
}

impl RuntimeState {
    /// Create a state from its parts.
    #[must_use]
    pub fn new(
        decks: Vector<RuntimeDeck>,
        players: Vector<RuntimePlayer>,
        properties: OrdMap<String, Value>,
    ) -> Self {
        Self {
            decks,
            players,
            properties,
        }
    }

    /// Number of players.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Player by 0-based index.
    #[must_use]
    pub fn player(&self, index: usize) -> Option<&RuntimePlayer> {
        self.players.get(index)
    }

    /// Deck by its definition id.
    #[must_use]
    pub fn deck(&self, id: &str) -> Option<&RuntimeDeck> {
        self.decks.iter().find(|deck| deck.id == id)
    }

    /// Global property value.
    #[must_use]
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Every card reachable from the state.
    ///
    /// Order: all decks in order, then each player's draw, hand and
    /// discard piles. Reaction resolution relies on this order.
    pub fn cards(&self) -> impl Iterator<Item = &RuntimeCard> {
        self.decks
            .iter()
            .flat_map(|deck| deck.cards.iter())
            .chain(self.players.iter().flat_map(|player| player.cards()))
    }

    /// Find a card instance anywhere in the state.
    #[must_use]
    pub fn find_card(&self, id: CardInstanceId) -> Option<&RuntimeCard> {
        self.cards().find(|card| card.id == id)
    }
}

/// Creates players with fresh ids and default properties.
///
/// Handed to the runtime schema's setup function as `create_player()`.
#[derive(Debug)]
pub struct PlayerFactory {
    ids: IdAllocator,
    defaults: OrdMap<String, Value>,
}

impl PlayerFactory {
    #[must_use]
    pub fn new(schema: &PropertySchema) -> Self {
        Self {
            ids: IdAllocator::new(),
            defaults: schema.defaults(EntityKind::Player),
        }
    }

    /// A player with defaulted properties and three empty piles.
    #[must_use]
    pub fn create(&self) -> RuntimePlayer {
        RuntimePlayer {
            id: PlayerEntityId(self.ids.next()),
            properties: self.defaults.clone(),
            draw: Pile::new(),
            hand: Pile::new(),
            discard: Pile::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::PropertyDefinition;
    use crate::core::CardTypeId;
    use serde_json::json;

    fn card(id: u64, ty: &str) -> RuntimeCard {
        RuntimeCard {
            id: CardInstanceId(id),
            type_id: CardTypeId::new(ty),
            name: ty.to_string(),
            properties: OrdMap::new(),
        }
    }

    fn sample_state() -> RuntimeState {
        let factory = PlayerFactory::new(&PropertySchema::default());
        let mut p1 = factory.create();
        let mut p2 = factory.create();
        p1.hand.add(card(2, "goblin"));
        p1.discard.add(card(3, "elf"));
        p2.draw.add(card(4, "goblin"));

        let deck = RuntimeDeck {
            id: "main".into(),
            name: "Main".into(),
            cards: Pile::from_iter([card(1, "dragon")]),
        };

        RuntimeState::new(
            Vector::from(vec![deck]),
            Vector::from(vec![p1, p2]),
            OrdMap::new(),
        )
    }

    #[test]
    fn test_card_walk_order() {
        let state = sample_state();
        let ids: Vec<u64> = state.cards().map(|c| c.id.raw()).collect();

        // Decks first, then each player's draw, hand, discard
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_player_cards_order() {
        let state = sample_state();
        let p1: Vec<u64> = state.players[0].cards().map(|c| c.id.raw()).collect();

        // Draw is empty, then hand, then discard
        assert_eq!(p1, vec![2, 3]);
    }

    #[test]
    fn test_find_card_and_lookups() {
        let state = sample_state();

        assert_eq!(state.find_card(CardInstanceId(4)).unwrap().type_id.as_str(), "goblin");
        assert!(state.find_card(CardInstanceId(99)).is_none());
        assert_eq!(state.deck("main").unwrap().cards.size(), 1);
        assert_eq!(state.player_count(), 2);
    }

    #[test]
    fn test_player_factory_ids_and_defaults() {
        let defs: Vec<PropertyDefinition> = serde_json::from_value(json!([
            {"propertyId": "hp", "entityId": "player", "name": "hp", "type": "number", "defaultValue": 20},
        ]))
        .unwrap();
        let (schema, _) = PropertySchema::partition(&defs);
        let factory = PlayerFactory::new(&schema);

        let a = factory.create();
        let b = factory.create();

        assert_ne!(a.id, b.id);
        assert_eq!(a.property("hp"), Some(&json!(20)));
        assert!(a.hand.is_empty());
    }

    #[test]
    fn test_json_shape() {
        let state = sample_state();
        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["players"][0]["hand"][0]["type_id"], json!("goblin"));
        assert_eq!(json["decks"][0]["cards"][0]["id"], json!(1));
    }
}
