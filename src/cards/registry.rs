//! Card registry: resolved card templates and instance creation.
//!
//! The registry turns each `CardDefinition` into a `CardTemplate` (type
//! defaults overridden per card) and stamps out `RuntimeCard` instances
//! from it, both during compilation and when scripts call
//! `api.clone_card(type_id)` at dispatch time.
//!
//! ## Example
//!
//! ```
//! use cardscript::cards::{CardDefinition, CardRegistry};
//! use cardscript::core::{CardTypeId, PropertySchema};
//! use serde_json::json;
//!
//! let def: CardDefinition = serde_json::from_value(json!({
//!     "cardId": "bolt", "deckId": "d1", "name": "Bolt"
//! })).unwrap();
//!
//! let mut registry = CardRegistry::new();
//! registry.register(&def, &PropertySchema::default()).unwrap();
//!
//! let a = registry.instantiate(&CardTypeId::new("bolt")).unwrap();
//! let b = registry.instantiate(&CardTypeId::new("bolt")).unwrap();
//! assert_ne!(a.id, b.id);
//! assert_eq!(a.type_id, b.type_id);
//! ```

use im::OrdMap;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;

use super::definition::{CardDefinition, EntityKind};
use super::instance::RuntimeCard;
use crate::core::error::DefinitionError;
use crate::core::ids::{CardInstanceId, CardTypeId, IdAllocator};
use crate::core::properties::PropertySchema;
use crate::core::state::RuntimeState;

/// A card type with its resolved property values.
#[derive(Clone, Debug, PartialEq)]
pub struct CardTemplate {
    pub type_id: CardTypeId,
    pub name: String,
    pub deck_id: String,
    pub properties: OrdMap<String, Value>,
}

/// Registry of card templates.
///
/// Instance ids come from an internal counter, so a registry built from
/// the same definitions always hands out the same id sequence.
#[derive(Debug, Default)]
pub struct CardRegistry {
    templates: FxHashMap<CardTypeId, CardTemplate>,
    order: Vec<CardTypeId>,
    ids: IdAllocator,
}

impl CardRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a card definition into a template.
    ///
    /// Fails on duplicate card ids and on overrides that name an unknown
    /// card property or carry a value of the wrong type.
    pub fn register(
        &mut self,
        def: &CardDefinition,
        schema: &PropertySchema,
    ) -> Result<&CardTemplate, DefinitionError> {
        let type_id = CardTypeId::new(def.card_id.clone());
        if self.templates.contains_key(&type_id) {
            return Err(DefinitionError::DuplicateCard(def.card_id.clone()));
        }

        let mut properties = schema.defaults(EntityKind::Card);
        for (key, value) in &def.property_defaults {
            let spec = schema.resolve(EntityKind::Card, key).ok_or_else(|| {
                DefinitionError::UnknownProperty {
                    card: def.name.clone(),
                    property: key.clone(),
                }
            })?;
            let value = spec.ty.fill_defaults(value.clone());
            if !spec.ty.conforms(&value) {
                return Err(DefinitionError::PropertyType {
                    owner: format!("card '{}'", def.name),
                    property: spec.name.clone(),
                    expected: spec.ty.describe(),
                    value,
                });
            }
            properties.insert(spec.name.clone(), value);
        }

        let template = CardTemplate {
            type_id: type_id.clone(),
            name: def.name.clone(),
            deck_id: def.deck_id.clone(),
            properties,
        };
        self.order.push(type_id.clone());
        Ok(self.templates.entry(type_id).or_insert(template))
    }

    /// Get a template by type id.
    #[must_use]
    pub fn template(&self, type_id: &CardTypeId) -> Option<&CardTemplate> {
        self.templates.get(type_id)
    }

    /// Create a new instance of a card type with a fresh instance id.
    ///
    /// Returns `None` for unknown type ids.
    #[must_use]
    pub fn instantiate(&self, type_id: &CardTypeId) -> Option<RuntimeCard> {
        let template = self.templates.get(type_id)?;
        Some(RuntimeCard {
            id: CardInstanceId(self.ids.next()),
            type_id: template.type_id.clone(),
            name: template.name.clone(),
            properties: template.properties.clone(),
        })
    }

    /// Check if a type id is registered.
    #[must_use]
    pub fn contains(&self, type_id: &CardTypeId) -> bool {
        self.templates.contains_key(type_id)
    }

    /// Get the number of registered card types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Iterate templates in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &CardTemplate> {
        self.order.iter().filter_map(|id| self.templates.get(id))
    }

    /// Check that every card in `state` came from this registry.
    ///
    /// Rejects unregistered types, ids this registry never handed out, and
    /// an instance id that appears in more than one place.
    pub fn check_state(&self, state: &RuntimeState) -> Result<(), String> {
        let issued = self.ids.allocated();
        let mut seen = FxHashSet::default();
        for card in state.cards() {
            if !self.templates.contains_key(&card.type_id) {
                return Err(format!("{} has unknown type '{}'", card.label(), card.type_id));
            }
            if card.id.raw() == 0 || card.id.raw() > issued {
                return Err(format!("{} was never created by this game", card.label()));
            }
            if !seen.insert(card.id) {
                return Err(format!("{} appears more than once", card.label()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::PropertyDefinition;
    use serde_json::json;

    fn schema() -> PropertySchema {
        let defs: Vec<PropertyDefinition> = serde_json::from_value(json!([
            {"propertyId": "pow", "entityId": "card", "name": "power", "type": "number", "defaultValue": 1},
            {"propertyId": "hp", "entityId": "player", "name": "health", "type": "number"},
        ]))
        .unwrap();
        PropertySchema::partition(&defs).0
    }

    fn card(id: &str, overrides: Value) -> CardDefinition {
        serde_json::from_value(json!({
            "cardId": id, "deckId": "d1", "name": id, "propertyDefaults": overrides
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults_and_overrides() {
        let schema = schema();
        let mut registry = CardRegistry::new();
        registry.register(&card("plain", json!({})), &schema).unwrap();
        registry.register(&card("strong", json!({"pow": 5})), &schema).unwrap();

        let plain = registry.instantiate(&"plain".into()).unwrap();
        let strong = registry.instantiate(&"strong".into()).unwrap();

        assert_eq!(plain.property("power"), Some(&json!(1)));
        assert_eq!(strong.property("power"), Some(&json!(5)));
    }

    #[test]
    fn test_override_errors() {
        let schema = schema();
        let mut registry = CardRegistry::new();

        let unknown = registry.register(&card("a", json!({"health": 3})), &schema);
        assert!(matches!(unknown, Err(DefinitionError::UnknownProperty { .. })));

        let mistyped = registry.register(&card("b", json!({"power": "big"})), &schema);
        assert!(matches!(mistyped, Err(DefinitionError::PropertyType { .. })));

        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_card_id() {
        let schema = schema();
        let mut registry = CardRegistry::new();
        registry.register(&card("a", json!({})), &schema).unwrap();

        let dup = registry.register(&card("a", json!({})), &schema);
        assert!(matches!(dup, Err(DefinitionError::DuplicateCard(_))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_instance_ids_are_sequential() {
        let schema = schema();
        let mut registry = CardRegistry::new();
        registry.register(&card("a", json!({})), &schema).unwrap();
        registry.register(&card("b", json!({})), &schema).unwrap();

        let ids: Vec<u64> = ["a", "b", "a"]
            .iter()
            .map(|ty| registry.instantiate(&(*ty).into()).unwrap().id.raw())
            .collect();

        assert_eq!(ids, vec![1, 2, 3]);
        assert!(registry.instantiate(&"missing".into()).is_none());
        assert_eq!(
            registry.iter().map(|t| t.type_id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn test_check_state() {
        use crate::cards::RuntimeDeck;

        let mut registry = CardRegistry::new();
        registry.register(&card("a", json!({})), &schema()).unwrap();
        let first = registry.instantiate(&"a".into()).unwrap();
        let second = registry.instantiate(&"a".into()).unwrap();

        let with = |cards: Vec<RuntimeCard>| {
            let mut deck = RuntimeDeck::new("d1", "Main");
            for card in cards {
                deck.cards.add(card);
            }
            RuntimeState::new(im::vector![deck], im::Vector::new(), OrdMap::new())
        };

        assert!(registry.check_state(&with(vec![first.clone(), second.clone()])).is_ok());

        let aliased = registry.check_state(&with(vec![first.clone(), first.clone()]));
        assert!(aliased.unwrap_err().contains("more than once"));

        let mut ghost = second.clone();
        ghost.type_id = "ghost".into();
        let unknown = registry.check_state(&with(vec![ghost]));
        assert!(unknown.unwrap_err().contains("unknown type 'ghost'"));

        let mut forged = second;
        forged.id = CardInstanceId(99);
        let never = registry.check_state(&with(vec![forged]));
        assert!(never.unwrap_err().contains("never created"));
    }
}
