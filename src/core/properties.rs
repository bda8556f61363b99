//! Property schema: which properties players and cards carry.
//!
//! Properties are declared once in the game definition and owned by an
//! entity kind. The schema fills defaults and rejects values of the wrong
//! type, both at compile time and after every dispatch.

use im::OrdMap;
use serde_json::Value;

use super::error::DefinitionError;
use super::state::RuntimeState;
use super::types::TypeDescriptor;
use crate::cards::{EntityKind, PropertyDefinition};

/// A resolved property declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertySpec {
    pub id: String,
    pub name: String,
    pub ty: TypeDescriptor,
    pub default: Value,
}

/// Properties partitioned by owning entity kind.
#[derive(Clone, Debug, Default)]
pub struct PropertySchema {
    player: Vec<PropertySpec>,
    card: Vec<PropertySpec>,
}

impl PropertySchema {
    /// Partition definitions by entity kind.
    ///
    /// Definitions whose default does not match their type are reported
    /// and skipped; the rest of the schema is still usable.
    pub fn partition(definitions: &[PropertyDefinition]) -> (Self, Vec<DefinitionError>) {
        let mut schema = Self::default();
        let mut errors = Vec::new();

        for def in definitions {
            let default = match &def.default_value {
                Some(value) if !def.ty.conforms(value) => {
                    errors.push(DefinitionError::PropertyType {
                        owner: format!("property '{}'", def.property_id),
                        property: def.name.clone(),
                        expected: def.ty.describe(),
                        value: value.clone(),
                    });
                    continue;
                }
                Some(value) => def.ty.fill_defaults(value.clone()),
                None => def.ty.default_value(),
            };

            let spec = PropertySpec {
                id: def.property_id.clone(),
                name: def.name.clone(),
                ty: def.ty.clone(),
                default,
            };
            match def.entity_id {
                EntityKind::Player => schema.player.push(spec),
                EntityKind::Card => schema.card.push(spec),
            }
        }

        (schema, errors)
    }

    #[must_use]
    pub fn specs(&self, kind: EntityKind) -> &[PropertySpec] {
        match kind {
            EntityKind::Player => &self.player,
            EntityKind::Card => &self.card,
        }
    }

    /// Look up a property by id, falling back to its name.
    #[must_use]
    pub fn resolve(&self, kind: EntityKind, key: &str) -> Option<&PropertySpec> {
        let specs = self.specs(kind);
        specs
            .iter()
            .find(|spec| spec.id == key)
            .or_else(|| specs.iter().find(|spec| spec.name == key))
    }

    /// Default property map for a new entity.
    #[must_use]
    pub fn defaults(&self, kind: EntityKind) -> OrdMap<String, Value> {
        self.specs(kind)
            .iter()
            .map(|spec| (spec.name.clone(), spec.default.clone()))
            .collect()
    }

    /// Fill absent properties and verify declared ones conform.
    ///
    /// Undeclared keys are left in place.
    pub fn normalize(
        &self,
        kind: EntityKind,
        owner: &str,
        properties: &mut OrdMap<String, Value>,
    ) -> Result<(), DefinitionError> {
        for spec in self.specs(kind) {
            let current = properties.remove(&spec.name).unwrap_or(Value::Null);
            let value = match current {
                Value::Null => spec.default.clone(),
                other => spec.ty.fill_defaults(other),
            };
            if !spec.ty.conforms(&value) {
                return Err(DefinitionError::PropertyType {
                    owner: owner.to_string(),
                    property: spec.name.clone(),
                    expected: spec.ty.describe(),
                    value,
                });
            }
            properties.insert(spec.name.clone(), value);
        }
        Ok(())
    }

    /// Normalize every player and card reachable from `state`.
    ///
    /// Leaves untouched maps pointer-equal, so an unchanged state still
    /// compares cheaply.
    pub fn normalize_state(&self, state: &mut RuntimeState) -> Result<(), DefinitionError> {
        for player in state.players.iter_mut() {
            let owner = player.id.to_string();
            self.normalize_if_needed(EntityKind::Player, &owner, &mut player.properties)?;
            for pile in [&mut player.draw, &mut player.hand, &mut player.discard] {
                for card in pile.iter_mut() {
                    let owner = card.label();
                    self.normalize_if_needed(EntityKind::Card, &owner, &mut card.properties)?;
                }
            }
        }
        for deck in state.decks.iter_mut() {
            for card in deck.cards.iter_mut() {
                let owner = card.label();
                self.normalize_if_needed(EntityKind::Card, &owner, &mut card.properties)?;
            }
        }
        Ok(())
    }

    fn normalize_if_needed(
        &self,
        kind: EntityKind,
        owner: &str,
        properties: &mut OrdMap<String, Value>,
    ) -> Result<(), DefinitionError> {
        let valid = self.specs(kind).iter().all(|spec| {
            properties
                .get(&spec.name)
                .is_some_and(|value| spec.ty.conforms(value))
        });
        if valid {
            return Ok(());
        }
        self.normalize(kind, owner, properties)
    }
}
