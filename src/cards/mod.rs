//! Card system: definition documents, runtime instances, and registry.
//!
//! ## Key Types
//!
//! - `GameDefinition`: the persisted, author-controlled game document
//! - `CardDefinition`: one card type with its behavior script
//! - `RuntimeCard` / `RuntimeDeck`: live instances inside `RuntimeState`
//! - `CardRegistry`: resolved templates, instance creation for `clone_card`

pub mod definition;
pub mod instance;
pub mod registry;

pub use definition::{
    CardDefinition, DeckDefinition, EntityKind, EventDefinition, GameDefinition,
    MiddlewareDefinition, PropertyDefinition,
};
pub use instance::{RuntimeCard, RuntimeDeck};
pub use registry::{CardRegistry, CardTemplate};
