//! Runtime schema: player count, global properties, and how the initial
//! state is laid out.

use std::rc::Rc;

use im::{OrdMap, Vector};
use serde_json::Value;

use crate::cards::RuntimeDeck;
use crate::core::error::DefinitionError;
use crate::core::rng::GameRng;
use crate::core::state::{PlayerFactory, RuntimePlayer, RuntimeState};

type SetupFn = Rc<dyn Fn(&mut SetupContext<'_>) -> Result<RuntimeState, String>>;

/// What the setup function is handed.
pub struct SetupContext<'a> {
    decks: Vector<RuntimeDeck>,
    players: &'a PlayerFactory,
    player_count: usize,
    globals: OrdMap<String, Value>,
    rng: &'a mut GameRng,
}

impl<'a> SetupContext<'a> {
    pub(crate) fn new(
        decks: Vector<RuntimeDeck>,
        players: &'a PlayerFactory,
        player_count: usize,
        globals: OrdMap<String, Value>,
        rng: &'a mut GameRng,
    ) -> Self {
        Self {
            decks,
            players,
            player_count,
            globals,
            rng,
        }
    }

    /// Decks with every defined card dealt into its deck.
    #[must_use]
    pub fn decks(&self) -> &Vector<RuntimeDeck> {
        &self.decks
    }

    /// Take the decks, leaving none behind.
    pub fn take_decks(&mut self) -> Vector<RuntimeDeck> {
        std::mem::take(&mut self.decks)
    }

    /// A new player with a fresh id, default properties and empty piles.
    #[must_use]
    pub fn create_player(&self) -> RuntimePlayer {
        self.players.create()
    }

    #[must_use]
    pub fn player_count(&self) -> usize {
        self.player_count
    }

    #[must_use]
    pub fn globals(&self) -> &OrdMap<String, Value> {
        &self.globals
    }

    /// Seeded RNG for shuffling and dealing.
    pub fn rng(&mut self) -> &mut GameRng {
        self.rng
    }
}

/// Shape of a game's runtime.
///
/// ```
/// use cardscript::compiler::RuntimeSchema;
/// use serde_json::json;
///
/// let schema = RuntimeSchema::new(2)
///     .with_global("round", json!(1))
///     .with_setup(|ctx| {
///         let mut decks = ctx.take_decks();
///         for deck in decks.iter_mut() {
///             let mut cards: Vec<_> = deck.cards.iter().cloned().collect();
///             ctx.rng().shuffle(&mut cards);
///             deck.cards.reset(cards);
///         }
///         let players = (0..ctx.player_count()).map(|_| ctx.create_player()).collect();
///         Ok(cardscript::core::RuntimeState::new(decks, players, ctx.globals().clone()))
///     });
///
/// assert_eq!(schema.player_count(), 2);
/// ```
#[derive(Clone)]
pub struct RuntimeSchema {
    player_count: usize,
    globals: OrdMap<String, Value>,
    setup: Option<SetupFn>,
}

impl RuntimeSchema {
    /// A schema for `player_count` players using the default layout: all
    /// decks as built, that many fresh players, and the declared globals.
    #[must_use]
    pub fn new(player_count: usize) -> Self {
        Self {
            player_count,
            globals: OrdMap::new(),
            setup: None,
        }
    }

    /// Declare a global property with its initial value.
    #[must_use]
    pub fn with_global(mut self, name: impl Into<String>, value: Value) -> Self {
        self.globals.insert(name.into(), value);
        self
    }

    /// Replace the default layout.
    #[must_use]
    pub fn with_setup(
        mut self,
        setup: impl Fn(&mut SetupContext<'_>) -> Result<RuntimeState, String> + 'static,
    ) -> Self {
        self.setup = Some(Rc::new(setup));
        self
    }

    #[must_use]
    pub fn player_count(&self) -> usize {
        self.player_count
    }

    #[must_use]
    pub fn globals(&self) -> &OrdMap<String, Value> {
        &self.globals
    }

    /// Build the initial state and check its player count.
    pub(crate) fn build(&self, context: &mut SetupContext<'_>) -> Result<RuntimeState, DefinitionError> {
        let state = match &self.setup {
            Some(setup) => setup(context).map_err(DefinitionError::Setup)?,
            None => default_setup(context),
        };
        if state.player_count() != self.player_count {
            return Err(DefinitionError::PlayerCount {
                expected: self.player_count,
                actual: state.player_count(),
            });
        }
        Ok(state)
    }
}

impl std::fmt::Debug for RuntimeSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeSchema")
            .field("player_count", &self.player_count)
            .field("globals", &self.globals)
            .field("custom_setup", &self.setup.is_some())
            .finish()
    }
}

fn default_setup(context: &mut SetupContext<'_>) -> RuntimeState {
    let players = (0..context.player_count())
        .map(|_| context.create_player())
        .collect();
    RuntimeState::new(context.take_decks(), players, context.globals().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PropertySchema;
    use serde_json::json;

    fn run(schema: &RuntimeSchema) -> Result<RuntimeState, DefinitionError> {
        let factory = PlayerFactory::new(&PropertySchema::default());
        let mut rng = GameRng::new(1);
        let decks = Vector::from(vec![RuntimeDeck::new("d1", "Main")]);
        let mut context = SetupContext::new(
            decks,
            &factory,
            schema.player_count(),
            schema.globals().clone(),
            &mut rng,
        );
        schema.build(&mut context)
    }

    #[test]
    fn test_default_setup() {
        let state = run(&RuntimeSchema::new(3).with_global("round", json!(1))).unwrap();
        assert_eq!(state.player_count(), 3);
        assert_eq!(state.decks.len(), 1);
        assert_eq!(state.global("round"), Some(&json!(1)));

        let ids: Vec<u64> = state.players.iter().map(|p| p.id.raw()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_custom_setup_player_count_checked() {
        let schema = RuntimeSchema::new(2).with_setup(|ctx| {
            let players = im::vector![ctx.create_player()];
            Ok(RuntimeState::new(ctx.take_decks(), players, OrdMap::new()))
        });
        assert!(matches!(
            run(&schema),
            Err(DefinitionError::PlayerCount { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_custom_setup_error() {
        let schema = RuntimeSchema::new(2).with_setup(|_| Err("no table".to_string()));
        assert!(matches!(run(&schema), Err(DefinitionError::Setup(msg)) if msg == "no table"));
    }
}
