//! Compiling a game definition into a running machine.
//!
//! ## Pipeline
//!
//! 1. Partition properties by owner and check their defaults.
//! 2. Register card types and create one instance of each, dealt into its
//!    deck when the deck exists.
//! 3. Build the `api` table (seeded RNG, `clone_card`, `dispatch`).
//! 4. Compile each card instance's effect table, then event effects and
//!    middlewares.
//! 5. Lay out the initial state with the schema's setup.
//! 6. Wire reactions, middlewares and the machine; point `api.dispatch`
//!    at it.
//!
//! Every error from steps 1-5 is collected; if there are any, no machine
//! is built and all of them are returned together.
//!
//! Card scripts are compiled per instance: `derive` factories see the
//! instance id as `info.card_id`, and `api.clone_card` compiles the script
//! again for the new instance.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use im::Vector;
use mlua::prelude::*;
use mlua::WeakLua;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::handlers::{self, GameDraft};
use super::schema::{RuntimeSchema, SetupContext};
use crate::cards::{CardRegistry, GameDefinition, RuntimeCard, RuntimeDeck};
use crate::core::config::SandboxConfig;
use crate::core::error::{
    ActionError, AggregateCompileError, CompileError, CompileErrorKind, DefinitionError,
    GameCompileError, ResourceError, Role,
};
use crate::core::ids::{CardInstanceId, CardTypeId};
use crate::core::properties::PropertySchema;
use crate::core::rng::GameRng;
use crate::core::state::{PlayerFactory, RuntimeState};
use crate::machine::{
    ActionTable, Dispatch, FailSafe, Middleware, Reaction, ReactionSelector, Reactions, StateMachine,
    Subscription,
};
use crate::script::backend::refill_budget;
use crate::script::{
    self, Compiled, LuaDrafter, ScriptApi, ScriptBackend, ScriptCompiler, ScriptOptions, Trampoline,
};

/// The machine a compiled game runs on.
pub type GameMachine = StateMachine<LuaDrafter>;

/// Options for `compile_game`.
#[derive(Clone, Default)]
pub struct CompileOptions {
    seed: u64,
    sandbox: SandboxConfig,
    middlewares: Vec<Middleware<GameDraft>>,
}

impl CompileOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// RNG seed; the same seed replays the same game.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_sandbox(mut self, sandbox: SandboxConfig) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Add a native middleware. Native middlewares wrap the scripted ones,
    /// first added outermost.
    #[must_use]
    pub fn with_middleware(mut self, middleware: Middleware<GameDraft>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn sandbox(&self) -> &SandboxConfig {
        &self.sandbox
    }
}

impl std::fmt::Debug for CompileOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileOptions")
            .field("seed", &self.seed)
            .field("sandbox", &self.sandbox)
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}

/// A compiled, running game.
///
/// Owns the script interpreter; call `dispose` when replacing it with a
/// fresh compile.
pub struct CompiledGame {
    pub runtime: Rc<GameMachine>,
    backend: Rc<dyn ScriptBackend>,
    compiler: Rc<ScriptCompiler>,
    cards: Rc<CardRegistry>,
    seed: u64,
}

impl CompiledGame {
    /// Dispatch an action on the runtime.
    pub fn perform_action(&self, name: &str, payload: Value) -> Result<Value, ActionError> {
        self.runtime.perform_action(name, payload)
    }

    #[must_use]
    pub fn state(&self) -> Rc<RuntimeState> {
        self.runtime.state()
    }

    pub fn subscribe(&self, listener: impl Fn(&RuntimeState) + 'static) -> Subscription {
        self.runtime.subscribe(listener)
    }

    /// A dispatch surface that reports failures instead of returning them.
    #[must_use]
    pub fn fail_safe(&self) -> FailSafe<LuaDrafter> {
        FailSafe::new(Rc::clone(&self.runtime))
    }

    /// Card types known to this game.
    #[must_use]
    pub fn cards(&self) -> &CardRegistry {
        &self.cards
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The compiler card clones are compiled with.
    #[must_use]
    pub fn compiler(&self) -> &ScriptCompiler {
        &self.compiler
    }

    /// Stop the runtime and release the interpreter.
    ///
    /// Committed state stays readable. A second call fails with
    /// `ResourceError::AlreadyDisposed`.
    pub fn dispose(&self) -> Result<(), ResourceError> {
        if self.backend.is_disposed() {
            return Err(ResourceError::AlreadyDisposed);
        }
        self.runtime.retire();
        self.backend.dispose()?;
        info!("game disposed");
        Ok(())
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.backend.is_disposed()
    }
}

/// Compile `definition` into a running game laid out by `schema`.
pub fn compile_game(
    schema: &RuntimeSchema,
    definition: &GameDefinition,
    options: CompileOptions,
) -> Result<CompiledGame, AggregateCompileError> {
    let fatal = |error: ResourceError| AggregateCompileError {
        errors: vec![error.into()],
    };
    let backend = script::create_backend(&options.sandbox).map_err(fatal)?;
    let lua = backend.lua().map_err(fatal)?;
    let mut errors: Vec<GameCompileError> = Vec::new();

    let (properties, property_errors) = PropertySchema::partition(&definition.properties);
    errors.extend(property_errors.into_iter().map(GameCompileError::from));
    let properties = Rc::new(properties);

    let (registry, decks, instances) = register_cards(definition, &properties, &mut errors);
    let registry = Rc::new(registry);

    let trampoline =
        Trampoline::new(&lua).map_err(|e| fatal(ResourceError::Allocation(e.to_string())))?;
    let rng = GameRng::new(options.seed);
    let api = ScriptApi::new(rng.for_context("scripts"), Rc::clone(&registry));
    let mut compiler = ScriptCompiler::new(Rc::clone(&backend)).map_err(fatal)?;
    compiler.set_api(
        api.install(&lua, &trampoline)
            .map_err(|e| fatal(ResourceError::Allocation(e.to_string())))?,
    );
    let compiler = Rc::new(compiler);

    let event_names: Vec<String> = definition.event_names().map(str::to_string).collect();
    let effects = Rc::new(CardEffects::new(&lua, trampoline.clone(), event_names, definition));
    {
        let compiler = Rc::downgrade(&compiler);
        let effects = Rc::clone(&effects);
        api.on_clone(Rc::new(move |card: &RuntimeCard| {
            let compiler = compiler
                .upgrade()
                .ok_or_else(|| "the game has been disposed".to_string())?;
            effects.compile(&compiler, card).map_err(|e| e.to_string())
        }));
    }
    for card in &instances {
        refill_budget(&lua);
        if let Err(e) = effects.compile(&compiler, card) {
            errors.push(e.into());
        }
    }

    let mut actions: ActionTable<GameDraft> = ActionTable::default();
    let mut seen_events = FxHashSet::default();
    for event in &definition.events {
        if !seen_events.insert(event.name.as_str()) {
            errors.push(DefinitionError::DuplicateEvent(event.name.clone()).into());
            continue;
        }
        refill_budget(&lua);
        match compiler.compile(Role::Event, &event.name, &event.code, ScriptOptions::effect()) {
            Ok(compiled) => {
                let function = match compiled {
                    Compiled::Callable(function) => Some(function),
                    _ => None,
                };
                let effect = handlers::event_effect(
                    lua.weak(),
                    trampoline.clone(),
                    event.name.clone(),
                    event.input_type.clone(),
                    function,
                );
                actions.insert(event.name.clone(), effect);
            }
            Err(e) => errors.push(e.into()),
        }
    }

    let mut scripted = Vec::new();
    for middleware in &definition.middlewares {
        refill_budget(&lua);
        match compiler.compile(
            Role::Middleware,
            &middleware.name,
            &middleware.code,
            ScriptOptions::middleware(),
        ) {
            Ok(Compiled::Callable(function)) => {
                scripted.push(handlers::middleware(
                    lua.weak(),
                    trampoline.clone(),
                    middleware.name.clone(),
                    function,
                ));
            }
            Ok(_) => {}
            Err(e) => errors.push(e.into()),
        }
    }

    let players = PlayerFactory::new(&properties);
    let mut setup_rng = rng.for_context("setup");
    let mut context = SetupContext::new(
        decks,
        &players,
        schema.player_count(),
        schema.globals().clone(),
        &mut setup_rng,
    );
    let initial = schema.build(&mut context).and_then(|mut state| {
        properties.normalize_state(&mut state)?;
        Ok(state)
    });
    let initial = match initial {
        Ok(state) if errors.is_empty() => state,
        Ok(_) => return Err(report(errors)),
        Err(e) => {
            errors.push(e.into());
            return Err(report(errors));
        }
    };

    let mut middlewares = options.middlewares;
    middlewares.extend(scripted);
    let drafter = LuaDrafter::new(&lua, Rc::clone(&properties), Rc::clone(&registry));
    let machine = Rc::new(
        StateMachine::new(drafter, initial, actions)
            .with_reactions(reaction_selector(effects))
            .with_middlewares(middlewares)
            .with_max_depth(options.sandbox.max_dispatch_depth),
    );
    let weak = Rc::downgrade(&machine);
    let target: Weak<dyn Dispatch> = weak;
    api.bind(target);

    info!(
        cards = registry.len(),
        events = definition.events.len(),
        middlewares = definition.middlewares.len(),
        backend = ?backend.kind(),
        seed = options.seed,
        "game compiled"
    );
    Ok(CompiledGame {
        runtime: machine,
        backend,
        compiler,
        cards: registry,
        seed: options.seed,
    })
}

fn report(errors: Vec<GameCompileError>) -> AggregateCompileError {
    for error in &errors {
        warn!(%error, "compile error");
    }
    warn!(count = errors.len(), "game failed to compile");
    AggregateCompileError { errors }
}

/// Register every card type and create one instance of each.
///
/// Instances are dealt into their deck. A card naming an unknown deck is
/// reported but still instantiated, so its script gets compiled and
/// checked too.
fn register_cards(
    definition: &GameDefinition,
    properties: &PropertySchema,
    errors: &mut Vec<GameCompileError>,
) -> (CardRegistry, Vector<RuntimeDeck>, Vec<RuntimeCard>) {
    let mut registry = CardRegistry::new();
    let mut decks: Vector<RuntimeDeck> = definition
        .decks
        .iter()
        .map(|deck| RuntimeDeck::new(deck.deck_id.as_str(), deck.name.as_str()))
        .collect();
    let mut instances = Vec::new();

    for card in &definition.cards {
        let known_deck = definition.deck(&card.deck_id).is_some();
        if !known_deck {
            errors.push(
                DefinitionError::UnknownDeck {
                    card: card.name.clone(),
                    deck: card.deck_id.clone(),
                }
                .into(),
            );
        }
        if let Err(e) = registry.register(card, properties) {
            errors.push(e.into());
            continue;
        }
        let Some(instance) = registry.instantiate(&CardTypeId::new(card.card_id.as_str())) else {
            continue;
        };
        if let Some(deck) = decks.iter_mut().find(|deck| deck.id == card.deck_id) {
            deck.cards.add(instance.clone());
        }
        instances.push(instance);
    }

    (registry, decks, instances)
}

struct CardScript {
    name: String,
    code: String,
}

/// Card scripts compiled per instance.
struct CardEffects {
    lua: WeakLua,
    trampoline: Trampoline,
    events: Vec<String>,
    scripts: FxHashMap<CardTypeId, CardScript>,
    tables: RefCell<FxHashMap<CardInstanceId, FxHashMap<String, Reaction<GameDraft>>>>,
    /// Events at least one instance handles.
    reacting: RefCell<FxHashSet<String>>,
    compiling: Cell<bool>,
}

impl CardEffects {
    fn new(lua: &Lua, trampoline: Trampoline, events: Vec<String>, definition: &GameDefinition) -> Self {
        let mut scripts = FxHashMap::default();
        for card in &definition.cards {
            scripts
                .entry(CardTypeId::new(card.card_id.as_str()))
                .or_insert_with(|| CardScript {
                    name: card.name.clone(),
                    code: card.code.clone(),
                });
        }
        Self {
            lua: lua.weak(),
            trampoline,
            events,
            scripts,
            tables: RefCell::default(),
            reacting: RefCell::default(),
            compiling: Cell::new(false),
        }
    }

    /// Compile `card`'s script for that instance and keep its handlers.
    ///
    /// A card script cannot clone cards while it is being compiled.
    fn compile(&self, compiler: &ScriptCompiler, card: &RuntimeCard) -> Result<(), CompileError> {
        let Some(script) = self.scripts.get(&card.type_id) else {
            return Ok(());
        };
        if self.compiling.get() {
            return Err(CompileError::new(
                Role::Card,
                &script.name,
                CompileErrorKind::Evaluate(format!(
                    "cannot clone {} while a card script is being compiled",
                    card.label()
                )),
            ));
        }

        self.compiling.set(true);
        let options = ScriptOptions::effect_table(&self.events).with_card(card.id, card.type_id.as_str());
        let compiled = compiler.compile(Role::Card, &script.name, &script.code, options);
        self.compiling.set(false);

        let label = format!("card '{}'", script.name);
        let table: FxHashMap<String, Reaction<GameDraft>> = compiled?
            .into_effect_table()
            .unwrap_or_default()
            .into_iter()
            .map(|(event, function)| {
                let reaction =
                    handlers::reaction(self.lua.clone(), self.trampoline.clone(), label.clone(), function);
                (event, reaction)
            })
            .collect();
        debug!(card = %card.label(), handlers = table.len(), "card script compiled");
        if !table.is_empty() {
            self.reacting.borrow_mut().extend(table.keys().cloned());
            self.tables.borrow_mut().insert(card.id, table);
        }
        Ok(())
    }
}

/// Select one handler per card type, in the order the types are first
/// met: decks in order, then every player's draw, hand and discard piles.
/// A type's handler comes from its first instance that handles the event.
fn reaction_selector(effects: Rc<CardEffects>) -> ReactionSelector<GameDraft> {
    Rc::new(move |draft: &GameDraft, name: &str| {
        let mut selected = Reactions::new();
        if !effects.reacting.borrow().contains(name) {
            return Ok(selected);
        }

        let tables = effects.tables.borrow();
        let mut seen: FxHashSet<String> = FxHashSet::default();
        for_each_card(draft, |id, type_id| {
            if seen.contains(&type_id) {
                return;
            }
            if let Some(reaction) = tables.get(&id).and_then(|table| table.get(name)) {
                selected.push(Rc::clone(reaction));
                seen.insert(type_id);
            }
        })
        .map_err(|e| ActionError::Marshal(e.to_string()))?;
        Ok(selected)
    })
}

fn for_each_card(draft: &LuaTable, mut visit: impl FnMut(CardInstanceId, String)) -> LuaResult<()> {
    let mut visit_pile = |pile: Option<LuaTable>| -> LuaResult<()> {
        let Some(pile) = pile else {
            return Ok(());
        };
        for i in 1..=pile.raw_len() {
            if let LuaValue::Table(card) = pile.raw_get::<LuaValue>(i)? {
                let id = card.raw_get::<Option<u64>>("id")?;
                let type_id = card.raw_get::<Option<String>>("type_id")?;
                if let (Some(id), Some(type_id)) = (id, type_id) {
                    visit(CardInstanceId(id), type_id);
                }
            }
        }
        Ok(())
    };

    if let Some(decks) = draft.raw_get::<Option<LuaTable>>("decks")? {
        for i in 1..=decks.raw_len() {
            if let LuaValue::Table(deck) = decks.raw_get::<LuaValue>(i)? {
                visit_pile(deck.raw_get("cards")?)?;
            }
        }
    }
    if let Some(players) = draft.raw_get::<Option<LuaTable>>("players")? {
        for i in 1..=players.raw_len() {
            if let LuaValue::Table(player) = players.raw_get::<LuaValue>(i)? {
                for zone in ["draw", "hand", "discard"] {
                    visit_pile(player.raw_get(zone)?)?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition(value: Value) -> GameDefinition {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_empty_definition_compiles() {
        let game = compile_game(&RuntimeSchema::new(2), &GameDefinition::default(), CompileOptions::new()).unwrap();
        assert_eq!(game.state().player_count(), 2);
        assert!(game.runtime.action_names().is_empty());
    }

    #[test]
    fn test_cards_dealt_into_decks() {
        let def = definition(json!({
            "decks": [{"deckId": "d1", "name": "Main"}, {"deckId": "d2", "name": "Side"}],
            "cards": [
                {"cardId": "a", "deckId": "d1", "name": "A"},
                {"cardId": "b", "deckId": "d2", "name": "B"},
                {"cardId": "c", "deckId": "d1", "name": "C"}
            ]
        }));
        let game = compile_game(&RuntimeSchema::new(1), &def, CompileOptions::new()).unwrap();
        let state = game.state();

        let main: Vec<&str> = state.decks[0].cards.iter().map(|c| c.type_id.as_str()).collect();
        assert_eq!(main, vec!["a", "c"]);
        assert_eq!(state.decks[1].cards.len(), 1);
        assert_eq!(game.cards().len(), 3);
    }

    #[test]
    fn test_definition_errors_are_collected() {
        let def = definition(json!({
            "decks": [{"deckId": "d1", "name": "Main"}],
            "cards": [
                {"cardId": "a", "deckId": "nowhere", "name": "A"},
                {"cardId": "b", "deckId": "d1", "name": "B", "propertyDefaults": {"ghost": 1}}
            ],
            "events": [
                {"eventId": "e1", "name": "draw", "code": ""},
                {"eventId": "e2", "name": "draw", "code": ""}
            ]
        }));
        let err = compile_game(&RuntimeSchema::new(1), &def, CompileOptions::new()).err().unwrap();

        assert_eq!(err.errors.len(), 3);
        assert!(err.errors.iter().any(|e| matches!(
            e,
            GameCompileError::Definition(DefinitionError::UnknownDeck { deck, .. }) if deck == "nowhere"
        )));
        assert!(err.errors.iter().any(|e| matches!(
            e,
            GameCompileError::Definition(DefinitionError::UnknownProperty { .. })
        )));
        assert!(err.errors.iter().any(|e| matches!(
            e,
            GameCompileError::Definition(DefinitionError::DuplicateEvent(name)) if name == "draw"
        )));
    }

    #[test]
    fn test_card_in_unknown_deck_is_still_compiled() {
        let def = definition(json!({
            "decks": [{"deckId": "d1", "name": "Main"}],
            "cards": [{"cardId": "a", "deckId": "nowhere", "name": "A", "code": "define({ play = "}]
        }));
        let err = compile_game(&RuntimeSchema::new(1), &def, CompileOptions::new()).err().unwrap();

        assert_eq!(err.errors.len(), 2, "{:?}", err.errors);
        assert!(err.errors.iter().any(|e| matches!(
            e,
            GameCompileError::Definition(DefinitionError::UnknownDeck { deck, .. }) if deck == "nowhere"
        )));
        assert!(err.errors.iter().any(|e| matches!(
            e,
            GameCompileError::Script(CompileError { role: Role::Card, kind: CompileErrorKind::Evaluate(_), .. })
        )));
    }

    #[test]
    fn test_blank_event_is_noop_action() {
        let def = definition(json!({
            "events": [{"eventId": "e1", "name": "pass"}]
        }));
        let game = compile_game(&RuntimeSchema::new(1), &def, CompileOptions::new()).unwrap();
        let before = game.state();

        assert_eq!(game.perform_action("pass", Value::Null).unwrap(), Value::Null);
        assert!(Rc::ptr_eq(&before, &game.state()));
    }

    #[test]
    fn test_setup_player_count_mismatch() {
        let schema = RuntimeSchema::new(2).with_setup(|ctx| {
            Ok(RuntimeState::new(ctx.take_decks(), Vector::new(), ctx.globals().clone()))
        });
        let err = compile_game(&schema, &GameDefinition::default(), CompileOptions::new())
            .err()
            .unwrap();
        assert!(matches!(
            err.errors.as_slice(),
            [GameCompileError::Definition(DefinitionError::PlayerCount { expected: 2, actual: 0 })]
        ));
    }

    #[test]
    fn test_dispose() {
        let game = compile_game(&RuntimeSchema::new(1), &GameDefinition::default(), CompileOptions::new()).unwrap();
        game.dispose().unwrap();
        assert!(game.is_disposed());
        assert!(game.runtime.is_retired());
        assert!(matches!(game.dispose(), Err(ResourceError::AlreadyDisposed)));
    }
}
