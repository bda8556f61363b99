//! # cardscript
//!
//! Compiles declaratively defined card games, with behavior authored as
//! small Lua scripts, into replayable in-memory state machines.
//!
//! ## Design Principles
//!
//! 1. **All-or-nothing dispatch**: every action runs against a draft; the
//!    draft is committed once at the outermost dispatch or discarded whole.
//!
//! 2. **Deterministic**: the same definition, schema and seed replay to the
//!    same state. Ids come from per-compile counters, randomness from a
//!    seeded ChaCha stream.
//!
//! 3. **Report everything**: a compile pass attempts every script and
//!    returns every authoring mistake at once.
//!
//! ## Architecture
//!
//! - **Persistent Data Structures**: O(1) snapshots via `im-rs`; a commit
//!   replaces the snapshot `Rc`, an unchanged dispatch keeps it.
//!
//! - **Sandboxed Scripts**: Lua 5.4 through `mlua`, either trusted (full
//!   library) or isolated (pure libraries, memory cap).
//!
//! ## Modules
//!
//! - `core`: ids, RNG, type descriptors, properties, state, actions, errors, config
//! - `zones`: `Pile`, the ordered card collection
//! - `cards`: definition documents, runtime cards and decks, card registry
//! - `machine`: `StateMachine`, drafting, subscriptions, `FailSafe`
//! - `script`: Lua backends, `api` table, script compiler, marshalling
//! - `compiler`: `compile_game` and the runtime schema
//!
//! ## Example
//!
//! ```
//! use cardscript::compiler::{compile_game, CompileOptions, RuntimeSchema};
//! use cardscript::cards::GameDefinition;
//! use serde_json::json;
//!
//! let definition: GameDefinition = serde_json::from_value(json!({
//!     "events": [{
//!         "eventId": "e1",
//!         "name": "tick",
//!         "code": "define(function(state) state.properties.turn = state.properties.turn + 1 end)"
//!     }]
//! })).unwrap();
//!
//! let schema = RuntimeSchema::new(2).with_global("turn", json!(0));
//! let game = compile_game(&schema, &definition, CompileOptions::new().with_seed(7)).unwrap();
//!
//! game.perform_action("tick", json!(null)).unwrap();
//! assert_eq!(game.state().global("turn"), Some(&json!(1)));
//! game.dispose().unwrap();
//! ```

pub mod core;
pub mod zones;
pub mod cards;
pub mod machine;
pub mod script;
pub mod compiler;

// Re-export commonly used types
pub use crate::core::{
    Action, ActionError, AggregateCompileError, CardInstanceId, CardTypeId, CompileError,
    CompileErrorKind, DefinitionError, GameCompileError, GameRng, PlayerEntityId, ResourceError,
    Role, RuntimePlayer, RuntimeState, SandboxConfig, TypeDescriptor,
};

pub use crate::zones::Pile;

pub use crate::cards::{CardDefinition, CardRegistry, GameDefinition, RuntimeCard, RuntimeDeck};

pub use crate::machine::{ActionFailure, Dispatch, FailSafe, StateMachine, Subscription};

pub use crate::script::{ScriptBackend, ScriptCompiler};

pub use crate::compiler::{compile_game, CompileOptions, CompiledGame, GameMachine, RuntimeSchema};
