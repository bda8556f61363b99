//! Game compiler: definition + schema in, running machine out.
//!
//! ## Key Types
//!
//! - `compile_game`: the whole pipeline, errors aggregated
//! - `RuntimeSchema`: player count, globals and initial layout
//! - `CompileOptions`: seed, sandbox, native middlewares
//! - `CompiledGame`: the running machine plus its interpreter

pub mod game;
pub mod handlers;
pub mod middleware;
pub mod schema;

pub use game::{compile_game, CompileOptions, CompiledGame, GameMachine};
pub use handlers::GameDraft;
pub use schema::{RuntimeSchema, SetupContext};
