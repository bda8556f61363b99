//! Core engine types: ids, RNG, type descriptors, properties, state, actions,
//! errors and sandbox configuration.
//!
//! Everything here is plain data. Behavior lives in `machine` (dispatch),
//! `script` (compiling snippets) and `compiler` (wiring a definition into a
//! running machine).

pub mod ids;
pub mod rng;
pub mod types;
pub mod properties;
pub mod state;
pub mod action;
pub mod error;
pub mod config;

pub use ids::{CardInstanceId, CardTypeId, IdAllocator, PlayerEntityId};
pub use rng::GameRng;
pub use types::{PrimitiveType, TypeDescriptor};
pub use properties::{PropertySchema, PropertySpec};
pub use state::{PlayerFactory, RuntimePlayer, RuntimeState};
pub use action::Action;
pub use error::{
    ActionError, AggregateCompileError, CompileError, CompileErrorKind, DefinitionError,
    GameCompileError, ResourceError, Role,
};
pub use config::{
    BackendKind, SandboxConfig, DEFAULT_INSTRUCTION_LIMIT, DEFAULT_MAX_DEPTH, DEFAULT_MEMORY_LIMIT,
};
