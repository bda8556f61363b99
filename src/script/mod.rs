//! Script layer: Lua backends, the host `api`, compiling snippets, and
//! marshalling values across the boundary.
//!
//! ## Key Types
//!
//! - `ScriptBackend`: an interpreter (`TrustedBackend` or `IsolatedBackend`)
//! - `ScriptCompiler`: evaluates a snippet and checks what it registers
//! - `ScriptApi`: builds the `api` table (RNG, cards, dispatch, pile helpers)
//! - `LuaDrafter`: drafts game state into a Lua table
//! - `Trampoline`: runs handlers as coroutines so nested dispatch stays flat

pub mod api;
pub mod backend;
pub mod compiler;
pub mod marshal;
pub mod trampoline;

pub use api::{CloneHook, DispatchCell, ScriptApi};
pub use backend::{create as create_backend, IsolatedBackend, ScriptBackend, TrustedBackend};
pub use compiler::{Compiled, ScriptCompiler, ScriptOptions, Signature};
pub use marshal::LuaDrafter;
pub use trampoline::Trampoline;
