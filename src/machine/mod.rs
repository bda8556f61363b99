//! Dispatch core.
//!
//! ## Key Types
//!
//! - `StateMachine<D>`: committed state, action table, reactions, middlewares
//! - `Drafter`: how a draft is opened from and folded back into state
//! - `FailSafe<D>`: dispatch wrapper that reports failures instead of returning them
//! - `Subscription`: handle for removing a listener

pub mod draft;
pub mod fail_safe;
mod listeners;
pub mod state_machine;

pub use draft::{CloneDrafter, Drafter};
pub use fail_safe::{ActionFailure, FailSafe};
pub use listeners::Subscription;
pub use state_machine::{
    ActionTable, Continuation, Dispatch, Effect, Middleware, Next, Outcome, Reaction,
    ReactionSelector, Reactions, StateMachine,
};
