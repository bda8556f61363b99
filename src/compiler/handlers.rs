//! Adapters from compiled Lua functions to machine handlers.
//!
//! Calling conventions seen by scripts:
//!
//! - event effect: `fn(state, payload)`; returning a function defers it
//!   until after reactions, any other value is the action's output
//! - card reaction: `fn(state, {input = payload, output = output})`
//! - middleware: `fn(state, action, next)`; `next()` continues with the
//!   same action, `next({name = ..., payload = ...})` with a rewritten one
//!
//! Every script function runs through the game's `Trampoline`.

use std::cell::RefCell;
use std::rc::Rc;

use mlua::prelude::*;
use mlua::WeakLua;
use serde_json::Value;

use crate::core::action::Action;
use crate::core::error::ActionError;
use crate::core::types::TypeDescriptor;
use crate::machine::{Effect, Middleware, Next, Outcome, Reaction};
use crate::script::marshal::{from_json, from_lua, to_json, to_lua};
use crate::script::Trampoline;

/// Draft type of the game machine.
pub type GameDraft = LuaTable;

fn upgrade(lua: &WeakLua) -> Result<Lua, ActionError> {
    lua.try_upgrade().ok_or(ActionError::Disposed)
}

/// Map a Lua error back to an action error.
///
/// Errors raised by nested dispatches keep their original variant.
pub(crate) fn action_error(label: &str, error: LuaError) -> ActionError {
    match nested_action_error(&error) {
        Some(inner) => inner.clone(),
        None => ActionError::script(label, error),
    }
}

fn nested_action_error(error: &LuaError) -> Option<&ActionError> {
    match error {
        LuaError::CallbackError { cause, .. } | LuaError::WithContext { cause, .. } => {
            nested_action_error(cause)
        }
        other => other.downcast_ref::<ActionError>(),
    }
}

/// An effect that validates its payload and then runs `function`.
pub(crate) fn event_effect(
    lua: WeakLua,
    trampoline: Trampoline,
    name: String,
    input: TypeDescriptor,
    function: Option<LuaFunction>,
) -> Effect<GameDraft> {
    let label = format!("event '{}'", name);
    Rc::new(move |draft: &GameDraft, payload: &Value| {
        if !input.conforms(payload) {
            return Err(ActionError::InvalidPayload {
                action: name.clone(),
                expected: input.describe(),
                payload: payload.clone(),
            });
        }
        let Some(function) = &function else {
            return Ok(Outcome::none());
        };

        let vm = upgrade(&lua)?;
        let payload = from_json(&vm, &input.fill_defaults(payload.clone()))?;
        let result: LuaValue = trampoline
            .call(&vm, function, (draft.clone(), payload))
            .map_err(|e| action_error(&label, e))?;

        match result {
            LuaValue::Function(then) => {
                let (lua, trampoline, label) = (lua.clone(), trampoline.clone(), label.clone());
                Ok(Outcome::Then(Box::new(move || {
                    let vm = upgrade(&lua)?;
                    trampoline
                        .call::<()>(&vm, &then, ())
                        .map_err(|e| action_error(&label, e))
                })))
            }
            other => Ok(Outcome::Output(to_json(&vm, other)?)),
        }
    })
}

/// A card instance's handler for one event.
pub(crate) fn reaction(
    lua: WeakLua,
    trampoline: Trampoline,
    label: String,
    function: LuaFunction,
) -> Reaction<GameDraft> {
    Rc::new(move |draft: &GameDraft, context: &Value| {
        let lua = upgrade(&lua)?;
        let context = from_json(&lua, context)?;
        trampoline
            .call::<()>(&lua, &function, (draft.clone(), context))
            .map_err(|e| action_error(&label, e))
    })
}

/// A scripted middleware.
///
/// If the script returns nothing after calling `next`, the action's output
/// is what `next` returned.
pub(crate) fn middleware(
    lua: WeakLua,
    trampoline: Trampoline,
    name: String,
    function: LuaFunction,
) -> Middleware<GameDraft> {
    let label = format!("middleware '{}'", name);
    Rc::new(move |draft: &GameDraft, action: Action, next: Next| {
        let lua = upgrade(&lua)?;
        let forwarded: Rc<RefCell<Option<Value>>> = Rc::new(RefCell::new(None));

        let original = action.clone();
        let slot = Rc::clone(&forwarded);
        let next_fn = trampoline
            .wrap(&lua, move |lua, args| {
                let action = match LuaValue::from_lua_multi(args, lua)? {
                    LuaValue::Nil => original.clone(),
                    value => from_lua::<Action>(lua, value)?,
                };
                let output = next(action).map_err(LuaError::external)?;
                *slot.borrow_mut() = Some(output.clone());
                to_lua(lua, &output)?.into_lua_multi(lua)
            })
            .map_err(|e| action_error(&label, e))?;

        let action_value = to_lua(&lua, &action).map_err(|e| ActionError::Marshal(e.to_string()))?;
        let result: LuaValue = trampoline
            .call(&lua, &function, (draft.clone(), action_value, next_fn))
            .map_err(|e| action_error(&label, e))?;

        let forwarded = forwarded.borrow_mut().take();
        match (result, forwarded) {
            (LuaValue::Nil, Some(output)) => Ok(output),
            (other, _) => to_json(&lua, other),
        }
    })
}
