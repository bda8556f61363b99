//! Moving values across the script boundary.
//!
//! Everything crosses by serde: payloads and outputs as `serde_json::Value`,
//! state as `RuntimeState`. `null` becomes `nil` on the way in, and Lua
//! arrays keep mlua's array metatable so empty piles stay sequences on the
//! way back.

use std::rc::Rc;

use mlua::prelude::*;
use mlua::{SerializeOptions, WeakLua};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::cards::CardRegistry;
use crate::core::error::ActionError;
use crate::core::properties::PropertySchema;
use crate::core::state::RuntimeState;
use crate::machine::Drafter;

fn options() -> SerializeOptions {
    SerializeOptions::new()
        .serialize_none_to_null(false)
        .serialize_unit_to_null(false)
}

/// Serialize a Rust value into a Lua value.
pub fn to_lua<T: Serialize + ?Sized>(lua: &Lua, value: &T) -> LuaResult<LuaValue> {
    lua.to_value_with(value, options())
}

/// Deserialize a Lua value.
pub fn from_lua<T: DeserializeOwned>(lua: &Lua, value: LuaValue) -> LuaResult<T> {
    lua.from_value(value)
}

/// Convert a script value to JSON, for outputs and payloads.
///
/// Functions and userdata have no JSON form and are rejected.
pub fn to_json(lua: &Lua, value: LuaValue) -> Result<Value, ActionError> {
    from_lua(lua, value).map_err(|e| ActionError::Marshal(e.to_string()))
}

/// Convert JSON to a script value.
pub fn from_json(lua: &Lua, value: &Value) -> Result<LuaValue, ActionError> {
    to_lua(lua, value).map_err(|e| ActionError::Marshal(e.to_string()))
}

/// Drafts game state into a Lua table.
///
/// Scripts mutate the table directly; `finish` reads it back, fills
/// property defaults and rejects values of the wrong type. It also rejects
/// cards the game never created and a card placed in two piles at once.
pub struct LuaDrafter {
    lua: WeakLua,
    schema: Rc<PropertySchema>,
    cards: Rc<CardRegistry>,
}

impl LuaDrafter {
    #[must_use]
    pub fn new(lua: &Lua, schema: Rc<PropertySchema>, cards: Rc<CardRegistry>) -> Self {
        Self {
            lua: lua.weak(),
            schema,
            cards,
        }
    }

    fn lua(&self) -> Result<Lua, ActionError> {
        self.lua.try_upgrade().ok_or(ActionError::Disposed)
    }
}

impl Drafter for LuaDrafter {
    type State = RuntimeState;
    type Draft = LuaTable;

    fn begin(&self, state: &RuntimeState) -> Result<LuaTable, ActionError> {
        let lua = self.lua()?;
        match to_lua(&lua, state).map_err(|e| ActionError::Marshal(e.to_string()))? {
            LuaValue::Table(table) => Ok(table),
            other => Err(ActionError::Marshal(format!(
                "state serialized to {}",
                other.type_name()
            ))),
        }
    }

    fn finish(&self, draft: &LuaTable) -> Result<RuntimeState, ActionError> {
        let lua = self.lua()?;
        let mut state: RuntimeState = from_lua(&lua, LuaValue::Table(draft.clone()))
            .map_err(|e| ActionError::InvalidState(e.to_string()))?;
        self.cards.check_state(&state).map_err(ActionError::InvalidState)?;
        self.schema
            .normalize_state(&mut state)
            .map_err(|e| ActionError::InvalidState(e.to_string()))?;
        Ok(state)
    }
}
