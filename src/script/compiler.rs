//! Turns script source into checked Lua values.
//!
//! A script registers exactly one value, either directly:
//!
//! ```lua
//! define({
//!   attack = function(state, ctx) ... end,
//! })
//! ```
//!
//! or through a factory that receives the host api and its own identity:
//!
//! ```lua
//! derive(function(api, info)
//!   return function(state, payload) api.log(info.name, "ran") end
//! end)
//! ```
//!
//! `info` carries `role` and `name`; card scripts also get `card_id`, the
//! instance being compiled, and `type_id`. Each script sees its own copy
//! of the `api` table.
//!
//! The registered value is then checked against the expected signature.

use std::cell::RefCell;
use std::rc::Rc;

use mlua::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{info, trace};

use super::api::render;
use super::backend::{shallow_copy, ScriptBackend};
use crate::core::error::{CompileError, CompileErrorKind, ResourceError, Role};
use crate::core::ids::CardInstanceId;

/// Expected shape of the registered value.
#[derive(Clone, Copy, Debug)]
pub enum Signature<'a> {
    /// Table from event name to handler function.
    EffectTable { events: &'a [String] },
    /// Single handler function.
    Effect,
    /// Middleware function.
    Middleware,
}

/// A checked script value.
#[derive(Debug)]
pub enum Compiled {
    EffectTable(FxHashMap<String, LuaFunction>),
    Callable(LuaFunction),
    Noop,
}

impl Compiled {
    /// The handler table, if this is one.
    #[must_use]
    pub fn into_effect_table(self) -> Option<FxHashMap<String, LuaFunction>> {
        match self {
            Compiled::EffectTable(table) => Some(table),
            _ => None,
        }
    }
}

/// Per-script compile options.
#[derive(Debug)]
pub struct ScriptOptions<'a> {
    pub signature: Signature<'a>,
    /// Returned as-is for blank source.
    pub if_empty: Compiled,
    /// The card instance and its type, exposed to `derive` factories as
    /// `info.card_id` and `info.type_id`.
    pub card: Option<(CardInstanceId, &'a str)>,
}

impl<'a> ScriptOptions<'a> {
    /// Card effect table; blank source compiles to an empty table.
    #[must_use]
    pub fn effect_table(events: &'a [String]) -> Self {
        Self {
            signature: Signature::EffectTable { events },
            if_empty: Compiled::EffectTable(FxHashMap::default()),
            card: None,
        }
    }

    /// Event effect; blank source compiles to `Noop`.
    #[must_use]
    pub fn effect() -> Self {
        Self {
            signature: Signature::Effect,
            if_empty: Compiled::Noop,
            card: None,
        }
    }

    /// Middleware; blank source compiles to `Noop`.
    #[must_use]
    pub fn middleware() -> Self {
        Self {
            signature: Signature::Middleware,
            if_empty: Compiled::Noop,
            card: None,
        }
    }

    #[must_use]
    pub fn with_card(mut self, id: CardInstanceId, type_id: &'a str) -> Self {
        self.card = Some((id, type_id));
        self
    }

    #[must_use]
    pub fn if_empty(mut self, value: Compiled) -> Self {
        self.if_empty = value;
        self
    }
}

/// Compiles scripts against one backend and one `api` table.
pub struct ScriptCompiler {
    backend: Rc<dyn ScriptBackend>,
    api: LuaTable,
}

impl ScriptCompiler {
    /// Create a compiler whose scripts see an empty `api` table.
    pub fn new(backend: Rc<dyn ScriptBackend>) -> Result<Self, ResourceError> {
        let lua = backend.lua()?;
        let api = lua
            .create_table()
            .map_err(|e| ResourceError::Allocation(e.to_string()))?;
        Ok(Self { backend, api })
    }

    /// Replace the `api` table scripts compiled from now on will see.
    pub fn set_api(&mut self, api: LuaTable) {
        self.api = api;
    }

    #[must_use]
    pub fn backend(&self) -> &Rc<dyn ScriptBackend> {
        &self.backend
    }

    /// Evaluate `source` and check the value it registers.
    pub fn compile(
        &self,
        role: Role,
        name: &str,
        source: &str,
        options: ScriptOptions<'_>,
    ) -> Result<Compiled, CompileError> {
        if source.trim().is_empty() {
            return Ok(options.if_empty);
        }
        let fail = |kind: CompileErrorKind| CompileError::new(role, name, kind);
        let evaluate = |e: LuaError| fail(CompileErrorKind::Evaluate(e.to_string()));

        let lua = self.backend.lua().map_err(|e| fail(e.into()))?;
        let slot: Rc<RefCell<Option<LuaValue>>> = Rc::new(RefCell::new(None));
        let env = self
            .environment(&lua, role, name, options.card, &slot)
            .map_err(evaluate)?;

        lua.load(source)
            .set_name(format!("={} {}", role, name))
            .set_environment(env)
            .exec()
            .map_err(evaluate)?;

        let value = slot.borrow_mut().take().ok_or_else(|| fail(CompileErrorKind::NotDefined))?;
        let compiled = check_shape(value, options.signature).map_err(|msg| fail(CompileErrorKind::Shape(msg)))?;
        trace!(%role, name, "script compiled");
        Ok(compiled)
    }

    fn environment(
        &self,
        lua: &Lua,
        role: Role,
        name: &str,
        card: Option<(CardInstanceId, &str)>,
        slot: &Rc<RefCell<Option<LuaValue>>>,
    ) -> LuaResult<LuaTable> {
        let env = self.backend.environment(lua)?;

        let define_slot = Rc::clone(slot);
        env.raw_set(
            "define",
            lua.create_function(move |_, value: LuaValue| {
                *define_slot.borrow_mut() = Some(value);
                Ok(())
            })?,
        )?;

        let info = lua.create_table()?;
        info.raw_set("role", role.to_string())?;
        info.raw_set("name", name)?;
        if let Some((id, type_id)) = card {
            info.raw_set("card_id", id.raw())?;
            info.raw_set("type_id", type_id)?;
        }
        let derive_slot = Rc::clone(slot);
        let api = shallow_copy(lua, &self.api, &[])?;
        let derive_api = api.clone();
        env.raw_set(
            "derive",
            lua.create_function(move |_, factory: LuaFunction| {
                let value: LuaValue = factory.call((derive_api.clone(), info.clone()))?;
                *derive_slot.borrow_mut() = Some(value);
                Ok(())
            })?,
        )?;

        env.raw_set("api", api)?;

        let label = format!("{} {}", role, name);
        env.raw_set(
            "print",
            lua.create_function(move |_, args: LuaMultiValue| {
                info!(target: "cardscript::script", script = %label, "{}", render(&args));
                Ok(())
            })?,
        )?;

        Ok(env)
    }
}

fn check_shape(value: LuaValue, signature: Signature<'_>) -> Result<Compiled, String> {
    match signature {
        Signature::EffectTable { events } => {
            let LuaValue::Table(table) = value else {
                return Err(format!("expected a table of event handlers, got {}", value.type_name()));
            };
            let mut handlers = FxHashMap::default();
            for pair in table.pairs::<LuaValue, LuaValue>() {
                let (key, handler) = pair.map_err(|e| e.to_string())?;
                let LuaValue::String(key) = key else {
                    return Err(format!("handler keys must be event names, got {}", key.type_name()));
                };
                let key = key.to_str().map_err(|e| e.to_string())?.to_string();
                if !events.iter().any(|event| *event == key) {
                    return Err(format!("no event named '{}'", key));
                }
                let LuaValue::Function(handler) = handler else {
                    return Err(format!(
                        "handler for '{}' must be a function, got {}",
                        key,
                        handler.type_name()
                    ));
                };
                handlers.insert(key, handler);
            }
            Ok(Compiled::EffectTable(handlers))
        }
        Signature::Effect | Signature::Middleware => match value {
            LuaValue::Function(function) => Ok(Compiled::Callable(function)),
            other => Err(format!("expected a function, got {}", other.type_name())),
        },
    }
}
