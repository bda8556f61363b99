//! Flat nesting for host calls made from scripts.
//!
//! A handler that calls `api.dispatch` would normally nest the whole
//! dispatch inside the Lua call that asked for it: Rust calls Lua, Lua
//! calls Rust, Rust calls Lua again, and every level keeps an interpreter
//! frame alive on the native stack and counts against Lua's C-call limit.
//!
//! `Trampoline::call` runs a handler as a coroutine instead. A host
//! function built with `Trampoline::wrap` yields its request back to the
//! driver when it finds itself inside such a coroutine; the driver runs
//! the request in plain Rust and resumes the coroutine with the result.
//! Each nested level then costs only Rust frames, and Lua's counters start
//! over at every level.
//!
//! Outside a driven coroutine (compile time, a script's own coroutine, or
//! a callback from `table.sort`) the wrapped function runs directly.

use std::cell::Cell;
use std::rc::Rc;

use mlua::prelude::*;

use super::backend::refill_budget;

const BOUNCE: &str = r#"
local driven = setmetatable({}, { __mode = "k" })
local running, yield, isyieldable = coroutine.running, coroutine.yield, coroutine.isyieldable
local error = error

local function settle(ok, ...)
  if ok then return ... end
  error((...), 0)
end

local function bounce(request, direct)
  return function(...)
    if driven[running()] and isyieldable() then
      return settle(yield(driven, request, ...))
    end
    return direct(...)
  end
end

return driven, bounce
"#;

type HostFn = dyn Fn(&Lua, LuaMultiValue) -> LuaResult<LuaMultiValue>;

struct Request(Rc<HostFn>);

/// Runs handlers as coroutines and serves their host calls from Rust.
#[derive(Clone)]
pub struct Trampoline {
    driven: LuaTable,
    bounce: LuaFunction,
    depth: Rc<Cell<usize>>,
}

impl Trampoline {
    /// Load the driver into `lua`. Needs the host's `coroutine` library.
    pub fn new(lua: &Lua) -> LuaResult<Self> {
        let (driven, bounce) = lua
            .load(BOUNCE)
            .set_name("=trampoline")
            .set_environment(lua.globals())
            .eval::<(LuaTable, LuaFunction)>()?;
        Ok(Self {
            driven,
            bounce,
            depth: Rc::new(Cell::new(0)),
        })
    }

    /// A Lua function running `host`, flattened when called from a driven
    /// coroutine.
    pub fn wrap<F>(&self, lua: &Lua, host: F) -> LuaResult<LuaFunction>
    where
        F: Fn(&Lua, LuaMultiValue) -> LuaResult<LuaMultiValue> + 'static,
    {
        let host: Rc<HostFn> = Rc::new(host);
        let direct = {
            let host = Rc::clone(&host);
            lua.create_function(move |lua, args: LuaMultiValue| host(lua, args))?
        };
        let request = lua.create_any_userdata(Request(host))?;
        self.bounce.call((request, direct))
    }

    /// Call `function` as a driven coroutine.
    ///
    /// The outermost call refills the interpreter's instruction budget.
    pub fn call<R: FromLuaMulti>(
        &self,
        lua: &Lua,
        function: &LuaFunction,
        args: impl IntoLuaMulti,
    ) -> LuaResult<R> {
        let thread = lua.create_thread(function.clone())?;
        self.driven.raw_set(&thread, true)?;

        let depth = self.depth.get();
        if depth == 0 {
            refill_budget(lua);
        }
        self.depth.set(depth + 1);
        let result = self.drive(lua, &thread, args);
        self.depth.set(depth);

        R::from_lua_multi(result?, lua)
    }

    fn drive(&self, lua: &Lua, thread: &LuaThread, args: impl IntoLuaMulti) -> LuaResult<LuaMultiValue> {
        let mut values: LuaMultiValue = thread.resume(args)?;
        while thread.status() == LuaThreadStatus::Resumable {
            let reply = match self.serve(lua, values)? {
                Ok(mut results) => {
                    results.push_front(LuaValue::Boolean(true));
                    results
                }
                Err(error) => LuaMultiValue::from_iter([
                    LuaValue::Boolean(false),
                    LuaValue::Error(Box::new(error)),
                ]),
            };
            values = thread.resume(reply)?;
        }
        Ok(values)
    }

    /// Run one yielded request. The outer error means the yield was not ours.
    fn serve(&self, lua: &Lua, mut values: LuaMultiValue) -> LuaResult<LuaResult<LuaMultiValue>> {
        let host = match (values.pop_front(), values.pop_front()) {
            (Some(LuaValue::Table(marker)), Some(LuaValue::UserData(request))) if marker == self.driven => {
                Rc::clone(&request.borrow::<Request>()?.0)
            }
            _ => {
                return Err(LuaError::RuntimeError(
                    "handler yielded to the host unexpectedly".to_string(),
                ))
            }
        };
        Ok(host(lua, values))
    }

    /// How many driven calls are currently on the stack.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.get()
    }
}

impl std::fmt::Debug for Trampoline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trampoline").field("depth", &self.depth.get()).finish()
    }
}
