//! Script backends.
//!
//! Both backends host a Lua 5.4 interpreter; they differ in what a script
//! can reach:
//!
//! | backend    | standard library                              | memory cap |
//! |------------|-----------------------------------------------|------------|
//! | trusted    | every safe library (`os`, `io`, `load`, ...)  | none       |
//! | isolated   | `table`, `string`, `math`, `utf8`, base subset | yes       |
//!
//! The isolated backend also meters execution: every top-level call gets
//! `instruction_limit` VM instructions, counted in strides of
//! `BUDGET_STRIDE`, and fails once they run out.
//!
//! One backend instance belongs to one compiled game and is released with
//! `dispose()`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use mlua::prelude::*;
use mlua::{HookTriggers, LuaOptions, StdLib, VmState};
use tracing::debug;

use crate::core::config::{BackendKind, SandboxConfig};
use crate::core::error::ResourceError;

/// Base functions an isolated script may call.
const ISOLATED_GLOBALS: &[&str] = &[
    "assert", "error", "ipairs", "next", "pairs", "pcall", "select", "tonumber", "tostring",
    "type", "xpcall", "rawequal", "rawget", "rawlen", "rawset", "setmetatable", "string",
    "table", "utf8",
];

/// `math` members hidden from isolated scripts; randomness goes through `api`.
const HIDDEN_MATH: &[&str] = &["random", "randomseed"];

/// Instructions between two budget checks.
const BUDGET_STRIDE: u32 = 1000;

/// A Lua interpreter that compiled scripts run in.
pub trait ScriptBackend {
    fn kind(&self) -> BackendKind;

    /// A handle to the interpreter.
    ///
    /// Fails once the backend has been disposed.
    fn lua(&self) -> Result<Lua, ResourceError>;

    /// A fresh environment table holding the standard library this backend
    /// exposes. Each compiled script gets its own.
    fn environment(&self, lua: &Lua) -> LuaResult<LuaTable>;

    /// Release the interpreter. A second call fails.
    fn dispose(&self) -> Result<(), ResourceError>;

    fn is_disposed(&self) -> bool;
}

/// Create the backend selected by `config`.
pub fn create(config: &SandboxConfig) -> Result<Rc<dyn ScriptBackend>, ResourceError> {
    let backend: Rc<dyn ScriptBackend> = match config.backend {
        BackendKind::Trusted => Rc::new(TrustedBackend::new()),
        BackendKind::Isolated => Rc::new(IsolatedBackend::new(config)?),
    };
    debug!(backend = ?config.backend, "script backend created");
    Ok(backend)
}

/// A new table with the same entries as `source`, minus `hidden` keys.
pub(crate) fn shallow_copy(lua: &Lua, source: &LuaTable, hidden: &[&str]) -> LuaResult<LuaTable> {
    let copy = lua.create_table()?;
    for pair in source.pairs::<LuaValue, LuaValue>() {
        let (key, value) = pair?;
        if let LuaValue::String(name) = &key {
            if hidden.iter().any(|h| &name.as_bytes()[..] == h.as_bytes()) {
                continue;
            }
        }
        copy.raw_set(key, value)?;
    }
    Ok(copy)
}

struct InstructionBudget {
    limit: u64,
    remaining: Cell<u64>,
}

fn install_budget(lua: &Lua, limit: u64) -> LuaResult<()> {
    if limit == 0 {
        return Ok(());
    }
    lua.set_app_data(InstructionBudget {
        limit,
        remaining: Cell::new(limit),
    });
    let triggers = HookTriggers::new().every_nth_instruction(BUDGET_STRIDE);
    lua.set_global_hook(triggers, |lua, _| {
        let Some(budget) = lua.app_data_ref::<InstructionBudget>() else {
            return Ok(VmState::Continue);
        };
        let left = budget.remaining.get().saturating_sub(u64::from(BUDGET_STRIDE));
        budget.remaining.set(left);
        if left == 0 {
            return Err(LuaError::RuntimeError(format!(
                "instruction budget of {} exhausted",
                budget.limit
            )));
        }
        Ok(VmState::Continue)
    })
}

/// Restore the full instruction budget ahead of a top-level call.
///
/// No-op for interpreters without one.
pub(crate) fn refill_budget(lua: &Lua) {
    if let Some(budget) = lua.app_data_ref::<InstructionBudget>() {
        budget.remaining.set(budget.limit);
    }
}

struct Host {
    lua: RefCell<Option<Lua>>,
}

impl Host {
    fn new(lua: Lua) -> Self {
        Self {
            lua: RefCell::new(Some(lua)),
        }
    }

    fn lua(&self) -> Result<Lua, ResourceError> {
        self.lua.borrow().clone().ok_or(ResourceError::AlreadyDisposed)
    }

    fn dispose(&self) -> Result<(), ResourceError> {
        match self.lua.borrow_mut().take() {
            Some(_) => Ok(()),
            None => Err(ResourceError::AlreadyDisposed),
        }
    }

    fn is_disposed(&self) -> bool {
        self.lua.borrow().is_none()
    }
}

/// Runs scripts with the full safe standard library.
///
/// Scripts can read every host global, including `os`, `io` and `load`.
/// Only suitable for definitions the host fully trusts.
pub struct TrustedBackend {
    host: Host,
}

impl TrustedBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            host: Host::new(Lua::new()),
        }
    }
}

impl Default for TrustedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptBackend for TrustedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Trusted
    }

    fn lua(&self) -> Result<Lua, ResourceError> {
        self.host.lua()
    }

    fn environment(&self, lua: &Lua) -> LuaResult<LuaTable> {
        let env = lua.create_table()?;
        for pair in lua.globals().pairs::<LuaValue, LuaValue>() {
            let (key, value) = pair?;
            env.raw_set(key, value)?;
        }
        Ok(env)
    }

    fn dispose(&self) -> Result<(), ResourceError> {
        self.host.dispose()
    }

    fn is_disposed(&self) -> bool {
        self.host.is_disposed()
    }
}

/// Runs scripts in a restricted interpreter with a memory cap.
///
/// No `os`, `io`, `package`, `debug`, `load` or `require`; values reach the
/// script only through `api` and the arguments handlers are called with.
/// Library tables are copied into each environment, so a script that
/// overwrites `string.rep` only changes its own copy.
///
/// `coroutine` is loaded for the host's dispatch driver but never handed
/// to scripts.
pub struct IsolatedBackend {
    host: Host,
    memory_limit: usize,
}

impl IsolatedBackend {
    pub fn new(config: &SandboxConfig) -> Result<Self, ResourceError> {
        let allocation = |e: LuaError| ResourceError::Allocation(e.to_string());
        let libs = StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8 | StdLib::COROUTINE;
        let lua = Lua::new_with(libs, LuaOptions::default()).map_err(allocation)?;
        lua.set_memory_limit(config.memory_limit).map_err(allocation)?;
        install_budget(&lua, config.instruction_limit).map_err(allocation)?;

        Ok(Self {
            host: Host::new(lua),
            memory_limit: config.memory_limit,
        })
    }

    #[must_use]
    pub fn memory_limit(&self) -> usize {
        self.memory_limit
    }
}

impl ScriptBackend for IsolatedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Isolated
    }

    fn lua(&self) -> Result<Lua, ResourceError> {
        self.host.lua()
    }

    fn environment(&self, lua: &Lua) -> LuaResult<LuaTable> {
        let globals = lua.globals();
        let env = lua.create_table()?;
        for name in ISOLATED_GLOBALS {
            let value = match globals.raw_get::<LuaValue>(*name)? {
                LuaValue::Table(library) => LuaValue::Table(shallow_copy(lua, &library, &[])?),
                other => other,
            };
            env.raw_set(*name, value)?;
        }

        let host_math: LuaTable = globals.raw_get("math")?;
        env.raw_set("math", shallow_copy(lua, &host_math, HIDDEN_MATH)?)?;
        Ok(env)
    }

    fn dispose(&self) -> Result<(), ResourceError> {
        self.host.dispose()
    }

    fn is_disposed(&self) -> bool {
        self.host.is_disposed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval<R: FromLuaMulti>(backend: &dyn ScriptBackend, source: &str) -> LuaResult<R> {
        let lua = backend.lua().unwrap();
        let env = backend.environment(&lua)?;
        lua.load(source).set_environment(env).eval()
    }

    #[test]
    fn test_trusted_reaches_host_libraries() {
        let backend = TrustedBackend::new();
        let value: String = eval(&backend, "return type(os) .. type(io) .. type(load)").unwrap();
        assert_eq!(value, "tabletablefunction");
    }

    fn isolated() -> IsolatedBackend {
        IsolatedBackend::new(&SandboxConfig::isolated()).unwrap()
    }

    #[test]
    fn test_isolated_hides_host_libraries() {
        let backend = isolated();
        let value: String = eval(
            &backend,
            "return type(os) .. type(io) .. type(load) .. type(require) .. type(math.random) .. type(coroutine)",
        )
        .unwrap();
        assert_eq!(value, "nilnilnilnilnilnil");
    }

    #[test]
    fn test_isolated_keeps_pure_libraries() {
        let backend = isolated();
        let value: String =
            eval(&backend, "return string.rep('a', 3) .. math.floor(2.5) .. #table.pack(1, 2)").unwrap();
        assert_eq!(value, "aaa22");
    }

    #[test]
    fn test_isolated_memory_limit() {
        let backend = IsolatedBackend::new(&SandboxConfig::isolated().with_memory_limit(1024 * 1024)).unwrap();
        let result = eval::<LuaValue>(&backend, "local t = {} for i = 1, 1e7 do t[i] = string.rep('x', 64) .. i end return #t");
        assert!(matches!(result, Err(LuaError::MemoryError(_))));
    }

    #[test]
    fn test_isolated_instruction_budget() {
        let backend = IsolatedBackend::new(&SandboxConfig::isolated().with_instruction_limit(50_000)).unwrap();
        let err = eval::<()>(&backend, "while true do end").unwrap_err();
        assert!(err.to_string().contains("instruction budget of 50000 exhausted"), "{err}");

        refill_budget(&backend.lua().unwrap());
        let sum: i64 = eval(&backend, "local n = 0 for i = 1, 10 do n = n + i end return n").unwrap();
        assert_eq!(sum, 55);
    }

    #[test]
    fn test_isolated_budget_can_be_disabled() {
        let backend = IsolatedBackend::new(&SandboxConfig::isolated().with_instruction_limit(0)).unwrap();
        let n: i64 = eval(&backend, "local n = 0 for i = 1, 200000 do n = n + 1 end return n").unwrap();
        assert_eq!(n, 200_000);
    }

    #[test]
    fn test_isolated_libraries_are_copied() {
        let backend = isolated();
        let lua = backend.lua().unwrap();
        let tamper = backend.environment(&lua).unwrap();
        lua.load("string.rep = nil table.insert = nil utf8.char = nil math.floor = nil")
            .set_environment(tamper)
            .exec()
            .unwrap();

        let value: String = eval(
            &backend,
            "return string.rep('b', 2) .. type(table.insert) .. utf8.char(72) .. math.floor(1.5)",
        )
        .unwrap();
        assert_eq!(value, "bbfunctionH1");
    }

    #[test]
    fn test_environments_are_independent() {
        let backend = TrustedBackend::new();
        let lua = backend.lua().unwrap();
        let a = backend.environment(&lua).unwrap();
        let b = backend.environment(&lua).unwrap();

        lua.load("shared = 1").set_environment(a).exec().unwrap();
        let seen: LuaValue = lua.load("return shared").set_environment(b).eval().unwrap();
        assert!(seen.is_nil());
    }

    #[test]
    fn test_dispose_twice_fails() {
        let backend = create(&SandboxConfig::isolated()).unwrap();
        assert!(backend.dispose().is_ok());
        assert!(backend.is_disposed());
        assert!(matches!(backend.dispose(), Err(ResourceError::AlreadyDisposed)));
        assert!(matches!(backend.lua(), Err(ResourceError::AlreadyDisposed)));
    }

    #[test]
    fn test_create_honors_kind() {
        assert_eq!(create(&SandboxConfig::trusted()).unwrap().kind(), BackendKind::Trusted);
        assert_eq!(create(&SandboxConfig::isolated()).unwrap().kind(), BackendKind::Isolated);
    }
}
