//! The `api` table handed to every script.
//!
//! | function                      | returns                         |
//! |-------------------------------|---------------------------------|
//! | `random()`                    | float in `[0, 1)`               |
//! | `random_int(low, high)`       | integer in `[low, high]`        |
//! | `shuffle(list)`               | `list`, shuffled in place       |
//! | `clone_card(type_id)`         | a fresh card of that type       |
//! | `dispatch(name, payload)`     | the action's output             |
//! | `log(...)`                    | nothing                         |
//! | `move_cards(from, n, to)`     | number of cards moved           |
//! | `take_cards(from, n)`         | list of removed cards           |
//! | `find_card(list, id)`         | the card, or `nil`              |
//!
//! Pile helpers follow `Pile` semantics on Lua arrays: cards leave from the
//! front, arrive at the back, and counts saturate at the list length.
//! Randomness comes from the game's seeded RNG, so a replay with the same
//! seed makes the same choices.
//!
//! `dispatch` is built with the trampoline, so a handler that dispatches
//! from inside a running action does not nest interpreter frames.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use mlua::prelude::*;
use serde_json::Value;
use tracing::info;

use super::marshal::{from_lua, to_lua};
use super::trampoline::Trampoline;
use crate::cards::{CardRegistry, RuntimeCard};
use crate::core::ids::CardTypeId;
use crate::core::rng::GameRng;
use crate::machine::Dispatch;

/// Forward reference to the machine scripts dispatch into.
///
/// Filled in once the machine exists; until then `api.dispatch` fails.
pub type DispatchCell = Rc<RefCell<Option<Weak<dyn Dispatch>>>>;

/// Runs for each card `clone_card` creates, before the script gets it.
pub type CloneHook = Rc<dyn Fn(&RuntimeCard) -> Result<(), String>>;

/// Host services exposed to scripts.
pub struct ScriptApi {
    rng: Rc<RefCell<GameRng>>,
    cards: Rc<CardRegistry>,
    dispatcher: DispatchCell,
    on_clone: Rc<RefCell<Option<CloneHook>>>,
}

impl ScriptApi {
    #[must_use]
    pub fn new(rng: GameRng, cards: Rc<CardRegistry>) -> Self {
        Self {
            rng: Rc::new(RefCell::new(rng)),
            cards,
            dispatcher: Rc::new(RefCell::new(None)),
            on_clone: Rc::new(RefCell::new(None)),
        }
    }

    /// Run `hook` for every card `api.clone_card` creates. A hook error
    /// fails the clone.
    pub fn on_clone(&self, hook: CloneHook) {
        *self.on_clone.borrow_mut() = Some(hook);
    }

    /// Point `api.dispatch` at a machine.
    pub fn bind(&self, target: Weak<dyn Dispatch>) {
        *self.dispatcher.borrow_mut() = Some(target);
    }

    /// The shared RNG; compile-time and dispatch-time calls draw from the
    /// same stream.
    #[must_use]
    pub fn rng(&self) -> Rc<RefCell<GameRng>> {
        Rc::clone(&self.rng)
    }

    /// Build the `api` table in `lua`.
    pub fn install(&self, lua: &Lua, trampoline: &Trampoline) -> LuaResult<LuaTable> {
        let api = lua.create_table()?;

        let rng = Rc::clone(&self.rng);
        api.set(
            "random",
            lua.create_function(move |_, ()| Ok(rng.borrow_mut().next_f64()))?,
        )?;

        let rng = Rc::clone(&self.rng);
        api.set(
            "random_int",
            lua.create_function(move |_, (low, high): (i64, i64)| {
                Ok(rng.borrow_mut().gen_range_inclusive(low, high))
            })?,
        )?;

        let rng = Rc::clone(&self.rng);
        api.set(
            "shuffle",
            lua.create_function(move |_, list: LuaTable| {
                let mut items = (1..=list.raw_len())
                    .map(|i| list.raw_get::<LuaValue>(i))
                    .collect::<LuaResult<Vec<_>>>()?;
                rng.borrow_mut().shuffle(&mut items);
                for (i, item) in items.into_iter().enumerate() {
                    list.raw_set(i + 1, item)?;
                }
                Ok(list)
            })?,
        )?;

        let cards = Rc::clone(&self.cards);
        let on_clone = Rc::clone(&self.on_clone);
        api.set(
            "clone_card",
            lua.create_function(move |lua, type_id: String| {
                let card = cards
                    .instantiate(&CardTypeId::new(type_id.as_str()))
                    .ok_or_else(|| {
                        LuaError::RuntimeError(format!("unknown card type '{}'", type_id))
                    })?;
                let hook = on_clone.borrow().clone();
                if let Some(hook) = hook {
                    hook(&card).map_err(LuaError::RuntimeError)?;
                }
                to_lua(lua, &card)
            })?,
        )?;

        let dispatcher = Rc::clone(&self.dispatcher);
        api.set(
            "dispatch",
            trampoline.wrap(lua, move |lua, args| {
                let (name, payload): (String, LuaValue) = FromLuaMulti::from_lua_multi(args, lua)?;
                let target = dispatcher
                    .borrow()
                    .as_ref()
                    .and_then(Weak::upgrade)
                    .ok_or_else(|| {
                        LuaError::RuntimeError(format!(
                            "cannot dispatch '{}': the game is not running",
                            name
                        ))
                    })?;
                let payload: Value = from_lua(lua, payload)?;
                let output = target.dispatch(&name, payload).map_err(LuaError::external)?;
                to_lua(lua, &output)?.into_lua_multi(lua)
            })?,
        )?;

        api.set(
            "log",
            lua.create_function(|_, args: LuaMultiValue| {
                info!(target: "cardscript::script", "{}", render(&args));
                Ok(())
            })?,
        )?;

        api.set(
            "move_cards",
            lua.create_function(|_, (from, n, to): (LuaTable, i64, LuaTable)| move_cards(&from, n, &to))?,
        )?;

        api.set(
            "take_cards",
            lua.create_function(|lua, (from, n): (LuaTable, i64)| {
                let taken = lua.create_table()?;
                move_cards(&from, n, &taken)?;
                Ok(taken)
            })?,
        )?;

        api.set(
            "find_card",
            lua.create_function(|_, (list, id): (LuaTable, i64)| {
                for i in 1..=list.raw_len() {
                    if let LuaValue::Table(card) = list.raw_get::<LuaValue>(i)? {
                        if card.raw_get::<Option<i64>>("id")? == Some(id) {
                            return Ok(LuaValue::Table(card));
                        }
                    }
                }
                Ok(LuaValue::Nil)
            })?,
        )?;

        Ok(api)
    }
}

/// Move up to `n` items from the front of `from` to the back of `to`.
fn move_cards(from: &LuaTable, n: i64, to: &LuaTable) -> LuaResult<usize> {
    let count = usize::try_from(n).unwrap_or(0).min(from.raw_len());
    for _ in 0..count {
        let card: LuaValue = from.raw_get(1)?;
        from.raw_remove(1)?;
        to.raw_insert((to.raw_len() + 1) as i64, card)?;
    }
    Ok(count)
}

/// Render script arguments the way Lua's `print` would.
pub(crate) fn render(args: &LuaMultiValue) -> String {
    args.iter()
        .map(|value| match value {
            LuaValue::Nil => "nil".to_string(),
            LuaValue::Boolean(b) => b.to_string(),
            LuaValue::Integer(i) => i.to_string(),
            LuaValue::Number(n) => n.to_string(),
            LuaValue::String(s) => s.to_string_lossy().to_string(),
            other => other.type_name().to_string(),
        })
        .collect::<Vec<_>>()
        .join("\t")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::CardDefinition;
    use crate::core::PropertySchema;
    use serde_json::json;

    fn registry() -> Rc<CardRegistry> {
        let def: CardDefinition = serde_json::from_value(json!({
            "cardId": "orc", "deckId": "d1", "name": "Orc"
        }))
        .unwrap();
        let mut registry = CardRegistry::new();
        registry.register(&def, &PropertySchema::default()).unwrap();
        Rc::new(registry)
    }

    fn setup(seed: u64) -> (Lua, ScriptApi, LuaTable) {
        let lua = Lua::new();
        let api = ScriptApi::new(GameRng::new(seed), registry());
        let trampoline = Trampoline::new(&lua).unwrap();
        let table = api.install(&lua, &trampoline).unwrap();
        lua.globals().set("api", table.clone()).unwrap();
        (lua, api, table)
    }

    #[test]
    fn test_random_is_seeded() {
        let (lua_a, _api_a, _) = setup(7);
        let (lua_b, _api_b, _) = setup(7);
        let script = "return { api.random(), api.random_int(1, 6), api.random_int(1, 6) }";

        let a: Vec<f64> = lua_a.load(script).eval().unwrap();
        let b: Vec<f64> = lua_b.load(script).eval().unwrap();
        assert_eq!(a, b);
        assert!((0.0..1.0).contains(&a[0]));
        assert!((1.0..=6.0).contains(&a[1]));
    }

    #[test]
    fn test_shuffle_keeps_elements() {
        let (lua, _api, _) = setup(3);
        let mut sorted: Vec<i64> = lua
            .load("local t = {1, 2, 3, 4, 5, 6} api.shuffle(t) return t")
            .eval()
            .unwrap();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_clone_card_fresh_ids() {
        let (lua, _api, _) = setup(1);
        let (a, b, ty): (i64, i64, String) = lua
            .load("local a = api.clone_card('orc') local b = api.clone_card('orc') return a.id, b.id, b.type_id")
            .eval()
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(ty, "orc");
    }

    #[test]
    fn test_clone_hook_sees_each_clone() {
        let (lua, api, _) = setup(1);
        let cloned = Rc::new(RefCell::new(Vec::new()));
        {
            let cloned = Rc::clone(&cloned);
            api.on_clone(Rc::new(move |card: &RuntimeCard| {
                cloned.borrow_mut().push(card.id.raw());
                Ok(())
            }));
        }

        let id: u64 = lua.load("return api.clone_card('orc').id").eval().unwrap();
        assert_eq!(*cloned.borrow(), vec![id]);

        api.on_clone(Rc::new(|_: &RuntimeCard| Err("no room".to_string())));
        let err = lua.load("api.clone_card('orc')").exec().unwrap_err();
        assert!(err.to_string().contains("no room"));
    }

    #[test]
    fn test_clone_card_unknown_type() {
        let (lua, _api, _) = setup(1);
        let err = lua.load("api.clone_card('dragon')").exec().unwrap_err();
        assert!(err.to_string().contains("unknown card type 'dragon'"));
    }

    #[test]
    fn test_pile_helpers_saturate() {
        let (lua, _api, _) = setup(1);
        let (moved, from_len, to_last, taken, rest): (i64, i64, i64, i64, i64) = lua
            .load(
                r#"
                local from = {1, 2, 3}
                local to = {9}
                local moved = api.move_cards(from, 2, to)
                local taken = api.take_cards(from, 10)
                return moved, #from, to[#to], #taken, api.move_cards(from, 5, to)
                "#,
            )
            .eval()
            .unwrap();
        assert_eq!((moved, from_len, to_last, taken, rest), (2, 1, 2, 1, 0));
    }

    #[test]
    fn test_find_card() {
        let (lua, _api, _) = setup(1);
        let found: (String, bool) = lua
            .load(
                r#"
                local list = { {id = 1, name = "a"}, {id = 2, name = "b"} }
                return api.find_card(list, 2).name, api.find_card(list, 3) == nil
                "#,
            )
            .eval()
            .unwrap();
        assert_eq!(found, ("b".to_string(), true));
    }

    #[test]
    fn test_dispatch_before_bind_fails() {
        let (lua, _api, _) = setup(1);
        let err = lua.load("api.dispatch('draw', nil)").exec().unwrap_err();
        assert!(err.to_string().contains("not running"));
    }

    #[test]
    fn test_render_matches_print() {
        let lua = Lua::new();
        let args = LuaMultiValue::from_iter([
            LuaValue::Integer(1),
            LuaValue::Boolean(true),
            LuaValue::Nil,
            LuaValue::String(lua.create_string("x").unwrap()),
        ]);
        assert_eq!(render(&args), "1\ttrue\tnil\tx");
    }
}
