//! Built-in native middlewares.
//!
//! Pass these in `CompileOptions::with_middleware`; they wrap every
//! scripted middleware.

use std::rc::Rc;

use ::tracing::{debug, debug_span, warn};

use crate::core::action::Action;
use crate::machine::{Middleware, Next};

/// Log every action, its output, and failures.
///
/// Nested dispatches show up as nested `action` spans.
#[must_use]
pub fn tracing<T: 'static>() -> Middleware<T> {
    Rc::new(|_: &T, action: Action, next: Next| {
        let span = debug_span!("action", name = %action.name);
        let _entered = span.enter();
        debug!(payload = %action.payload, "dispatching");

        let result = next(action);
        match &result {
            Ok(output) => debug!(%output, "action done"),
            Err(error) => warn!(%error, "action failed"),
        }
        result
    })
}

/// Drop every action whose name is in `blocked`.
///
/// Blocked actions produce `null` and leave state untouched.
#[must_use]
pub fn block<T: 'static>(blocked: &[&str]) -> Middleware<T> {
    let blocked: Vec<String> = blocked.iter().map(|name| name.to_string()).collect();
    Rc::new(move |_: &T, action: Action, next: Next| {
        if blocked.contains(&action.name) {
            debug!(action = %action.name, "action blocked");
            return Ok(serde_json::Value::Null);
        }
        next(action)
    })
}
