//! Error-containing dispatch decorator.

use std::rc::Rc;

use serde_json::Value;
use tracing::warn;

use super::draft::Drafter;
use super::listeners::{Listeners, Subscription};
use super::state_machine::StateMachine;
use crate::core::action::Action;
use crate::core::error::ActionError;

/// A dispatch that failed, as delivered to error listeners.
#[derive(Debug)]
pub struct ActionFailure {
    pub action: Action,
    pub error: ActionError,
}

/// Wraps a machine so a failing action never escapes to the caller.
///
/// Failures are logged and handed to every error listener; the committed
/// state stays as it was before the action.
pub struct FailSafe<D: Drafter> {
    machine: Rc<StateMachine<D>>,
    errors: Listeners<ActionFailure>,
}

impl<D: Drafter> Clone for FailSafe<D> {
    fn clone(&self) -> Self {
        Self {
            machine: Rc::clone(&self.machine),
            errors: self.errors.clone(),
        }
    }
}

impl<D: Drafter> FailSafe<D> {
    #[must_use]
    pub fn new(machine: Rc<StateMachine<D>>) -> Self {
        Self {
            machine,
            errors: Listeners::new(),
        }
    }

    /// Dispatch, returning `None` if the action failed.
    pub fn perform_action(&self, name: &str, payload: Value) -> Option<Value> {
        match self.machine.perform_action(name, payload.clone()) {
            Ok(output) => Some(output),
            Err(error) => {
                warn!(action = name, error = %error, "action failed");
                let failure = ActionFailure {
                    action: Action::new(name, payload),
                    error,
                };
                self.errors.notify(&failure);
                None
            }
        }
    }

    /// Register an error listener.
    pub fn subscribe_errors(&self, listener: impl Fn(&ActionFailure) + 'static) -> Subscription {
        self.errors.add(listener)
    }

    pub fn subscribe(&self, listener: impl Fn(&D::State) + 'static) -> Subscription {
        self.machine.subscribe(listener)
    }

    #[must_use]
    pub fn state(&self) -> Rc<D::State> {
        self.machine.state()
    }

    /// The wrapped machine.
    #[must_use]
    pub fn machine(&self) -> &Rc<StateMachine<D>> {
        &self.machine
    }
}
