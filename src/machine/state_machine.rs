//! Reactive state machine.
//!
//! ## Dispatch
//!
//! `perform_action(name, payload)`:
//! 1. Opens a draft, or reuses the open one when called from inside
//!    another dispatch.
//! 2. Runs the middleware chain; its innermost step invokes the effect
//!    registered for `name`. The effect returns an output or a
//!    continuation.
//! 3. Invokes every reaction the selector yields for `name`, in order, with
//!    `{input: payload, output}`.
//! 4. Runs the continuation, if any.
//! 5. At the outermost frame only: finishes the draft and, if it differs
//!    from the committed state, commits a new snapshot and notifies
//!    subscribers once.
//!
//! Errors propagate out of `perform_action` and discard the whole draft,
//! however many reactions already ran.
//!
//! Nesting is bounded: a dispatch deeper than `max_depth` fails with
//! `ActionError::DepthExceeded` instead of exhausting the native stack.
//!
//! ## Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use cardscript::machine::{ActionTable, CloneDrafter, Effect, Outcome, StateMachine};
//! use serde_json::{json, Value};
//!
//! let mut actions = ActionTable::default();
//! let add: Effect<Rc<RefCell<i64>>> = Rc::new(|draft, payload: &Value| {
//!     *draft.borrow_mut() += payload.as_i64().unwrap_or(0);
//!     Ok(Outcome::none())
//! });
//! actions.insert("add".to_string(), add);
//!
//! let machine = StateMachine::new(CloneDrafter::new(), 0i64, actions);
//! machine.perform_action("add", json!(5)).unwrap();
//! assert_eq!(*machine.state(), 5);
//! ```

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::draft::Drafter;
use super::listeners::{Listeners, Subscription};
use crate::core::action::Action;
use crate::core::config::DEFAULT_MAX_DEPTH;
use crate::core::error::ActionError;

/// Deferred work an effect asks to run after reactions.
pub type Continuation = Box<dyn FnOnce() -> Result<(), ActionError>>;

/// What an effect produced.
pub enum Outcome {
    /// A value, passed to reactions as `output` and returned to the caller.
    Output(Value),
    /// A secondary effect to run after reactions.
    Then(Continuation),
}

impl Outcome {
    /// No output.
    #[must_use]
    pub fn none() -> Self {
        Outcome::Output(Value::Null)
    }
}

impl std::fmt::Debug for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Output(value) => f.debug_tuple("Output").field(value).finish(),
            Outcome::Then(_) => f.write_str("Then(..)"),
        }
    }
}

/// An entry of the primary action table.
pub type Effect<T> = Rc<dyn Fn(&T, &Value) -> Result<Outcome, ActionError>>;

/// A card-contributed handler, called with `{input, output}`.
pub type Reaction<T> = Rc<dyn Fn(&T, &Value) -> Result<(), ActionError>>;

/// Reactions yielded for one dispatch.
pub type Reactions<T> = SmallVec<[Reaction<T>; 4]>;

/// Resolves reactions for an action name against the current draft.
pub type ReactionSelector<T> = Rc<dyn Fn(&T, &str) -> Result<Reactions<T>, ActionError>>;

/// Continues the middleware chain with a (possibly rewritten) action.
pub type Next = Rc<dyn Fn(Action) -> Result<Value, ActionError>>;

/// Wraps dispatch. The first middleware in a list is the outermost.
///
/// Not calling `next` suppresses the action.
pub type Middleware<T> = Rc<dyn Fn(&T, Action, Next) -> Result<Value, ActionError>>;

/// Primary action table: action name to effect.
pub type ActionTable<T> = FxHashMap<String, Effect<T>>;

#[derive(Clone)]
struct Pipeline<T> {
    actions: ActionTable<T>,
    selector: Option<ReactionSelector<T>>,
    middlewares: Vec<Middleware<T>>,
}

impl<T: Clone + 'static> Pipeline<T> {
    fn run(self: &Rc<Self>, draft: &T, action: Action, index: usize) -> Result<Value, ActionError> {
        match self.middlewares.get(index) {
            Some(middleware) => {
                let pipeline = Rc::clone(self);
                let inner = draft.clone();
                let next: Next = Rc::new(move |action: Action| pipeline.run(&inner, action, index + 1));
                middleware(draft, action, next)
            }
            None => self.step(draft, action),
        }
    }

    fn step(&self, draft: &T, action: Action) -> Result<Value, ActionError> {
        let effect = self
            .actions
            .get(&action.name)
            .ok_or_else(|| ActionError::UnknownAction(action.name.clone()))?;

        let (output, continuation) = match effect(draft, &action.payload)? {
            Outcome::Output(value) => (value, None),
            Outcome::Then(continuation) => (Value::Null, Some(continuation)),
        };

        if let Some(selector) = &self.selector {
            let reactions = selector(draft, &action.name)?;
            if !reactions.is_empty() {
                trace!(action = %action.name, count = reactions.len(), "running reactions");
                let context = json!({ "input": action.payload, "output": output });
                for reaction in &reactions {
                    reaction(draft, &context)?;
                }
            }
        }

        if let Some(continuation) = continuation {
            continuation()?;
        }
        Ok(output)
    }
}

/// Object-safe dispatch, for handlers that only hold a forward reference
/// to the machine.
pub trait Dispatch {
    fn dispatch(&self, name: &str, payload: Value) -> Result<Value, ActionError>;
}

/// Holds committed state and dispatches actions against drafts of it.
pub struct StateMachine<D: Drafter> {
    drafter: D,
    state: RefCell<Rc<D::State>>,
    draft: RefCell<Option<D::Draft>>,
    depth: Cell<usize>,
    max_depth: usize,
    pipeline: RefCell<Option<Rc<Pipeline<D::Draft>>>>,
    listeners: Listeners<D::State>,
}

impl<D: Drafter> StateMachine<D> {
    /// Create a machine with an action table and no reactions.
    pub fn new(drafter: D, initial: D::State, actions: ActionTable<D::Draft>) -> Self {
        Self {
            drafter,
            state: RefCell::new(Rc::new(initial)),
            draft: RefCell::new(None),
            depth: Cell::new(0),
            max_depth: DEFAULT_MAX_DEPTH,
            pipeline: RefCell::new(Some(Rc::new(Pipeline {
                actions,
                selector: None,
                middlewares: Vec::new(),
            }))),
            listeners: Listeners::new(),
        }
    }

    /// Set the reaction selector (builder pattern).
    #[must_use]
    pub fn with_reactions(mut self, selector: ReactionSelector<D::Draft>) -> Self {
        if let Some(pipeline) = self.pipeline.get_mut() {
            Rc::make_mut(pipeline).selector = Some(selector);
        }
        self
    }

    /// Set the middleware chain, outermost first (builder pattern).
    #[must_use]
    pub fn with_middlewares(mut self, middlewares: Vec<Middleware<D::Draft>>) -> Self {
        if let Some(pipeline) = self.pipeline.get_mut() {
            Rc::make_mut(pipeline).middlewares = middlewares;
        }
        self
    }

    /// Bound nested dispatch depth (builder pattern).
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// The committed state snapshot.
    ///
    /// Snapshots are immutable; a commit replaces the `Rc`, so pointer
    /// equality tells whether anything was committed in between.
    #[must_use]
    pub fn state(&self) -> Rc<D::State> {
        Rc::clone(&self.state.borrow())
    }

    /// Dispatch an action.
    ///
    /// Returns the effect's output (`null` when it returned a continuation).
    pub fn perform_action(&self, name: &str, payload: Value) -> Result<Value, ActionError> {
        let pipeline = self.pipeline.borrow().clone().ok_or(ActionError::Disposed)?;

        let depth = self.depth.get();
        if depth >= self.max_depth {
            return Err(ActionError::DepthExceeded {
                action: name.to_string(),
                limit: self.max_depth,
            });
        }

        let open = self.draft.borrow().clone();
        let (draft, outermost) = match open {
            Some(draft) => (draft, false),
            None => {
                let draft = self.drafter.begin(&self.state.borrow())?;
                *self.draft.borrow_mut() = Some(draft.clone());
                (draft, true)
            }
        };

        self.depth.set(depth + 1);
        trace!(action = name, depth, "dispatch");
        let result = pipeline.run(&draft, Action::new(name, payload), 0);
        self.depth.set(depth);

        if !outermost {
            return result;
        }

        self.draft.borrow_mut().take();
        let output = match result {
            Ok(output) => output,
            Err(e) => {
                debug!(action = name, error = %e, "dispatch failed, draft discarded");
                return Err(e);
            }
        };

        let next = self.drafter.finish(&draft)?;
        let changed = **self.state.borrow() != next;
        if changed {
            let snapshot = Rc::new(next);
            *self.state.borrow_mut() = Rc::clone(&snapshot);
            debug!(action = name, "state committed");
            self.listeners.notify(&snapshot);
        }
        Ok(output)
    }

    /// Register a state listener, called after each commit.
    pub fn subscribe(&self, listener: impl Fn(&D::State) + 'static) -> Subscription {
        self.listeners.add(listener)
    }

    /// Number of registered state listeners.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }

    /// Whether a dispatch is in progress.
    #[must_use]
    pub fn is_dispatching(&self) -> bool {
        self.depth.get() > 0
    }

    /// Check if an action is registered.
    #[must_use]
    pub fn has_action(&self, name: &str) -> bool {
        self.pipeline
            .borrow()
            .as_ref()
            .is_some_and(|pipeline| pipeline.actions.contains_key(name))
    }

    /// Registered action names, sorted.
    #[must_use]
    pub fn action_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .pipeline
            .borrow()
            .as_ref()
            .map(|pipeline| pipeline.actions.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Drop all handlers. Later dispatches fail with `ActionError::Disposed`.
    ///
    /// Committed state and subscriptions stay readable.
    pub fn retire(&self) {
        self.pipeline.borrow_mut().take();
        self.draft.borrow_mut().take();
    }

    /// Whether `retire` has been called.
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.pipeline.borrow().is_none()
    }
}

impl<D: Drafter> Dispatch for StateMachine<D> {
    fn dispatch(&self, name: &str, payload: Value) -> Result<Value, ActionError> {
        self.perform_action(name, payload)
    }
}
