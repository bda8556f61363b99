//! Copy-on-write drafting.
//!
//! Every top-level dispatch works on a *draft*: a private working copy of
//! the committed state. Handlers mutate the draft; the machine turns it back
//! into a state at the end and commits it only if it differs. A failed
//! dispatch drops the draft, so the committed snapshot is never touched.
//!
//! The draft type is chosen by the `Drafter`:
//! - `CloneDrafter<S>` drafts into `Rc<RefCell<S>>`. With `im` collections
//!   the clone is O(1) and untouched subtrees stay shared.
//! - The game runtime drafts into a Lua table (`script::LuaDrafter`) so
//!   scripts can mutate state directly.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::core::error::ActionError;

/// Produces and finishes drafts of a state type.
pub trait Drafter: 'static {
    type State: PartialEq + 'static;
    type Draft: Clone + 'static;

    /// Open a draft of `state`.
    fn begin(&self, state: &Self::State) -> Result<Self::Draft, ActionError>;

    /// Turn a draft back into a state.
    fn finish(&self, draft: &Self::Draft) -> Result<Self::State, ActionError>;
}

/// Drafts by cloning into a shared cell.
///
/// Handlers borrow the cell for as long as they need; a borrow must be
/// released before dispatching a nested action.
///
/// ```
/// use cardscript::machine::{CloneDrafter, Drafter};
///
/// let drafter = CloneDrafter::<Vec<u32>>::new();
/// let draft = drafter.begin(&vec![1, 2]).unwrap();
/// draft.borrow_mut().push(3);
///
/// assert_eq!(drafter.finish(&draft).unwrap(), vec![1, 2, 3]);
/// ```
pub struct CloneDrafter<S> {
    _state: PhantomData<fn() -> S>,
}

impl<S> CloneDrafter<S> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            _state: PhantomData,
        }
    }
}

impl<S> Default for CloneDrafter<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Clone + PartialEq + 'static> Drafter for CloneDrafter<S> {
    type State = S;
    type Draft = Rc<RefCell<S>>;

    fn begin(&self, state: &S) -> Result<Self::Draft, ActionError> {
        Ok(Rc::new(RefCell::new(state.clone())))
    }

    fn finish(&self, draft: &Self::Draft) -> Result<S, ActionError> {
        Ok(draft.borrow().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_does_not_alias_state() {
        let drafter = CloneDrafter::<im::Vector<u32>>::new();
        let state = im::Vector::from(vec![1, 2, 3]);

        let draft = drafter.begin(&state).unwrap();
        draft.borrow_mut().push_back(4);

        assert_eq!(state.len(), 3);
        assert_eq!(drafter.finish(&draft).unwrap().len(), 4);
    }

    #[test]
    fn test_untouched_draft_finishes_equal() {
        let drafter = CloneDrafter::<String>::new();
        let state = "abc".to_string();

        let draft = drafter.begin(&state).unwrap();
        assert_eq!(drafter.finish(&draft).unwrap(), state);
    }
}
