//! Error taxonomy.
//!
//! - `CompileError`: one script failed to evaluate or has the wrong shape
//! - `DefinitionError`: the game definition is inconsistent
//! - `AggregateCompileError`: everything that went wrong in one compile pass
//! - `ActionError`: a handler failed during live dispatch
//! - `ResourceError`: interpreter allocation or disposal misuse

use thiserror::Error;

/// What a compiled script is used as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Card,
    Event,
    Middleware,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Role::Card => "Card",
            Role::Event => "Event",
            Role::Middleware => "Middleware",
        };
        f.write_str(name)
    }
}

/// A script that could not be compiled, attributed to its author-facing name.
#[derive(Debug, Error)]
#[error("{role} '{name}': {kind}")]
pub struct CompileError {
    pub role: Role,
    pub name: String,
    pub kind: CompileErrorKind,
}

impl CompileError {
    pub fn new(role: Role, name: impl Into<String>, kind: CompileErrorKind) -> Self {
        Self {
            role,
            name: name.into(),
            kind,
        }
    }
}

#[derive(Debug, Error)]
pub enum CompileErrorKind {
    /// Syntax or runtime error while evaluating the script body.
    #[error("script failed to evaluate: {0}")]
    Evaluate(String),

    /// The script ran but never registered a value.
    #[error("script did not call define or derive")]
    NotDefined,

    /// The registered value does not match the expected signature.
    #[error("unexpected shape: {0}")]
    Shape(String),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

/// Inconsistencies in the game definition itself.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("card '{card}' references unknown deck '{deck}'")]
    UnknownDeck { card: String, deck: String },

    #[error("card '{card}' overrides unknown card property '{property}'")]
    UnknownProperty { card: String, property: String },

    #[error("{owner}: property '{property}' expects {expected}, got {value}")]
    PropertyType {
        owner: String,
        property: String,
        expected: String,
        value: serde_json::Value,
    },

    #[error("card id '{0}' is defined more than once")]
    DuplicateCard(String),

    #[error("event '{0}' is defined more than once")]
    DuplicateEvent(String),

    #[error("schema expects {expected} players, setup produced {actual}")]
    PlayerCount { expected: usize, actual: usize },

    #[error("initial state setup failed: {0}")]
    Setup(String),
}

/// One entry of an aggregate compile report.
#[derive(Debug, Error)]
pub enum GameCompileError {
    #[error(transparent)]
    Script(#[from] CompileError),

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

/// All errors from one compile pass.
#[derive(Debug, Error)]
#[error("game failed to compile with {} error(s)", errors.len())]
pub struct AggregateCompileError {
    pub errors: Vec<GameCompileError>,
}

impl AggregateCompileError {
    /// Iterate over script errors only.
    pub fn script_errors(&self) -> impl Iterator<Item = &CompileError> {
        self.errors.iter().filter_map(|e| match e {
            GameCompileError::Script(script) => Some(script),
            _ => None,
        })
    }
}

/// A failure during live dispatch.
#[derive(Clone, Debug, Error)]
pub enum ActionError {
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("action '{action}' expects payload of type {expected}, got {payload}")]
    InvalidPayload {
        action: String,
        expected: String,
        payload: serde_json::Value,
    },

    /// A script handler raised an error.
    #[error("{label} failed: {message}")]
    Script { label: String, message: String },

    /// State or payload could not cross the script boundary.
    #[error("marshalling failed: {0}")]
    Marshal(String),

    /// The drafted state violates the property schema.
    #[error("invalid state after dispatch: {0}")]
    InvalidState(String),

    /// A native handler failed.
    #[error("{0}")]
    Failed(String),

    /// Nested dispatch went deeper than the machine allows.
    #[error("action '{action}' exceeds the nested dispatch limit of {limit}")]
    DepthExceeded { action: String, limit: usize },

    #[error("runtime has been disposed")]
    Disposed,
}

impl ActionError {
    pub fn script(label: impl Into<String>, error: impl std::fmt::Display) -> Self {
        ActionError::Script {
            label: label.into(),
            message: error.to_string(),
        }
    }
}

impl From<ResourceError> for ActionError {
    fn from(_: ResourceError) -> Self {
        ActionError::Disposed
    }
}

/// Interpreter lifecycle errors.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("script backend already disposed")]
    AlreadyDisposed,

    #[error("failed to allocate script backend: {0}")]
    Allocation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_message_names_role_and_script() {
        let err = CompileError::new(Role::Card, "Goblin", CompileErrorKind::NotDefined);
        assert_eq!(err.to_string(), "Card 'Goblin': script did not call define or derive");
    }

    #[test]
    fn test_aggregate_counts() {
        let agg = AggregateCompileError {
            errors: vec![
                CompileError::new(Role::Event, "draw", CompileErrorKind::NotDefined).into(),
                DefinitionError::DuplicateEvent("draw".into()).into(),
            ],
        };

        assert_eq!(agg.to_string(), "game failed to compile with 2 error(s)");
        assert_eq!(agg.script_errors().count(), 1);
    }

    #[test]
    fn test_action_error_from_resource() {
        let err: ActionError = ResourceError::AlreadyDisposed.into();
        assert!(matches!(err, ActionError::Disposed));
    }
}
