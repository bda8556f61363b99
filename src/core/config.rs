//! Sandbox configuration.
//!
//! Chooses which script backend a compiled game runs on and what it may
//! consume. Values can come from code, from a serialized config document,
//! or from environment overrides:
//!
//! - `CARDSCRIPT_BACKEND`: `trusted` or `isolated`
//! - `CARDSCRIPT_MEMORY_LIMIT`: bytes, isolated backend only
//! - `CARDSCRIPT_INSTRUCTION_LIMIT`: VM instructions per top-level call,
//!   isolated backend only, `0` for unlimited
//! - `CARDSCRIPT_MAX_DEPTH`: nested `api.dispatch` levels

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default memory cap for the isolated interpreter (16 MiB).
pub const DEFAULT_MEMORY_LIMIT: usize = 16 * 1024 * 1024;

/// Default instruction budget for one top-level script call.
pub const DEFAULT_INSTRUCTION_LIMIT: u64 = 100_000_000;

/// Default nesting limit for dispatches made from scripts.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Which interpreter flavor compiles and runs scripts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Full standard library, no memory cap. Only for fully trusted authors.
    Trusted,
    /// Restricted library, allow-listed globals, bounded memory.
    #[default]
    Isolated,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trusted" => Ok(BackendKind::Trusted),
            "isolated" => Ok(BackendKind::Isolated),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

/// Script backend configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub backend: BackendKind,
    /// Interpreter memory cap in bytes (isolated backend).
    pub memory_limit: usize,
    /// VM instructions one top-level call may execute (isolated backend).
    /// Zero disables the budget.
    pub instruction_limit: u64,
    pub max_dispatch_depth: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            memory_limit: DEFAULT_MEMORY_LIMIT,
            instruction_limit: DEFAULT_INSTRUCTION_LIMIT,
            max_dispatch_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl SandboxConfig {
    /// Trusted backend with default limits.
    #[must_use]
    pub fn trusted() -> Self {
        Self {
            backend: BackendKind::Trusted,
            ..Self::default()
        }
    }

    /// Isolated backend with default limits.
    #[must_use]
    pub fn isolated() -> Self {
        Self::default()
    }

    /// Set the memory cap (builder pattern).
    #[must_use]
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = bytes;
        self
    }

    #[must_use]
    pub fn with_instruction_limit(mut self, instructions: u64) -> Self {
        self.instruction_limit = instructions;
        self
    }

    #[must_use]
    pub fn with_max_dispatch_depth(mut self, depth: usize) -> Self {
        self.max_dispatch_depth = depth;
        self
    }

    /// Defaults with environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `CARDSCRIPT_*` environment overrides.
    ///
    /// Unparseable values are logged and ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("CARDSCRIPT_BACKEND") {
            match v.parse() {
                Ok(kind) => self.backend = kind,
                Err(e) => warn!("Ignoring CARDSCRIPT_BACKEND: {}", e),
            }
        }
        if let Ok(v) = std::env::var("CARDSCRIPT_MEMORY_LIMIT") {
            match v.trim().parse() {
                Ok(bytes) => self.memory_limit = bytes,
                Err(e) => warn!("Ignoring CARDSCRIPT_MEMORY_LIMIT={}: {}", v, e),
            }
        }
        if let Ok(v) = std::env::var("CARDSCRIPT_INSTRUCTION_LIMIT") {
            match v.trim().parse() {
                Ok(count) => self.instruction_limit = count,
                Err(e) => warn!("Ignoring CARDSCRIPT_INSTRUCTION_LIMIT={}: {}", v, e),
            }
        }
        if let Ok(v) = std::env::var("CARDSCRIPT_MAX_DEPTH") {
            match v.trim().parse() {
                Ok(depth) => self.max_dispatch_depth = depth,
                Err(e) => warn!("Ignoring CARDSCRIPT_MAX_DEPTH={}: {}", v, e),
            }
        }
        self
    }
}
