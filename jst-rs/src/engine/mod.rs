//! Scripting engine backends.
//!
//! An engine is anything implementing [`ScriptEngine`]: it parses text,
//! resolves host named items through the [`ScriptSite`] it was given, and
//! hands out [`Dispatch`] handles onto its global scope.  Engines never
//! return structured script errors directly; they report them to the site
//! (`on_script_error`) and fail the call with [`NativeError::Exception`].
//!
//! | Identifier              | Backend        | Cargo feature |
//! |-------------------------|----------------|---------------|
//! | `jscript`, `javascript` | QuickJS        | `javascript`  |
//! | `lua`                   | Lua 5.4        | `lua`         |

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use thiserror::Error;

use crate::site::ScriptSite;
use crate::value::Value;

#[cfg(feature = "lua")]
pub mod lua;
#[cfg(feature = "javascript")]
pub mod quickjs;

// ── Capabilities / flags ──────────────────────────────────────────────────────

bitflags! {
    /// What an engine can do.  A session needs all of [`Capabilities::REQUIRED`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u32 {
        /// `init_new` + `parse_text`.
        const PARSE       = 0b001;
        /// Host named items.
        const NAMED_ITEMS = 0b010;
        /// Global scope dispatch (`global_dispatch`).
        const DISPATCH    = 0b100;

        const REQUIRED = Self::PARSE.bits() | Self::NAMED_ITEMS.bits() | Self::DISPATCH.bits();
    }
}

bitflags! {
    /// Flags for [`ScriptEngine::parse_text`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ParseFlags: u32 {
        /// Evaluate as a single expression and return its value.
        const EXPRESSION = 0x20;
        /// Keep top-level declarations alive after the call.
        const PERSISTENT = 0x40;
    }
}

/// Engine execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Uninitialized,
    Initialized,
    Started,
    Connected,
    Disconnected,
    Closed,
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Raw failure of a call into an engine.
#[derive(Debug, Clone, Error)]
pub enum NativeError {
    /// Script code raised; details were reported to the site.
    #[error("script raised an exception")]
    Exception,
    #[error("unknown name `{0}`")]
    UnknownName(String),
    #[error("value conversion failed: {0}")]
    Conversion(String),
    #[error("engine is {0:?}")]
    InvalidState(EngineState),
    #[error("{0}")]
    Engine(String),
}

/// What an engine tells the site about a script error.
///
/// Positions are 0-based; the site converts them when it builds the fault.
#[derive(Debug, Clone, Default)]
pub struct ErrorReport {
    /// Error class, e.g. `SyntaxError` or `runtime error`.
    pub source_name: String,
    pub code: i32,
    pub description: String,
    pub line: u32,
    pub column: u32,
    /// Source text the position refers to, used to look up the line.
    pub source_text: Option<Rc<str>>,
}

impl ErrorReport {
    /// The text of the offending line, if it can be found.
    pub fn source_line(&self) -> Option<String> {
        self.source_text
            .as_deref()?
            .lines()
            .nth(self.line as usize)
            .map(|l| l.trim_end().to_owned())
    }
}

// ── Traits ────────────────────────────────────────────────────────────────────

/// A handle onto an engine's global scope.
pub trait Dispatch {
    /// Read a global property.
    fn get_property(&self, name: &str) -> Result<Value, NativeError>;

    /// Call a global function with positional arguments.
    fn invoke_method(&self, name: &str, args: &[Value]) -> Result<Value, NativeError>;

    /// Drop the native reference.  Must be safe to call more than once.
    fn release(&mut self);
}

/// The capability set a session drives.
pub trait ScriptEngine {
    fn language(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Install the host callback object.
    fn set_site(&mut self, site: Rc<ScriptSite>);

    /// Prepare an empty script state.
    fn init_new(&mut self) -> Result<(), NativeError>;

    fn state(&self) -> EngineState;

    /// Move to `state`.  Moving to the current state is a no-op.
    fn set_state(&mut self, state: EngineState) -> Result<(), NativeError>;

    /// Announce a root-level name; its value is fetched from the site.
    fn add_named_item(&mut self, name: &str) -> Result<(), NativeError>;

    /// Parse (and run) `code`.  With [`ParseFlags::EXPRESSION`] the value of
    /// the expression is returned, otherwise [`Value::Undefined`].
    fn parse_text(&mut self, code: &str, flags: ParseFlags) -> Result<Value, NativeError>;

    /// A statement assigning the value of `expr` to the global `var`.
    ///
    /// Evaluating `expr` this way must give the same value and the same
    /// errors as `parse_text(expr, EXPRESSION)`, so `expr` must not simply be
    /// pasted into the statement.
    fn assignment(&self, var: &str, expr: &str) -> String;

    fn global_dispatch(&self) -> Result<Box<dyn Dispatch>, NativeError>;

    /// Release the parse interface and then the runtime.  Idempotent.
    fn close(&mut self);
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Constructor for an engine instance.
pub type EngineFactory = fn() -> Result<Box<dyn ScriptEngine>, NativeError>;

/// Maps language identifiers to engine factories (case-insensitive).
#[derive(Clone)]
pub struct EngineRegistry {
    factories: HashMap<String, EngineFactory>,
}

impl EngineRegistry {
    /// A registry with no engines.
    pub fn empty() -> Self {
        Self { factories: HashMap::new() }
    }

    /// A registry holding every engine compiled into this build.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut reg = Self::empty();
        #[cfg(feature = "javascript")]
        {
            reg.register("jscript", quickjs::new_engine);
            reg.register("javascript", quickjs::new_engine);
        }
        #[cfg(feature = "lua")]
        reg.register("lua", lua::new_engine);
        reg
    }

    /// Register (or replace) the engine for `language`.
    pub fn register(&mut self, language: &str, factory: EngineFactory) {
        self.factories.insert(language.to_ascii_lowercase(), factory);
    }

    pub fn lookup(&self, language: &str) -> Option<EngineFactory> {
        self.factories.get(&language.to_ascii_lowercase()).copied()
    }

    /// Registered identifiers, sorted.
    pub fn languages(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRegistry").field("languages", &self.languages()).finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
