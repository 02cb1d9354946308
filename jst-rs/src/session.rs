//! Interpreter sessions.
//!
//! A session owns one running engine plus the [`ScriptSite`] it calls back
//! into.  Every failed engine call is checked against the site's fault slot:
//! a populated slot becomes [`HostError::ScriptFault`], an empty one
//! [`HostError::NativeCallFailure`].
//!
//! ```text
//! let mut s = InterpreterSession::start("jscript")?;
//! s.set_named_item("host", Value::from("value"))?;
//! let two = s.eval("1 + 1")?;
//! let handle = s.parse_module("function f(x) { return x; }")?;
//! ```

use std::rc::Rc;

use tracing::debug;

use crate::engine::{
    Capabilities, EngineRegistry, EngineState, NativeError, ParseFlags, ScriptEngine,
};
use crate::error::{HostError, Result, ScriptFault};
use crate::handle::ParsedHandle;
use crate::site::ScriptSite;
use crate::value::Value;

/// Global the narrow parse variant stores expression results in.
const RESULT_VAR: &str = "x___";

/// How text passed to [`InterpreterSession::parse`] is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Evaluate a single expression and return its value.
    Expression,
    /// Parse a persistent program and return a handle to its global scope.
    Module,
}

/// Result of [`InterpreterSession::parse`].
#[derive(Debug)]
pub enum Parsed {
    Value(Value),
    Handle(ParsedHandle),
}

/// Which expression-evaluation path the session drives.
///
/// Chosen once at start from the host word size.  The narrow path does not
/// trust the engine to hand back immediate expression results; it assigns the
/// expression to a synthetic global and reads that back instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParseVariant {
    Narrow,
    Wide,
}

impl ParseVariant {
    pub(crate) fn native() -> Self {
        if usize::BITS == 32 {
            ParseVariant::Narrow
        } else {
            ParseVariant::Wide
        }
    }
}

/// One running scripting engine and its host callback site.
pub struct InterpreterSession {
    language: String,
    engine: Option<Box<dyn ScriptEngine>>,
    site: Option<Rc<ScriptSite>>,
    variant: ParseVariant,
}

impl InterpreterSession {
    /// Start the engine registered as `language` in the default registry.
    pub fn start(language: &str) -> Result<Self> {
        Self::start_with(&EngineRegistry::with_defaults(), language)
    }

    /// Start the engine registered as `language` in `registry`.
    pub fn start_with(registry: &EngineRegistry, language: &str) -> Result<Self> {
        Self::start_variant(registry, language, ParseVariant::native())
    }

    pub(crate) fn start_variant(
        registry: &EngineRegistry,
        language: &str,
        variant: ParseVariant,
    ) -> Result<Self> {
        if language.is_empty() {
            return Err(HostError::InvalidName("language"));
        }
        let factory = registry
            .lookup(language)
            .ok_or_else(|| HostError::EngineNotFound(language.to_owned()))?;
        let mut engine = factory().map_err(HostError::NativeCallFailure)?;

        let missing = Capabilities::REQUIRED - engine.capabilities();
        if !missing.is_empty() {
            engine.close();
            return Err(HostError::EngineTypeMismatch { language: language.to_owned(), missing });
        }

        let site = Rc::new(ScriptSite::new());
        engine.set_site(Rc::clone(&site));
        if let Err(e) = engine.init_new() {
            engine.close();
            return Err(HostError::NativeCallFailure(e));
        }

        debug!(language, engine = engine.language(), ?variant, "script session started");
        Ok(Self { language: language.to_owned(), engine: Some(engine), site: Some(site), variant })
    }

    /// The identifier this session was started with.
    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn is_closed(&self) -> bool {
        self.engine.is_none()
    }

    /// Expose `value` to scripts as the global `name`.
    ///
    /// Must happen before the parse that references `name`.  Registering a
    /// name again replaces the value for later parses.
    pub fn set_named_item(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        if name.is_empty() {
            return Err(HostError::InvalidName("named item name"));
        }
        let (engine, site) = self.parts()?;
        site.insert_item(name, value.into());
        engine.add_named_item(name).map_err(HostError::NativeCallFailure)?;
        debug!(name, "named item registered");
        Ok(())
    }

    /// Submit `text` in the given mode.
    pub fn parse(&mut self, text: &str, mode: ParseMode) -> Result<Parsed> {
        match mode {
            ParseMode::Expression => self.eval(text).map(Parsed::Value),
            ParseMode::Module => self.parse_module(text).map(Parsed::Handle),
        }
    }

    /// Evaluate a single expression.
    pub fn eval(&mut self, expression: &str) -> Result<Value> {
        let variant = self.variant;
        let (engine, site) = self.connect()?;
        if variant == ParseVariant::Wide {
            return engine
                .parse_text(expression, ParseFlags::EXPRESSION)
                .map_err(|e| surface(site, e));
        }

        let statement = engine.assignment(RESULT_VAR, expression);
        engine
            .parse_text(&statement, ParseFlags::empty())
            .map_err(|e| against_text(surface(site, e), expression))?;
        let mut dispatch = engine.global_dispatch().map_err(|e| surface(site, e))?;
        let value = dispatch.get_property(RESULT_VAR).map_err(|e| surface(site, e));
        dispatch.release();
        value
    }

    /// Parse a persistent program and return a handle to its globals.
    pub fn parse_module(&mut self, text: &str) -> Result<ParsedHandle> {
        let (engine, site) = self.connect()?;
        engine.parse_text(text, ParseFlags::PERSISTENT).map_err(|e| surface(site, e))?;
        let dispatch = engine.global_dispatch().map_err(|e| surface(site, e))?;
        debug!(bytes = text.len(), "module parsed");
        Ok(ParsedHandle::new(Rc::downgrade(site), dispatch))
    }

    /// Release the engine.  Later calls do nothing.
    pub fn close(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.close();
            debug!(language = %self.language, "script session closed");
        }
        self.site = None;
    }

    fn parts(&mut self) -> Result<(&mut Box<dyn ScriptEngine>, &Rc<ScriptSite>)> {
        match (self.engine.as_mut(), self.site.as_ref()) {
            (Some(engine), Some(site)) => Ok((engine, site)),
            _ => Err(HostError::Disposed("script session")),
        }
    }

    /// Put the engine in the connected state with an empty fault slot.
    fn connect(&mut self) -> Result<(&mut Box<dyn ScriptEngine>, &Rc<ScriptSite>)> {
        let (engine, site) = self.parts()?;
        engine.set_state(EngineState::Connected).map_err(HostError::NativeCallFailure)?;
        site.clear_fault();
        Ok((engine, site))
    }
}

impl Drop for InterpreterSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for InterpreterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterpreterSession")
            .field("language", &self.language)
            .field("closed", &self.is_closed())
            .field("variant", &self.variant)
            .finish()
    }
}

/// Decide how a failed engine call surfaces: the site's fault if its error
/// callback fired, the raw failure otherwise.
pub(crate) fn surface(site: &ScriptSite, err: NativeError) -> HostError {
    match site.take_fault() {
        Some(fault) => HostError::ScriptFault(fault),
        None => HostError::NativeCallFailure(err),
    }
}

/// Point a fault's source line at `text` rather than the statement that
/// wrapped it.  Positions already refer to `text`.
fn against_text(err: HostError, text: &str) -> HostError {
    match err {
        HostError::ScriptFault(f) => {
            let source_line = f
                .line
                .checked_sub(1)
                .and_then(|n| text.lines().nth(n as usize))
                .map(|l| l.trim_end().to_owned());
            HostError::ScriptFault(ScriptFault::new(
                f.source_name,
                f.code,
                f.line,
                f.column,
                f.description,
                source_line,
            ))
        }
        other => other,
    }
}

/// Start a session, register `named_items`, evaluate `expression`, close.
pub fn eval_once<'a>(
    language: &str,
    expression: &str,
    named_items: impl IntoIterator<Item = (&'a str, Value)>,
) -> Result<Value> {
    let mut session = InterpreterSession::start(language)?;
    for (name, value) in named_items {
        session.set_named_item(name, value)?;
    }
    let value = session.eval(expression);
    session.close();
    value
}

// ── Tests ─────────────────────────────────────────────────────────────────────
