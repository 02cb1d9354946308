//! Lua 5.4 engine via the `mlua` crate.
//!
//! Enabled with the `lua` Cargo feature (on by default):
//! ```text
//! cargo build --features lua
//! cargo test  --features lua
//! ```
//!
//! Registered as `lua`.  Chunks are named `jst`, so error messages look like
//! `jst:3: attempt to call a nil value (global 'f')`; the position is taken
//! from that prefix.  Lua reports no column, so faults carry column 1.
//!
//! | Host value        | Lua value                          |
//! |-------------------|------------------------------------|
//! | undefined / null  | `nil`                              |
//! | number            | integer when integral, else float  |
//! | array             | sequence table (1-based)           |
//! | object            | table with string keys             |
//! | host function     | Lua function                       |

use std::rc::{Rc, Weak};
use std::sync::OnceLock;

use mlua::prelude::*;
use regex::Regex;

use super::{
    Capabilities, Dispatch, EngineState, ErrorReport, NativeError, ParseFlags, ScriptEngine,
};
use crate::error::codes;
use crate::site::ScriptSite;
use crate::value::{HostFn, Value};

const CHUNK_NAME: &str = "=jst";
const MAX_DEPTH: usize = 64;

/// Registry constructor.
pub fn new_engine() -> Result<Box<dyn ScriptEngine>, NativeError> {
    Ok(Box::new(LuaEngine::new()))
}

// ── LuaEngine ─────────────────────────────────────────────────────────────────

/// A Lua interpreter driven through the [`ScriptEngine`] contract.
pub struct LuaEngine {
    lua: Option<Lua>,
    site: Option<Rc<ScriptSite>>,
    state: EngineState,
    pending: Vec<String>,
    source: Option<Rc<str>>,
}

impl LuaEngine {
    pub fn new() -> Self {
        Self {
            lua: Some(Lua::new()),
            site: None,
            state: EngineState::Uninitialized,
            pending: Vec::new(),
            source: None,
        }
    }

    fn lua(&self) -> Result<&Lua, NativeError> {
        match (&self.lua, self.state) {
            (_, EngineState::Closed) | (None, _) => Err(NativeError::InvalidState(self.state)),
            (Some(lua), _) => Ok(lua),
        }
    }

    /// Bind pending named items into the globals table.  A name stays pending
    /// until it is bound, so a failed parse can be retried.
    fn bind_pending(&mut self) -> Result<(), NativeError> {
        let (Some(site), Some(lua)) = (&self.site, &self.lua) else {
            return Ok(());
        };
        let globals = lua.globals();
        while let Some(name) = self.pending.first() {
            let value = site.item(name).ok_or_else(|| NativeError::UnknownName(name.clone()))?;
            let lv = to_lua(lua, &value).map_err(|e| NativeError::Conversion(e.to_string()))?;
            globals.set(name.as_str(), lv).map_err(|e| NativeError::Engine(e.to_string()))?;
            self.pending.remove(0);
        }
        Ok(())
    }
}

impl Default for LuaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptEngine for LuaEngine {
    fn language(&self) -> &str {
        "lua"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::REQUIRED
    }

    fn set_site(&mut self, site: Rc<ScriptSite>) {
        self.site = Some(site);
    }

    fn init_new(&mut self) -> Result<(), NativeError> {
        self.lua()?;
        self.pending.clear();
        self.set_state(EngineState::Initialized)
    }

    fn state(&self) -> EngineState {
        self.state
    }

    fn set_state(&mut self, state: EngineState) -> Result<(), NativeError> {
        if self.state == state {
            return Ok(());
        }
        if self.state == EngineState::Closed {
            return Err(NativeError::InvalidState(self.state));
        }
        self.state = state;
        if let Some(site) = &self.site {
            site.on_state_change(state);
        }
        Ok(())
    }

    fn add_named_item(&mut self, name: &str) -> Result<(), NativeError> {
        self.lua()?;
        if !self.pending.iter().any(|n| n == name) {
            self.pending.push(name.to_owned());
        }
        Ok(())
    }

    fn parse_text(&mut self, code: &str, flags: ParseFlags) -> Result<Value, NativeError> {
        self.lua()?;
        self.bind_pending()?;
        let source: Rc<str> = Rc::from(code);
        self.source = Some(Rc::clone(&source));
        let lua = self.lua()?;

        let chunk = lua.load(code).set_name(CHUNK_NAME);
        if let Some(site) = &self.site {
            site.on_enter_script();
        }
        let result = if flags.contains(ParseFlags::EXPRESSION) {
            chunk.eval::<LuaValue>()
        } else {
            chunk.exec().map(|()| LuaValue::Nil)
        };
        if let Some(site) = &self.site {
            site.on_leave_script();
        }

        match result {
            Ok(v) if flags.contains(ParseFlags::EXPRESSION) => from_lua(&v, 0),
            Ok(_) => Ok(Value::Undefined),
            Err(e) => Err(fail(e, self.site.as_deref(), Some(&source))),
        }
    }

    /// The expression runs as the `return` of a closure on the first line,
    /// so line numbers, trailing `;` and `--` comments behave as in `eval`.
    fn assignment(&self, var: &str, expr: &str) -> String {
        format!("{var} = (function() return {expr}\nend)()")
    }

    fn global_dispatch(&self) -> Result<Box<dyn Dispatch>, NativeError> {
        let lua = self.lua()?.clone();
        Ok(Box::new(LuaDispatch {
            globals: Some(lua.globals()),
            lua: Some(lua),
            site: self.site.as_ref().map_or_else(Weak::new, Rc::downgrade),
            source: self.source.clone(),
        }))
    }

    fn close(&mut self) {
        if self.state == EngineState::Closed {
            return;
        }
        if let Some(site) = &self.site {
            site.on_script_terminate();
        }
        let _ = self.set_state(EngineState::Closed);
        self.pending.clear();
        self.lua = None;
        self.site = None;
    }
}

impl Drop for LuaEngine {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

/// Handle onto the Lua globals table.
pub struct LuaDispatch {
    globals: Option<LuaTable>,
    lua: Option<Lua>,
    site: Weak<ScriptSite>,
    source: Option<Rc<str>>,
}

impl LuaDispatch {
    fn parts(&self) -> Result<(&Lua, &LuaTable), NativeError> {
        match (&self.lua, &self.globals) {
            (Some(lua), Some(globals)) => Ok((lua, globals)),
            _ => Err(NativeError::InvalidState(EngineState::Closed)),
        }
    }
}

impl Dispatch for LuaDispatch {
    fn get_property(&self, name: &str) -> Result<Value, NativeError> {
        let (_, globals) = self.parts()?;
        let v = globals
            .get::<LuaValue>(name)
            .map_err(|e| fail(e, self.site.upgrade().as_deref(), self.source.as_ref()))?;
        from_lua(&v, 0)
    }

    fn invoke_method(&self, name: &str, args: &[Value]) -> Result<Value, NativeError> {
        let (lua, globals) = self.parts()?;
        let site = self.site.upgrade();
        let func = match globals.get::<LuaValue>(name) {
            Ok(LuaValue::Function(f)) => f,
            Ok(_) => return Err(NativeError::UnknownName(name.to_owned())),
            Err(e) => return Err(fail(e, site.as_deref(), self.source.as_ref())),
        };
        let lua_args = args
            .iter()
            .map(|a| to_lua(lua, a))
            .collect::<LuaResult<Vec<_>>>()
            .map_err(|e| NativeError::Conversion(e.to_string()))?;

        if let Some(site) = &site {
            site.on_enter_script();
        }
        let result = func.call::<LuaValue>(LuaMultiValue::from_vec(lua_args));
        if let Some(site) = &site {
            site.on_leave_script();
        }
        match result {
            Ok(v) => from_lua(&v, 0),
            Err(e) => Err(fail(e, site.as_deref(), self.source.as_ref())),
        }
    }

    fn release(&mut self) {
        self.globals = None;
        self.lua = None;
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

fn position_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bjst:(\d+):").expect("lua position regex"))
}

fn prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^.*?\bjst:\d+:\s*").expect("lua prefix regex"))
}

/// Map an `mlua` error to a [`NativeError`], reporting script errors to the site.
fn fail(err: LuaError, site: Option<&ScriptSite>, source: Option<&Rc<str>>) -> NativeError {
    let source_name = match &err {
        LuaError::SyntaxError { .. } => "syntax error",
        LuaError::RuntimeError(_) | LuaError::CallbackError { .. } | LuaError::MemoryError(_) => {
            "runtime error"
        }
        other => return NativeError::Engine(other.to_string()),
    };
    let report = error_report(source_name, &err.to_string(), source.cloned());
    if let Some(site) = site {
        site.on_script_error(&report);
    }
    NativeError::Exception
}

fn error_report(source_name: &str, text: &str, source_text: Option<Rc<str>>) -> ErrorReport {
    let line = position_re()
        .captures(text)
        .and_then(|c| c.get(1)?.as_str().parse::<u32>().ok())
        .unwrap_or(1);
    let first = text.lines().next().unwrap_or_default();
    let description = prefix_re().replace(first, "").into_owned();
    ErrorReport {
        source_name: source_name.to_owned(),
        code: codes::for_error_name(source_name),
        description,
        line: line.saturating_sub(1),
        column: 0,
        source_text,
    }
}

// ── Value conversion ──────────────────────────────────────────────────────────

fn from_lua(value: &LuaValue, depth: usize) -> Result<Value, NativeError> {
    if depth > MAX_DEPTH {
        return Err(NativeError::Conversion("value nested too deeply".into()));
    }
    let conv = |e: LuaError| NativeError::Conversion(e.to_string());
    Ok(match value {
        LuaValue::Nil => Value::Undefined,
        LuaValue::Boolean(b) => Value::Bool(*b),
        LuaValue::Integer(i) => Value::Number(*i as f64),
        LuaValue::Number(n) => Value::Number(*n),
        LuaValue::String(s) => Value::String(String::from_utf8_lossy(&s.as_bytes()).into_owned()),
        LuaValue::Table(t) => {
            let len = t.raw_len();
            let mut entries = Vec::new();
            let mut sequence = true;
            for pair in t.clone().pairs::<LuaValue, LuaValue>() {
                let (k, v) = pair.map_err(conv)?;
                let key = match &k {
                    LuaValue::Integer(i) => {
                        sequence &= *i >= 1 && (*i as usize) <= len;
                        i.to_string()
                    }
                    LuaValue::String(s) => {
                        sequence = false;
                        String::from_utf8_lossy(&s.as_bytes()).into_owned()
                    }
                    other => {
                        sequence = false;
                        format!("{other:?}")
                    }
                };
                entries.push((key, from_lua(&v, depth + 1)?));
            }
            if sequence && entries.len() == len && len > 0 {
                entries.sort_by_key(|(k, _)| k.parse::<usize>().unwrap_or(usize::MAX));
                Value::Array(entries.into_iter().map(|(_, v)| v).collect())
            } else {
                Value::object(entries)
            }
        }
        LuaValue::Function(_) => Value::Opaque("function".into()),
        other => Value::Opaque(other.type_name().to_owned()),
    })
}

fn to_lua(lua: &Lua, value: &Value) -> LuaResult<LuaValue> {
    Ok(match value {
        Value::Undefined | Value::Null | Value::Opaque(_) => LuaValue::Nil,
        Value::Bool(b) => LuaValue::Boolean(*b),
        Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => LuaValue::Integer(*n as i64),
        Value::Number(n) => LuaValue::Number(*n),
        Value::String(s) => LuaValue::String(lua.create_string(s)?),
        Value::Array(items) => {
            let t = lua.create_table()?;
            for (i, item) in items.iter().enumerate() {
                t.raw_set(i + 1, to_lua(lua, item)?)?;
            }
            LuaValue::Table(t)
        }
        Value::Object(map) => {
            let t = lua.create_table()?;
            for (k, v) in map {
                t.raw_set(k.as_str(), to_lua(lua, v)?)?;
            }
            LuaValue::Table(t)
        }
        Value::Function(host) => LuaValue::Function(host_function(lua, host.clone())?),
    })
}

/// Wrap a host callback as a Lua function; callback errors become Lua errors.
fn host_function(lua: &Lua, host: HostFn) -> LuaResult<LuaFunction> {
    lua.create_function(move |lua, args: LuaMultiValue| {
        let args = args
            .iter()
            .map(|a| from_lua(a, 0))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| LuaError::RuntimeError(e.to_string()))?;
        match host.call(args) {
            Ok(v) => to_lua(lua, &v),
            Err(msg) => Err(LuaError::RuntimeError(format!("{}: {msg}", host.name()))),
        }
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
