//! JavaScript engine backed by QuickJS via the `rquickjs` crate.
//!
//! Enabled with the `javascript` Cargo feature (on by default) and
//! registered under `jscript` and `javascript`.
//!
//! Script errors are read off the thrown value: `name`, `message`,
//! `lineNumber`/`columnNumber` when QuickJS sets them, otherwise the first
//! positioned frame of `stack`.

use std::rc::{Rc, Weak};
use std::sync::OnceLock;

use regex::Regex;
use rquickjs::context::EvalOptions;
use rquickjs::function::Rest;
use rquickjs::{
    Array, Context, Ctx, Exception, Function, IntoJs, Null, Object, Runtime, Undefined,
};

use super::{
    Capabilities, Dispatch, EngineState, ErrorReport, NativeError, ParseFlags, ScriptEngine,
};
use crate::error::codes;
use crate::site::ScriptSite;
use crate::value::{HostFn, Value};

type JsValue<'js> = rquickjs::Value<'js>;

/// Deepest nesting converted back to the host.
const MAX_DEPTH: usize = 64;

/// Registry constructor.
pub fn new_engine() -> Result<Box<dyn ScriptEngine>, NativeError> {
    Ok(Box::new(QuickJsEngine::new()?))
}

// ── QuickJsEngine ─────────────────────────────────────────────────────────────

pub struct QuickJsEngine {
    runtime: Option<Runtime>,
    context: Option<Context>,
    site: Option<Rc<ScriptSite>>,
    state: EngineState,
    /// Named items announced but not yet bound into the global object.
    pending: Vec<String>,
    /// Text of the most recent parse, for source-line lookups.
    source: Option<Rc<str>>,
}

impl QuickJsEngine {
    pub fn new() -> Result<Self, NativeError> {
        let runtime = Runtime::new().map_err(|e| NativeError::Engine(e.to_string()))?;
        let context = Context::full(&runtime).map_err(|e| NativeError::Engine(e.to_string()))?;
        Ok(Self {
            runtime: Some(runtime),
            context: Some(context),
            site: None,
            state: EngineState::Uninitialized,
            pending: Vec::new(),
            source: None,
        })
    }

    fn context(&self) -> Result<&Context, NativeError> {
        match (&self.context, self.state) {
            (_, EngineState::Closed) | (None, _) => Err(NativeError::InvalidState(self.state)),
            (Some(ctx), _) => Ok(ctx),
        }
    }

    /// Bind pending named items into the global object.  A name leaves the
    /// pending list only once it is bound; on failure the rest stay queued.
    fn bind_pending(&mut self) -> Result<(), NativeError> {
        let (Some(site), Some(context)) = (&self.site, &self.context) else {
            return Ok(());
        };
        let pending = &mut self.pending;
        context.with(|ctx| {
            let globals = ctx.globals();
            while let Some(name) = pending.first() {
                let value =
                    site.item(name).ok_or_else(|| NativeError::UnknownName(name.clone()))?;
                let js = to_js(&ctx, &value).map_err(|e| NativeError::Conversion(e.to_string()))?;
                globals
                    .set(name.as_str(), js)
                    .map_err(|e| NativeError::Engine(e.to_string()))?;
                pending.remove(0);
            }
            Ok(())
        })
    }
}

impl ScriptEngine for QuickJsEngine {
    fn language(&self) -> &str {
        "javascript"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::REQUIRED
    }

    fn set_site(&mut self, site: Rc<ScriptSite>) {
        self.site = Some(site);
    }

    fn init_new(&mut self) -> Result<(), NativeError> {
        self.context()?;
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
        self.context()?;
        if !self.pending.iter().any(|n| n == name) {
            self.pending.push(name.to_owned());
        }
        Ok(())
    }

    fn parse_text(&mut self, code: &str, flags: ParseFlags) -> Result<Value, NativeError> {
        self.context()?;
        self.bind_pending()?;
        let source: Rc<str> = Rc::from(code);
        self.source = Some(Rc::clone(&source));
        let site = self.site.clone();
        let context = self.context()?;

        context.with(|ctx| {
            if let Some(site) = &site {
                site.on_enter_script();
            }
            let result = match ctx.eval_with_options::<JsValue, _>(code, script_options()) {
                Ok(v) if flags.contains(ParseFlags::EXPRESSION) => from_js(&v, 0),
                Ok(_) => Ok(Value::Undefined),
                Err(e) => Err(fail(&ctx, e, site.as_deref(), Some(&source))),
            };
            if let Some(site) = &site {
                site.on_leave_script();
            }
            result
        })
    }

    /// Indirect `eval` of the quoted text: global scope, and the completion
    /// value of the whole program, exactly as a direct parse would give.
    fn assignment(&self, var: &str, expr: &str) -> String {
        format!("{var} = (0, eval)({});", js_string(expr))
    }

    fn global_dispatch(&self) -> Result<Box<dyn Dispatch>, NativeError> {
        let context = self.context()?.clone();
        Ok(Box::new(QuickJsDispatch {
            context: Some(context),
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
        // Context before runtime.
        self.context = None;
        self.runtime = None;
        self.site = None;
    }
}

/// Scripts run as global, non-strict code so top-level assignments create
/// globals the way classic hosts expect.
fn script_options() -> EvalOptions {
    let mut opts = EvalOptions::default();
    opts.global = true;
    opts.strict = false;
    opts
}

impl Drop for QuickJsEngine {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

/// Handle onto the global object of a QuickJS context.
pub struct QuickJsDispatch {
    context: Option<Context>,
    site: Weak<ScriptSite>,
    source: Option<Rc<str>>,
}

impl QuickJsDispatch {
    fn context(&self) -> Result<&Context, NativeError> {
        self.context.as_ref().ok_or(NativeError::InvalidState(EngineState::Closed))
    }
}

impl Dispatch for QuickJsDispatch {
    fn get_property(&self, name: &str) -> Result<Value, NativeError> {
        let site = self.site.upgrade();
        self.context()?.with(|ctx| {
            match ctx.globals().get::<_, JsValue>(name) {
                Ok(v) => from_js(&v, 0),
                Err(e) => Err(fail(&ctx, e, site.as_deref(), self.source.as_ref())),
            }
        })
    }

    fn invoke_method(&self, name: &str, args: &[Value]) -> Result<Value, NativeError> {
        let site = self.site.upgrade();
        self.context()?.with(|ctx| {
            let target = ctx
                .globals()
                .get::<_, JsValue>(name)
                .map_err(|e| fail(&ctx, e, site.as_deref(), self.source.as_ref()))?;
            let Some(func) = target.as_function() else {
                return Err(NativeError::UnknownName(name.to_owned()));
            };
            let js_args = args
                .iter()
                .map(|a| to_js(&ctx, a))
                .collect::<rquickjs::Result<Vec<_>>>()
                .map_err(|e| NativeError::Conversion(e.to_string()))?;

            if let Some(site) = &site {
                site.on_enter_script();
            }
            let result = match func.call::<_, JsValue>((Rest(js_args),)) {
                Ok(v) => from_js(&v, 0),
                Err(e) => Err(fail(&ctx, e, site.as_deref(), self.source.as_ref())),
            };
            if let Some(site) = &site {
                site.on_leave_script();
            }
            result
        })
    }

    fn release(&mut self) {
        self.context = None;
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Turn an `rquickjs` error into a [`NativeError`], reporting thrown
/// exceptions to the site.
fn fail(
    ctx: &Ctx<'_>,
    err: rquickjs::Error,
    site: Option<&ScriptSite>,
    source: Option<&Rc<str>>,
) -> NativeError {
    match err {
        rquickjs::Error::Exception => {
            let thrown = ctx.catch();
            let report = error_report(&thrown, source.cloned());
            if let Some(site) = site {
                site.on_script_error(&report);
            }
            NativeError::Exception
        }
        other => NativeError::Engine(other.to_string()),
    }
}

fn stack_position_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*at\s+(?:[^\n(]*\()?[^\s():]+:(\d+)(?::(\d+))?\)?\s*$")
            .expect("stack position regex")
    })
}

/// First `(line, column)` found in a QuickJS stack trace, 1-based.
fn stack_position(stack: &str) -> Option<(u32, Option<u32>)> {
    let caps = stack_position_re().captures(stack)?;
    let line = caps.get(1)?.as_str().parse().ok()?;
    let column = caps.get(2).and_then(|m| m.as_str().parse().ok());
    Some((line, column))
}

fn error_report(thrown: &JsValue<'_>, source_text: Option<Rc<str>>) -> ErrorReport {
    let mut report = ErrorReport { source_text, ..Default::default() };

    let Some(obj) = thrown.as_object() else {
        report.source_name = "Error".into();
        report.code = codes::UNCAUGHT;
        report.description = from_js(thrown, 0).map(|v| v.to_string()).unwrap_or_default();
        return report;
    };

    let prop = |key: &str| obj.get::<_, Option<String>>(key).ok().flatten();
    let num = |key: &str| obj.get::<_, Option<i32>>(key).ok().flatten();

    report.source_name = prop("name").unwrap_or_else(|| "Error".into());
    report.code = codes::for_error_name(&report.source_name);
    report.description = prop("message").unwrap_or_default();

    let from_stack = prop("stack").as_deref().and_then(stack_position);
    let line = num("lineNumber")
        .map(|n| n.max(0) as u32)
        .or(from_stack.map(|(l, _)| l));
    let column = num("columnNumber")
        .map(|n| n.max(0) as u32)
        .or(from_stack.and_then(|(_, c)| c));

    // QuickJS counts from 1.
    report.line = line.unwrap_or(1).saturating_sub(1);
    report.column = column.unwrap_or(1).saturating_sub(1);
    report
}

/// `s` as a double-quoted JavaScript string literal.
fn js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// ── Value conversion ──────────────────────────────────────────────────────────

fn from_js(value: &JsValue<'_>, depth: usize) -> Result<Value, NativeError> {
    if depth > MAX_DEPTH {
        return Err(NativeError::Conversion("value nested too deeply".into()));
    }
    let conv = |e: rquickjs::Error| NativeError::Conversion(e.to_string());

    if value.is_undefined() {
        return Ok(Value::Undefined);
    }
    if value.is_null() {
        return Ok(Value::Null);
    }
    if let Some(b) = value.as_bool() {
        return Ok(Value::Bool(b));
    }
    if let Some(n) = value.as_number() {
        return Ok(Value::Number(n));
    }
    if let Some(s) = value.as_string() {
        return s.to_string().map(Value::String).map_err(conv);
    }
    if value.is_function() {
        return Ok(Value::Opaque("function".into()));
    }
    if let Some(arr) = value.as_array() {
        let mut items = Vec::with_capacity(arr.len());
        for item in arr.iter::<JsValue>() {
            items.push(from_js(&item.map_err(conv)?, depth + 1)?);
        }
        return Ok(Value::Array(items));
    }
    if let Some(obj) = value.as_object() {
        let mut entries = Vec::new();
        for prop in obj.props::<String, JsValue>() {
            let (k, v) = prop.map_err(conv)?;
            entries.push((k, from_js(&v, depth + 1)?));
        }
        return Ok(Value::object(entries));
    }
    Ok(Value::Opaque(format!("{:?}", value.type_of()).to_lowercase()))
}

fn to_js<'js>(ctx: &Ctx<'js>, value: &Value) -> rquickjs::Result<JsValue<'js>> {
    match value {
        Value::Undefined | Value::Opaque(_) => Undefined.into_js(ctx),
        Value::Null => Null.into_js(ctx),
        Value::Bool(b) => (*b).into_js(ctx),
        Value::Number(n) => (*n).into_js(ctx),
        Value::String(s) => s.as_str().into_js(ctx),
        Value::Array(items) => {
            let arr = Array::new(ctx.clone())?;
            for (i, item) in items.iter().enumerate() {
                arr.set(i, to_js(ctx, item)?)?;
            }
            Ok(arr.into_value())
        }
        Value::Object(map) => {
            let obj = Object::new(ctx.clone())?;
            for (k, v) in map {
                obj.set(k.as_str(), to_js(ctx, v)?)?;
            }
            Ok(obj.into_value())
        }
        Value::Function(host) => Ok(host_function(ctx, host.clone())?.into_value()),
    }
}

/// Wrap a host callback as a JavaScript function.  Callback errors are
/// thrown as `Error` objects inside the script.
fn host_function<'js>(ctx: &Ctx<'js>, host: HostFn) -> rquickjs::Result<Function<'js>> {
    Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, args: Rest<JsValue<'js>>| -> rquickjs::Result<JsValue<'js>> {
            let args = args
                .0
                .iter()
                .map(|a| from_js(a, 0))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| Exception::throw_type(&ctx, &e.to_string()))?;
            match host.call(args) {
                Ok(v) => to_js(&ctx, &v),
                Err(msg) => Err(Exception::throw_message(&ctx, &msg)),
            }
        },
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
