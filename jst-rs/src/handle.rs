//! Handles onto a parsed module's global scope.

use std::fmt;
use std::rc::Weak;

use tracing::debug;

use crate::engine::Dispatch;
use crate::error::{HostError, Result};
use crate::session::surface;
use crate::site::ScriptSite;
use crate::value::Value;

/// A late-bound reference to the globals of a module parsed by an
/// [`InterpreterSession`](crate::InterpreterSession).
///
/// The handle keeps only a weak link to its session: once the session is
/// closed every call returns [`HostError::Disposed`].  Releasing the handle
/// never affects the session.
pub struct ParsedHandle {
    dispatch: Option<Box<dyn Dispatch>>,
    site: Weak<ScriptSite>,
}

impl ParsedHandle {
    pub(crate) fn new(site: Weak<ScriptSite>, dispatch: Box<dyn Dispatch>) -> Self {
        Self { dispatch: Some(dispatch), site }
    }

    /// Call the global function `name` with positional `args`.
    ///
    /// A script error raised by the call surfaces as
    /// [`HostError::ScriptFault`]; a name that is not a function as
    /// [`HostError::NativeCallFailure`].
    pub fn invoke(&self, name: &str, args: &[Value]) -> Result<Value> {
        let dispatch = self.dispatch.as_ref().ok_or(HostError::Disposed("parsed handle"))?;
        if name.is_empty() {
            return Err(HostError::InvalidName("method name"));
        }
        let site = self.site.upgrade().ok_or(HostError::Disposed("script session"))?;
        site.clear_fault();
        debug!(name, args = args.len(), "invoke");
        dispatch.invoke_method(name, args).map_err(|e| surface(&site, e))
    }

    /// Read the global `name`.
    pub fn get(&self, name: &str) -> Result<Value> {
        let dispatch = self.dispatch.as_ref().ok_or(HostError::Disposed("parsed handle"))?;
        if name.is_empty() {
            return Err(HostError::InvalidName("property name"));
        }
        let site = self.site.upgrade().ok_or(HostError::Disposed("script session"))?;
        site.clear_fault();
        dispatch.get_property(name).map_err(|e| surface(&site, e))
    }

    pub fn is_closed(&self) -> bool {
        self.dispatch.is_none()
    }

    /// Release the native reference.  Later calls do nothing.
    pub fn close(&mut self) {
        if let Some(mut dispatch) = self.dispatch.take() {
            dispatch.release();
        }
    }
}

impl Drop for ParsedHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ParsedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedHandle")
            .field("closed", &self.is_closed())
            .field("session_alive", &(self.site.strong_count() > 0))
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
