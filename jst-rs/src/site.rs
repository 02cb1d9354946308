//! The host callback object handed to every engine.
//!
//! The site owns the named-item table and a single-slot fault mailbox.
//! Engines write the mailbox from `on_script_error`; the session reads and
//! clears it right after a failing call.  It is a slot, not a queue: only
//! the most recent fault before the call returned matters.

use std::cell::RefCell;
use std::collections::HashMap;

use tracing::trace;

use crate::engine::{EngineState, ErrorReport};
use crate::error::ScriptFault;
use crate::value::Value;

#[derive(Debug, Default)]
pub struct ScriptSite {
    named_items: RefCell<HashMap<String, Value>>,
    last_fault: RefCell<Option<ScriptFault>>,
}

impl ScriptSite {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Named items ───────────────────────────────────────────────────────

    /// Register (or overwrite) a named item.
    pub fn insert_item(&self, name: impl Into<String>, value: Value) {
        self.named_items.borrow_mut().insert(name.into(), value);
    }

    /// Resolve a named item for an engine.
    pub fn item(&self, name: &str) -> Option<Value> {
        self.named_items.borrow().get(name).cloned()
    }

    pub fn item_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.named_items.borrow().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    // ── Fault mailbox ─────────────────────────────────────────────────────

    pub fn clear_fault(&self) {
        self.last_fault.borrow_mut().take();
    }

    /// Read and clear the mailbox.
    pub fn take_fault(&self) -> Option<ScriptFault> {
        self.last_fault.borrow_mut().take()
    }

    pub fn has_fault(&self) -> bool {
        self.last_fault.borrow().is_some()
    }

    // ── Engine notifications ──────────────────────────────────────────────

    /// An engine reports a script error.  Converts the 0-based position to
    /// 1-based and overwrites any earlier fault.
    pub fn on_script_error(&self, report: &ErrorReport) {
        let fault = ScriptFault::new(
            report.source_name.clone(),
            report.code,
            report.line.saturating_add(1),
            report.column.saturating_add(1),
            report.description.clone(),
            report.source_line(),
        );
        trace!(line = fault.line, column = fault.column, code = fault.code, "script error");
        *self.last_fault.borrow_mut() = Some(fault);
    }

    /// Execution is about to enter script code.  Drops any fault left over
    /// from analysis so it is not attributed to the new call.
    pub fn on_enter_script(&self) {
        trace!("enter script");
        self.clear_fault();
    }

    pub fn on_leave_script(&self) {
        trace!("leave script");
    }

    pub fn on_state_change(&self, state: EngineState) {
        trace!(?state, "engine state change");
    }

    pub fn on_script_terminate(&self) {
        trace!("script terminated");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;

    fn report(line: u32, column: u32) -> ErrorReport {
        ErrorReport {
            source_name: "SyntaxError".into(),
            code: codes::SYNTAX,
            description: "unexpected token".into(),
            line,
            column,
            source_text: Some("a\nb = ;\n".into()),
        }
    }

    #[test]
    fn error_positions_become_one_based() {
        let site = ScriptSite::new();
        site.on_script_error(&report(1, 4));
        let f = site.take_fault().unwrap();
        assert_eq!((f.line, f.column), (2, 5));
        assert_eq!(f.source_line.as_deref(), Some("b = ;"));
        assert!(!site.has_fault());
    }

    #[test]
    fn later_error_overwrites_earlier() {
        let site = ScriptSite::new();
        site.on_script_error(&report(0, 0));
        site.on_script_error(&report(1, 0));
        assert_eq!(site.take_fault().unwrap().line, 2);
        assert!(site.take_fault().is_none());
    }

    #[test]
    fn enter_script_clears_fault() {
        let site = ScriptSite::new();
        site.on_script_error(&report(0, 0));
        site.on_enter_script();
        assert!(!site.has_fault());
    }

    #[test]
    fn missing_source_line_is_tolerated() {
        let site = ScriptSite::new();
        site.on_script_error(&ErrorReport { source_text: None, ..report(0, 0) });
        assert!(site.take_fault().unwrap().source_line.is_none());
    }

    #[test]
    fn items_overwrite_silently() {
        let site = ScriptSite::new();
        site.insert_item("x", Value::from(1));
        site.insert_item("x", Value::from(2));
        assert_eq!(site.item("x"), Some(Value::Number(2.0)));
        assert_eq!(site.item_names(), vec!["x".to_owned()]);
        assert!(site.item("y").is_none());
    }
}
