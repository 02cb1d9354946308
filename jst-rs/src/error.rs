//! Host-side error taxonomy.
//!
//! Engines report failures as [`NativeError`]; the session decides whether a
//! failed call surfaces as a structured [`ScriptFault`] (the site's error
//! callback fired during the call) or as [`HostError::NativeCallFailure`].

use thiserror::Error;

use crate::engine::{Capabilities, NativeError};

/// Numeric error codes carried by [`ScriptFault::code`].
///
/// Values follow the Windows Script `0x800Axxxx` numbering so faults read the
/// same as the engines template authors are used to.
pub mod codes {
    /// Syntax error.
    pub const SYNTAX: i32 = 0x800A_03EA_u32 as i32;
    /// Reference to an undefined identifier.
    pub const UNDEFINED_IDENTIFIER: i32 = 0x800A_1391_u32 as i32;
    /// Operation applied to a value of the wrong type.
    pub const TYPE_MISMATCH: i32 = 0x800A_000D_u32 as i32;
    /// Argument or index out of range.
    pub const OUT_OF_RANGE: i32 = 0x800A_0005_u32 as i32;
    /// A value was thrown and nothing caught it.
    pub const UNCAUGHT: i32 = 0x800A_139E_u32 as i32;

    /// Map an engine error class name (`SyntaxError`, `TypeError`, ...) to a code.
    pub fn for_error_name(name: &str) -> i32 {
        match name {
            "SyntaxError" | "syntax error" => SYNTAX,
            "ReferenceError" => UNDEFINED_IDENTIFIER,
            "TypeError" => TYPE_MISMATCH,
            "RangeError" | "URIError" => OUT_OF_RANGE,
            _ => UNCAUGHT,
        }
    }
}

/// A structured interpreter error: position, code, description, source line.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ScriptFault {
    pub message: String,
    /// Engine-reported error class (`SyntaxError`, `runtime error`, ...).
    pub source_name: String,
    pub code: i32,
    /// 1-based.
    pub line: u32,
    /// 1-based.
    pub column: u32,
    pub description: String,
    /// The offending source line, when the engine could provide it.
    pub source_line: Option<String>,
}

impl ScriptFault {
    /// Build a fault from 1-based coordinates, composing the message.
    pub fn new(
        source_name: impl Into<String>,
        code: i32,
        line: u32,
        column: u32,
        description: impl Into<String>,
        source_line: Option<String>,
    ) -> Self {
        let source_name = source_name.into();
        let description = description.into();
        let source_line = source_line.filter(|s| !s.is_empty());
        let mut message = format!(
            "Script exception: {source_name}. Error number {code} (0x{code:08X}): \
             {description} at line {line}, column {column}."
        );
        if let Some(text) = &source_line {
            message.push_str(&format!(" Source line: '{text}'."));
        }
        Self { message, source_name, code, line, column, description, source_line }
    }
}

/// Errors surfaced by the session, parsed handles and the template compiler.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("no scripting engine is registered as `{0}`")]
    EngineNotFound(String),

    #[error("`{language}` is not a usable scripting engine (missing {missing:?})")]
    EngineTypeMismatch { language: String, missing: Capabilities },

    #[error("{0} must not be empty")]
    InvalidName(&'static str),

    #[error(transparent)]
    ScriptFault(#[from] ScriptFault),

    #[error("native call failed: {0}")]
    NativeCallFailure(#[source] NativeError),

    #[error("{0} is not open")]
    Disposed(&'static str),
}

impl HostError {
    /// The structured fault, if this error carries one.
    pub fn fault(&self) -> Option<&ScriptFault> {
        match self {
            HostError::ScriptFault(f) => Some(f),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, HostError>;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_includes_source_line_when_present() {
        let f = ScriptFault::new("SyntaxError", codes::SYNTAX, 3, 7, "unexpected token", Some("var = ;".into()));
        assert_eq!(
            f.message,
            "Script exception: SyntaxError. Error number -2146827286 (0x800A03EA): \
             unexpected token at line 3, column 7. Source line: 'var = ;'."
        );
    }

    #[test]
    fn empty_source_line_is_absent() {
        let f = ScriptFault::new("TypeError", codes::TYPE_MISMATCH, 1, 1, "x is not a function", Some(String::new()));
        assert!(f.source_line.is_none());
        assert!(f.message.ends_with("at line 1, column 1."));
    }

    #[test]
    fn error_names_map_to_codes() {
        assert_eq!(codes::for_error_name("SyntaxError"), codes::SYNTAX);
        assert_eq!(codes::for_error_name("ReferenceError"), codes::UNDEFINED_IDENTIFIER);
        assert_eq!(codes::for_error_name("Error"), codes::UNCAUGHT);
    }

    #[test]
    fn fault_accessor() {
        let f = ScriptFault::new("Error", codes::UNCAUGHT, 1, 1, "boom", None);
        let e = HostError::from(f.clone());
        assert_eq!(e.fault(), Some(&f));
        assert!(HostError::Disposed("session").fault().is_none());
        assert_eq!(e.to_string(), f.message);
    }
}
