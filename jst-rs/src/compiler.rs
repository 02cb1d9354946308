//! Template precompiler on top of the embedded template library.
//!
//! | State           | Reached by                       | Operations       |
//! |-----------------|----------------------------------|------------------|
//! | `Uninitialized` | `Default`, failed `load`         | `load`, `close`  |
//! | `Ready`         | `new`, `with_library`, `load`    | all              |
//! | `Closed`        | `close`                          | `close`          |
//!
//! Anything but `Ready` makes `configure`/`compile` fail with
//! [`HostError::Disposed`] before the engine is touched.

use tracing::debug;

use crate::embedded;
use crate::engine::NativeError;
use crate::error::{HostError, Result};
use crate::handle::ParsedHandle;
use crate::session::InterpreterSession;
use crate::value::Value;

/// Engine the embedded library is written for.
pub const LANGUAGE: &str = "jscript";

/// Template delimiter overrides, forwarded to `setTemplateSettings`.
///
/// Each pattern is regular-expression source with one capture group.
/// `None` or an empty string keeps the library's default for that slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateSettings {
    pub interpolate: Option<String>,
    pub evaluate: Option<String>,
    pub escape: Option<String>,
}

impl TemplateSettings {
    /// True when no slot overrides anything.
    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }

    fn entries(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("interpolate", self.interpolate.as_deref()),
            ("evaluate", self.evaluate.as_deref()),
            ("escape", self.escape.as_deref()),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.filter(|s| !s.is_empty()).map(|s| (k, s)))
    }
}

impl From<&TemplateSettings> for Value {
    fn from(settings: &TemplateSettings) -> Self {
        Value::object(settings.entries().map(|(k, v)| (k, Value::from(v))))
    }
}

enum State {
    Uninitialized,
    // Field order is drop order: the handle goes before its session.
    Ready { handle: ParsedHandle, session: InterpreterSession },
    Closed,
}

/// Compiles template text to JavaScript function source.
pub struct TemplateCompiler {
    state: State,
}

impl TemplateCompiler {
    /// Start a session and load the embedded library.
    pub fn new() -> Result<Self> {
        let mut compiler = Self::default();
        compiler.load()?;
        Ok(compiler)
    }

    /// Start `language` and load `sources` (concatenated in order) in place
    /// of the embedded library.  The sources must define `compile` and
    /// `setTemplateSettings`.
    pub fn with_library(language: &str, sources: &[&str]) -> Result<Self> {
        let mut compiler = Self::default();
        compiler.load_from(language, &sources.join("\n"))?;
        Ok(compiler)
    }

    /// Move from `Uninitialized` to `Ready` with the embedded library.
    pub fn load(&mut self) -> Result<()> {
        self.load_from(LANGUAGE, &embedded::library_source())
    }

    fn load_from(&mut self, language: &str, library: &str) -> Result<()> {
        if !matches!(self.state, State::Uninitialized) {
            return Err(HostError::Disposed("template compiler"));
        }
        // On failure the session drops here, releasing the engine.
        let mut session = InterpreterSession::start(language)?;
        let handle = session.parse_module(library)?;
        debug!(language, bytes = library.len(), "template library loaded");
        self.state = State::Ready { handle, session };
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready { .. })
    }

    fn handle(&self) -> Result<&ParsedHandle> {
        match &self.state {
            State::Ready { handle, .. } => Ok(handle),
            _ => Err(HostError::Disposed("template compiler")),
        }
    }

    /// Replace the template delimiters used by later compiles.
    pub fn configure(&self, settings: &TemplateSettings) -> Result<()> {
        let handle = self.handle()?;
        handle.invoke("setTemplateSettings", &[Value::from(settings)])?;
        debug!(?settings, "template settings applied");
        Ok(())
    }

    /// Compile one template to the source text of its render function.
    pub fn compile(&self, template: &str) -> Result<String> {
        let handle = self.handle()?;
        match handle.invoke("compile", &[Value::from(template)])? {
            Value::String(source) => Ok(source),
            other => Err(HostError::NativeCallFailure(NativeError::Conversion(format!(
                "compile returned {}, expected string",
                other.type_name()
            )))),
        }
    }

    /// Release the library handle, then the session.  Idempotent.
    pub fn close(&mut self) {
        if let State::Ready { mut handle, mut session } =
            std::mem::replace(&mut self.state, State::Closed)
        {
            handle.close();
            session.close();
            debug!("template compiler closed");
        }
        self.state = State::Closed;
    }
}

impl Default for TemplateCompiler {
    fn default() -> Self {
        Self { state: State::Uninitialized }
    }
}

impl Drop for TemplateCompiler {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TemplateCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            State::Uninitialized => "Uninitialized",
            State::Ready { .. } => "Ready",
            State::Closed => "Closed",
        };
        f.debug_struct("TemplateCompiler").field("state", &state).finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_value_omits_empty_slots() {
        let s = TemplateSettings {
            interpolate: Some(r"\{\{(.+?)\}\}".into()),
            evaluate: Some(String::new()),
            escape: None,
        };
        let v = Value::from(&s);
        assert_eq!(v.get("interpolate").and_then(Value::as_str), Some(r"\{\{(.+?)\}\}"));
        assert!(v.get("evaluate").is_none());
        assert!(v.get("escape").is_none());
        assert!(!s.is_empty());
        assert!(TemplateSettings::default().is_empty());
    }

    #[test]
    fn uninitialized_compiler_is_disposed() {
        let c = TemplateCompiler::default();
        assert!(!c.is_ready());
        assert!(matches!(c.compile("x"), Err(HostError::Disposed(_))));
        assert!(matches!(
            c.configure(&TemplateSettings::default()),
            Err(HostError::Disposed(_))
        ));
    }

    #[test]
    fn unknown_language_leaves_uninitialized() {
        let mut c = TemplateCompiler::default();
        assert!(matches!(c.load_from("cobol", ""), Err(HostError::EngineNotFound(_))));
        assert!(!c.is_ready());
    }

    #[cfg(feature = "javascript")]
    mod javascript {
        use super::*;

        const UPPER: &str = "var compile = function(t) { return t.toUpperCase(); };\n\
                             var setTemplateSettings = function(s) {};";

        #[test]
        fn stub_library_compile() {
            let c = TemplateCompiler::with_library(LANGUAGE, &[UPPER]).unwrap();
            assert_eq!(c.compile("\"Hello\"").unwrap(), "\"HELLO\"");
            c.configure(&TemplateSettings::default()).unwrap();
        }

        #[test]
        fn broken_library_is_script_fault() {
            let err = TemplateCompiler::with_library(LANGUAGE, &["var compile = ;"]).unwrap_err();
            assert!(err.fault().is_some());
        }

        #[test]
        fn non_string_result_is_conversion_failure() {
            let c = TemplateCompiler::with_library(
                LANGUAGE,
                &["var compile = function(t) { return 1; };"],
            )
            .unwrap();
            assert!(matches!(
                c.compile("x"),
                Err(HostError::NativeCallFailure(NativeError::Conversion(_)))
            ));
        }

        #[test]
        fn embedded_library_compiles_templates() {
            let c = TemplateCompiler::new().unwrap();
            let src = c.compile("Hello <%= name %>!").unwrap();
            assert!(src.starts_with("function(obj){"), "{src}");
            assert!(src.contains("name"));
            assert!(src.contains("Hello "));
        }

        #[test]
        fn escape_delimiter_uses_escape_helper() {
            let c = TemplateCompiler::new().unwrap();
            let src = c.compile("<%- html %>").unwrap();
            assert!(src.contains("_.escape"), "{src}");
        }

        #[test]
        fn configure_changes_delimiters() {
            let c = TemplateCompiler::new().unwrap();
            c.configure(&TemplateSettings {
                interpolate: Some(r"\{\{(.+?)\}\}".into()),
                ..Default::default()
            })
            .unwrap();
            let src = c.compile("Hi {{ who }}").unwrap();
            assert!(src.contains("who"));
            assert!(!src.contains("{{"), "{src}");
        }

        #[test]
        fn template_error_is_script_fault() {
            let c = TemplateCompiler::new().unwrap();
            let err = c.compile("<% if ( %>").unwrap_err();
            assert!(err.fault().is_some(), "{err:?}");
        }

        #[test]
        fn closed_compiler_is_disposed() {
            let mut c = TemplateCompiler::new().unwrap();
            c.close();
            c.close();
            assert!(matches!(c.compile("x"), Err(HostError::Disposed(_))));
        }
    }
}
