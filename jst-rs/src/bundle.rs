//! Assembles compiled templates into one JavaScript file.
//!
//! ```text
//! (function(global) {
//! global.App = global.App || {};
//! global.App.JST = global.App.JST || {};
//! global.App.JST["page"] = function(obj){ ... };
//! })(this);
//! ```

use std::fmt::Write as _;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Namespace used when none is given.
pub const DEFAULT_NAMESPACE: &str = "JST";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BundleError {
    #[error("invalid namespace `{namespace}`: segment `{segment}` is not an identifier")]
    InvalidNamespace { namespace: String, segment: String },
    #[error("cannot derive a template name from `{0}`")]
    NoTemplateName(String),
}

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("valid regex"))
}

/// Template name for a source file: its file name without the extension.
pub fn template_name(path: &Path) -> Result<String, BundleError> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| BundleError::NoTemplateName(path.display().to_string()))
}

/// Escape `s` for use inside a double-quoted JavaScript string.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

/// Output file under construction.
#[derive(Debug, Clone)]
pub struct Bundle {
    namespace: String,
    body: String,
    count: usize,
}

impl Bundle {
    /// Start a bundle for `namespace` (dot separated, empty means
    /// [`DEFAULT_NAMESPACE`]) and write its header guards.
    pub fn new(namespace: &str) -> Result<Self, BundleError> {
        let namespace = if namespace.is_empty() { DEFAULT_NAMESPACE } else { namespace };
        let mut body = String::new();
        let mut prefix = String::new();
        for segment in namespace.split('.') {
            if !identifier_re().is_match(segment) {
                return Err(BundleError::InvalidNamespace {
                    namespace: namespace.to_owned(),
                    segment: segment.to_owned(),
                });
            }
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(segment);
            let _ = writeln!(body, "global.{prefix} = global.{prefix} || {{}};");
        }
        Ok(Self { namespace: namespace.to_owned(), body, count: 0 })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Number of templates added so far.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append one compiled template.
    pub fn push(&mut self, name: &str, compiled: &str) {
        let _ = writeln!(self.body, "global.{}[\"{}\"] = {};", self.namespace, quote(name), compiled);
        self.count += 1;
    }

    /// The complete file text.
    pub fn finish(&self) -> String {
        format!("(function(global) {{\n{}\n}})(this);", self.body)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_namespace_layout() {
        let mut b = Bundle::new("").unwrap();
        b.push("a", "\"HELLO\"");
        b.push("b", "\"HELLO\"");
        assert_eq!(
            b.finish(),
            "(function(global) {\n\
             global.JST = global.JST || {};\n\
             global.JST[\"a\"] = \"HELLO\";\n\
             global.JST[\"b\"] = \"HELLO\";\n\
             \n})(this);"
        );
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn nested_namespace_guards_every_prefix() {
        let b = Bundle::new("App.Views.JST").unwrap();
        let out = b.finish();
        let guards: Vec<&str> = out.lines().filter(|l| l.contains("||")).collect();
        assert_eq!(
            guards,
            [
                "global.App = global.App || {};",
                "global.App.Views = global.App.Views || {};",
                "global.App.Views.JST = global.App.Views.JST || {};",
            ]
        );
        assert!(b.is_empty());
    }

    #[test]
    fn bad_segments_rejected() {
        for ns in ["App..JST", "1st", "a-b", "App."] {
            assert!(Bundle::new(ns).is_err(), "{ns}");
        }
        assert!(Bundle::new("$app._x1").is_ok());
    }

    #[test]
    fn names_are_quoted() {
        let mut b = Bundle::new("JST").unwrap();
        b.push("we\"ird\\", "1");
        assert!(b.finish().contains(r#"global.JST["we\"ird\\"] = 1;"#));
    }

    #[test]
    fn template_name_is_file_stem() {
        assert_eq!(template_name(Path::new("views/user.list.tpl")).unwrap(), "user.list");
        assert_eq!(template_name(Path::new("a.tpl")).unwrap(), "a");
        assert_eq!(template_name(Path::new("noext")).unwrap(), "noext");
        assert!(template_name(Path::new("/")).is_err());
    }
}
