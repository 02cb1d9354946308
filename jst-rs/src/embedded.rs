//! Embedded copies of the `scripts/` template library.
//!
//! The files are baked into the binary at compile time via `include_str!()`
//! so the compiler never touches the disk to find its own library.
//!
//! # Load order
//! 1. `underscore.js`          → `_`, `_.template`, `_.templateSettings`
//! 2. `underscore.compile.js`  → `compile`, `setTemplateSettings` (uses 1)

/// A single embedded script file.
pub struct EmbeddedFile {
    pub name: &'static str,
    pub content: &'static str,
}

/// All embedded scripts, in dependency order.
pub static EMBEDDED_SCRIPTS: &[EmbeddedFile] = &[
    EmbeddedFile { name: "underscore.js",         content: include_str!("../scripts/underscore.js") },
    EmbeddedFile { name: "underscore.compile.js", content: include_str!("../scripts/underscore.compile.js") },
];

/// Look up an embedded script by bare file name.
pub fn get_embedded(name: &str) -> Option<&'static str> {
    EMBEDDED_SCRIPTS.iter().find(|f| f.name == name).map(|f| f.content)
}

/// Iterator over all embedded scripts as `(name, content)` pairs.
pub fn all_embedded() -> impl Iterator<Item = (&'static str, &'static str)> {
    EMBEDDED_SCRIPTS.iter().map(|f| (f.name, f.content))
}

/// The full library text: every script, in load order, newline separated.
pub fn library_source() -> String {
    let mut out = String::new();
    for (_, content) in all_embedded() {
        out.push_str(content);
        if !content.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
