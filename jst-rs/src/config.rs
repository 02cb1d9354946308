//! `.jstrc` configuration file parser.
//!
//! | Line                  | Action                                  |
//! |-----------------------|-----------------------------------------|
//! | `key = value`         | set `key` (value may be double-quoted)  |
//! | `; …` or `# …`        | comment, ignored                        |
//! | blank                 | ignored                                 |
//!
//! Recognised keys: `namespace`, `output`, `interpolate`, `evaluate`,
//! `escape`.  Command-line flags override anything set here.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use thiserror::Error;

use crate::compiler::TemplateSettings;

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug, Error)]
#[error("line {line}: {message}")]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

/// Settings read from a config file.  `None` means "not set here".
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Config {
    pub namespace: Option<String>,
    pub output: Option<PathBuf>,
    pub settings: TemplateSettings,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config string.
    ///
    /// Bad lines are skipped and reported; everything else still loads.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                errors.push(ConfigError { line: lineno, message: format!("expected `key = value`, got `{line}`") });
                continue;
            };
            let key = key.trim();
            let value = match unquote(value.trim()) {
                Ok(v) => v,
                Err(msg) => {
                    errors.push(ConfigError { line: lineno, message: msg });
                    continue;
                }
            };

            match key.to_ascii_lowercase().as_str() {
                "namespace" => config.namespace = Some(value),
                "output" => config.output = Some(PathBuf::from(value)),
                "interpolate" => config.settings.interpolate = Some(value),
                "evaluate" => config.settings.evaluate = Some(value),
                "escape" => config.settings.escape = Some(value),
                _ => errors.push(ConfigError { line: lineno, message: format!("unknown key `{key}`") }),
            }
        }

        (config, errors)
    }

    /// Read and parse a config file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }
}

/// Strip one pair of surrounding double quotes, honouring `\"` and `\\`
/// inside them.  Unquoted values are returned as-is.
fn unquote(s: &str) -> Result<String, String> {
    let Some(inner) = s.strip_prefix('"') else {
        return Ok(s.to_owned());
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some(c @ ('"' | '\\')) => out.push(c),
                Some(c) => {
                    out.push('\\');
                    out.push(c);
                }
                None => break,
            },
            '"' => {
                return if chars.as_str().trim().is_empty() {
                    Ok(out)
                } else {
                    Err(format!("trailing text after quoted value `{s}`"))
                };
            }
            c => out.push(c),
        }
    }
    Err(format!("unterminated quote in `{s}`"))
}

// ── File resolution ───────────────────────────────────────────────────────────

/// Name of the per-directory config file.
pub const LOCAL_CONFIG: &str = ".jstrc";

/// Platform config file: `<config dir>/jst/config`.
pub fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "jst").map(|d| d.config_dir().join("config"))
}

/// Find the config file to load: `explicit`, else `./.jstrc`, else the
/// platform config file, whichever exists first.
pub fn resolve_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_owned());
    }
    let local = PathBuf::from(LOCAL_CONFIG);
    if local.is_file() {
        return Some(local);
    }
    user_config_path().filter(|p| p.is_file())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
