//! The compile task: many template files in, one bundle file out.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use crate::bundle::{template_name, Bundle, BundleError};
use crate::compiler::{TemplateCompiler, TemplateSettings};
use crate::error::HostError;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("no template sources given")]
    NoSources,
    #[error("no output file given")]
    NoOutput,
    #[error("output file `{}` is also a template source", .0.display())]
    OutputIsSource(PathBuf),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Bundle(#[from] BundleError),
    #[error("{}: {source}", path.display())]
    Template {
        path: PathBuf,
        #[source]
        source: HostError,
    },
    #[error(transparent)]
    Host(#[from] HostError),
}

impl TaskError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        TaskError::Io { path: path.to_owned(), source }
    }
}

/// One run of the precompiler.
#[derive(Debug, Clone, Default)]
pub struct CompileTask {
    pub sources: Vec<PathBuf>,
    pub output: PathBuf,
    /// Dot-separated global path; empty means `JST`.
    pub namespace: String,
    pub settings: TemplateSettings,
}

impl CompileTask {
    /// Check the task parameters without touching any file.
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.sources.is_empty() {
            return Err(TaskError::NoSources);
        }
        if self.output.as_os_str().is_empty() {
            return Err(TaskError::NoOutput);
        }
        let output = self.output.to_string_lossy().to_lowercase();
        if self.sources.iter().any(|s| s.to_string_lossy().to_lowercase() == output) {
            return Err(TaskError::OutputIsSource(self.output.clone()));
        }
        Ok(())
    }

    /// Compile every source into the bundle text, in input order.
    pub fn render(&self) -> Result<String, TaskError> {
        self.validate()?;
        let mut bundle = Bundle::new(&self.namespace)?;
        let compiler = TemplateCompiler::new()?;
        compiler.configure(&self.settings)?;

        for path in &self.sources {
            let name = template_name(path)?;
            let text = std::fs::read_to_string(path).map_err(|e| TaskError::io(path, e))?;
            let compiled = compiler
                .compile(&text)
                .map_err(|source| TaskError::Template { path: path.clone(), source })?;
            debug!(path = %path.display(), name, "template compiled");
            bundle.push(&name, &compiled);
        }
        Ok(bundle.finish())
    }

    /// Compile and write the output file.  Returns the template count.
    ///
    /// The file is written to a temporary sibling and renamed into place, so
    /// a failed run leaves any previous output untouched.
    pub fn run(&self) -> Result<usize, TaskError> {
        let text = self.render()?;
        write_atomic(&self.output, text.as_bytes())?;
        info!("Compiled {} templates to {}", self.sources.len(), self.output.display());
        Ok(self.sources.len())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), TaskError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| TaskError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| TaskError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| TaskError::io(path, e.error))?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn task(sources: &[&str], output: &str) -> CompileTask {
        CompileTask {
            sources: sources.iter().map(PathBuf::from).collect(),
            output: PathBuf::from(output),
            ..Default::default()
        }
    }

    #[test]
    fn needs_sources() {
        assert!(matches!(task(&[], "out.js").validate(), Err(TaskError::NoSources)));
    }

    #[test]
    fn needs_output() {
        assert!(matches!(task(&["a.tpl"], "").validate(), Err(TaskError::NoOutput)));
    }

    #[test]
    fn output_must_differ_from_sources_ignoring_case() {
        let t = task(&["views/A.tpl", "b.tpl"], "VIEWS/a.TPL");
        assert!(matches!(t.validate(), Err(TaskError::OutputIsSource(_))));
        assert!(task(&["a.tpl"], "a.js").validate().is_ok());
    }

    #[test]
    fn validation_runs_before_any_read() {
        let t = task(&["does/not/exist.tpl"], "does/not/exist.tpl");
        assert!(matches!(t.run(), Err(TaskError::OutputIsSource(_))));
    }

    #[test]
    fn atomic_write_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.js");
        std::fs::write(&out, "old").unwrap();
        write_atomic(&out, b"new").unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "new");
    }

    #[cfg(feature = "javascript")]
    #[test]
    fn missing_source_is_io_error_and_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.js");
        let t = CompileTask {
            sources: vec![dir.path().join("missing.tpl")],
            output: out.clone(),
            ..Default::default()
        };
        assert!(matches!(t.run(), Err(TaskError::Io { .. })));
        assert!(!out.exists());
    }

    #[cfg(feature = "javascript")]
    #[test]
    fn run_writes_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("greet.tpl");
        std::fs::write(&src, "Hello <%= name %>").unwrap();
        let out = dir.path().join("templates.js");
        let t = CompileTask {
            sources: vec![src],
            output: out.clone(),
            namespace: "App.JST".into(),
            ..Default::default()
        };
        assert_eq!(t.run().unwrap(), 1);
        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.starts_with("(function(global) {\n"));
        assert!(text.contains("global.App.JST = global.App.JST || {};"));
        assert!(text.contains("global.App.JST[\"greet\"] = function(obj){"));
        assert!(text.ends_with("})(this);"));
    }
}
