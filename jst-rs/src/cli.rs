//! Command-line argument parsing.
//!
//! Usage:
//!   jst [-c <file> | --no-config] [-n <ns>] [--interpolate <re>]
//!       [--evaluate <re>] [--escape <re>] [-v...] -o <output> <source>...

use std::path::PathBuf;

use clap::Parser;

use crate::compiler::TemplateSettings;
use crate::config::Config;
use crate::task::CompileTask;

// ── Public types ──────────────────────────────────────────────────────────────

/// Precompile underscore-style templates into one JavaScript file.
#[derive(Debug, Parser)]
#[command(name = "jst", version, long_about = None)]
pub struct CliArgs {
    /// Template files, in output order
    #[arg(value_name = "SOURCE")]
    pub sources: Vec<PathBuf>,

    /// File to write the bundle to
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Dot-separated global namespace for the templates [default: JST]
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Interpolation delimiter regex, e.g. "\{\{(.+?)\}\}"
    #[arg(long, value_name = "REGEX")]
    pub interpolate: Option<String>,

    /// Evaluation delimiter regex
    #[arg(long, value_name = "REGEX")]
    pub evaluate: Option<String>,

    /// HTML-escaping interpolation delimiter regex
    #[arg(long, value_name = "REGEX")]
    pub escape: Option<String>,

    /// Config file to load instead of searching
    #[arg(short, long, value_name = "FILE", conflicts_with = "no_config")]
    pub config: Option<PathBuf>,

    /// Do not load any config file
    #[arg(long)]
    pub no_config: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl CliArgs {
    /// Default tracing filter for the chosen verbosity.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Build the task, letting flags override `config`.
    pub fn into_task(self, config: Config) -> CompileTask {
        CompileTask {
            sources: self.sources,
            output: self.output.or(config.output).unwrap_or_default(),
            namespace: self.namespace.or(config.namespace).unwrap_or_default(),
            settings: TemplateSettings {
                interpolate: self.interpolate.or(config.settings.interpolate),
                evaluate: self.evaluate.or(config.settings.evaluate),
                escape: self.escape.or(config.settings.escape),
            },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("jst").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn sources_and_output() {
        let a = parse(&["-o", "out.js", "a.tpl", "b.tpl"]);
        assert_eq!(a.sources, [PathBuf::from("a.tpl"), PathBuf::from("b.tpl")]);
        assert_eq!(a.output, Some(PathBuf::from("out.js")));
        assert_eq!(a.log_level(), "info");
    }

    #[test]
    fn verbosity_counts() {
        assert_eq!(parse(&["-v"]).log_level(), "debug");
        assert_eq!(parse(&["-v", "-v", "-v"]).log_level(), "trace");
    }

    #[test]
    fn config_conflicts_with_no_config() {
        let r = CliArgs::try_parse_from(["jst", "-c", "x", "--no-config", "a.tpl"]);
        assert!(r.is_err());
    }

    #[test]
    fn flags_override_config() {
        let config = Config {
            namespace: Some("FromFile".into()),
            output: Some(PathBuf::from("file.js")),
            settings: TemplateSettings {
                interpolate: Some("file-i".into()),
                evaluate: Some("file-e".into()),
                escape: None,
            },
        };
        let t = parse(&["-n", "Flag", "--interpolate", "flag-i", "a.tpl"]).into_task(config);
        assert_eq!(t.namespace, "Flag");
        assert_eq!(t.output, PathBuf::from("file.js"));
        assert_eq!(t.settings.interpolate.as_deref(), Some("flag-i"));
        assert_eq!(t.settings.evaluate.as_deref(), Some("file-e"));
        assert!(t.settings.escape.is_none());
    }

    #[test]
    fn missing_output_stays_empty_for_validation() {
        let t = parse(&["a.tpl"]).into_task(Config::default());
        assert!(t.output.as_os_str().is_empty());
        assert!(t.validate().is_err());
    }
}
