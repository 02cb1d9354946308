use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use jst::cli::CliArgs;
use jst::config::{self, Config};

fn main() {
    let args = CliArgs::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_level())),
        )
        .init();

    // ── Load config (flags override it) ───────────────────────────────────────
    let config = if args.no_config {
        Config::default()
    } else {
        match config::resolve_config(args.config.as_deref()) {
            Some(path) => match Config::load_file(&path) {
                Ok((cfg, errors)) => {
                    for e in errors {
                        warn!("{}: {e}", path.display());
                    }
                    cfg
                }
                Err(e) => {
                    eprintln!("jst: {}: {e}", path.display());
                    std::process::exit(1);
                }
            },
            None => Config::default(),
        }
    };

    // ── Compile ───────────────────────────────────────────────────────────────
    let task = args.into_task(config);
    if let Err(e) = task.run() {
        eprintln!("jst: {e}");
        std::process::exit(1);
    }
}
