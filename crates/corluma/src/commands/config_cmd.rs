//! Config subcommand handlers.

use corluma_config::{self as config, Config};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::util;

/// TOML view of the effective config, headed by where it came from.
fn format_config(cfg: &Config) -> Result<String, CliError> {
    let body = toml::to_string_pretty(cfg).map_err(|e| CliError::Render(e.to_string()))?;
    Ok(format!(
        "# file: {}\n# data: {}\n\n{body}",
        config::config_path().display(),
        cfg.data_dir().display()
    ))
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = util::load_config()?;
            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => format_config(&cfg)?,
                format => output::render_single(
                    format,
                    &cfg,
                    |_| String::new(),
                    |_| String::new(),
                )?,
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Init { force } => {
            let path = config::config_path();
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            config::save_config(&Config::default())?;
            if !global.quiet {
                eprintln!("Wrote default configuration to {}", path.display());
            }
            Ok(())
        }
    }
}
