//! Shared helpers for command handlers.

use std::io::IsTerminal;

use corluma_config::Config;
use corluma_core::{DiscoveryEngine, ProtocolFamily};

use crate::cli::FamilyArg;
use crate::error::CliError;

/// Load the config file layered with `CORLUMA_*` env vars.
pub fn load_config() -> Result<Config, CliError> {
    Ok(corluma_config::load_config()?)
}

/// Families named by an optional `--family` filter.
pub fn selected_families(filter: Option<FamilyArg>) -> Vec<ProtocolFamily> {
    filter.map_or_else(
        || vec![ProtocolFamily::Hue, ProtocolFamily::Nanoleaf],
        |f| vec![f.into()],
    )
}

/// Engine over the saved devices of `family`, without starting discovery.
pub fn open_engine(cfg: &Config, family: ProtocolFamily) -> Result<DiscoveryEngine, CliError> {
    let config = cfg.discovery_config(family)?;
    Ok(DiscoveryEngine::new(&config))
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, action: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}
