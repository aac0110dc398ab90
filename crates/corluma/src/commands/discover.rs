//! `corluma discover`: run discovery until Ctrl-C or a deadline.

use std::time::Duration;

use tracing::{debug, warn};

use corluma_core::{DiscoveryService, DiscoverySnapshot};

use crate::cli::{DiscoverArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::devices::{self, DeviceEntry};
use super::util;

pub async fn handle(args: DiscoverArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = util::load_config()?;
    let families = args.families().unwrap_or_else(|| cfg.enabled_families());
    if families.is_empty() {
        return Err(CliError::Validation {
            field: "families".into(),
            reason: "both hue and nanoleaf are disabled in the config file".into(),
        });
    }
    if !args.ips.is_empty() && families.len() > 1 {
        return Err(CliError::Validation {
            field: "ip".into(),
            reason: "manual addresses need --hue or --nanoleaf".into(),
        });
    }

    let mut network = cfg.network_config()?;
    network.disable_broadcast |= args.no_broadcast;

    let mut configs = Vec::with_capacity(families.len());
    for family in families {
        let mut config = cfg.discovery_config(family)?;
        config.manual_ips.extend(args.ips.iter().cloned());
        configs.push(config);
    }

    let service = DiscoveryService::launch(&network, configs).await?;
    // Keep discovery on past the startup grace.
    service.start_all().await?;

    let watchers = watch_states(&service, global);

    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "cannot listen for Ctrl-C");
            }
            debug!("interrupted");
        }
        () = deadline => debug!("discovery duration elapsed"),
    }

    let mut snapshots: Vec<DiscoverySnapshot> = Vec::new();
    for handle in service.handles() {
        snapshots.push(handle.snapshot().await?);
    }
    service.shutdown().await;
    for watcher in watchers {
        let _ = watcher.await;
    }

    let entries: Vec<_> = snapshots.iter().flat_map(DeviceEntry::from_snapshot).collect();
    devices::render_entries(global, &entries)
}

/// Print every state change of every engine to stderr.
///
/// Each watcher ends when its engine task drops the state channel.
fn watch_states(
    service: &DiscoveryService,
    global: &GlobalOpts,
) -> Vec<tokio::task::JoinHandle<()>> {
    let color = output::should_color(global.color);
    let quiet = global.quiet;

    service
        .handles()
        .iter()
        .map(|handle| {
            let family = handle.family();
            let mut rx = handle.subscribe_state();
            tokio::spawn(async move {
                loop {
                    let state = *rx.borrow_and_update();
                    if !quiet {
                        eprintln!(
                            "{family:>8}  {}  {}",
                            output::paint_state(state, color),
                            state.describe()
                        );
                    }
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
            })
        })
        .collect()
}
