//! Device command handlers.
//!
//! These work on the saved device files only; nothing is probed.

use serde::Serialize;
use tabled::Tabled;

use corluma_core::{Bucket, ConnectionRecord, DiscoveryEngine, DiscoverySnapshot, ProtocolFamily};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Listing model ───────────────────────────────────────────────────

/// A record plus the bucket it was in, when that is meaningful.
#[derive(Debug, Serialize)]
pub struct DeviceEntry<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Bucket>,
    #[serde(flatten)]
    pub record: &'a ConnectionRecord,
}

impl<'a> DeviceEntry<'a> {
    /// Every record of a live snapshot, found first.
    pub fn from_snapshot(snapshot: &'a DiscoverySnapshot) -> impl Iterator<Item = Self> {
        snapshot.records().map(|(bucket, record)| Self {
            status: Some(bucket),
            record,
        })
    }

    /// A saved record; its bucket only means "not seen yet".
    pub fn saved(record: &'a ConnectionRecord) -> Self {
        Self {
            status: None,
            record,
        }
    }
}

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
pub struct DeviceRow {
    #[tabled(rename = "Family")]
    family: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Serial")]
    serial: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Paired")]
    paired: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Model")]
    model: String,
}

impl From<&DeviceEntry<'_>> for DeviceRow {
    fn from(e: &DeviceEntry<'_>) -> Self {
        let r = e.record;
        Self {
            family: r.family.to_string(),
            name: r.label().to_owned(),
            serial: dash(r.serial()),
            address: address(r),
            paired: if r.has_token() { "yes" } else { "no" }.into(),
            status: e
                .status
                .map_or_else(|| "saved".into(), |b| b.to_string()),
            model: dash(&r.model),
        }
    }
}

fn dash(s: &str) -> String {
    if s.is_empty() { "-".into() } else { s.to_owned() }
}

fn address(r: &ConnectionRecord) -> String {
    if r.ip.is_empty() {
        "-".into()
    } else {
        format!("{}:{}", r.ip, r.port)
    }
}

/// Identifier for `-o plain`.
pub fn entry_id(e: &DeviceEntry<'_>) -> String {
    e.record.key().to_owned()
}

fn detail(e: &DeviceEntry<'_>) -> String {
    let r = e.record;
    let mut lines = vec![
        format!("Name:         {}", r.label()),
        format!("Family:       {}", r.family),
        format!("Serial:       {}", dash(r.serial())),
        format!("Address:      {}", address(r)),
        format!("Paired:       {}", if r.has_token() { "yes" } else { "no" }),
        format!("Auth state:   {}", r.auth_state),
        format!("Hardware:     {}", dash(&r.hardware_name)),
        format!("Model:        {}", dash(&r.model)),
        format!("Firmware:     {}", dash(&r.firmware)),
    ];
    if !r.manufacturer.is_empty() {
        lines.push(format!("Manufacturer: {}", r.manufacturer));
    }
    if !r.mac_address.is_empty() {
        lines.push(format!("MAC:          {}", r.mac_address));
    }
    if !r.api_version.is_empty() {
        lines.push(format!("API version:  {}", r.api_version));
    }
    if let Some(seen) = r.last_seen {
        lines.push(format!("Last seen:    {}", seen.format("%Y-%m-%d %H:%M:%S UTC")));
    }
    if !r.lights.is_empty() {
        lines.push(format!("Lights:       {}", r.lights.len()));
        for light in &r.lights {
            lines.push(format!("  {:>3}  {}  ({})", light.index, light.name, light.uniqueid));
        }
    }
    lines.join("\n")
}

/// Render live or saved entries in the selected format.
pub fn render_entries(global: &GlobalOpts, entries: &[DeviceEntry<'_>]) -> Result<(), CliError> {
    let out = output::render_list(
        global.output,
        entries,
        |e: &DeviceEntry<'_>| DeviceRow::from(e),
        entry_id,
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: DevicesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = util::load_config()?;

    match args.command {
        DevicesCommand::List { family } => {
            let engines = util::selected_families(family)
                .into_iter()
                .map(|f| util::open_engine(&cfg, f))
                .collect::<Result<Vec<_>, _>>()?;
            let snapshots: Vec<_> = engines.iter().map(DiscoveryEngine::snapshot).collect();
            let entries: Vec<_> = snapshots
                .iter()
                .flat_map(|s| s.records().map(|(_, r)| DeviceEntry::saved(r)))
                .collect();
            render_entries(global, &entries)
        }

        DevicesCommand::Get { family, key } => {
            let family = ProtocolFamily::from(family);
            let engine = util::open_engine(&cfg, family)?;
            let snapshot = engine.snapshot();
            let record = find(&snapshot, &key).ok_or_else(|| not_found(family, &key))?;
            let out =
                output::render_single(global.output, &DeviceEntry::saved(record), detail, entry_id)?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Remove { family, key } => {
            let family = ProtocolFamily::from(family);
            let mut engine = util::open_engine(&cfg, family)?;
            let label = find(&engine.snapshot(), &key)
                .map(|r| r.label().to_owned())
                .ok_or_else(|| not_found(family, &key))?;

            let prompt = format!("Forget {family} device '{label}'?");
            if !util::confirm(&prompt, "devices remove", global.yes)? {
                return Ok(());
            }
            let removed = engine.remove(&key).ok_or_else(|| not_found(family, &key))?;
            if !global.quiet {
                eprintln!("Removed {} ({})", removed.label(), removed.key());
            }
            Ok(())
        }

        DevicesCommand::Rename { family, key, name } => {
            let family = ProtocolFamily::from(family);
            if name.trim().is_empty() {
                return Err(CliError::Validation {
                    field: "name".into(),
                    reason: "cannot be empty".into(),
                });
            }
            let mut engine = util::open_engine(&cfg, family)?;
            if find(&engine.snapshot(), &key).is_none() {
                return Err(not_found(family, &key));
            }
            if engine.rename(&key, &name) {
                if !global.quiet {
                    eprintln!("Renamed {key} to '{}'", name.trim());
                }
            } else if !global.quiet {
                eprintln!("{key} is already named '{}'", name.trim());
            }
            Ok(())
        }
    }
}

/// Record named by serial or IP.
fn find<'s>(snapshot: &'s DiscoverySnapshot, key: &str) -> Option<&'s ConnectionRecord> {
    snapshot
        .records()
        .map(|(_, r)| r)
        .find(|r| r.matches_key(key))
}

fn not_found(family: ProtocolFamily, key: &str) -> CliError {
    CliError::NotFound {
        family: family.to_string(),
        identifier: key.into(),
    }
}
