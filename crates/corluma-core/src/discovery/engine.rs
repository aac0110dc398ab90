// ── Discovery engine ──
//
// Synchronous state machine for one protocol family. It owns the three
// record buckets and the persistence file, plans the probes for each
// timer tick, and folds probe replies and broadcast packets back into
// the buckets. It never performs I/O other than saving the file; the
// async driver in `service` does the networking and calls in here one
// event at a time.

use std::time::{Duration, Instant};

use chrono::Utc;
use corluma_api::{normalize_host, ProbeKind, ProbeOutcome, ProbeRequest, ProbeResponse, ProtocolFamily, SsdpPacket};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::rules::{rules_for, Candidate, ConnectionReply, CredentialReply, DeviceIdentity, FamilyRules};
use crate::config::DiscoveryConfig;
use crate::model::{reduce_state, AuthState, BucketCounts, ConnectionRecord, DiscoveryState};
use crate::store::{Bucket, PersistenceStore, RecordBuckets, Slot};

/// Read-only view of an engine, for front ends.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoverySnapshot {
    pub family: ProtocolFamily,
    pub state: DiscoveryState,
    pub running: bool,
    pub found: Vec<ConnectionRecord>,
    pub not_found: Vec<ConnectionRecord>,
    pub unknown: Vec<ConnectionRecord>,
}

impl DiscoverySnapshot {
    pub fn counts(&self) -> BucketCounts {
        BucketCounts {
            found: self.found.len(),
            not_found: self.not_found.len(),
            unknown: self.unknown.len(),
        }
    }

    /// Every record with its bucket, found first.
    pub fn records(&self) -> impl Iterator<Item = (Bucket, &ConnectionRecord)> {
        self.found
            .iter()
            .map(|r| (Bucket::Found, r))
            .chain(self.not_found.iter().map(|r| (Bucket::NotFound, r)))
            .chain(self.unknown.iter().map(|r| (Bucket::Unknown, r)))
    }
}

#[derive(Debug)]
pub struct DiscoveryEngine {
    rules: Box<dyn FamilyRules>,
    buckets: RecordBuckets,
    store: PersistenceStore,
    directory_interval: Duration,
    last_directory: Option<Instant>,
    running: bool,
    /// Someone asked for discovery to keep running.
    wants_running: bool,
    /// Stop requests are ignored until the startup grace ends.
    grace_active: bool,
    connection_error: bool,
}

impl DiscoveryEngine {
    /// Build an engine and load the family's saved records into the
    /// not-found bucket.
    pub fn new(config: &DiscoveryConfig) -> Self {
        let store = PersistenceStore::new(config.family, &config.save_path);
        Self::with_store(config.family, store, config.directory_interval)
    }

    pub fn with_store(
        family: ProtocolFamily,
        mut store: PersistenceStore,
        directory_interval: Duration,
    ) -> Self {
        let loaded = store.load();
        let mut engine = Self {
            rules: rules_for(family),
            buckets: RecordBuckets::new(),
            store,
            directory_interval,
            last_directory: None,
            running: false,
            wants_running: false,
            grace_active: false,
            connection_error: false,
        };

        for mut record in loaded {
            if record.has_serial()
                && engine
                    .buckets
                    .locate(|r| r.serial() == record.serial())
                    .is_some()
            {
                debug!(serial = record.serial(), "skipping duplicate saved device");
                continue;
            }
            if record.display_name.is_empty() {
                record.display_name = engine.unique_name();
            }
            engine.buckets.push_not_found(record);
        }
        engine
    }

    pub fn family(&self) -> ProtocolFamily {
        self.rules.family()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start polling. Returns `false` if already running.
    pub fn start(&mut self) -> bool {
        self.wants_running = true;
        self.resume()
    }

    /// Stop polling. Ignored while the startup grace is active; the stop
    /// then happens when the grace ends. Returns whether it stopped.
    pub fn stop(&mut self) -> bool {
        self.wants_running = false;
        if !self.running || self.grace_active {
            return false;
        }
        self.running = false;
        info!(family = %self.family(), "discovery stopped");
        true
    }

    /// Force discovery on for the startup window.
    pub fn begin_grace(&mut self) {
        self.grace_active = true;
        self.resume();
    }

    /// End the startup window. Stops unless someone asked to keep
    /// running; returns whether it stopped.
    pub fn finish_grace(&mut self) -> bool {
        self.grace_active = false;
        if self.wants_running {
            false
        } else {
            self.stop()
        }
    }

    fn resume(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        self.last_directory = None;
        info!(family = %self.family(), "discovery started");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn in_grace(&self) -> bool {
        self.grace_active
    }

    /// Record whether the broadcast listener failed to start.
    pub fn set_connection_error(&mut self, failed: bool) {
        self.connection_error = failed;
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> DiscoveryState {
        reduce_state(self.buckets.counts(), self.connection_error)
    }

    pub fn buckets(&self) -> &RecordBuckets {
        &self.buckets
    }

    pub fn snapshot(&self) -> DiscoverySnapshot {
        DiscoverySnapshot {
            family: self.family(),
            state: self.state(),
            running: self.running,
            found: self.buckets.found().cloned().collect(),
            not_found: self.buckets.not_found().to_vec(),
            unknown: self.buckets.unknown().to_vec(),
        }
    }

    pub fn find_by_serial(&self, serial: &str) -> Option<&ConnectionRecord> {
        self.buckets.get_found(serial).or_else(|| {
            let slot = self
                .buckets
                .locate(|r| r.has_serial() && r.serial().eq_ignore_ascii_case(serial))?;
            self.buckets.get(slot)
        })
    }

    pub fn find_by_ip(&self, ip: &str) -> Option<(Bucket, &ConnectionRecord)> {
        let (ip, _) = normalize_host(ip);
        let slot = self.buckets.locate(|r| r.ip == ip)?;
        self.buckets.get(slot).map(|r| (slot.bucket, r))
    }

    /// Whether a found record has exactly this address and token.
    pub fn is_connected(&self, ip: &str, port: u16, token: &str) -> bool {
        self.buckets
            .found()
            .any(|r| r.ip == ip && r.port == port && r.auth_token == token)
    }

    /// `"Bridge N"` / `"Nanoleaf N"` with N above every suffix in use.
    pub fn unique_name(&self) -> String {
        let prefix = self.family().name_prefix();
        let next = self
            .buckets
            .iter()
            .filter_map(|(_, r)| r.display_name.strip_prefix(prefix)?.parse::<u32>().ok())
            .max()
            .map_or(1, |n| n.saturating_add(1));
        format!("{prefix}{next}")
    }

    // ── User edits ───────────────────────────────────────────────────

    /// Track `input` as a not-found record. Returns `false` if the
    /// address is empty or already tracked.
    pub fn add_manual_ip(&mut self, input: &str) -> bool {
        let (ip, port) = normalize_host(input);
        if ip.is_empty() {
            warn!(input, "ignoring empty address");
            return false;
        }
        if self.buckets.locate(|r| r.ip == ip).is_some() {
            debug!(%ip, "address already tracked");
            return false;
        }

        let family = self.family();
        let mut record = ConnectionRecord::new(family, ip, port.unwrap_or(family.default_port()));
        record.display_name = self.unique_name();
        info!(%family, ip = %record.ip, port = record.port, "added manual address");
        self.buckets.push_not_found(record);
        self.persist();
        true
    }

    /// Delete every record named by `key` (serial or IP).
    pub fn remove(&mut self, key: &str) -> Option<ConnectionRecord> {
        let mut removed = None;
        while let Some(slot) = self.buckets.locate(|r| r.matches_key(key)) {
            let record = self.buckets.take(slot);
            removed = removed.or(record);
        }
        if let Some(record) = &removed {
            info!(family = %self.family(), key = record.key(), "removed device");
            self.persist();
        }
        removed
    }

    /// Change the display name of the record named by `key`.
    pub fn rename(&mut self, key: &str, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        let Some(slot) = self.buckets.locate(|r| r.matches_key(key)) else {
            return false;
        };
        let Some(record) = self.buckets.get_mut(slot) else {
            return false;
        };
        if record.display_name == name {
            return false;
        }
        record.display_name = name.to_owned();
        if slot.bucket != Bucket::Unknown {
            self.persist();
        }
        true
    }

    // ── Timer tick ───────────────────────────────────────────────────

    /// Probes to send this tick. Returns nothing while stopped.
    pub fn plan_tick(&mut self, now: Instant) -> Vec<ProbeRequest> {
        if !self.running {
            return Vec::new();
        }
        let family = self.family();
        let mut plan = Vec::new();

        let pending = self
            .buckets
            .not_found()
            .iter()
            .chain(self.buckets.unknown())
            .filter(|r| !r.ip.is_empty());
        for record in pending {
            let request = if usable_token(record) {
                ProbeRequest::test_connection(family, &record.ip, record.port, &record.auth_token)
            } else {
                ProbeRequest::request_credentials(family, &record.ip, record.port)
            };
            push_unique(&mut plan, request);
        }

        // Known tokens at new addresses: the device may have moved.
        let donors: Vec<&ConnectionRecord> = self
            .buckets
            .not_found()
            .iter()
            .filter(|r| usable_token(r))
            .collect();
        let mut targets: Vec<&ConnectionRecord> = self
            .buckets
            .unknown()
            .iter()
            .filter(|r| !r.ip.is_empty())
            .collect();
        if self.rules.cross_tests_pending() {
            targets.extend(
                self.buckets
                    .not_found()
                    .iter()
                    .filter(|r| !r.ip.is_empty() && !r.has_token()),
            );
        }
        for target in targets {
            for donor in donors.iter().filter(|d| d.ip != target.ip) {
                push_unique(
                    &mut plan,
                    ProbeRequest::test_connection(family, &target.ip, target.port, &donor.auth_token),
                );
            }
        }

        if family.has_directory()
            && self
                .last_directory
                .is_none_or(|last| now.duration_since(last) >= self.directory_interval)
        {
            self.last_directory = Some(now);
            plan.push(ProbeRequest::directory(family));
        }

        plan
    }

    // ── Broadcast packets ────────────────────────────────────────────

    /// Fold a broadcast packet in. Returns whether anything changed.
    pub fn on_broadcast(&mut self, packet: &SsdpPacket) -> bool {
        match self.rules.parse_broadcast(packet) {
            Some(candidate) => self.merge_candidate(candidate),
            None => false,
        }
    }

    /// Match a candidate against every bucket: by id or hardware name
    /// first, then by IP; otherwise it becomes a new unknown record.
    pub fn merge_candidate(&mut self, candidate: Candidate) -> bool {
        let family = self.family();
        let port = candidate.port.unwrap_or(family.default_port());

        let same_device = |r: &ConnectionRecord| {
            let by_id = candidate
                .id
                .as_deref()
                .is_some_and(|id| r.has_serial() && r.serial().eq_ignore_ascii_case(id));
            let by_name = candidate
                .hardware_name
                .as_deref()
                .is_some_and(|name| !r.hardware_name.is_empty() && r.hardware_name == name);
            by_id || by_name
        };

        if let Some(slot) = self.buckets.locate(same_device) {
            if self
                .buckets
                .get(slot)
                .is_some_and(|r| r.ip == candidate.ip && r.port == port)
            {
                return false;
            }
            self.move_record(slot, candidate.ip, port);
            return true;
        }

        if let Some(slot) = self.buckets.locate(|r| r.ip == candidate.ip) {
            let Some(record) = self.buckets.get_mut(slot) else {
                return false;
            };
            let mut changed = false;
            if let Some(id) = candidate.id.as_deref() {
                if !record.has_serial() {
                    changed |= record.set_serial(id);
                }
            }
            if let Some(name) = candidate.hardware_name {
                if record.hardware_name.is_empty() {
                    record.hardware_name = name;
                    changed = true;
                }
            }
            if changed && slot.bucket != Bucket::Unknown {
                self.persist();
            }
            return changed;
        }

        let mut record = ConnectionRecord::new(family, candidate.ip, port);
        if let Some(id) = candidate.id.as_deref() {
            record.set_serial(id);
        }
        record.hardware_name = candidate.hardware_name.unwrap_or_default();
        record.display_name = self.unique_name();
        debug!(%family, ip = %record.ip, port, "new candidate");
        self.buckets.push_unknown(record);
        true
    }

    /// Point the record at `slot` to a new address.
    ///
    /// Address-only records already at that address describe the same
    /// device and are folded in. A found record goes back to not-found
    /// so the next tick tests it at the new address.
    fn move_record(&mut self, slot: Slot, ip: String, port: u16) {
        let family = self.family();
        let (merged, slot) = self
            .buckets
            .drain_pending(slot, |r| r.ip == ip && !r.has_serial());
        let Some(mut record) = self.buckets.take(slot) else {
            return;
        };
        info!(
            %family,
            key = record.key(),
            old_ip = %record.ip,
            new_ip = %ip,
            "device changed address"
        );
        record.ip = ip;
        record.port = port;
        record.ip_verified = false;

        let mut bucket = slot.bucket;
        if bucket == Bucket::Found {
            record.auth_state = AuthState::TestingConnection;
            bucket = Bucket::NotFound;
        }
        for (from, old) in merged {
            debug!(%family, ip = %old.ip, "merging address-only record");
            if usable_token(&old) && !usable_token(&record) {
                record.auth_token.clone_from(&old.auth_token);
                record.auth_state = old.auth_state;
            }
            if from == Bucket::NotFound && bucket == Bucket::Unknown {
                if !old.display_name.is_empty() {
                    record.display_name = old.display_name;
                }
                bucket = Bucket::NotFound;
            }
        }

        self.buckets.push_pending(bucket, record);
        if bucket != Bucket::Unknown {
            self.persist();
        }
    }

    // ── Probe replies ────────────────────────────────────────────────

    /// Fold a probe outcome in. Returns whether anything changed.
    ///
    /// Transport failures and unreadable replies are logged and left for
    /// the next tick.
    pub fn on_probe(&mut self, outcome: ProbeOutcome) -> bool {
        match outcome {
            ProbeOutcome::Failed { request, error } => {
                debug!(
                    family = %request.family,
                    kind = ?request.kind,
                    ip = %request.host,
                    error = %error,
                    "probe failed"
                );
                false
            }
            ProbeOutcome::Response(response) => match response.request.kind {
                ProbeKind::Directory => {
                    let candidates = self.rules.read_directory(&response);
                    candidates
                        .into_iter()
                        .fold(false, |changed, c| self.merge_candidate(c) || changed)
                }
                ProbeKind::RequestCredentials => self.on_credentials(&response),
                ProbeKind::TestConnection => self.on_connection(&response),
            },
        }
    }

    fn on_credentials(&mut self, response: &ProbeResponse) -> bool {
        let host = response.request.host.as_str();
        let Some(slot) = self.buckets.locate_pending(|r| r.ip == host) else {
            debug!(ip = %host, "credentials reply for an untracked address");
            return false;
        };
        let reply = self.rules.read_credentials(response);
        let Some(record) = self.buckets.get_mut(slot) else {
            return false;
        };

        match reply {
            CredentialReply::Token(token) => {
                info!(family = %record.family, ip = %record.ip, "received credentials");
                record.auth_token = token;
                record.auth_state = AuthState::TestingConnection;
                record.ip_verified = true;
                self.buckets.promote_unknown(slot);
                self.persist();
                true
            }
            CredentialReply::AwaitingUser => {
                let changed = record.auth_state != AuthState::AwaitingCredentials
                    || slot.bucket == Bucket::Unknown;
                if record.auth_state != AuthState::AwaitingCredentials {
                    debug!(ip = %record.ip, "waiting for the user to allow pairing");
                }
                record.auth_state = AuthState::AwaitingCredentials;
                record.ip_verified = true;
                if slot.bucket == Bucket::Unknown {
                    self.buckets.promote_unknown(slot);
                    self.persist();
                }
                changed
            }
            CredentialReply::Unrecognized(reason) => {
                debug!(ip = %host, %reason, "ignoring credentials reply");
                false
            }
        }
    }

    fn on_connection(&mut self, response: &ProbeResponse) -> bool {
        let request = &response.request;
        let host = request.host.as_str();
        let token = request.token.as_deref().unwrap_or_default();

        let target = self
            .buckets
            .locate_pending(|r| r.ip == host && r.auth_token == token)
            .or_else(|| self.buckets.locate_pending(|r| r.ip == host));

        match self.rules.read_connection(response) {
            ConnectionReply::Verified(identity) => match target {
                Some(slot) => self.promote(slot, token, identity),
                None => {
                    debug!(ip = %host, "connection reply for an untracked or connected device");
                    false
                }
            },
            ConnectionReply::Unauthorized => {
                let Some(record) = target.and_then(|slot| self.buckets.get_mut(slot)) else {
                    return false;
                };
                if record.auth_token != token {
                    debug!(ip = %host, "borrowed credentials rejected");
                    return false;
                }
                if record.auth_state == AuthState::AwaitingCredentials {
                    return false;
                }
                info!(family = %record.family, ip = %record.ip, "credentials rejected, pairing again");
                record.auth_state = AuthState::AwaitingCredentials;
                record.ip_verified = true;
                true
            }
            ConnectionReply::Unrecognized(reason) => {
                debug!(ip = %host, %reason, "ignoring connection reply");
                false
            }
        }
    }

    /// Move the record at `slot` into found, absorbing any other record
    /// that describes the same device.
    fn promote(&mut self, slot: Slot, token: &str, identity: DeviceIdentity) -> bool {
        let Some(current) = self.buckets.get(slot) else {
            return false;
        };
        let serial = if identity.serial.is_empty() {
            current.serial().to_owned()
        } else {
            identity.serial.clone()
        };
        if serial.is_empty() {
            debug!(ip = %current.ip, "device did not report an id");
            return false;
        }
        if current.has_serial() && !current.serial().eq_ignore_ascii_case(&serial) {
            warn!(
                ip = %current.ip,
                expected = current.serial(),
                reported = %serial,
                "a different device answered at this address"
            );
            return false;
        }

        let from_unknown = slot.bucket == Bucket::Unknown;
        let Some(mut record) = self.buckets.take(slot) else {
            return false;
        };
        record.set_serial(&serial);
        record.auth_token = token.to_owned();

        // Older records of the same device: same serial, or the donor
        // whose token just worked at this new address.
        let mut previous_name = self
            .buckets
            .get_found(&serial)
            .map(|r| r.display_name.clone())
            .filter(|n| !n.is_empty());
        while let Some(stale) = self.buckets.locate_pending(|r| {
            (r.has_serial() && r.serial().eq_ignore_ascii_case(&serial))
                || (r.auth_token == token && r.ip != record.ip)
        }) {
            if let Some(old) = self.buckets.take(stale) {
                debug!(serial = %serial, old_ip = %old.ip, "absorbing older record");
                if previous_name.is_none() && !old.display_name.is_empty() {
                    previous_name = Some(old.display_name);
                }
            }
        }
        if let Some(name) = previous_name {
            if from_unknown || record.display_name.is_empty() {
                record.display_name = name;
            }
        }

        apply_identity(&mut record, identity);
        if record.display_name.is_empty() {
            record.display_name = self.unique_name();
        }
        record.auth_state = AuthState::Connected;
        record.ip_verified = true;
        record.last_seen = Some(Utc::now());

        info!(
            family = %record.family,
            serial = %serial,
            ip = %record.ip,
            name = %record.display_name,
            "device connected"
        );
        if self.buckets.insert_found(record).is_err() {
            return false;
        }
        self.persist();
        true
    }

    // ── Persistence ──────────────────────────────────────────────────

    fn persist(&mut self) {
        if let Err(e) = self.store.save(self.buckets.persisted()) {
            warn!(error = %e, "could not save devices");
        }
    }
}

/// A token that has not been rejected yet.
fn usable_token(record: &ConnectionRecord) -> bool {
    record.has_token() && record.auth_state != AuthState::AwaitingCredentials
}

fn push_unique(plan: &mut Vec<ProbeRequest>, request: ProbeRequest) {
    if !plan.contains(&request) {
        plan.push(request);
    }
}

fn apply_identity(record: &mut ConnectionRecord, identity: DeviceIdentity) {
    let fields = [
        (&mut record.hardware_name, identity.hardware_name),
        (&mut record.mac_address, identity.mac_address),
        (&mut record.api_version, identity.api_version),
        (&mut record.firmware, identity.firmware),
        (&mut record.model, identity.model),
        (&mut record.manufacturer, identity.manufacturer),
    ];
    for (field, value) in fields {
        if !value.is_empty() {
            *field = value;
        }
    }
    if let Some(lights) = identity.lights {
        record.lights = lights;
    }
}
