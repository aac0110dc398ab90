// ── Record buckets ──
//
// The three collections a discovery engine keeps. Records are owned by
// exactly one bucket at a time; moving a record means taking it out of
// one and inserting it into another. Found records are keyed by serial.

use indexmap::IndexMap;
use serde::Serialize;
use strum::Display;

use crate::model::{BucketCounts, ConnectionRecord};

/// Which collection a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Bucket {
    /// Serial and working credentials confirmed.
    Found,
    /// Known from disk or manual entry, not yet confirmed this session.
    NotFound,
    /// Seen on the network, no identity yet.
    Unknown,
}

/// Position of a record inside [`RecordBuckets`].
///
/// Invalidated by any removal; look it up again after mutating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub bucket: Bucket,
    pub index: usize,
}

#[derive(Debug, Default, Clone)]
pub struct RecordBuckets {
    found: IndexMap<String, ConnectionRecord>,
    not_found: Vec<ConnectionRecord>,
    unknown: Vec<ConnectionRecord>,
}

impl RecordBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn found(&self) -> impl Iterator<Item = &ConnectionRecord> {
        self.found.values()
    }

    pub fn not_found(&self) -> &[ConnectionRecord] {
        &self.not_found
    }

    pub fn unknown(&self) -> &[ConnectionRecord] {
        &self.unknown
    }

    pub fn counts(&self) -> BucketCounts {
        BucketCounts {
            found: self.found.len(),
            not_found: self.not_found.len(),
            unknown: self.unknown.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts().total() == 0
    }

    /// Every record with the bucket it lives in.
    pub fn iter(&self) -> impl Iterator<Item = (Bucket, &ConnectionRecord)> {
        self.found
            .values()
            .map(|r| (Bucket::Found, r))
            .chain(self.not_found.iter().map(|r| (Bucket::NotFound, r)))
            .chain(self.unknown.iter().map(|r| (Bucket::Unknown, r)))
    }

    /// The records that are written to disk: found first, then not-found.
    pub fn persisted(&self) -> impl Iterator<Item = &ConnectionRecord> {
        self.found.values().chain(self.not_found.iter())
    }

    pub fn get_found(&self, serial: &str) -> Option<&ConnectionRecord> {
        self.found.get(serial)
    }

    /// First record (found, then not-found, then unknown) matching `pred`.
    pub fn locate(&self, mut pred: impl FnMut(&ConnectionRecord) -> bool) -> Option<Slot> {
        if let Some(index) = self.found.values().position(&mut pred) {
            return Some(Slot {
                bucket: Bucket::Found,
                index,
            });
        }
        if let Some(index) = self.not_found.iter().position(&mut pred) {
            return Some(Slot {
                bucket: Bucket::NotFound,
                index,
            });
        }
        self.unknown.iter().position(pred).map(|index| Slot {
            bucket: Bucket::Unknown,
            index,
        })
    }

    /// Like [`locate`](Self::locate) but skips the found bucket.
    pub fn locate_pending(&self, mut pred: impl FnMut(&ConnectionRecord) -> bool) -> Option<Slot> {
        if let Some(index) = self.not_found.iter().position(&mut pred) {
            return Some(Slot {
                bucket: Bucket::NotFound,
                index,
            });
        }
        self.unknown.iter().position(pred).map(|index| Slot {
            bucket: Bucket::Unknown,
            index,
        })
    }

    pub fn get(&self, slot: Slot) -> Option<&ConnectionRecord> {
        match slot.bucket {
            Bucket::Found => self.found.get_index(slot.index).map(|(_, r)| r),
            Bucket::NotFound => self.not_found.get(slot.index),
            Bucket::Unknown => self.unknown.get(slot.index),
        }
    }

    /// Mutable access to a record.
    ///
    /// Callers must not change the serial of a found record through this;
    /// serials are immutable once set, which [`ConnectionRecord`] enforces.
    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut ConnectionRecord> {
        match slot.bucket {
            Bucket::Found => self.found.get_index_mut(slot.index).map(|(_, r)| r),
            Bucket::NotFound => self.not_found.get_mut(slot.index),
            Bucket::Unknown => self.unknown.get_mut(slot.index),
        }
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Remove and return the record at `slot`.
    pub fn take(&mut self, slot: Slot) -> Option<ConnectionRecord> {
        match slot.bucket {
            Bucket::Found => self
                .found
                .shift_remove_index(slot.index)
                .map(|(_, r)| r),
            Bucket::NotFound => {
                (slot.index < self.not_found.len()).then(|| self.not_found.remove(slot.index))
            }
            Bucket::Unknown => {
                (slot.index < self.unknown.len()).then(|| self.unknown.remove(slot.index))
            }
        }
    }

    /// Insert or replace a found record, keyed by its serial.
    ///
    /// Returns the record back if it has no serial.
    pub fn insert_found(&mut self, record: ConnectionRecord) -> Result<(), ConnectionRecord> {
        if !record.has_serial() {
            return Err(record);
        }
        self.found.insert(record.serial().to_owned(), record);
        Ok(())
    }

    pub fn push_not_found(&mut self, record: ConnectionRecord) {
        self.not_found.push(record);
    }

    pub fn push_unknown(&mut self, record: ConnectionRecord) {
        self.unknown.push(record);
    }

    /// Remove every pending record matching `pred` except the one at
    /// `keep`. Returns the removed records with their buckets, and `keep`
    /// shifted to its new position.
    pub fn drain_pending(
        &mut self,
        keep: Slot,
        mut pred: impl FnMut(&ConnectionRecord) -> bool,
    ) -> (Vec<(Bucket, ConnectionRecord)>, Slot) {
        let mut removed = Vec::new();
        let mut kept = keep;
        for bucket in [Bucket::NotFound, Bucket::Unknown] {
            let list = match bucket {
                Bucket::NotFound => &mut self.not_found,
                _ => &mut self.unknown,
            };
            let mut index = 0;
            let mut shift = 0;
            list.retain(|r| {
                let i = index;
                index += 1;
                if keep.bucket == bucket && i == keep.index {
                    return true;
                }
                if !pred(r) {
                    return true;
                }
                if keep.bucket == bucket && i < keep.index {
                    shift += 1;
                }
                removed.push((bucket, r.clone()));
                false
            });
            if kept.bucket == bucket {
                kept.index -= shift;
            }
        }
        (removed, kept)
    }

    /// Append a record to the not-found or unknown bucket.
    pub fn push_pending(&mut self, bucket: Bucket, record: ConnectionRecord) {
        match bucket {
            Bucket::Unknown => self.unknown.push(record),
            Bucket::Found | Bucket::NotFound => self.not_found.push(record),
        }
    }

    /// Move an unknown record to not-found. No-op for other buckets.
    pub fn promote_unknown(&mut self, slot: Slot) {
        if slot.bucket == Bucket::Unknown && slot.index < self.unknown.len() {
            let record = self.unknown.remove(slot.index);
            self.not_found.push(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corluma_api::ProtocolFamily;

    fn rec(ip: &str) -> ConnectionRecord {
        ConnectionRecord::new(ProtocolFamily::Nanoleaf, ip, 16021)
    }

    #[test]
    fn insert_found_requires_serial() {
        let mut buckets = RecordBuckets::new();
        assert!(buckets.insert_found(rec("10.0.0.1")).is_err());
        assert!(buckets.insert_found(rec("10.0.0.1").with_serial("S1")).is_ok());
        // Same serial replaces rather than duplicates.
        assert!(buckets.insert_found(rec("10.0.0.2").with_serial("S1")).is_ok());
        assert_eq!(buckets.counts().found, 1);
        assert_eq!(buckets.get_found("S1").map(|r| r.ip.as_str()), Some("10.0.0.2"));
    }

    #[test]
    fn locate_searches_found_first() {
        let mut buckets = RecordBuckets::new();
        buckets.push_unknown(rec("10.0.0.1"));
        buckets.push_not_found(rec("10.0.0.2"));
        buckets
            .insert_found(rec("10.0.0.3").with_serial("S3"))
            .unwrap_or_else(|_| unreachable!());

        let slot = buckets.locate(|r| r.ip == "10.0.0.1");
        assert_eq!(slot.map(|s| s.bucket), Some(Bucket::Unknown));
        let slot = buckets.locate(|r| r.ip.starts_with("10.0.0."));
        assert_eq!(slot.map(|s| s.bucket), Some(Bucket::Found));
        assert_eq!(
            buckets.locate_pending(|r| r.ip.starts_with("10.0.0.")).map(|s| s.bucket),
            Some(Bucket::NotFound)
        );
    }

    #[test]
    fn drain_pending_keeps_slot_and_shifts_it() {
        let mut buckets = RecordBuckets::new();
        buckets.push_not_found(rec("10.0.0.9"));
        buckets.push_not_found(rec("10.0.0.1"));
        buckets.push_not_found(rec("10.0.0.9").with_serial("S9"));
        buckets.push_unknown(rec("10.0.0.9"));

        let keep = buckets.locate(|r| r.has_serial()).expect("slot");
        assert_eq!(keep.index, 2);
        let (removed, keep) = buckets.drain_pending(keep, |r| r.ip == "10.0.0.9");

        let from: Vec<_> = removed.iter().map(|(b, _)| *b).collect();
        assert_eq!(from, vec![Bucket::NotFound, Bucket::Unknown]);
        assert_eq!(keep, Slot { bucket: Bucket::NotFound, index: 1 });
        assert_eq!(buckets.get(keep).map(ConnectionRecord::serial), Some("S9"));
        assert_eq!(buckets.counts().total(), 2);
    }

    #[test]
    fn promote_and_take_move_records() {
        let mut buckets = RecordBuckets::new();
        buckets.push_unknown(rec("10.0.0.1"));
        let slot = buckets.locate(|r| r.ip == "10.0.0.1").expect("slot");
        buckets.promote_unknown(slot);
        assert_eq!(
            buckets.counts(),
            BucketCounts {
                found: 0,
                not_found: 1,
                unknown: 0
            }
        );

        let slot = buckets.locate(|r| r.ip == "10.0.0.1").expect("slot");
        let taken = buckets.take(slot).expect("record");
        assert_eq!(taken.ip, "10.0.0.1");
        assert!(buckets.is_empty());
    }
}
