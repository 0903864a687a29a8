//! # Choice Ledger: Disk-Backed Decision Trace
//!
//! Persists the choice records of an annotation run via `rkyv` zero-copy
//! serialization, so that later runs (and `control-bake`) can reassemble the
//! decisions without re-scraping stderr.

use crate::kind::ChoiceKind;
use crate::record::{ChoiceRecord, Origin};
use memmap2::Mmap;
use rkyv::{Archive, Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Errors from ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializeError(String),
    #[error("Deserialization error: {0}")]
    DeserializeError(String),
    #[error("Corrupt entry at index {index}: {reason}")]
    CorruptEntry { index: usize, reason: String },
}

/// Single decision in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Deserialize, Serialize)]
#[rkyv(derive(Debug))]
pub struct LedgerEntry {
    pub kind: u8,
    pub function: u32,
    pub position: u32,
    pub cardinality: u32,
    pub choice: u32,
    pub origin: u8,
    pub site: String,
    pub function_name: String,
}

impl From<&ChoiceRecord> for LedgerEntry {
    fn from(r: &ChoiceRecord) -> Self {
        Self {
            kind: r.kind.ordinal(),
            function: r.function,
            position: r.position,
            cardinality: r.cardinality,
            choice: r.choice,
            origin: r.origin.to_u8(),
            site: r.site.clone(),
            function_name: r.function_name.clone(),
        }
    }
}

/// In-memory ledger, serializable to disk.
#[derive(Debug, Clone, Default, Archive, Deserialize, Serialize)]
#[rkyv(derive(Debug))]
pub struct ChoiceLedger {
    pub entries: Vec<LedgerEntry>,
}

impl ChoiceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ChoiceRecord>) -> Self {
        Self {
            entries: records.into_iter().map(LedgerEntry::from).collect(),
        }
    }

    pub fn insert(&mut self, entry: LedgerEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorts entries by (kind, function, position) and serializes with `rkyv`.
    ///
    /// A later pass that replays a slot records it again; only the first
    /// record per key is kept.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, LedgerError> {
        self.entries.sort_by_key(|e| (e.kind, e.function, e.position));
        self.entries
            .dedup_by_key(|e| (e.kind, e.function, e.position));
        let aligned = rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map_err(|e| LedgerError::SerializeError(e.to_string()))?;
        Ok(aligned.to_vec())
    }

    /// Saves the ledger to a file, creating parent directories.
    pub fn save(&mut self, path: &Path) -> Result<(), LedgerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = self.to_bytes()?;
        let mut file = File::create(path)?;
        file.write_all(&bytes)?;
        Ok(())
    }
}

/// Memory-mapped read-only ledger handle.
pub struct MappedLedger {
    _mmap: Mmap,
}

impl MappedLedger {
    /// Opens and validates a ledger file via mmap.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        rkyv::access::<ArchivedChoiceLedger, rkyv::rancor::Error>(&mmap)
            .map_err(|e| LedgerError::DeserializeError(e.to_string()))?;

        Ok(Self { _mmap: mmap })
    }

    /// Returns a reference to the archived ledger (zero-copy).
    pub fn archived(&self) -> &ArchivedChoiceLedger {
        // SAFETY: The archive was validated in `open()` via rkyv::access and
        // the mmap lives as long as self.
        unsafe { rkyv::access_unchecked::<ArchivedChoiceLedger>(&self._mmap[..]) }
    }

    /// Finds the decision for one slot (binary search; ledgers are sorted on save).
    pub fn find(&self, kind: ChoiceKind, function: u32, position: u32) -> Option<&ArchivedLedgerEntry> {
        let entries = &self.archived().entries;
        let key = (kind.ordinal(), function, position);
        let idx = entries
            .binary_search_by_key(&key, |e| (e.kind, e.function.to_native(), e.position.to_native()))
            .ok()?;
        Some(&entries[idx])
    }

    pub fn len(&self) -> usize {
        self.archived().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archived().entries.is_empty()
    }

    /// Rebuilds owned choice records from the archive.
    pub fn to_records(&self) -> Result<Vec<ChoiceRecord>, LedgerError> {
        self.archived()
            .entries
            .iter()
            .enumerate()
            .map(|(index, e)| {
                let kind = ChoiceKind::from_ordinal(e.kind).map_err(|err| {
                    LedgerError::CorruptEntry {
                        index,
                        reason: err.to_string(),
                    }
                })?;
                let origin = Origin::from_u8(e.origin).ok_or_else(|| LedgerError::CorruptEntry {
                    index,
                    reason: format!("unknown origin tag {}", e.origin),
                })?;
                Ok(ChoiceRecord {
                    cardinality: e.cardinality.to_native(),
                    choice: e.choice.to_native(),
                    kind,
                    function: e.function.to_native(),
                    position: e.position.to_native(),
                    site: e.site.as_str().to_string(),
                    function_name: e.function_name.as_str().to_string(),
                    origin,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: ChoiceKind, function: u32, position: u32, choice: u32) -> ChoiceRecord {
        ChoiceRecord {
            cardinality: kind.fixed_cardinality().unwrap_or(2),
            choice,
            kind,
            function,
            position,
            site: format!("v{position}"),
            function_name: format!("f{function}"),
            origin: Origin::Default,
        }
    }

    #[test]
    fn test_ledger_roundtrip_bytes() {
        let records = [record(ChoiceKind::InboundsGep, 0, 1, 1)];
        let mut ledger = ChoiceLedger::from_records(&records);
        let bytes = ledger.to_bytes().unwrap();
        let archived = rkyv::access::<ArchivedChoiceLedger, rkyv::rancor::Error>(&bytes).unwrap();
        assert_eq!(archived.entries.len(), 1);
        assert_eq!(archived.entries[0].kind, 6);
        assert_eq!(archived.entries[0].site.as_str(), "v1");
    }

    #[test]
    fn test_save_sorts_and_dedups() {
        let records = [
            record(ChoiceKind::ParameterAligned, 1, 1, 2),
            record(ChoiceKind::InboundsGep, 0, 2, 0),
            record(ChoiceKind::InboundsGep, 0, 1, 1),
            record(ChoiceKind::InboundsGep, 0, 1, 1),
        ];
        let mut ledger = ChoiceLedger::from_records(&records);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("choices.rkyv");
        ledger.save(&path).unwrap();

        let mapped = MappedLedger::open(&path).unwrap();
        assert_eq!(mapped.len(), 3);
        let restored = mapped.to_records().unwrap();
        assert_eq!(restored[0], records[2]);
        assert_eq!(restored[1], records[1]);
        assert_eq!(restored[2], records[0]);
    }

    #[test]
    fn test_find_slot() {
        let records = [
            record(ChoiceKind::InboundsGep, 0, 1, 1),
            record(ChoiceKind::InboundsGep, 0, 2, 0),
        ];
        let mut ledger = ChoiceLedger::from_records(&records);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("choices.rkyv");
        ledger.save(&path).unwrap();

        let mapped = MappedLedger::open(&path).unwrap();
        let hit = mapped.find(ChoiceKind::InboundsGep, 0, 2).unwrap();
        assert_eq!(hit.choice.to_native(), 0);
        assert!(mapped.find(ChoiceKind::InboundsGep, 1, 1).is_none());
    }

    #[test]
    fn test_empty_ledger() {
        let ledger = ChoiceLedger::new();
        assert!(ledger.is_empty());
        assert_eq!(ledger.len(), 0);
    }

    #[test]
    fn test_open_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.rkyv");
        std::fs::write(&path, b"definitely not an archive").unwrap();
        assert!(MappedLedger::open(&path).is_err());
    }
}
