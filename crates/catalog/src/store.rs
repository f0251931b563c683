//! In-memory catalog store and load-time deduplication.

use std::fs;
use std::io::Read;
use std::path::Path;

use tracing::{info, warn};

use crate::record::RawRow;
use crate::{Error, Record, Result};

/// Region preferred when no policy is configured.
pub const DEFAULT_PREFERRED_REGION: &str = "EU";

/// Chooses one row per identifier when the source repeats identifiers.
///
/// Rows are ranked by region: the preferred region first, then any other
/// non-empty region, then rows without a region. Ties keep first-seen order.
/// A blank preferred region means no preference.
#[derive(Debug, Clone)]
pub struct DedupPolicy {
    preferred_region: String,
}

impl DedupPolicy {
    pub fn new(preferred_region: impl Into<String>) -> Self {
        Self {
            preferred_region: preferred_region.into(),
        }
    }

    pub fn preferred_region(&self) -> &str {
        &self.preferred_region
    }

    /// Rank of a region; lower wins.
    pub fn priority(&self, region: Option<&str>) -> u8 {
        match region {
            Some(r) if self.prefers(r) => 0,
            Some(_) => 1,
            None => 2,
        }
    }

    fn prefers(&self, region: &str) -> bool {
        let preferred = self.preferred_region.trim();
        !preferred.is_empty() && region.contains(preferred)
    }

    /// Keep exactly one record per identifier, ordered by identifier.
    pub fn apply(&self, records: Vec<Record>) -> Vec<Record> {
        let mut ranked: Vec<(u8, Record)> = records
            .into_iter()
            .map(|r| (self.priority(r.region.as_deref()), r))
            .collect();

        // sort_by is stable, so equal (id, priority) pairs keep source order
        ranked.sort_by(|(pa, a), (pb, b)| a.id.cmp(&b.id).then(pa.cmp(pb)));
        ranked.dedup_by(|(_, next), (_, kept)| next.id == kept.id);

        ranked.into_iter().map(|(_, r)| r).collect()
    }
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_PREFERRED_REGION)
    }
}

#[derive(Debug)]
enum State {
    NotReady,
    Ready(Vec<Record>),
}

/// Read-only, identifier-keyed product catalog.
///
/// A catalog is either loaded (ready) or not; every query on an unloaded
/// catalog fails with [`Error::NotReady`]. Once loaded it never changes and
/// can be shared freely across threads.
#[derive(Debug)]
pub struct Catalog {
    state: State,
}

impl Catalog {
    /// A catalog with no record set. Every query fails with `NotReady`.
    pub fn not_ready() -> Self {
        Self {
            state: State::NotReady,
        }
    }

    /// Load a catalog from a JSON Lines (or JSON array) file.
    pub fn open(path: impl AsRef<Path>, policy: &DedupPolicy) -> Result<Self> {
        let path = path.as_ref();
        let file = fs::File::open(path).map_err(|source| Error::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "loading dataset");

        Self::load_from(file, policy).map_err(|e| match e {
            Error::Unreadable { source, .. } => Error::Unreadable {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse raw rows from a reader and build the canonical record set.
    pub fn load_from(mut source: impl Read, policy: &DedupPolicy) -> Result<Self> {
        let mut text = String::new();
        source
            .read_to_string(&mut text)
            .map_err(|source| Error::Unreadable {
                path: "<reader>".into(),
                source,
            })?;

        let rows = parse_rows(&text)?;
        let raw_count = rows.len();

        let mut records = Vec::with_capacity(raw_count);
        let mut skipped = 0usize;
        for row in rows {
            match Record::from_raw(row) {
                Some(record) => records.push(record),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(skipped, "skipped rows without Material_Code");
        }

        let catalog = Self::from_records(records, policy)?;
        info!(
            raw = raw_count,
            unique = catalog.len(),
            removed = raw_count - skipped - catalog.len(),
            "dataset deduplicated"
        );
        Ok(catalog)
    }

    /// Build a catalog from already-decoded records.
    pub fn from_records(records: Vec<Record>, policy: &DedupPolicy) -> Result<Self> {
        if records.is_empty() {
            return Err(Error::Empty);
        }
        Ok(Self {
            state: State::Ready(policy.apply(records)),
        })
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    /// Number of canonical records (zero when not ready).
    pub fn len(&self) -> usize {
        match &self.state {
            State::Ready(records) => records.len(),
            State::NotReady => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records in store order.
    pub fn records(&self) -> Result<&[Record]> {
        match &self.state {
            State::Ready(records) => Ok(records),
            State::NotReady => Err(Error::NotReady),
        }
    }

    /// Look up one record by identifier.
    pub fn get(&self, id: &str) -> Result<Option<&Record>> {
        let records = self.records()?;
        Ok(records
            .binary_search_by(|r| r.id.as_str().cmp(id))
            .ok()
            .map(|i| &records[i]))
    }
}

fn parse_rows(text: &str) -> Result<Vec<RawRow>> {
    if text.trim_start().starts_with('[') {
        return serde_json::from_str(text).map_err(|source| Error::Parse {
            line: source.line(),
            source,
        });
    }

    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|source| Error::Parse {
                line: i + 1,
                source,
            })
        })
        .collect()
}
