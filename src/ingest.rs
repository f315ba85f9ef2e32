//! Ingestion of freshly parsed records: field-level filtering and duplicate
//! resolution against an external record store. This module only decides
//! *what* to persist; calling the store's `store()` is left to the caller,
//! and so are atomicity guarantees across concurrent writers. Documented
//! race: two concurrent `New`-policy ingestions of the same `(element, name)`
//! may both compute the same next version.

use std::str::FromStr;

use crate::error::{Cp2kFileError, Result};

/// How a candidate colliding on `(element, name)` with a stored record is
/// resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DuplicateHandling {
    /// Silently drop the candidate.
    Ignore,
    /// Fail the whole ingest on the first collision, before anything is
    /// persisted.
    Error,
    /// Keep the candidate as the next version of the stored record.
    New,
}

impl FromStr for DuplicateHandling {
    type Err = Cp2kFileError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ignore" => Ok(Self::Ignore),
            "error" => Ok(Self::Error),
            "new" => Ok(Self::New),
            _ => Err(Cp2kFileError::UnsupportedPolicy(s.to_string())),
        }
    }
}

/// A record already in the external store, as reported by lookups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExistingEntry {
    /// The store's unique id for the record.
    pub id: String,
    pub version: u32,
}

/// The single seam to the external record store: exact-`(element, name)`
/// lookup, never alias matching (ingestion compares raw identity).
/// Implemented for plain closures, so callers without a store can pass one
/// directly. A store-side ambiguity surfaces as
/// [`Cp2kFileError::AmbiguousMatch`].
pub trait StoreLookup {
    fn get(&self, element: &str, name: &str) -> Result<Option<ExistingEntry>>;
}

impl<F> StoreLookup for F
where
    F: Fn(&str, &str) -> Result<Option<ExistingEntry>>,
{
    fn get(&self, element: &str, name: &str) -> Result<Option<ExistingEntry>> {
        self(element, name)
    }
}

/// The record surface the coordinator needs; implemented by both
/// [`BasisSet`](crate::BasisSet) and
/// [`Pseudopotential`](crate::Pseudopotential).
pub trait IngestRecord {
    fn element(&self) -> &str;
    fn name(&self) -> &str;
    fn tags(&self) -> &[String];
    fn aliases(&self) -> &[String];
    fn version(&self) -> u32;
    fn set_version(&mut self, version: u32);
}

/// Per-field predicates: a record is kept only when every predicate on its
/// field holds. Fields without a predicate are unconstrained.
#[derive(Default)]
pub struct Filters<'a> {
    pub element: Option<Box<dyn Fn(&str) -> bool + 'a>>,
    pub name: Option<Box<dyn Fn(&str) -> bool + 'a>>,
    pub tags: Option<Box<dyn Fn(&[String]) -> bool + 'a>>,
    pub aliases: Option<Box<dyn Fn(&[String]) -> bool + 'a>>,
}

impl Filters<'_> {
    pub fn matches(&self, record: &impl IngestRecord) -> bool {
        self.element.as_ref().is_none_or(|f| f(record.element()))
            && self.name.as_ref().is_none_or(|f| f(record.name()))
            && self.tags.as_ref().is_none_or(|f| f(record.tags()))
            && self.aliases.as_ref().is_none_or(|f| f(record.aliases()))
    }
}

/// Outcome of the duplicate decision for one candidate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Persist, with this version.
    Keep(u32),
    /// Already stored; skip silently.
    Drop,
    /// Abort the ingest; the store holds `existing_id` for the colliding
    /// pair.
    Fail { existing_id: String },
}

/// The policy mapping itself: stateless, one lookup result in, one outcome
/// out. Kept free of store access so it can be tested on its own.
pub fn resolve_duplicate(
    policy: DuplicateHandling,
    parsed_version: u32,
    existing: Option<&ExistingEntry>,
) -> Resolution {
    match (policy, existing) {
        (_, None) => Resolution::Keep(parsed_version),
        (DuplicateHandling::Ignore, Some(_)) => Resolution::Drop,
        (DuplicateHandling::Error, Some(e)) => Resolution::Fail {
            existing_id: e.id.clone(),
        },
        (DuplicateHandling::New, Some(e)) => Resolution::Keep(e.version + 1),
    }
}

/// Filter `records`, then resolve each survivor against the store under
/// `duplicate_handling`. Returns the records ready for the caller to persist.
/// One lookup per candidate; the store is never written to.
pub fn ingest<R, L>(
    records: impl IntoIterator<Item = R>,
    filters: &Filters,
    duplicate_handling: DuplicateHandling,
    lookup: &L,
) -> Result<Vec<R>>
where
    R: IngestRecord,
    L: StoreLookup,
{
    let mut kept = Vec::new();

    for mut record in records {
        if !filters.matches(&record) {
            continue;
        }

        let existing = lookup.get(record.element(), record.name())?;

        match resolve_duplicate(duplicate_handling, record.version(), existing.as_ref()) {
            Resolution::Keep(version) => {
                record.set_version(version);
                kept.push(record);
            }
            Resolution::Drop => (),
            Resolution::Fail { existing_id } => {
                return Err(Cp2kFileError::DuplicateExists {
                    element: record.element().to_string(),
                    name: record.name().to_string(),
                    existing_id,
                });
            }
        }
    }

    Ok(kept)
}
