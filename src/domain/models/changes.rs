use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer};

/// An opaque "last seen position" into an append-only changes feed.
///
/// Advanced monotonically forward after each poll batch; never rewound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SequenceCursor(u64);

impl SequenceCursor {
    pub fn start() -> Self {
        Self(0)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Move the cursor forward. A `seq` behind the current position leaves
    /// the cursor untouched.
    pub fn advance_to(&mut self, seq: u64) {
        if seq > self.0 {
            self.0 = seq;
        }
    }
}

impl fmt::Display for SequenceCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One batch of a longpoll `_changes` response:
/// `{"results": [...], "last_seq": ...}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangesBatch {
    pub results: Vec<ChangeEntry>,
    #[serde(deserialize_with = "sequence_number")]
    pub last_seq: u64,
}

/// One document mutation notification within a changes batch.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeEntry {
    pub id: String,
    #[serde(deserialize_with = "sequence_number")]
    pub seq: u64,
    #[serde(default)]
    pub changes: Vec<ChangeRev>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeRev {
    pub rev: String,
}

/// Sync Gateway emits sequence values as JSON numbers or as numeric strings
/// depending on version; accept both.
fn sequence_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("non-numeric sequence value: {s:?}"))),
    }
}

/// The set of documents (id -> expected revision) a verification call is
/// still waiting on.
///
/// Built once from the caller's added/updated results, then shrunk as each
/// document is confirmed; an empty set is the terminal convergence signal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentExpectationSet {
    docs: BTreeMap<String, String>,
}

impl DocumentExpectationSet {
    /// Canonicalize a single id -> rev map.
    pub fn from_map(docs: BTreeMap<String, String>) -> Self {
        Self { docs }
    }

    /// Canonicalize a list of id -> rev maps into one map, as produced by
    /// several separate bulk-add calls.
    pub fn from_list<I>(batches: I) -> Self
    where
        I: IntoIterator<Item = BTreeMap<String, String>>,
    {
        let mut docs = BTreeMap::new();
        for batch in batches {
            docs.extend(batch);
        }
        Self { docs }
    }

    pub fn insert(&mut self, id: impl Into<String>, rev: impl Into<String>) {
        self.docs.insert(id.into(), rev.into());
    }

    pub fn contains(&self, id: &str) -> bool {
        self.docs.contains_key(id)
    }

    pub fn expected_rev(&self, id: &str) -> Option<&str> {
        self.docs.get(id).map(String::as_str)
    }

    /// Cross the document off; returns the expected revision if it was still
    /// outstanding.
    pub fn confirm(&mut self, id: &str) -> Option<String> {
        self.docs.remove(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.docs.keys()
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.docs
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}
