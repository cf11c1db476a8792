//! Coverage data model
//!
//! Line sets, arcs and the canonical per-run capture record.
//!
//! Arc endpoints are a tagged type internally. The signed-integer convention
//! of the wire format (`-L` = boundary of the callable whose first line is `L`)
//! exists only in the serde impls at the bottom of this module.

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Per-file line sets keyed by the path as reported by the runtime
pub type FileLines = BTreeMap<String, LineSet>;

/// Per-file arc sets keyed by the path as reported by the runtime
pub type FileArcs = BTreeMap<String, BTreeSet<Arc>>;

/// A set of unique positive 1-based line numbers, always iterated in order
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LineSet(BTreeSet<u32>);

impl LineSet {
    /// Create an empty line set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a line. Line 0 is not a source line and is ignored.
    pub fn insert(&mut self, line: u32) -> bool {
        line > 0 && self.0.insert(line)
    }

    /// Check membership
    #[must_use]
    pub fn contains(&self, line: u32) -> bool {
        self.0.contains(&line)
    }

    /// Number of lines
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set has no lines
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate lines in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }

    /// Add every line of `other` to this set
    pub fn union_with(&mut self, other: &LineSet) {
        self.0.extend(other.0.iter().copied());
    }

    /// Lines present in both sets
    #[must_use]
    pub fn intersection(&self, other: &LineSet) -> LineSet {
        LineSet(self.0.intersection(&other.0).copied().collect())
    }

    /// Lines in this set but not in `other`
    #[must_use]
    pub fn difference(&self, other: &LineSet) -> LineSet {
        LineSet(self.0.difference(&other.0).copied().collect())
    }

    /// Whether every line of this set is also in `other`
    #[must_use]
    pub fn is_subset(&self, other: &LineSet) -> bool {
        self.0.is_subset(&other.0)
    }

    /// Lines as a sorted vector
    #[must_use]
    pub fn to_vec(&self) -> Vec<u32> {
        self.0.iter().copied().collect()
    }
}

impl FromIterator<u32> for LineSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut set = LineSet::new();
        for line in iter {
            let _ = set.insert(line);
        }
        set
    }
}

impl Extend<u32> for LineSet {
    fn extend<I: IntoIterator<Item = u32>>(&mut self, iter: I) {
        for line in iter {
            let _ = self.insert(line);
        }
    }
}

impl<'a> IntoIterator for &'a LineSet {
    type Item = &'a u32;
    type IntoIter = std::collections::btree_set::Iter<'a, u32>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// One end of an arc
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArcEndpoint {
    /// An ordinary source line
    Line(u32),
    /// Entry into the callable whose first line is the payload
    Entry(u32),
    /// Exit from the callable whose first line is the payload
    Exit(u32),
}

impl ArcEndpoint {
    /// Signed wire encoding of this endpoint
    #[must_use]
    pub fn to_signed(self) -> i64 {
        match self {
            Self::Line(line) => i64::from(line),
            Self::Entry(first) | Self::Exit(first) => -i64::from(first),
        }
    }

    /// Whether this is a callable boundary marker
    #[must_use]
    pub const fn is_boundary(self) -> bool {
        matches!(self, Self::Entry(_) | Self::Exit(_))
    }

    /// The source line for `Line` endpoints
    #[must_use]
    pub const fn line(self) -> Option<u32> {
        match self {
            Self::Line(line) => Some(line),
            Self::Entry(_) | Self::Exit(_) => None,
        }
    }
}

/// A directed edge between two consecutively observed points of one file
///
/// `from` is always a `Line` or an `Entry`; `to` is always a `Line` or an
/// `Exit`. The constructors are the only way to build an arc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Arc {
    from: ArcEndpoint,
    to: ArcEndpoint,
}

impl Arc {
    /// Arc between two source lines
    #[must_use]
    pub const fn interior(from: u32, to: u32) -> Self {
        Self {
            from: ArcEndpoint::Line(from),
            to: ArcEndpoint::Line(to),
        }
    }

    /// Arc from entry into the callable starting at `first_line` to `line`
    #[must_use]
    pub const fn entry(first_line: u32, line: u32) -> Self {
        Self {
            from: ArcEndpoint::Entry(first_line),
            to: ArcEndpoint::Line(line),
        }
    }

    /// Arc from `line` to exit from the callable starting at `first_line`
    #[must_use]
    pub const fn exit(line: u32, first_line: u32) -> Self {
        Self {
            from: ArcEndpoint::Line(line),
            to: ArcEndpoint::Exit(first_line),
        }
    }

    /// Decode the signed wire pair
    ///
    /// # Errors
    ///
    /// Returns a message when the pair has no positive endpoint, two negative
    /// endpoints, or a zero.
    pub fn from_signed(from: i64, to: i64) -> Result<Self, String> {
        let to_u32 = |v: i64| {
            u32::try_from(v.unsigned_abs()).map_err(|_| format!("arc endpoint {v} out of range"))
        };
        match (from.signum(), to.signum()) {
            (1, 1) => Ok(Self::interior(to_u32(from)?, to_u32(to)?)),
            (-1, 1) => Ok(Self::entry(to_u32(from)?, to_u32(to)?)),
            (1, -1) => Ok(Self::exit(to_u32(from)?, to_u32(to)?)),
            _ => Err(format!("invalid arc [{from}, {to}]")),
        }
    }

    /// Source endpoint
    #[must_use]
    pub const fn source(self) -> ArcEndpoint {
        self.from
    }

    /// Target endpoint
    #[must_use]
    pub const fn target(self) -> ArcEndpoint {
        self.to
    }

    /// Signed wire pair
    #[must_use]
    pub fn to_signed(self) -> (i64, i64) {
        (self.from.to_signed(), self.to.to_signed())
    }

    /// Whether both endpoints are source lines
    #[must_use]
    pub const fn is_interior(self) -> bool {
        !self.from.is_boundary() && !self.to.is_boundary()
    }
}

// Ordered by the signed pair so serialized arc lists sort the same way the
// runtime-side tracer sorts them.
impl PartialOrd for Arc {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Arc {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_signed().cmp(&other.to_signed())
    }
}

impl fmt::Display for Arc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (from, to) = self.to_signed();
        write!(f, "{from}->{to}")
    }
}

/// Metadata attached to one capture
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Human-meaningful identifier of the run, used for test attribution
    #[serde(alias = "test_script", default, skip_serializing_if = "Option::is_none")]
    pub run_label: Option<String>,
}

/// One run's raw coverage observation
///
/// Immutable once persisted; later processing builds new values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRecord {
    /// Executed lines per file
    #[serde(default)]
    pub executed: FileLines,
    /// Executable lines reported by the runtime itself (device pathway)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<FileLines>,
    /// Observed arcs per file (arc collection enabled)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arcs: Option<FileArcs>,
    /// Run metadata
    #[serde(rename = "_metadata", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RunMetadata>,
}

impl CaptureRecord {
    /// Run label from metadata, if any
    #[must_use]
    pub fn run_label(&self) -> Option<&str> {
        self.metadata.as_ref()?.run_label.as_deref()
    }

    /// Number of files with executed lines
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.executed.len()
    }

    /// Total executed lines over all files
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.executed.values().map(LineSet::len).sum()
    }
}

impl Serialize for LineSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for line in &self.0 {
            seq.serialize_element(line)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for LineSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<i64>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .filter_map(|line| u32::try_from(line).ok())
            .collect())
    }
}

impl Serialize for Arc {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (from, to) = self.to_signed();
        let mut tup = serializer.serialize_tuple(2)?;
        tup.serialize_element(&from)?;
        tup.serialize_element(&to)?;
        tup.end()
    }
}

impl<'de> Deserialize<'de> for Arc {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ArcVisitor;

        impl<'de> Visitor<'de> for ArcVisitor {
            type Value = Arc;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a [from, to] pair of integers")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Arc, A::Error> {
                let from: i64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let to: i64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                if seq.next_element::<i64>()?.is_some() {
                    return Err(de::Error::invalid_length(3, &self));
                }
                Arc::from_signed(from, to).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_seq(ArcVisitor)
    }
}
