// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Positions inside a partition, and the ranges built from them.
//!
//! A [`Position`] totally orders everything that can appear in a partition:
//! the partition boundaries, the static row, and every clustering position.
//! Clustering positions are a [`ClusteringKey`] prefix plus a [`BoundWeight`],
//! so that a position can sit before, at, or after all keys sharing a prefix.

use std::cmp::Ordering;
use std::fmt;
use std::ops;
use std::ops::RangeBounds;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

/// A clustering key prefix: an ordered list of byte components.
///
/// Ordering is component-wise, and a prefix sorts before every key it prefixes.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusteringKey(Vec<Vec<u8>>);

impl ClusteringKey {
    pub fn new(components: Vec<Vec<u8>>) -> Self {
        Self(components)
    }

    /// The empty prefix. It prefixes every key.
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn components(&self) -> &[Vec<u8>] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Encodes as one big-endian component so that byte order equals numeric order.
impl From<u64> for ClusteringKey {
    fn from(value: u64) -> Self {
        Self(vec![value.to_be_bytes().to_vec()])
    }
}

impl From<&str> for ClusteringKey {
    fn from(value: &str) -> Self {
        Self(vec![value.as_bytes().to_vec()])
    }
}

impl fmt::Display for ClusteringKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            match std::str::from_utf8(c) {
                Ok(s) if s.chars().all(|ch| !ch.is_control()) => write!(f, "{}", s)?,
                _ => {
                    for b in c {
                        write!(f, "{:02x}", b)?;
                    }
                }
            }
        }
        write!(f, "]")
    }
}

/// Where a clustering position lies relative to the keys sharing its prefix.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BoundWeight {
    BeforeAllPrefixed,
    Equal,
    AfterAllPrefixed,
}

/// A totally ordered location inside a partition.
///
/// ```text
/// PartitionStart < StaticRow < BeforeAllRows < Clustering{..} < AfterAllRows < PartitionEnd
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub enum Position {
    PartitionStart,
    StaticRow,
    BeforeAllRows,
    Clustering {
        key: ClusteringKey,
        weight: BoundWeight,
    },
    AfterAllRows,
    PartitionEnd,
}

impl Position {
    /// The position of the row with exactly this key.
    pub fn for_key(key: ClusteringKey) -> Self {
        Position::Clustering {
            key,
            weight: BoundWeight::Equal,
        }
    }

    /// Before every key prefixed by `key`, including `key` itself.
    ///
    /// The empty prefix gives [`Position::BeforeAllRows`].
    pub fn before_key(key: ClusteringKey) -> Self {
        if key.is_empty() {
            return Position::BeforeAllRows;
        }
        Position::Clustering {
            key,
            weight: BoundWeight::BeforeAllPrefixed,
        }
    }

    /// After every key prefixed by `key`, including `key` itself.
    ///
    /// The empty prefix gives [`Position::AfterAllRows`].
    pub fn after_key(key: ClusteringKey) -> Self {
        if key.is_empty() {
            return Position::AfterAllRows;
        }
        Position::Clustering {
            key,
            weight: BoundWeight::AfterAllPrefixed,
        }
    }

    pub const fn before_all_rows() -> Self {
        Position::BeforeAllRows
    }

    pub const fn after_all_rows() -> Self {
        Position::AfterAllRows
    }

    fn region(&self) -> u8 {
        match self {
            Position::PartitionStart => 0,
            Position::StaticRow => 1,
            Position::BeforeAllRows => 2,
            Position::Clustering { .. } => 3,
            Position::AfterAllRows => 4,
            Position::PartitionEnd => 5,
        }
    }

    pub fn is_clustering(&self) -> bool {
        matches!(
            self,
            Position::BeforeAllRows | Position::Clustering { .. } | Position::AfterAllRows
        )
    }

    /// Interpret this position as the start of an interval.
    pub fn as_start_bound(&self) -> Bound {
        match self {
            Position::Clustering {
                key,
                weight: BoundWeight::AfterAllPrefixed,
            } => Bound::new(key.clone(), BoundKind::ExclStart),
            Position::Clustering { key, .. } => Bound::new(key.clone(), BoundKind::InclStart),
            // Nothing starts after all rows.
            Position::AfterAllRows | Position::PartitionEnd => {
                Bound::new(ClusteringKey::empty(), BoundKind::ExclStart)
            }
            _ => Bound::new(ClusteringKey::empty(), BoundKind::InclStart),
        }
    }

    /// Interpret this position as the end of an interval.
    pub fn as_end_bound(&self) -> Bound {
        match self {
            Position::Clustering {
                key,
                weight: BoundWeight::BeforeAllPrefixed,
            } => Bound::new(key.clone(), BoundKind::ExclEnd),
            Position::Clustering { key, .. } => Bound::new(key.clone(), BoundKind::InclEnd),
            Position::AfterAllRows | Position::PartitionEnd => {
                Bound::new(ClusteringKey::empty(), BoundKind::InclEnd)
            }
            // Nothing ends before all rows.
            _ => Bound::new(ClusteringKey::empty(), BoundKind::ExclEnd),
        }
    }
}

fn cmp_prefixed(
    k1: &ClusteringKey,
    w1: BoundWeight,
    k2: &ClusteringKey,
    w2: BoundWeight,
) -> Ordering {
    for (c1, c2) in k1.components().iter().zip(k2.components()) {
        match c1.cmp(c2) {
            Ordering::Equal => {}
            ord => return ord,
        }
    }

    match k1.len().cmp(&k2.len()) {
        Ordering::Equal => w1.cmp(&w2),
        // k1 is a strict prefix of k2
        Ordering::Less => {
            if w1 == BoundWeight::AfterAllPrefixed {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        Ordering::Greater => {
            if w2 == BoundWeight::AfterAllPrefixed {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (
                Position::Clustering {
                    key: k1,
                    weight: w1,
                },
                Position::Clustering {
                    key: k2,
                    weight: w2,
                },
            ) => cmp_prefixed(k1, *w1, k2, *w2),
            _ => self.region().cmp(&other.region()),
        }
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::PartitionStart => write!(f, "{{partition_start}}"),
            Position::StaticRow => write!(f, "{{static_row}}"),
            Position::BeforeAllRows => write!(f, "{{before_all_rows}}"),
            Position::Clustering { key, weight } => {
                let w = match weight {
                    BoundWeight::BeforeAllPrefixed => -1,
                    BoundWeight::Equal => 0,
                    BoundWeight::AfterAllPrefixed => 1,
                };
                write!(f, "{{{}, {}}}", key, w)
            }
            Position::AfterAllRows => write!(f, "{{after_all_rows}}"),
            Position::PartitionEnd => write!(f, "{{partition_end}}"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundKind {
    InclStart,
    ExclStart,
    InclEnd,
    ExclEnd,
}

impl BoundKind {
    pub fn is_start(&self) -> bool {
        matches!(self, BoundKind::InclStart | BoundKind::ExclStart)
    }
}

/// An interval endpoint: a key prefix and how the interval treats it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bound {
    pub key: ClusteringKey,
    pub kind: BoundKind,
}

impl Bound {
    pub fn new(key: ClusteringKey, kind: BoundKind) -> Self {
        Self { key, kind }
    }

    /// The position this bound refers to.
    ///
    /// An empty prefix maps to [`Position::BeforeAllRows`] or [`Position::AfterAllRows`].
    pub fn position(&self) -> Position {
        match self.kind {
            BoundKind::InclStart | BoundKind::ExclEnd => Position::before_key(self.key.clone()),
            BoundKind::ExclStart | BoundKind::InclEnd => Position::after_key(self.key.clone()),
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            BoundKind::InclStart => write!(f, "[{}", self.key),
            BoundKind::ExclStart => write!(f, "({}", self.key),
            BoundKind::InclEnd => write!(f, "{}]", self.key),
            BoundKind::ExclEnd => write!(f, "{})", self.key),
        }
    }
}

/// A half-open range of positions, `[start, end)`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PositionRange {
    pub start: Position,
    pub end: Position,
}

impl PositionRange {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Every clustering row of a partition.
    pub fn all_clustered_rows() -> Self {
        Self::new(Position::BeforeAllRows, Position::AfterAllRows)
    }

    pub fn contains(&self, pos: &Position) -> bool {
        &self.start <= pos && pos < &self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl fmt::Display for PositionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// A partition key together with its token.
///
/// The key bytes are shared, so a clone can outlive the fragment it was taken from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DecoratedKey {
    token: i64,
    key: Arc<[u8]>,
}

impl DecoratedKey {
    pub fn new(token: i64, key: impl AsRef<[u8]>) -> Self {
        Self {
            token,
            key: Arc::from(key.as_ref()),
        }
    }

    pub fn token(&self) -> i64 {
        self.token
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }
}

impl fmt::Display for DecoratedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}, {}}}", self.token, String::from_utf8_lossy(&self.key))
    }
}

/// A range of partitions, ordered by [`DecoratedKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRange {
    start: ops::Bound<DecoratedKey>,
    end: ops::Bound<DecoratedKey>,
}

impl PartitionRange {
    pub fn new(start: ops::Bound<DecoratedKey>, end: ops::Bound<DecoratedKey>) -> Self {
        Self { start, end }
    }

    pub fn full() -> Self {
        Self::new(ops::Bound::Unbounded, ops::Bound::Unbounded)
    }

    pub fn single(key: DecoratedKey) -> Self {
        Self::new(ops::Bound::Included(key.clone()), ops::Bound::Included(key))
    }

    /// `[start, end)` in key order.
    pub fn between(start: DecoratedKey, end: DecoratedKey) -> Self {
        Self::new(ops::Bound::Included(start), ops::Bound::Excluded(end))
    }
}

impl Default for PartitionRange {
    fn default() -> Self {
        Self::full()
    }
}

impl RangeBounds<DecoratedKey> for PartitionRange {
    fn start_bound(&self) -> ops::Bound<&DecoratedKey> {
        self.start.as_ref()
    }

    fn end_bound(&self) -> ops::Bound<&DecoratedKey> {
        self.end.as_ref()
    }
}
