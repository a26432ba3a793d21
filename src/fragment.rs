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

//! The two fragment representations of partition content.
//!
//! - [`FragmentV2`]: range deletions are expressed as [`RangeTombstoneChange`] events,
//!   each one switching the active tombstone at a position.
//! - [`Fragment`]: range deletions are expressed as closed [`RangeTombstone`] intervals.
//!
//! Both share the row and partition boundary types.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::position::Bound;
use crate::position::ClusteringKey;
use crate::position::DecoratedKey;
use crate::position::Position;

/// A deletion marker: everything written at or before `timestamp` is deleted.
///
/// Tombstones are ordered by `timestamp` first; the greater one wins.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tombstone {
    pub timestamp: i64,
    /// Seconds since epoch when the deletion happened.
    pub deletion_time: u64,
}

impl Tombstone {
    pub fn new(timestamp: i64, deletion_time: u64) -> Self {
        Self {
            timestamp,
            deletion_time,
        }
    }
}

impl fmt::Display for Tombstone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{tombstone: timestamp={}, deletion_time={}}}",
            self.timestamp, self.deletion_time
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub timestamp: i64,
    pub value: Vec<u8>,
}

/// Cells of a row, by column name.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    cells: BTreeMap<String, Cell>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cell(mut self, column: impl ToString, timestamp: i64, value: impl AsRef<[u8]>) -> Self {
        self.set_cell(column, timestamp, value);
        self
    }

    pub fn set_cell(&mut self, column: impl ToString, timestamp: i64, value: impl AsRef<[u8]>) {
        self.cells.insert(column.to_string(), Cell {
            timestamp,
            value: value.as_ref().to_vec(),
        });
    }

    pub fn cell(&self, column: &str) -> Option<&Cell> {
        self.cells.get(column)
    }

    pub fn cells(&self) -> impl Iterator<Item = (&String, &Cell)> {
        self.cells.iter()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Merge `other` into this row, the cell with the greater timestamp wins.
    pub fn apply(&mut self, other: Row) {
        for (column, cell) in other.cells {
            match self.cells.get(&column) {
                Some(existing) if existing.timestamp >= cell.timestamp => {}
                _ => {
                    self.cells.insert(column, cell);
                }
            }
        }
    }

    /// Approximate heap footprint, for memory accounting.
    pub fn memory_usage(&self) -> usize {
        self.cells
            .iter()
            .map(|(k, c)| k.len() + c.value.len() + std::mem::size_of::<Cell>())
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionStart {
    pub key: DecoratedKey,
    pub tomb: Option<Tombstone>,
}

impl PartitionStart {
    pub fn new(key: DecoratedKey, tomb: Option<Tombstone>) -> Self {
        Self { key, tomb }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticRow {
    pub row: Row,
}

impl StaticRow {
    pub fn new(row: Row) -> Self {
        Self { row }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusteringRow {
    pub key: ClusteringKey,
    pub row: Row,
}

impl ClusteringRow {
    pub fn new(key: ClusteringKey, row: Row) -> Self {
        Self { key, row }
    }

    pub fn position(&self) -> Position {
        Position::for_key(self.key.clone())
    }
}

/// From `position` on, `tomb` is the active range deletion; `None` ends the active one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeTombstoneChange {
    pub position: Position,
    pub tomb: Option<Tombstone>,
}

impl RangeTombstoneChange {
    pub fn new(position: Position, tomb: Option<Tombstone>) -> Self {
        Self { position, tomb }
    }
}

/// A closed deletion interval `[start, end)` in position order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeTombstone {
    pub start: Position,
    pub end: Position,
    pub tomb: Tombstone,
}

impl RangeTombstone {
    pub fn new(start: Position, end: Position, tomb: Tombstone) -> Self {
        Self { start, end, tomb }
    }

    pub fn start_bound(&self) -> Bound {
        self.start.as_start_bound()
    }

    pub fn end_bound(&self) -> Bound {
        self.end.as_end_bound()
    }
}

impl fmt::Display for RangeTombstone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{range_tombstone: {}, {}, {}}}",
            self.start_bound(),
            self.end_bound(),
            self.tomb
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionEnd;

/// A fragment with range deletions expressed as change events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentV2 {
    PartitionStart(PartitionStart),
    StaticRow(StaticRow),
    ClusteringRow(ClusteringRow),
    RangeTombstoneChange(RangeTombstoneChange),
    PartitionEnd(PartitionEnd),
}

impl FragmentV2 {
    pub fn position(&self) -> Position {
        match self {
            FragmentV2::PartitionStart(_) => Position::PartitionStart,
            FragmentV2::StaticRow(_) => Position::StaticRow,
            FragmentV2::ClusteringRow(cr) => cr.position(),
            FragmentV2::RangeTombstoneChange(rtc) => rtc.position.clone(),
            FragmentV2::PartitionEnd(_) => Position::PartitionEnd,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FragmentV2::PartitionStart(_) => "partition_start",
            FragmentV2::StaticRow(_) => "static_row",
            FragmentV2::ClusteringRow(_) => "clustering_row",
            FragmentV2::RangeTombstoneChange(_) => "range_tombstone_change",
            FragmentV2::PartitionEnd(_) => "partition_end",
        }
    }

    pub fn is_partition_start(&self) -> bool {
        matches!(self, FragmentV2::PartitionStart(_))
    }

    pub fn is_partition_end(&self) -> bool {
        matches!(self, FragmentV2::PartitionEnd(_))
    }

    /// Approximate footprint, for memory accounting.
    pub fn memory_usage(&self) -> usize {
        let payload = match self {
            FragmentV2::PartitionStart(ps) => ps.key.key().len(),
            FragmentV2::StaticRow(sr) => sr.row.memory_usage(),
            FragmentV2::ClusteringRow(cr) => {
                cr.key.components().iter().map(|c| c.len()).sum::<usize>()
                    + cr.row.memory_usage()
            }
            FragmentV2::RangeTombstoneChange(_) | FragmentV2::PartitionEnd(_) => 0,
        };
        std::mem::size_of::<Self>() + payload
    }
}

impl fmt::Display for FragmentV2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FragmentV2::PartitionStart(ps) => write!(f, "{{partition_start: {}}}", ps.key),
            FragmentV2::RangeTombstoneChange(rtc) => match &rtc.tomb {
                Some(t) => write!(f, "{{range_tombstone_change: {}, {}}}", rtc.position, t),
                None => write!(f, "{{range_tombstone_change: {}, none}}", rtc.position),
            },
            other => write!(f, "{{{}: {}}}", other.kind(), other.position()),
        }
    }
}

/// A fragment with range deletions expressed as closed intervals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    PartitionStart(PartitionStart),
    StaticRow(StaticRow),
    ClusteringRow(ClusteringRow),
    RangeTombstone(RangeTombstone),
    PartitionEnd(PartitionEnd),
}

impl Fragment {
    /// The position a fragment is ordered by; an interval is ordered by its start.
    pub fn position(&self) -> Position {
        match self {
            Fragment::PartitionStart(_) => Position::PartitionStart,
            Fragment::StaticRow(_) => Position::StaticRow,
            Fragment::ClusteringRow(cr) => cr.position(),
            Fragment::RangeTombstone(rt) => rt.start.clone(),
            Fragment::PartitionEnd(_) => Position::PartitionEnd,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Fragment::PartitionStart(_) => "partition_start",
            Fragment::StaticRow(_) => "static_row",
            Fragment::ClusteringRow(_) => "clustering_row",
            Fragment::RangeTombstone(_) => "range_tombstone",
            Fragment::PartitionEnd(_) => "partition_end",
        }
    }

    pub fn is_partition_start(&self) -> bool {
        matches!(self, Fragment::PartitionStart(_))
    }

    pub fn is_partition_end(&self) -> bool {
        matches!(self, Fragment::PartitionEnd(_))
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fragment::PartitionStart(ps) => write!(f, "{{partition_start: {}}}", ps.key),
            Fragment::RangeTombstone(rt) => write!(f, "{}", rt),
            other => write!(f, "{{{}: {}}}", other.kind(), other.position()),
        }
    }
}

macro_rules! impl_from_variant {
    ($enum:ident, $variant:ident) => {
        impl From<$variant> for $enum {
            fn from(value: $variant) -> Self {
                $enum::$variant(value)
            }
        }
    };
}

impl_from_variant!(FragmentV2, PartitionStart);
impl_from_variant!(FragmentV2, StaticRow);
impl_from_variant!(FragmentV2, ClusteringRow);
impl_from_variant!(FragmentV2, RangeTombstoneChange);
impl_from_variant!(FragmentV2, PartitionEnd);

impl_from_variant!(Fragment, PartitionStart);
impl_from_variant!(Fragment, StaticRow);
impl_from_variant!(Fragment, ClusteringRow);
impl_from_variant!(Fragment, RangeTombstone);
impl_from_variant!(Fragment, PartitionEnd);

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::position::BoundKind;

    #[test]
    fn test_row_apply_newer_wins() {
        let mut r = Row::new().with_cell("a", 1, "a1").with_cell("b", 5, "b5");
        r.apply(Row::new().with_cell("a", 2, "a2").with_cell("b", 3, "b3").with_cell("c", 1, "c1"));

        assert_eq!(r.cell("a").map(|c| c.value.clone()), Some(b"a2".to_vec()));
        assert_eq!(r.cell("b").map(|c| c.value.clone()), Some(b"b5".to_vec()));
        assert_eq!(r.len(), 3);
    }

    #[test]
    fn test_fragment_position_and_kind() {
        let cr = ClusteringRow::new(ClusteringKey::from(3), Row::new());
        let f: Fragment = cr.clone().into();
        assert_eq!(f.kind(), "clustering_row");
        assert_eq!(f.position(), Position::for_key(ClusteringKey::from(3)));

        let rt = RangeTombstone::new(
            Position::before_key(ClusteringKey::from(1)),
            Position::before_key(ClusteringKey::from(2)),
            Tombstone::new(10, 100),
        );
        let f: Fragment = rt.clone().into();
        assert_eq!(f.position(), rt.start);

        let f: FragmentV2 = PartitionEnd.into();
        assert!(f.is_partition_end());
        assert_eq!(f.position(), Position::PartitionEnd);
    }

    #[test]
    fn test_range_tombstone_bounds() {
        let rt = RangeTombstone::new(
            Position::before_key(ClusteringKey::from("a")),
            Position::after_key(ClusteringKey::from("c")),
            Tombstone::new(1, 1),
        );
        assert_eq!(rt.start_bound().kind, BoundKind::InclStart);
        assert_eq!(rt.end_bound().kind, BoundKind::InclEnd);
        assert_eq!(
            "{range_tombstone: [[a], [c]], {tombstone: timestamp=1, deletion_time=1}}",
            rt.to_string()
        );
    }

    #[test]
    fn test_tombstone_order() {
        assert!(Tombstone::new(1, 9) < Tombstone::new(2, 0));
        assert!(Tombstone::new(1, 1) < Tombstone::new(1, 2));
    }
}
