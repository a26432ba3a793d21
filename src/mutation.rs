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

//! Materializes partitions of a [`FragmentV1Stream`] into [`Mutation`]s.

use std::collections::BTreeMap;
use std::fmt;
use std::io;

use log::debug;

use crate::assembler::TombstoneAssembler;
use crate::consumer::PartitionConsumer;
use crate::consumer::StopIteration;
use crate::fragment::ClusteringRow;
use crate::fragment::RangeTombstone;
use crate::fragment::Row;
use crate::fragment::StaticRow;
use crate::fragment::Tombstone;
use crate::position::ClusteringKey;
use crate::position::DecoratedKey;
use crate::reader::FragmentReaderV2;
use crate::schema::SchemaRef;
use crate::stream::FragmentV1Stream;

/// The whole content of one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    schema: SchemaRef,
    key: DecoratedKey,
    partition_tombstone: Option<Tombstone>,
    static_row: Row,
    rows: BTreeMap<ClusteringKey, Row>,
    range_tombstones: Vec<RangeTombstone>,
}

impl Mutation {
    pub fn new(schema: SchemaRef, key: DecoratedKey) -> Self {
        Self {
            schema,
            key,
            partition_tombstone: None,
            static_row: Row::new(),
            rows: BTreeMap::new(),
            range_tombstones: vec![],
        }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn key(&self) -> &DecoratedKey {
        &self.key
    }

    pub fn partition_tombstone(&self) -> Option<Tombstone> {
        self.partition_tombstone
    }

    pub fn static_row(&self) -> &Row {
        &self.static_row
    }

    pub fn rows(&self) -> impl Iterator<Item = (&ClusteringKey, &Row)> {
        self.rows.iter()
    }

    pub fn row(&self, key: &ClusteringKey) -> Option<&Row> {
        self.rows.get(key)
    }

    pub fn range_tombstones(&self) -> &[RangeTombstone] {
        &self.range_tombstones
    }

    /// A partition with neither data nor deletions.
    pub fn is_empty(&self) -> bool {
        self.partition_tombstone.is_none()
            && self.static_row.is_empty()
            && self.rows.is_empty()
            && self.range_tombstones.is_empty()
    }

    /// Keep the greater of the current and `tomb`.
    pub fn apply_partition_tombstone(&mut self, tomb: Tombstone) {
        self.partition_tombstone = Some(match self.partition_tombstone {
            Some(t) => t.max(tomb),
            None => tomb,
        });
    }

    pub fn apply_static_row(&mut self, row: StaticRow) {
        self.static_row.apply(row.row);
    }

    /// Rows with the same key are merged.
    pub fn apply_clustering_row(&mut self, row: ClusteringRow) {
        self.rows.entry(row.key).or_default().apply(row.row);
    }

    /// An interval that continues the last one with the same tombstone extends it.
    pub fn apply_range_tombstone(&mut self, rt: RangeTombstone) {
        if let Some(last) = self.range_tombstones.last_mut() {
            if last.end == rt.start && last.tomb == rt.tomb {
                last.end = rt.end;
                return;
            }
        }
        self.range_tombstones.push(rt);
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{mutation: {} {}, rows: {}, range_tombstones: {}",
            self.schema,
            self.key,
            self.rows.len(),
            self.range_tombstones.len()
        )?;
        if let Some(t) = &self.partition_tombstone {
            write!(f, ", partition_tombstone: {}", t)?;
        }
        write!(f, "}}")
    }
}

/// A [`PartitionConsumer`] that builds one [`Mutation`] and stops at the end of its partition.
pub struct MutationRebuilder {
    schema: SchemaRef,
    mutation: Option<Mutation>,
}

impl MutationRebuilder {
    pub fn new(schema: SchemaRef) -> Self {
        Self {
            schema,
            mutation: None,
        }
    }

    fn apply(&mut self, f: impl FnOnce(&mut Mutation)) -> StopIteration {
        if let Some(m) = self.mutation.as_mut() {
            f(m);
        }
        StopIteration::No
    }
}

impl PartitionConsumer for MutationRebuilder {
    type Output = Option<Mutation>;

    fn consume_new_partition(&mut self, key: &DecoratedKey) {
        self.mutation = Some(Mutation::new(self.schema.clone(), key.clone()));
    }

    fn consume_partition_tombstone(&mut self, tomb: Tombstone) {
        self.apply(|m| m.apply_partition_tombstone(tomb));
    }

    fn consume_static_row(&mut self, row: StaticRow) -> StopIteration {
        self.apply(|m| m.apply_static_row(row))
    }

    fn consume_clustering_row(&mut self, row: ClusteringRow) -> StopIteration {
        self.apply(|m| m.apply_clustering_row(row))
    }

    fn consume_range_tombstone(&mut self, rt: RangeTombstone) -> StopIteration {
        self.apply(|m| m.apply_range_tombstone(rt))
    }

    /// Stops once a partition is built. The tail of a partition entered
    /// midway is passed over and the next partition is built instead.
    fn consume_end_of_partition(&mut self) -> StopIteration {
        if self.mutation.is_none() {
            debug!("MutationRebuilder: pass over the tail of a partition");
            return StopIteration::No;
        }
        StopIteration::Yes
    }

    fn consume_end_of_stream(self) -> Self::Output {
        self.mutation
    }
}

/// Read the next partition of `stream` as a whole, `None` if no partition is left.
pub async fn read_mutation<R, A>(
    stream: &mut FragmentV1Stream<R, A>,
) -> Result<Option<Mutation>, io::Error>
where
    R: FragmentReaderV2,
    A: TombstoneAssembler,
{
    let rebuilder = MutationRebuilder::new(stream.schema().clone());
    stream.consume(rebuilder).await
}

/// Feed every remaining partition of `stream` to `f`, until it returns
/// [`StopIteration::Yes`] or the stream ends.
pub async fn consume_partitions<R, A, F>(
    stream: &mut FragmentV1Stream<R, A>,
    mut f: F,
) -> Result<(), io::Error>
where
    R: FragmentReaderV2,
    A: TombstoneAssembler,
    F: FnMut(Mutation) -> StopIteration,
{
    while let Some(mutation) = read_mutation(stream).await? {
        if f(mutation).is_stop() {
            debug!("consume_partitions: stopped by consumer");
            break;
        }
    }
    Ok(())
}
