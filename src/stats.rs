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

//! Collects summary statistics of the content of a stream.

use log::trace;
use serde::Deserialize;
use serde::Serialize;

use crate::consumer::PartitionConsumer;
use crate::consumer::StopIteration;
use crate::fragment::ClusteringRow;
use crate::fragment::RangeTombstone;
use crate::fragment::Row;
use crate::fragment::StaticRow;
use crate::fragment::Tombstone;
use crate::position::Bound;
use crate::position::BoundKind;
use crate::position::ClusteringKey;
use crate::position::DecoratedKey;
use crate::schema::SchemaRef;

/// Statistics of the partitions fed to a [`MetadataCollector`].
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsMetadata {
    pub partitions_count: u64,
    pub rows_count: u64,
    pub cells_count: u64,
    pub range_tombstones_count: u64,
    pub min_timestamp: Option<i64>,
    pub max_timestamp: Option<i64>,
    /// The smallest clustering prefix covered by a row or a range tombstone.
    pub min_clustering_key: Option<ClusteringKey>,
    /// The greatest clustering prefix covered by a row or a range tombstone.
    pub max_clustering_key: Option<ClusteringKey>,
}

/// A [`PartitionConsumer`] that never stops and returns [`StatsMetadata`] at the end.
pub struct MetadataCollector {
    schema: SchemaRef,
    stats: StatsMetadata,
}

impl MetadataCollector {
    pub fn new(schema: SchemaRef) -> Self {
        Self {
            schema,
            stats: StatsMetadata::default(),
        }
    }

    pub fn stats(&self) -> &StatsMetadata {
        &self.stats
    }

    fn update_timestamp(&mut self, ts: i64) {
        let s = &mut self.stats;
        s.min_timestamp = Some(s.min_timestamp.map_or(ts, |m| m.min(ts)));
        s.max_timestamp = Some(s.max_timestamp.map_or(ts, |m| m.max(ts)));
    }

    fn update_row(&mut self, row: &Row) {
        for (_, cell) in row.cells() {
            self.stats.cells_count += 1;
            self.update_timestamp(cell.timestamp);
        }
    }

    fn update_min(&mut self, start: Bound) {
        let replace = match &self.stats.min_clustering_key {
            None => true,
            Some(min) => {
                start.position() < Bound::new(min.clone(), BoundKind::InclStart).position()
            }
        };

        if replace {
            trace!("{}: setting min_clustering_key={}", self.schema, start.key);
            self.stats.min_clustering_key = Some(start.key);
        }
    }

    fn update_max(&mut self, end: Bound) {
        let replace = match &self.stats.max_clustering_key {
            None => true,
            Some(max) => end.position() > Bound::new(max.clone(), BoundKind::InclEnd).position(),
        };

        if replace {
            trace!("{}: setting max_clustering_key={}", self.schema, end.key);
            self.stats.max_clustering_key = Some(end.key);
        }
    }
}

impl PartitionConsumer for MetadataCollector {
    type Output = StatsMetadata;

    fn consume_new_partition(&mut self, key: &DecoratedKey) {
        trace!("{}: partition {}", self.schema, key);
        self.stats.partitions_count += 1;
    }

    fn consume_partition_tombstone(&mut self, tomb: Tombstone) {
        self.update_timestamp(tomb.timestamp);
    }

    fn consume_static_row(&mut self, row: StaticRow) -> StopIteration {
        self.update_row(&row.row);
        StopIteration::No
    }

    fn consume_clustering_row(&mut self, row: ClusteringRow) -> StopIteration {
        self.stats.rows_count += 1;
        self.update_row(&row.row);
        self.update_min(Bound::new(row.key.clone(), BoundKind::InclStart));
        self.update_max(Bound::new(row.key, BoundKind::InclEnd));
        StopIteration::No
    }

    fn consume_range_tombstone(&mut self, rt: RangeTombstone) -> StopIteration {
        self.stats.range_tombstones_count += 1;
        self.update_timestamp(rt.tomb.timestamp);
        self.update_min(rt.start_bound());
        self.update_max(rt.end_bound());
        StopIteration::No
    }

    fn consume_end_of_partition(&mut self) -> StopIteration {
        StopIteration::No
    }

    fn consume_end_of_stream(self) -> Self::Output {
        trace!("{}: collected {:?}", self.schema, self.stats);
        self.stats
    }
}
