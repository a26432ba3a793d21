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

//! Fragment builders shared by tests.

use crate::fragment::ClusteringRow;
use crate::fragment::Fragment;
use crate::fragment::FragmentV2;
use crate::fragment::PartitionEnd;
use crate::fragment::PartitionStart;
use crate::fragment::RangeTombstone;
use crate::fragment::RangeTombstoneChange;
use crate::fragment::Row;
use crate::fragment::StaticRow;
use crate::fragment::Tombstone;
use crate::impls::vec_reader::VecReader;
use crate::permit::ReaderPermit;
use crate::position::ClusteringKey;
use crate::position::DecoratedKey;
use crate::position::Position;
use crate::schema::Schema;
use crate::schema::SchemaRef;

pub(crate) fn schema() -> SchemaRef {
    Schema::new("ks", "t", ["ck"]).into_ref()
}

pub(crate) fn reader(fragments: impl IntoIterator<Item = FragmentV2>) -> VecReader {
    VecReader::new(schema(), ReaderPermit::new("test"), fragments)
}

pub(crate) fn pk(token: i64) -> DecoratedKey {
    DecoratedKey::new(token, format!("pk{}", token))
}

pub(crate) fn t(ts: i64) -> Tombstone {
    Tombstone::new(ts, 0)
}

pub(crate) fn before(k: u64) -> Position {
    Position::before_key(ClusteringKey::from(k))
}

pub(crate) fn after(k: u64) -> Position {
    Position::after_key(ClusteringKey::from(k))
}

pub(crate) fn ps(token: i64) -> FragmentV2 {
    PartitionStart::new(pk(token), None).into()
}

pub(crate) fn ps_deleted(token: i64, ts: i64) -> FragmentV2 {
    PartitionStart::new(pk(token), Some(t(ts))).into()
}

pub(crate) fn sr() -> FragmentV2 {
    StaticRow::new(Row::new().with_cell("s", 1, "static")).into()
}

pub(crate) fn crow(k: u64) -> ClusteringRow {
    ClusteringRow::new(ClusteringKey::from(k), Row::new().with_cell("v", 1, format!("v{}", k)))
}

pub(crate) fn cr(k: u64) -> FragmentV2 {
    crow(k).into()
}

/// A tombstone `ts` becomes active before key `k`.
pub(crate) fn open(k: u64, ts: i64) -> FragmentV2 {
    RangeTombstoneChange::new(before(k), Some(t(ts))).into()
}

/// The active tombstone ends before key `k`.
pub(crate) fn close(k: u64) -> FragmentV2 {
    RangeTombstoneChange::new(before(k), None).into()
}

pub(crate) fn pe() -> FragmentV2 {
    PartitionEnd.into()
}

pub(crate) fn rt(start: Position, end: Position, ts: i64) -> Fragment {
    RangeTombstone::new(start, end, t(ts)).into()
}

/// The v1 counterpart of a fragment that passes through unchanged.
pub(crate) fn v1(f: FragmentV2) -> Fragment {
    match f {
        FragmentV2::PartitionStart(x) => x.into(),
        FragmentV2::StaticRow(x) => x.into(),
        FragmentV2::ClusteringRow(x) => x.into(),
        FragmentV2::PartitionEnd(x) => x.into(),
        FragmentV2::RangeTombstoneChange(x) => {
            panic!("range tombstone change has no v1 counterpart: {:?}", x)
        }
    }
}
