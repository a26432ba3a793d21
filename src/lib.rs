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

//! # Fragment Stream
//!
//! Adapts a stream of partition fragments that expresses range deletions as
//! [`RangeTombstoneChange`] events into one that expresses them as closed
//! [`RangeTombstone`] intervals.
//!
//! ## Core Components
//!
//! - [`FragmentReaderV2`]: the source of change-event fragments
//! - [`FragmentV1Stream`]: the adapter, pulling [`FragmentV2`]s and yielding [`Fragment`]s
//! - [`PartitionConsumer`]: push-style consumption with early termination and partition skip
//! - [`read_mutation`] and [`consume_partitions`]: whole-partition drivers
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::io;
//!
//! use fragment_stream::impls::vec_reader::VecReader;
//! use fragment_stream::read_mutation;
//! use fragment_stream::FragmentV1Stream;
//! use fragment_stream::ReaderPermit;
//! use fragment_stream::Schema;
//!
//! #[tokio::main]
//! async fn main() -> io::Result<()> {
//!     let schema = Schema::new("ks", "t", ["ck"]).into_ref();
//!     let reader = VecReader::new(schema, ReaderPermit::new("example"), []);
//!
//!     let mut stream = FragmentV1Stream::new(reader);
//!
//!     // Read partitions one at a time
//!     while let Some(mutation) = read_mutation(&mut stream).await? {
//!         println!("{}", mutation);
//!     }
//!
//!     stream.close().await
//! }
//! ```

use std::io;

use futures_util::stream::BoxStream;

pub mod assembler;
pub mod config;
pub mod consumer;
pub mod errors;
pub mod fragment;
pub mod impls;
pub mod mutation;
pub mod permit;
pub mod position;
pub mod reader;
pub mod schema;
pub mod stats;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::assembler::RangeTombstoneAssembler;
pub use crate::assembler::TombstoneAssembler;
pub use crate::config::StreamConfig;
pub use crate::consumer::PartitionConsumer;
pub use crate::consumer::StopIteration;
pub use crate::errors::AssemblerError;
pub use crate::errors::StreamError;
pub use crate::fragment::ClusteringRow;
pub use crate::fragment::Fragment;
pub use crate::fragment::FragmentV2;
pub use crate::fragment::PartitionEnd;
pub use crate::fragment::PartitionStart;
pub use crate::fragment::RangeTombstone;
pub use crate::fragment::RangeTombstoneChange;
pub use crate::fragment::Row;
pub use crate::fragment::StaticRow;
pub use crate::fragment::Tombstone;
pub use crate::mutation::consume_partitions;
pub use crate::mutation::read_mutation;
pub use crate::mutation::Mutation;
pub use crate::mutation::MutationRebuilder;
pub use crate::permit::ReaderPermit;
pub use crate::position::ClusteringKey;
pub use crate::position::DecoratedKey;
pub use crate::position::PartitionRange;
pub use crate::position::Position;
pub use crate::position::PositionRange;
pub use crate::reader::FragmentReaderV2;
pub use crate::schema::Schema;
pub use crate::schema::SchemaRef;
pub use crate::stats::MetadataCollector;
pub use crate::stats::StatsMetadata;
pub use crate::stream::FragmentV1Stream;

/// A boxed stream that yields `Result` of items or an `io::Error`.
pub type IOResultStream<T> = BoxStream<'static, Result<T, io::Error>>;
