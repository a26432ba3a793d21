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

//! Defines the interface of a source of [`FragmentV2`]s.
//!
//! The [`FragmentReaderV2`] trait is what a [`FragmentV1Stream`](crate::FragmentV1Stream)
//! pulls from. Implementations own their buffering and I/O; the stream only relies on the
//! order of fragments and on the repositioning operations below.

use std::io;

use crate::fragment::FragmentV2;
use crate::permit::ReaderPermit;
use crate::position::PartitionRange;
use crate::position::PositionRange;
use crate::schema::SchemaRef;

/// A pull-based source of [`FragmentV2`]s, ordered by partition and then by position.
///
/// Only one caller drives a reader at a time: every method must complete before the
/// next one is issued.
///
/// # Examples
///
/// ```rust,no_run
/// use std::io;
///
/// use fragment_stream::impls::vec_reader::VecReader;
/// use fragment_stream::FragmentReaderV2;
/// use fragment_stream::ReaderPermit;
/// use fragment_stream::Schema;
///
/// #[tokio::main]
/// async fn main() -> io::Result<()> {
///     let schema = Schema::new("ks", "t", ["ck"]).into_ref();
///     let mut reader = VecReader::new(schema, ReaderPermit::new("example"), []);
///
///     while let Some(fragment) = reader.next().await? {
///         println!("{}", fragment);
///     }
///
///     reader.close().await
/// }
/// ```
#[async_trait::async_trait]
pub trait FragmentReaderV2: Send {
    fn schema(&self) -> &SchemaRef;

    fn permit(&self) -> &ReaderPermit;

    /// Pop the next fragment, `None` at end of stream.
    async fn next(&mut self) -> Result<Option<FragmentV2>, io::Error>;

    /// Return the next fragment without consuming it.
    async fn peek(&mut self) -> Result<Option<FragmentV2>, io::Error>;

    /// Whether the source is exhausted and nothing is left in the buffer.
    ///
    /// It does not perform I/O: `false` does not guarantee another fragment exists.
    fn is_end_of_stream(&self) -> bool;

    /// Skip the rest of the current partition.
    ///
    /// A no-op if the next fragment already is a partition start.
    async fn next_partition(&mut self) -> Result<(), io::Error>;

    /// Restrict the rest of the stream to partitions in `range`.
    async fn fast_forward_to_partition_range(
        &mut self,
        range: PartitionRange,
    ) -> Result<(), io::Error>;

    /// Restrict the rest of the current partition to positions in `range`.
    ///
    /// Successive ranges in one partition must be increasing and must not overlap.
    /// Once `range` is exhausted, `next()` returns `None` until the next repositioning,
    /// unless nothing of the partition lies past `range`: then the partition end follows.
    async fn fast_forward_to_position_range(&mut self, range: PositionRange)
        -> Result<(), io::Error>;

    fn set_max_buffer_size(&mut self, size: usize);

    /// Read ahead until the buffer is full or the source is exhausted.
    async fn fill_buffer(&mut self) -> Result<(), io::Error>;

    fn is_buffer_empty(&self) -> bool;

    fn is_buffer_full(&self) -> bool;

    /// Release the resources held by this reader. It must not be read afterward.
    async fn close(&mut self) -> Result<(), io::Error>;
}

#[async_trait::async_trait]
impl<R> FragmentReaderV2 for Box<R>
where R: FragmentReaderV2 + ?Sized
{
    fn schema(&self) -> &SchemaRef {
        (**self).schema()
    }

    fn permit(&self) -> &ReaderPermit {
        (**self).permit()
    }

    async fn next(&mut self) -> Result<Option<FragmentV2>, io::Error> {
        (**self).next().await
    }

    async fn peek(&mut self) -> Result<Option<FragmentV2>, io::Error> {
        (**self).peek().await
    }

    fn is_end_of_stream(&self) -> bool {
        (**self).is_end_of_stream()
    }

    async fn next_partition(&mut self) -> Result<(), io::Error> {
        (**self).next_partition().await
    }

    async fn fast_forward_to_partition_range(
        &mut self,
        range: PartitionRange,
    ) -> Result<(), io::Error> {
        (**self).fast_forward_to_partition_range(range).await
    }

    async fn fast_forward_to_position_range(
        &mut self,
        range: PositionRange,
    ) -> Result<(), io::Error> {
        (**self).fast_forward_to_position_range(range).await
    }

    fn set_max_buffer_size(&mut self, size: usize) {
        (**self).set_max_buffer_size(size)
    }

    async fn fill_buffer(&mut self) -> Result<(), io::Error> {
        (**self).fill_buffer().await
    }

    fn is_buffer_empty(&self) -> bool {
        (**self).is_buffer_empty()
    }

    fn is_buffer_full(&self) -> bool {
        (**self).is_buffer_full()
    }

    async fn close(&mut self) -> Result<(), io::Error> {
        (**self).close().await
    }
}
