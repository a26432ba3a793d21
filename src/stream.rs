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

//! Adapts a [`FragmentReaderV2`] into a stream of [`Fragment`]s.
//!
//! Range tombstone changes read from the underlying reader are fed to a
//! [`TombstoneAssembler`], and only the closed intervals it produces are emitted.
//! Everything else passes through unchanged, in order.

use std::io;
use std::mem;
use std::time::Instant;

use futures_util::StreamExt;
use log::debug;
use log::trace;

use crate::assembler::RangeTombstoneAssembler;
use crate::assembler::TombstoneAssembler;
use crate::config::StreamConfig;
use crate::errors::StreamError;
use crate::fragment::ClusteringRow;
use crate::fragment::Fragment;
use crate::fragment::FragmentV2;
use crate::permit::ReaderPermit;
use crate::position::PartitionRange;
use crate::position::Position;
use crate::position::PositionRange;
use crate::reader::FragmentReaderV2;
use crate::schema::SchemaRef;
use crate::IOResultStream;

/// What the stream holds besides the reader and the assembler.
#[derive(Debug)]
enum State {
    /// Nothing pending: the next fragment comes from the reader.
    Ready,

    /// A row read from the reader, held back because a range tombstone was emitted ahead of it.
    RowBuffered(ClusteringRow),

    Closed,
}

/// A pull-based stream of [`Fragment`]s, built on top of a [`FragmentReaderV2`].
///
/// The stream exclusively owns the reader. It emits fragments in the reader's order,
/// except that a range tombstone can be emitted ahead of the clustering row that
/// revealed its end; that row is then returned by the following `next()`, without
/// touching the reader.
///
/// A tombstone still open when a partition or the stream ends is discarded.
///
/// # Examples
///
/// ```rust,no_run
/// use std::io;
///
/// use fragment_stream::impls::vec_reader::VecReader;
/// use fragment_stream::FragmentV1Stream;
/// use fragment_stream::ReaderPermit;
/// use fragment_stream::Schema;
///
/// #[tokio::main]
/// async fn main() -> io::Result<()> {
///     let schema = Schema::new("ks", "t", ["ck"]).into_ref();
///     let reader = VecReader::new(schema, ReaderPermit::new("example"), []);
///
///     let mut stream = FragmentV1Stream::new(reader);
///     while let Some(fragment) = stream.next().await? {
///         println!("{}", fragment);
///     }
///     stream.close().await
/// }
/// ```
pub struct FragmentV1Stream<R, A = RangeTombstoneAssembler> {
    reader: R,
    schema: SchemaRef,
    permit: ReaderPermit,
    assembler: A,
    state: State,
}

impl<R> FragmentV1Stream<R>
where R: FragmentReaderV2
{
    pub fn new(reader: R) -> Self {
        Self::with_assembler(reader, RangeTombstoneAssembler::default())
    }

    /// Build a stream and apply `config` to it.
    pub fn with_config(reader: R, config: &StreamConfig) -> Self {
        let mut stream = Self::new(reader);
        stream.set_max_buffer_size(config.max_buffer_size);
        if let Some(timeout) = config.timeout {
            stream.set_timeout(Instant::now() + timeout);
        }
        stream
    }
}

impl<R, A> FragmentV1Stream<R, A>
where
    R: FragmentReaderV2,
    A: TombstoneAssembler,
{
    pub fn with_assembler(reader: R, assembler: A) -> Self {
        let schema = reader.schema().clone();
        let permit = reader.permit().clone();
        Self {
            reader,
            schema,
            permit,
            assembler,
            state: State::Ready,
        }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn permit(&self) -> &ReaderPermit {
        &self.permit
    }

    pub fn underlying(&self) -> &R {
        &self.reader
    }

    /// Give the reader back. A row held back by the stream is lost.
    pub fn into_underlying(self) -> R {
        self.reader
    }

    /// Convert into a [`futures::Stream`] of fragments.
    pub fn into_stream(self) -> IOResultStream<Fragment>
    where
        R: 'static,
        A: 'static,
    {
        futures::stream::try_unfold(self, |mut strm| async move {
            let fragment = strm.next().await?;
            Ok::<_, io::Error>(fragment.map(|f| (f, strm)))
        })
        .boxed()
    }

    /// Return the next fragment, or `None` at end of stream.
    pub async fn next(&mut self) -> Result<Option<Fragment>, io::Error> {
        match mem::replace(&mut self.state, State::Ready) {
            State::Ready => {}
            State::RowBuffered(row) => {
                return Ok(Some(row.into()));
            }
            State::Closed => {
                self.state = State::Closed;
                return Err(StreamError::closed("FragmentV1Stream", "next").into());
            }
        }

        if self.reader.is_end_of_stream() {
            return Ok(None);
        }

        self.read_from_underlying().await
    }

    /// Pull from the reader until a fragment is produced or the reader is exhausted.
    ///
    /// A range tombstone change the assembler only records produces no fragment,
    /// thus more than one fragment may be read.
    async fn read_from_underlying(&mut self) -> Result<Option<Fragment>, io::Error> {
        loop {
            let Some(fragment) = self.reader.next().await? else {
                self.assembler.on_end_of_stream();
                return Ok(None);
            };

            if let Some(out) = self.translate(fragment)? {
                return Ok(Some(out));
            }

            trace!("FragmentV1Stream: swallowed a range tombstone change, read more");
        }
    }

    fn translate(&mut self, fragment: FragmentV2) -> Result<Option<Fragment>, io::Error> {
        let out: Fragment = match fragment {
            FragmentV2::PartitionStart(ps) => {
                self.assembler.reset();
                ps.into()
            }
            FragmentV2::StaticRow(sr) => sr.into(),
            FragmentV2::ClusteringRow(cr) => {
                if self.assembler.needs_flush() {
                    let pos = Position::after_key(cr.key.clone());
                    if let Some(rt) = self.assembler.flush(&self.schema, pos) {
                        self.state = State::RowBuffered(cr);
                        return Ok(Some(rt.into()));
                    }
                }
                cr.into()
            }
            FragmentV2::RangeTombstoneChange(rtc) => {
                let rt = self.assembler.consume(&self.schema, rtc)?;
                return Ok(rt.map(Fragment::from));
            }
            FragmentV2::PartitionEnd(pe) => {
                self.assembler.on_end_of_stream();
                pe.into()
            }
        };
        Ok(Some(out))
    }

    /// Whether another fragment may follow, without consuming it.
    ///
    /// A `true` can still be followed by a `None` from `next()`: the remaining
    /// fragments may be range tombstone changes that produce nothing.
    pub async fn has_more_fragments(&mut self) -> Result<bool, io::Error> {
        match &self.state {
            State::RowBuffered(_) => return Ok(true),
            State::Closed => {
                return Err(StreamError::closed("FragmentV1Stream", "has_more_fragments").into())
            }
            State::Ready => {}
        }

        if self.reader.is_end_of_stream() {
            return Ok(false);
        }

        let peeked = self.reader.peek().await?;
        Ok(peeked.is_some())
    }

    fn ensure_open(&self, operation: &'static str) -> Result<(), io::Error> {
        if let State::Closed = self.state {
            return Err(StreamError::closed("FragmentV1Stream", operation).into());
        }
        Ok(())
    }

    fn reset_state(&mut self) {
        if let State::RowBuffered(row) = &self.state {
            debug!(
                "FragmentV1Stream: drop buffered row at {} on reposition",
                row.position()
            );
        }
        self.assembler.reset();
        self.state = State::Ready;
    }

    /// Skip the rest of the current partition.
    pub async fn next_partition(&mut self) -> Result<(), io::Error> {
        self.ensure_open("next_partition")?;
        self.reset_state();
        self.reader.next_partition().await
    }

    pub async fn fast_forward_to_partition_range(
        &mut self,
        range: PartitionRange,
    ) -> Result<(), io::Error> {
        self.ensure_open("fast_forward_to_partition_range")?;
        self.reset_state();
        self.reader.fast_forward_to_partition_range(range).await
    }

    pub async fn fast_forward_to_position_range(
        &mut self,
        range: PositionRange,
    ) -> Result<(), io::Error> {
        self.ensure_open("fast_forward_to_position_range")?;
        self.reset_state();
        self.reader.fast_forward_to_position_range(range).await
    }

    pub fn set_timeout(&mut self, timeout: Instant) {
        self.permit.set_timeout(timeout);
    }

    pub fn set_max_buffer_size(&mut self, size: usize) {
        self.reader.set_max_buffer_size(size);
    }

    pub async fn fill_buffer(&mut self) -> Result<(), io::Error> {
        self.ensure_open("fill_buffer")?;
        self.reader.fill_buffer().await
    }

    pub fn is_buffer_empty(&self) -> bool {
        !self.has_buffered_row() && self.reader.is_buffer_empty()
    }

    pub fn is_buffer_full(&self) -> bool {
        self.reader.is_buffer_full()
    }

    pub fn is_end_of_stream(&self) -> bool {
        !self.has_buffered_row() && self.reader.is_end_of_stream()
    }

    fn has_buffered_row(&self) -> bool {
        matches!(self.state, State::RowBuffered(_))
    }

    /// Close the underlying reader. The stream must not be read afterward.
    ///
    /// Every call is passed to the reader, which decides whether closing twice is an error.
    pub async fn close(&mut self) -> Result<(), io::Error> {
        self.assembler.reset();
        self.state = State::Closed;
        self.reader.close().await
    }
}
