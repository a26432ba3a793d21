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

//! Provides an in-memory implementation of [`FragmentReaderV2`].
//!
//! [`VecReader`] serves a pre-built list of fragments. It is intended for testing
//! and for feeding already materialized data into a stream.

use std::collections::VecDeque;
use std::io;
use std::ops::RangeBounds;

use log::debug;
use log::trace;

use crate::config::DEFAULT_MAX_BUFFER_SIZE;
use crate::errors::StreamError;
use crate::fragment::FragmentV2;
use crate::fragment::RangeTombstoneChange;
use crate::fragment::Tombstone;
use crate::permit::ReaderPermit;
use crate::position::PartitionRange;
use crate::position::PositionRange;
use crate::reader::FragmentReaderV2;
use crate::schema::SchemaRef;

/// Restricts the clustering fragments of one partition to a [`PositionRange`].
///
/// A range tombstone active across the range start is re-opened at the start,
/// and one active at the range end is closed there. The first fragment at or past
/// the range end is handed back unconsumed, so that a later range can resume from it.
/// Partition end passes only when the partition has nothing left past the range.
#[derive(Debug)]
struct PositionFilter {
    range: PositionRange,
    /// The tombstone in effect in the source, after the last consumed fragment.
    active: Option<Tombstone>,
    entered: bool,
    done: bool,
}

impl PositionFilter {
    /// `active` is the tombstone in effect where the filter starts.
    fn new(range: PositionRange, active: Option<Tombstone>) -> Self {
        Self {
            range,
            active,
            entered: false,
            done: false,
        }
    }

    /// Push what `fragment` turns into to `out`, or return it if it lies past the range.
    fn filter(&mut self, fragment: FragmentV2, out: &mut Vec<FragmentV2>) -> Option<FragmentV2> {
        let pos = fragment.position();

        if fragment.is_partition_end() {
            self.finish(out);
            self.active = None;
            out.push(fragment);
            return None;
        }

        if !pos.is_clustering() {
            out.push(fragment);
            return None;
        }

        if self.done || pos >= self.range.end {
            self.finish(out);
            return Some(fragment);
        }

        if pos < self.range.start {
            if let FragmentV2::RangeTombstoneChange(rtc) = &fragment {
                self.active = rtc.tomb;
            }
            return None;
        }

        if !self.entered {
            self.entered = true;

            let replaced =
                matches!(fragment, FragmentV2::RangeTombstoneChange(_)) && pos == self.range.start;
            if let (Some(t), false) = (self.active, replaced) {
                out.push(RangeTombstoneChange::new(self.range.start.clone(), Some(t)).into());
            }
        }

        if let FragmentV2::RangeTombstoneChange(rtc) = &fragment {
            self.active = rtc.tomb;
        }
        out.push(fragment);
        None
    }

    fn finish(&mut self, out: &mut Vec<FragmentV2>) {
        if self.done {
            return;
        }
        self.done = true;

        if let Some(t) = self.active {
            if !self.entered && !self.range.is_empty() {
                out.push(RangeTombstoneChange::new(self.range.start.clone(), Some(t)).into());
            }
            out.push(RangeTombstoneChange::new(self.range.end.clone(), None).into());
        }
    }
}

/// A [`FragmentReaderV2`] over a list of fragments held in memory.
///
/// Fragments move from the unread list into a bounded buffer on `fill_buffer()`,
/// and are served from the buffer. Partition and position ranges are applied while
/// filling. Every read checks the permit deadline.
#[derive(Debug)]
pub struct VecReader {
    schema: SchemaRef,
    permit: ReaderPermit,

    /// Fragments not yet moved into the buffer.
    unread: VecDeque<FragmentV2>,
    buffer: VecDeque<FragmentV2>,
    max_buffer_size: usize,

    partition_range: PartitionRange,

    /// Set while dropping a partition out of `partition_range`.
    skip_partition: bool,

    position_filter: Option<PositionFilter>,

    /// The range tombstone in effect at the last fragment served.
    served_tombstone: Option<Tombstone>,

    closed: bool,

    /// Number of `next()` calls served, i.e., fragments actually pulled by a consumer.
    reads: usize,
}

impl VecReader {
    pub fn new(
        schema: SchemaRef,
        permit: ReaderPermit,
        fragments: impl IntoIterator<Item = FragmentV2>,
    ) -> Self {
        Self {
            schema,
            permit,
            unread: fragments.into_iter().collect(),
            buffer: VecDeque::new(),
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            partition_range: PartitionRange::full(),
            skip_partition: false,
            position_filter: None,
            served_tombstone: None,
            closed: false,
            reads: 0,
        }
    }

    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self, operation: &'static str) -> Result<(), io::Error> {
        if self.closed {
            return Err(StreamError::closed("VecReader", operation).into());
        }
        Ok(())
    }

    fn push_buffer(&mut self, fragment: FragmentV2) {
        self.permit.consume_memory(fragment.memory_usage());
        self.buffer.push_back(fragment);
    }

    fn pop_buffer(&mut self) -> Option<FragmentV2> {
        let fragment = self.buffer.pop_front()?;
        self.permit.release_memory(fragment.memory_usage());

        match &fragment {
            FragmentV2::RangeTombstoneChange(rtc) => self.served_tombstone = rtc.tomb,
            FragmentV2::PartitionStart(_) | FragmentV2::PartitionEnd(_) => {
                self.served_tombstone = None
            }
            _ => {}
        }
        Some(fragment)
    }

    /// Apply the partition range and the position filter to one unread fragment.
    ///
    /// Returns the fragment if the position filter leaves it for a later range.
    fn admit(&mut self, fragment: FragmentV2) -> Option<FragmentV2> {
        match &fragment {
            FragmentV2::PartitionStart(ps) => {
                self.position_filter = None;
                self.skip_partition = !self.partition_range.contains(&ps.key);
                if self.skip_partition {
                    trace!("VecReader: skip partition {} out of range", ps.key);
                    return None;
                }
            }
            _ if self.skip_partition => {
                if fragment.is_partition_end() {
                    self.skip_partition = false;
                }
                return None;
            }
            _ => {}
        }

        let mut out = Vec::with_capacity(2);
        let held = match &mut self.position_filter {
            Some(filter) => filter.filter(fragment, &mut out),
            None => {
                out.push(fragment);
                None
            }
        };

        for f in out {
            self.push_buffer(f);
        }
        held
    }

    /// Drop the buffered clustering fragments of the current partition.
    ///
    /// They are the output of a position filter about to be replaced.
    fn drop_filtered(&mut self) {
        let mut in_partition = true;
        let mut kept = VecDeque::with_capacity(self.buffer.len());

        while let Some(f) = self.buffer.pop_front() {
            if f.is_partition_start() || f.is_partition_end() {
                in_partition = false;
            }
            if in_partition && f.position().is_clustering() {
                self.permit.release_memory(f.memory_usage());
                continue;
            }
            kept.push_back(f);
        }

        self.buffer = kept;
    }

    /// Return buffered fragments to the unread list, in order.
    fn unread_buffer(&mut self) {
        while let Some(fragment) = self.buffer.pop_back() {
            self.permit.release_memory(fragment.memory_usage());
            self.unread.push_front(fragment);
        }
    }

    /// Drop unread fragments up to, but not including, the next partition start.
    fn skip_to_partition_start(&mut self) {
        self.unread_buffer();

        let mut skipped = 0;
        while let Some(f) = self.unread.front() {
            if f.is_partition_start() {
                break;
            }
            self.unread.pop_front();
            skipped += 1;
        }

        self.skip_partition = false;
        self.position_filter = None;
        self.served_tombstone = None;

        trace!("VecReader: skipped {} fragments to next partition", skipped);
    }
}

#[async_trait::async_trait]
impl FragmentReaderV2 for VecReader {
    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn permit(&self) -> &ReaderPermit {
        &self.permit
    }

    async fn next(&mut self) -> Result<Option<FragmentV2>, io::Error> {
        self.ensure_open("next")?;
        self.permit.check_timeout()?;

        if self.buffer.is_empty() {
            self.fill_buffer().await?;
        }

        self.reads += 1;
        Ok(self.pop_buffer())
    }

    async fn peek(&mut self) -> Result<Option<FragmentV2>, io::Error> {
        self.ensure_open("peek")?;
        self.permit.check_timeout()?;

        if self.buffer.is_empty() {
            self.fill_buffer().await?;
        }

        Ok(self.buffer.front().cloned())
    }

    fn is_end_of_stream(&self) -> bool {
        self.unread.is_empty() && self.buffer.is_empty()
    }

    async fn next_partition(&mut self) -> Result<(), io::Error> {
        self.ensure_open("next_partition")?;
        self.skip_to_partition_start();
        Ok(())
    }

    async fn fast_forward_to_partition_range(
        &mut self,
        range: PartitionRange,
    ) -> Result<(), io::Error> {
        self.ensure_open("fast_forward_to_partition_range")?;
        debug!("VecReader: fast forward to partition range {:?}", range);

        self.skip_to_partition_start();
        self.partition_range = range;
        Ok(())
    }

    async fn fast_forward_to_position_range(
        &mut self,
        range: PositionRange,
    ) -> Result<(), io::Error> {
        self.ensure_open("fast_forward_to_position_range")?;
        debug!("VecReader: fast forward to position range {}", range);

        let active = match self.position_filter.take() {
            Some(filter) => {
                self.drop_filtered();
                filter.active
            }
            None => self.served_tombstone,
        };

        self.unread_buffer();
        self.position_filter = Some(PositionFilter::new(range, active));
        Ok(())
    }

    fn set_max_buffer_size(&mut self, size: usize) {
        self.max_buffer_size = size.max(1);
    }

    async fn fill_buffer(&mut self) -> Result<(), io::Error> {
        self.ensure_open("fill_buffer")?;
        self.permit.check_timeout()?;

        while !self.is_buffer_full() {
            let Some(fragment) = self.unread.pop_front() else {
                break;
            };
            if let Some(held) = self.admit(fragment) {
                self.unread.push_front(held);
                break;
            }
        }
        Ok(())
    }

    fn is_buffer_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn is_buffer_full(&self) -> bool {
        self.buffer.len() >= self.max_buffer_size
    }

    async fn close(&mut self) -> Result<(), io::Error> {
        if self.closed {
            return Ok(());
        }

        debug!(
            "VecReader: close {} with {} buffered and {} unread fragments",
            self.permit.description(),
            self.buffer.len(),
            self.unread.len()
        );

        while self.pop_buffer().is_some() {}
        self.unread.clear();
        self.served_tombstone = None;
        self.closed = true;
        Ok(())
    }
}
