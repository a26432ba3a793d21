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

//! Push-style consumption of a [`FragmentV1Stream`].
//!
//! [`FragmentV1Stream::consume`] drives a [`PartitionConsumer`] partition by partition.
//! [`FragmentV1Stream::consume_pausable`] hands raw fragments to a callback.

use std::future::Future;
use std::io;

use log::trace;

use crate::assembler::TombstoneAssembler;
use crate::fragment::ClusteringRow;
use crate::fragment::Fragment;
use crate::fragment::RangeTombstone;
use crate::fragment::StaticRow;
use crate::fragment::Tombstone;
use crate::position::DecoratedKey;
use crate::reader::FragmentReaderV2;
use crate::stream::FragmentV1Stream;

/// Whether a consumer wants the iteration to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopIteration {
    No,
    Yes,
}

impl StopIteration {
    pub fn is_stop(&self) -> bool {
        matches!(self, StopIteration::Yes)
    }
}

impl From<bool> for StopIteration {
    fn from(stop: bool) -> Self {
        if stop {
            StopIteration::Yes
        } else {
            StopIteration::No
        }
    }
}

/// Receives the fragments of a stream, one partition at a time.
///
/// For every partition, `consume_new_partition()` is called first and
/// `consume_end_of_partition()` last. Returning [`StopIteration::Yes`] from a row or
/// range tombstone callback ends the current partition early: `consume_end_of_partition()`
/// is called right away, and the rest of the partition is skipped.
pub trait PartitionConsumer {
    /// What the whole consumption returns.
    type Output;

    /// The key is valid until `consume_end_of_partition()` returns; clone it to keep it longer.
    fn consume_new_partition(&mut self, key: &DecoratedKey);

    /// The partition level tombstone, called right after `consume_new_partition()` if there is one.
    fn consume_partition_tombstone(&mut self, _tomb: Tombstone) {}

    fn consume_static_row(&mut self, row: StaticRow) -> StopIteration;

    fn consume_clustering_row(&mut self, row: ClusteringRow) -> StopIteration;

    fn consume_range_tombstone(&mut self, rt: RangeTombstone) -> StopIteration;

    /// Returning [`StopIteration::Yes`] stops the whole consumption.
    fn consume_end_of_partition(&mut self) -> StopIteration;

    fn consume_end_of_stream(self) -> Self::Output;
}

/// Translates stream fragments into [`PartitionConsumer`] callbacks.
struct ConsumerAdapter<C> {
    /// Key of the partition being consumed.
    key: Option<DecoratedKey>,
    consumer: C,
}

impl<C> ConsumerAdapter<C>
where C: PartitionConsumer
{
    fn new(consumer: C) -> Self {
        Self {
            key: None,
            consumer,
        }
    }

    async fn consume<R, A>(
        &mut self,
        stream: &mut FragmentV1Stream<R, A>,
        fragment: Fragment,
    ) -> Result<StopIteration, io::Error>
    where
        R: FragmentReaderV2,
        A: TombstoneAssembler,
    {
        let stop = match fragment {
            Fragment::PartitionStart(ps) => {
                let key = self.key.insert(ps.key);
                self.consumer.consume_new_partition(key);
                if let Some(tomb) = ps.tomb {
                    self.consumer.consume_partition_tombstone(tomb);
                }
                return Ok(StopIteration::No);
            }
            Fragment::StaticRow(sr) => self.consumer.consume_static_row(sr),
            Fragment::ClusteringRow(cr) => self.consumer.consume_clustering_row(cr),
            Fragment::RangeTombstone(rt) => self.consumer.consume_range_tombstone(rt),
            Fragment::PartitionEnd(_) => {
                let stop = self.consumer.consume_end_of_partition();
                self.key = None;
                return Ok(stop);
            }
        };

        self.handle_result(stream, stop).await
    }

    async fn handle_result<R, A>(
        &mut self,
        stream: &mut FragmentV1Stream<R, A>,
        stop: StopIteration,
    ) -> Result<StopIteration, io::Error>
    where
        R: FragmentReaderV2,
        A: TombstoneAssembler,
    {
        if !stop.is_stop() {
            return Ok(StopIteration::No);
        }

        let end = self.consumer.consume_end_of_partition();
        let key = self.key.take();

        if end.is_stop() {
            return Ok(StopIteration::Yes);
        }

        if let Some(key) = key {
            trace!("ConsumerAdapter: skip the rest of partition {}", key);
        }
        stream.next_partition().await?;
        Ok(StopIteration::No)
    }
}

impl<R, A> FragmentV1Stream<R, A>
where
    R: FragmentReaderV2,
    A: TombstoneAssembler,
{
    /// Feed the stream to `consumer` until it stops or the stream ends,
    /// and return what `consume_end_of_stream()` returns.
    ///
    /// When `consume_end_of_partition()` stops the consumption, the next call
    /// starts from the following partition.
    pub async fn consume<C>(&mut self, consumer: C) -> Result<C::Output, io::Error>
    where C: PartitionConsumer {
        let mut adapter = ConsumerAdapter::new(consumer);

        while let Some(fragment) = self.next().await? {
            if adapter.consume(self, fragment).await?.is_stop() {
                break;
            }
        }

        Ok(adapter.consumer.consume_end_of_stream())
    }

    /// Feed fragments to `f` until it returns [`StopIteration::Yes`] or the stream ends.
    ///
    /// The next call starts from the fragment after the last one fed.
    pub async fn consume_pausable<F>(&mut self, mut f: F) -> Result<(), io::Error>
    where F: FnMut(Fragment) -> StopIteration {
        while let Some(fragment) = self.next().await? {
            if f(fragment).is_stop() {
                break;
            }
        }
        Ok(())
    }

    /// Like [`consume_pausable`](Self::consume_pausable), with an asynchronous callback.
    pub async fn consume_pausable_async<F, Fut>(&mut self, mut f: F) -> Result<(), io::Error>
    where
        F: FnMut(Fragment) -> Fut,
        Fut: Future<Output = Result<StopIteration, io::Error>>,
    {
        while let Some(fragment) = self.next().await? {
            if f(fragment).await?.is_stop() {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::impls::vec_reader::VecReader;
    use crate::testing::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        New(i64),
        Tomb(Tombstone),
        Static,
        Row(ClusteringRow),
        Rt(RangeTombstone),
        End,
        Eos,
    }

    /// Records callbacks, optionally stopping on the first static row, clustering row
    /// or range tombstone of a partition, or at the end of a given partition.
    #[derive(Default)]
    struct Recorder {
        events: Vec<Event>,
        stop_on_static_row: bool,
        stop_on_first_row: bool,
        stop_on_range_tombstone: bool,
        halt_after: Option<i64>,
        current: Option<i64>,
    }

    impl PartitionConsumer for Recorder {
        type Output = Vec<Event>;

        fn consume_new_partition(&mut self, key: &DecoratedKey) {
            self.current = Some(key.token());
            self.events.push(Event::New(key.token()));
        }

        fn consume_partition_tombstone(&mut self, tomb: Tombstone) {
            self.events.push(Event::Tomb(tomb));
        }

        fn consume_static_row(&mut self, _row: StaticRow) -> StopIteration {
            self.events.push(Event::Static);
            self.stop_on_static_row.into()
        }

        fn consume_clustering_row(&mut self, row: ClusteringRow) -> StopIteration {
            self.events.push(Event::Row(row));
            self.stop_on_first_row.into()
        }

        fn consume_range_tombstone(&mut self, rt: RangeTombstone) -> StopIteration {
            self.events.push(Event::Rt(rt));
            self.stop_on_range_tombstone.into()
        }

        fn consume_end_of_partition(&mut self) -> StopIteration {
            self.events.push(Event::End);
            (self.current.take() == self.halt_after && self.halt_after.is_some()).into()
        }

        fn consume_end_of_stream(mut self) -> Self::Output {
            self.events.push(Event::Eos);
            self.events
        }
    }

    fn stream(fragments: Vec<crate::fragment::FragmentV2>) -> FragmentV1Stream<VecReader> {
        FragmentV1Stream::new(reader(fragments))
    }

    #[test]
    fn test_stop_iteration_from_bool() {
        assert_eq!(StopIteration::from(true), StopIteration::Yes);
        assert_eq!(StopIteration::from(false), StopIteration::No);
        assert!(StopIteration::Yes.is_stop());
        assert!(!StopIteration::No.is_stop());
    }

    #[tokio::test]
    async fn test_consume_all_callbacks() -> anyhow::Result<()> {
        let mut s = stream(vec![
            ps_deleted(1, 3),
            sr(),
            open(1, 2),
            cr(2),
            close(4),
            pe(),
            ps(2),
            pe(),
        ]);

        let got = s.consume(Recorder::default()).await?;
        assert_eq!(got, vec![
            Event::New(1),
            Event::Tomb(t(3)),
            Event::Static,
            Event::Rt(RangeTombstone::new(before(1), after(2), t(2))),
            Event::Row(crow(2)),
            Event::Rt(RangeTombstone::new(after(2), before(4), t(2))),
            Event::End,
            Event::New(2),
            Event::End,
            Event::Eos,
        ]);
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_on_row_skips_rest_of_partition() -> anyhow::Result<()> {
        let mut s = stream(vec![
            ps(1),
            cr(1),
            cr(2),
            pe(),
            ps(2),
            cr(3),
            pe(),
        ]);

        let rec = Recorder {
            stop_on_first_row: true,
            ..Default::default()
        };
        let got = s.consume(rec).await?;

        // End of partition is reported once per partition.
        assert_eq!(got, vec![
            Event::New(1),
            Event::Row(crow(1)),
            Event::End,
            Event::New(2),
            Event::Row(crow(3)),
            Event::End,
            Event::Eos,
        ]);
        assert!(s.is_end_of_stream());
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_on_end_of_partition_halts() -> anyhow::Result<()> {
        let mut s = stream(vec![ps(1), cr(1), pe(), ps(2), cr(2), pe()]);

        let rec = Recorder {
            halt_after: Some(1),
            ..Default::default()
        };
        let got = s.consume(rec).await?;
        assert_eq!(got, vec![
            Event::New(1),
            Event::Row(crow(1)),
            Event::End,
            Event::Eos,
        ]);

        // A later call resumes at the next partition.
        let got = s.consume(Recorder::default()).await?;
        assert_eq!(got, vec![
            Event::New(2),
            Event::Row(crow(2)),
            Event::End,
            Event::Eos,
        ]);
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_on_row_then_halt() -> anyhow::Result<()> {
        let mut s = stream(vec![ps(1), cr(1), cr(2), pe(), ps(2), cr(3), pe()]);

        let rec = Recorder {
            stop_on_first_row: true,
            halt_after: Some(1),
            ..Default::default()
        };
        let got = s.consume(rec).await?;
        assert_eq!(got, vec![
            Event::New(1),
            Event::Row(crow(1)),
            Event::End,
            Event::Eos,
        ]);

        // Halting does not skip the rest of the partition.
        assert_eq!(s.next().await?, Some(v1(cr(2))));
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_on_static_row_skips_rest_of_partition() -> anyhow::Result<()> {
        let mut s = stream(vec![ps(1), sr(), cr(1), pe(), ps(2), cr(2), pe()]);

        let rec = Recorder {
            stop_on_static_row: true,
            ..Default::default()
        };
        let got = s.consume(rec).await?;
        assert_eq!(got, vec![
            Event::New(1),
            Event::Static,
            Event::End,
            Event::New(2),
            Event::Row(crow(2)),
            Event::End,
            Event::Eos,
        ]);
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_on_range_tombstone_drops_deferred_row() -> anyhow::Result<()> {
        let mut s = stream(vec![
            ps(1),
            open(1, 1),
            cr(2),
            close(4),
            pe(),
            ps(2),
            cr(3),
            pe(),
        ]);

        let rec = Recorder {
            stop_on_range_tombstone: true,
            ..Default::default()
        };
        let got = s.consume(rec).await?;

        // Row 2 is held back behind the interval when the consumer stops,
        // and skipping the partition drops it.
        assert_eq!(got, vec![
            Event::New(1),
            Event::Rt(RangeTombstone::new(before(1), after(2), t(1))),
            Event::End,
            Event::New(2),
            Event::Row(crow(3)),
            Event::End,
            Event::Eos,
        ]);
        Ok(())
    }

    #[tokio::test]
    async fn test_halt_on_range_tombstone_keeps_deferred_row() -> anyhow::Result<()> {
        let mut s = stream(vec![ps(1), open(1, 1), cr(2), close(4), pe()]);

        let rec = Recorder {
            stop_on_range_tombstone: true,
            halt_after: Some(1),
            ..Default::default()
        };
        let got = s.consume(rec).await?;
        assert_eq!(got, vec![
            Event::New(1),
            Event::Rt(RangeTombstone::new(before(1), after(2), t(1))),
            Event::End,
            Event::Eos,
        ]);

        assert_eq!(s.next().await?, Some(v1(cr(2))));
        Ok(())
    }

    #[tokio::test]
    async fn test_consume_empty_stream() -> anyhow::Result<()> {
        let mut s = stream(vec![]);

        let got = s.consume(Recorder::default()).await?;
        assert_eq!(got, vec![Event::Eos]);
        Ok(())
    }

    #[tokio::test]
    async fn test_consume_pausable_resumes() -> anyhow::Result<()> {
        let input = vec![ps(1), cr(1), cr(2), pe()];
        let mut s = stream(input.clone());

        let mut got = vec![];
        s.consume_pausable(|f| {
            let stop = matches!(f, Fragment::ClusteringRow(_));
            got.push(f);
            stop.into()
        })
        .await?;
        assert_eq!(got, vec![v1(ps(1)), v1(cr(1))]);

        s.consume_pausable(|f| {
            got.push(f);
            StopIteration::No
        })
        .await?;
        assert_eq!(got, input.into_iter().map(v1).collect::<Vec<_>>());
        assert!(s.is_end_of_stream());
        Ok(())
    }

    #[tokio::test]
    async fn test_consume_pausable_async() -> anyhow::Result<()> {
        let mut s = stream(vec![ps(1), open(1, 1), close(2), pe()]);

        let mut got = vec![];
        s.consume_pausable_async(|f| {
            got.push(f);
            async { Ok(StopIteration::No) }
        })
        .await?;

        assert_eq!(got, vec![
            v1(ps(1)),
            rt(before(1), before(2), 1),
            v1(pe()),
        ]);
        Ok(())
    }

    #[tokio::test]
    async fn test_consume_pausable_async_error() -> anyhow::Result<()> {
        let mut s = stream(vec![ps(1), cr(1), pe()]);

        let res = s
            .consume_pausable_async(|f| async move {
                if f.is_partition_start() {
                    Ok(StopIteration::No)
                } else {
                    Err(io::Error::new(io::ErrorKind::Other, "consumer failed"))
                }
            })
            .await;

        let err = res.unwrap_err();
        assert_eq!(err.to_string(), "consumer failed");

        // The failed fragment has been consumed.
        assert_eq!(s.next().await?, Some(v1(pe())));
        Ok(())
    }
}
