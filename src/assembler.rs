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

//! Turns range tombstone change events into closed range tombstone intervals.

use log::debug;

use crate::errors::AssemblerError;
use crate::fragment::RangeTombstone;
use crate::fragment::RangeTombstoneChange;
use crate::fragment::Tombstone;
use crate::position::Position;
use crate::schema::Schema;

/// Translates [`RangeTombstoneChange`]s of one partition into [`RangeTombstone`]s.
///
/// An interval is only returned once its end is known: either another change arrives,
/// or the caller flushes up to a position it is about to emit.
pub trait TombstoneAssembler: Send {
    /// Whether a tombstone is open, i.e., a row may need an interval emitted before it.
    fn needs_flush(&self) -> bool;

    /// Close the open interval at `pos` and reopen it there.
    ///
    /// Returns `None` if nothing is open or the open interval would be empty.
    fn flush(&mut self, schema: &Schema, pos: Position) -> Option<RangeTombstone>;

    /// Feed a change event, returning the interval it completes, if any.
    fn consume(
        &mut self,
        schema: &Schema,
        change: RangeTombstoneChange,
    ) -> Result<Option<RangeTombstone>, AssemblerError>;

    /// Forget all state, e.g., when a new partition starts.
    fn reset(&mut self);

    /// The partition or stream ended. An interval still open can not be closed and is dropped.
    fn on_end_of_stream(&mut self);
}

/// The default [`TombstoneAssembler`], holding at most one open change.
#[derive(Debug, Clone, Default)]
pub struct RangeTombstoneAssembler {
    /// Start position and tombstone of the open interval.
    open: Option<(Position, Tombstone)>,
}

impl RangeTombstoneAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_tombstone(&self) -> Option<&(Position, Tombstone)> {
        self.open.as_ref()
    }
}

impl TombstoneAssembler for RangeTombstoneAssembler {
    fn needs_flush(&self) -> bool {
        self.open.is_some()
    }

    fn flush(&mut self, _schema: &Schema, pos: Position) -> Option<RangeTombstone> {
        let (start, tomb) = self.open.as_mut()?;

        if *start >= pos {
            return None;
        }

        let end = pos.clone();
        let rt = RangeTombstone::new(std::mem::replace(start, pos), end, *tomb);
        Some(rt)
    }

    fn consume(
        &mut self,
        schema: &Schema,
        change: RangeTombstoneChange,
    ) -> Result<Option<RangeTombstone>, AssemblerError> {
        let mut completed = None;

        if let Some((start, tomb)) = &self.open {
            if change.position < *start {
                return Err(AssemblerError::OutOfOrder {
                    table: schema.to_string(),
                    open: start.clone(),
                    current: change.position,
                });
            }

            // Same deletion continues: keep the open interval, no boundary in between.
            if change.tomb.as_ref() == Some(tomb) {
                return Ok(None);
            }

            if *start < change.position {
                completed = Some(RangeTombstone::new(
                    start.clone(),
                    change.position.clone(),
                    *tomb,
                ));
            }
        }

        self.open = change.tomb.map(|t| (change.position, t));
        Ok(completed)
    }

    fn reset(&mut self) {
        self.open = None;
    }

    fn on_end_of_stream(&mut self) {
        if let Some((start, tomb)) = self.open.take() {
            debug!(
                "RangeTombstoneAssembler: discard open range tombstone at {}: {}",
                start, tomb
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::position::ClusteringKey;

    fn schema() -> Schema {
        Schema::new("ks", "t", ["ck"])
    }

    fn before(k: u64) -> Position {
        Position::before_key(ClusteringKey::from(k))
    }

    fn t(ts: i64) -> Tombstone {
        Tombstone::new(ts, 0)
    }

    fn open(k: u64, ts: i64) -> RangeTombstoneChange {
        RangeTombstoneChange::new(before(k), Some(t(ts)))
    }

    fn close(k: u64) -> RangeTombstoneChange {
        RangeTombstoneChange::new(before(k), None)
    }

    #[test]
    fn test_open_then_close() -> anyhow::Result<()> {
        let s = schema();
        let mut a = RangeTombstoneAssembler::new();

        assert!(!a.needs_flush());
        assert_eq!(a.consume(&s, open(5, 1))?, None);
        assert!(a.needs_flush());

        let got = a.consume(&s, close(9))?;
        assert_eq!(got, Some(RangeTombstone::new(before(5), before(9), t(1))));
        assert!(!a.needs_flush());
        Ok(())
    }

    #[test]
    fn test_change_of_tombstone_splits_interval() -> anyhow::Result<()> {
        let s = schema();
        let mut a = RangeTombstoneAssembler::new();

        a.consume(&s, open(1, 1))?;
        let got = a.consume(&s, open(4, 2))?;
        assert_eq!(got, Some(RangeTombstone::new(before(1), before(4), t(1))));

        let got = a.consume(&s, close(6))?;
        assert_eq!(got, Some(RangeTombstone::new(before(4), before(6), t(2))));
        Ok(())
    }

    #[test]
    fn test_same_tombstone_is_merged() -> anyhow::Result<()> {
        let s = schema();
        let mut a = RangeTombstoneAssembler::new();

        a.consume(&s, open(1, 1))?;
        assert_eq!(a.consume(&s, open(3, 1))?, None);
        assert_eq!(a.consume(&s, open(3, 1))?, None);

        let got = a.consume(&s, close(8))?;
        assert_eq!(got, Some(RangeTombstone::new(before(1), before(8), t(1))));
        Ok(())
    }

    #[test]
    fn test_change_at_same_position_replaces() -> anyhow::Result<()> {
        let s = schema();
        let mut a = RangeTombstoneAssembler::new();

        a.consume(&s, open(2, 1))?;
        assert_eq!(a.consume(&s, open(2, 5))?, None);

        let got = a.consume(&s, close(3))?;
        assert_eq!(got, Some(RangeTombstone::new(before(2), before(3), t(5))));
        Ok(())
    }

    #[test]
    fn test_out_of_order_change() -> anyhow::Result<()> {
        let s = schema();
        let mut a = RangeTombstoneAssembler::new();

        a.consume(&s, open(5, 1))?;
        let err = a.consume(&s, close(2)).unwrap_err();
        assert_eq!(err, AssemblerError::OutOfOrder {
            table: "ks.t".to_string(),
            open: before(5),
            current: before(2),
        });

        // State is unchanged after the failure.
        assert_eq!(a.open_tombstone(), Some(&(before(5), t(1))));
        Ok(())
    }

    #[test]
    fn test_flush() -> anyhow::Result<()> {
        let s = schema();
        let mut a = RangeTombstoneAssembler::new();

        assert_eq!(a.flush(&s, before(3)), None);

        a.consume(&s, open(5, 1))?;

        // Nothing to emit before the open start.
        assert_eq!(a.flush(&s, before(5)), None);

        let after7 = Position::after_key(ClusteringKey::from(7));
        let got = a.flush(&s, after7.clone());
        assert_eq!(got, Some(RangeTombstone::new(before(5), after7.clone(), t(1))));
        assert_eq!(a.open_tombstone(), Some(&(after7.clone(), t(1))));

        let got = a.consume(&s, close(9))?;
        assert_eq!(got, Some(RangeTombstone::new(after7, before(9), t(1))));
        Ok(())
    }

    #[test]
    fn test_end_of_stream_discards_open() -> anyhow::Result<()> {
        let s = schema();
        let mut a = RangeTombstoneAssembler::new();

        a.consume(&s, open(1, 1))?;
        a.on_end_of_stream();
        assert!(!a.needs_flush());

        a.consume(&s, open(1, 1))?;
        a.reset();
        assert_eq!(a.open_tombstone(), None);

        // A close without an open one completes nothing.
        assert_eq!(a.consume(&s, close(4))?, None);
        Ok(())
    }
}
