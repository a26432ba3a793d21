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

//! Errors raised by this crate.
//!
//! Reads surface failures as [`io::Error`], the same as the underlying readers do.
//! The typed errors here are converted into it, with the typed error kept as the source.

use std::io;

use crate::position::Position;

/// Errors raised while assembling range tombstone intervals.
#[derive(Clone, PartialEq, Eq, thiserror::Error, Debug)]
pub enum AssemblerError {
    /// A range tombstone change arrived at a position before the currently open one.
    #[error("OutOfOrder: range tombstone change at {current} precedes the open one at {open} in {table}")]
    OutOfOrder {
        table: String,
        open: Position,
        current: Position,
    },
}

impl From<AssemblerError> for io::Error {
    fn from(e: AssemblerError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, e)
    }
}

/// Errors raised by a stream or reader itself, not by the data it carries.
#[derive(Clone, PartialEq, Eq, thiserror::Error, Debug)]
pub enum StreamError {
    /// An operation was issued after `close()`.
    #[error("Closed: {operation}() called on a closed {what}")]
    Closed {
        what: &'static str,
        operation: &'static str,
    },

    /// The permit deadline passed before the read completed.
    #[error("Timeout: read of {description} exceeded its deadline")]
    Timeout { description: String },
}

impl StreamError {
    pub fn closed(what: &'static str, operation: &'static str) -> Self {
        StreamError::Closed { what, operation }
    }
}

impl From<StreamError> for io::Error {
    fn from(e: StreamError) -> Self {
        let kind = match &e {
            StreamError::Closed { .. } => io::ErrorKind::Other,
            StreamError::Timeout { .. } => io::ErrorKind::TimedOut,
        };
        io::Error::new(kind, e)
    }
}
