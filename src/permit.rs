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

//! The resource and deadline token threaded through every read.

use std::fmt;
use std::io;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;

use crate::errors::StreamError;

#[derive(Debug, Default)]
struct PermitState {
    description: String,
    timeout: Mutex<Option<Instant>>,
    memory: AtomicUsize,
}

/// A cloneable handle to one read's deadline and memory account.
///
/// All clones share the same state: a deadline set through the stream is observed
/// by the reader underneath it.
#[derive(Debug, Clone, Default)]
pub struct ReaderPermit {
    inner: Arc<PermitState>,
}

impl ReaderPermit {
    pub fn new(description: impl ToString) -> Self {
        Self {
            inner: Arc::new(PermitState {
                description: description.to_string(),
                ..Default::default()
            }),
        }
    }

    pub fn description(&self) -> &str {
        &self.inner.description
    }

    pub fn set_timeout(&self, timeout: Instant) {
        *self.timeout_slot() = Some(timeout);
    }

    pub fn clear_timeout(&self) {
        *self.timeout_slot() = None;
    }

    pub fn timeout(&self) -> Option<Instant> {
        *self.timeout_slot()
    }

    /// Fails with [`io::ErrorKind::TimedOut`] once the deadline has passed.
    pub fn check_timeout(&self) -> Result<(), io::Error> {
        match self.timeout() {
            Some(deadline) if Instant::now() >= deadline => Err(StreamError::Timeout {
                description: self.inner.description.clone(),
            }
            .into()),
            _ => Ok(()),
        }
    }

    pub fn consume_memory(&self, bytes: usize) {
        self.inner.memory.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn release_memory(&self, bytes: usize) {
        let _ = self
            .inner
            .memory
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |m| {
                Some(m.saturating_sub(bytes))
            });
    }

    pub fn consumed_memory(&self) -> usize {
        self.inner.memory.load(Ordering::Relaxed)
    }

    fn timeout_slot(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        // The slot holds a plain value, a poisoned lock leaves nothing half-updated.
        self.inner
            .timeout
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Display for ReaderPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{permit: {}, memory={}}}",
            self.inner.description,
            self.consumed_memory()
        )
    }
}
