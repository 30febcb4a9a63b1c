// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

/// Rejection returned by a [`MemoryReporter`] when a reported change pushes usage over its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLimitExceeded {
    /// Bytes accounted after the rejected change.
    pub used_bytes: i64,
    /// The limit that was crossed.
    pub limit_bytes: i64,
}

impl fmt::Display for MemoryLimitExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "memory usage {} bytes exceeds limit of {} bytes",
            self.used_bytes, self.limit_bytes
        )
    }
}

impl std::error::Error for MemoryLimitExceeded {}

/// Receives footprint changes of a percentile state.
///
/// Called with the signed difference in bytes every time the footprint changes, including
/// negative deltas when it shrinks. Implementations must be cheap: the call sits on the per-row
/// update path. A rejection means the change has already happened; the state surfaces it as a
/// `MemoryLimitExceeded` error so that the caller can abort.
pub trait MemoryReporter {
    /// Records `delta_bytes` and reports whether usage stays within the limit.
    fn report_memory_usage(&mut self, delta_bytes: i64) -> Result<(), MemoryLimitExceeded>;
}

impl<R: MemoryReporter + ?Sized> MemoryReporter for &mut R {
    fn report_memory_usage(&mut self, delta_bytes: i64) -> Result<(), MemoryLimitExceeded> {
        (**self).report_memory_usage(delta_bytes)
    }
}

impl<R: MemoryReporter + ?Sized> MemoryReporter for Box<R> {
    fn report_memory_usage(&mut self, delta_bytes: i64) -> Result<(), MemoryLimitExceeded> {
        (**self).report_memory_usage(delta_bytes)
    }
}

/// Lets several states on one thread share a single budget.
impl<R: MemoryReporter> MemoryReporter for Rc<RefCell<R>> {
    fn report_memory_usage(&mut self, delta_bytes: i64) -> Result<(), MemoryLimitExceeded> {
        self.borrow_mut().report_memory_usage(delta_bytes)
    }
}

/// Adapts a closure into a [`MemoryReporter`].
///
/// # Examples
///
/// ```
/// # use percentile_digest::percentile::{FnReporter, MemoryLimitExceeded, MemoryReporter};
/// let mut total = 0i64;
/// let mut reporter = FnReporter(|delta: i64| -> Result<(), MemoryLimitExceeded> {
///     total += delta;
///     Ok(())
/// });
/// reporter.report_memory_usage(64).unwrap();
/// drop(reporter);
/// assert_eq!(total, 64);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FnReporter<F>(pub F);

impl<F> MemoryReporter for FnReporter<F>
where
    F: FnMut(i64) -> Result<(), MemoryLimitExceeded>,
{
    fn report_memory_usage(&mut self, delta_bytes: i64) -> Result<(), MemoryLimitExceeded> {
        (self.0)(delta_bytes)
    }
}

/// A running byte counter with an optional upper limit.
///
/// Every delta is recorded, rejected ones included, so the counter always matches what the
/// reporting states hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryBudget {
    used_bytes: i64,
    limit_bytes: Option<i64>,
}

impl MemoryBudget {
    /// A budget that never rejects.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// A budget that rejects growth beyond `limit_bytes`.
    pub fn with_limit(limit_bytes: i64) -> Self {
        Self {
            used_bytes: 0,
            limit_bytes: Some(limit_bytes),
        }
    }

    /// Bytes currently accounted.
    pub fn used_bytes(&self) -> i64 {
        self.used_bytes
    }

    /// The configured limit, if any.
    pub fn limit_bytes(&self) -> Option<i64> {
        self.limit_bytes
    }
}

impl MemoryReporter for MemoryBudget {
    fn report_memory_usage(&mut self, delta_bytes: i64) -> Result<(), MemoryLimitExceeded> {
        self.used_bytes = self.used_bytes.saturating_add(delta_bytes);
        match self.limit_bytes {
            // shrinking is always accepted
            Some(limit_bytes) if delta_bytes > 0 && self.used_bytes > limit_bytes => {
                debug!(
                    used_bytes = self.used_bytes,
                    limit_bytes, "memory limit exceeded"
                );
                Err(MemoryLimitExceeded {
                    used_bytes: self.used_bytes,
                    limit_bytes,
                })
            }
            _ => Ok(()),
        }
    }
}
