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

//! Aggregation state for approximate percentile functions.
//!
//! A [`PercentileState`] is what a partial or final aggregation step holds per group: one
//! [`TDigest`](crate::tdigest::TDigest), the list of percentiles the query asked for, and a
//! [`MemoryReporter`] that is told about every change of the state's footprint. The footprint is
//! computed from allocated capacities, so it never under-reports what the state holds.
//!
//! # Usage
//!
//! ```rust
//! # use percentile_digest::percentile::{MemoryBudget, PercentileState};
//! # use percentile_digest::error::ErrorKind;
//! let mut budget = MemoryBudget::with_limit(1 << 20);
//! let mut partial = PercentileState::new(100.0, vec![0.5], &mut budget).unwrap();
//! for i in 0..1000 {
//!     partial.add_value(i as f64).unwrap();
//! }
//! let mut digest = partial.into_digest();
//! let bytes = digest.serialize();
//!
//! let mut total = PercentileState::new(100.0, vec![0.5], MemoryBudget::unbounded()).unwrap();
//! let digest = percentile_digest::tdigest::TDigest::deserialize(&bytes).unwrap();
//! total.merge_with(&digest).unwrap();
//! let median = total.evaluate().unwrap()[0];
//! assert!((median - 500.0).abs() < 10.0);
//!
//! let tiny = PercentileState::new(100.0, vec![0.5], MemoryBudget::with_limit(16));
//! assert_eq!(tiny.unwrap_err().kind(), ErrorKind::MemoryLimitExceeded);
//! ```

mod memory;
mod state;

pub use self::memory::FnReporter;
pub use self::memory::MemoryBudget;
pub use self::memory::MemoryLimitExceeded;
pub use self::memory::MemoryReporter;
pub use self::state::PercentileState;
