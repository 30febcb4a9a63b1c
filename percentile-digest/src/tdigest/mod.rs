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

//! T-Digest sketch for estimating quantiles and ranks of a numeric stream.
//!
//! A digest keeps a bounded list of centroids, each a `(mean, weight)` pair summarizing a cluster
//! of nearby values. Values are buffered and folded into the centroid list in batches; the size a
//! cluster may grow to depends on its position in the distribution, so clusters near the tails stay
//! small and extreme quantiles stay accurate. The exact minimum and maximum are tracked on the
//! side.
//!
//! Cluster sizes follow the `K_2` scale function of the t-digest paper, `q * (1 - q)` scaled by a
//! normalizer `2c / (4 ln(n / 2c) + 24)` for compression `c` and total weight `n`. Two values with
//! the same mean always end up in one centroid.
//!
//! Digests built on different partitions combine with [`TDigest::merge`], provided they share the
//! same compression. The serialized form is described in the `serialization` module docs and is
//! `28 + 16 * centroids` bytes long.
//!
//! # Usage
//!
//! ```rust
//! # use percentile_digest::tdigest::TDigest;
//! let mut left = TDigest::new(100.0).unwrap();
//! let mut right = TDigest::new(100.0).unwrap();
//! for i in 1..=500 {
//!     left.add(i as f64);
//!     right.add((i + 500) as f64);
//! }
//! left.merge(&right).unwrap();
//! assert_eq!(left.quantile(0.0).unwrap(), 1.0);
//! assert_eq!(left.quantile(1.0).unwrap(), 1000.0);
//! let median = left.quantile(0.5).unwrap();
//! assert!((median - 500.0).abs() < 10.0);
//! ```

mod iter;
mod serialization;
mod sketch;

pub use self::iter::TDigestIntoIter;
pub use self::serialization::CENTROID_SIZE_BYTES;
pub use self::serialization::HEADER_SIZE_BYTES;
pub use self::sketch::TDigest;
pub(crate) use self::sketch::check_rank;

/// Compression used by [`TDigest::default`].
pub const DEFAULT_COMPRESSION: f64 = 100.0;
