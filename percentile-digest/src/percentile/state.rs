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

use std::mem;

use tracing::debug;

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::error::Error;
use crate::error::ErrorKind;
use crate::percentile::MemoryReporter;
use crate::tdigest::TDigest;
use crate::tdigest::check_rank;

const PERCENTILE_SIZE_BYTES: usize = 8;

/// Aggregation state of an approximate percentile function over one group.
///
/// Owns a digest, the percentiles the query asked for, and the reporter its footprint is
/// accounted to. The percentiles and compression are fixed at construction.
#[derive(Debug)]
pub struct PercentileState<R> {
    digest: TDigest,
    percentiles: Vec<f64>,
    reporter: R,
    memory_usage_bytes: i64,
}

impl<R: MemoryReporter> PercentileState<R> {
    /// Creates an empty state and reports its initial footprint.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a non-positive compression or a percentile outside
    /// [0.0, 1.0], and `MemoryLimitExceeded` if the reporter rejects the initial footprint.
    ///
    /// # Examples
    ///
    /// ```
    /// # use percentile_digest::percentile::{MemoryBudget, PercentileState};
    /// let mut state = PercentileState::new(100.0, vec![0.5, 0.9], MemoryBudget::unbounded()).unwrap();
    /// for i in 1..=10 {
    ///     state.add_value(i as f64).unwrap();
    /// }
    /// let values = state.evaluate().unwrap();
    /// assert_eq!(values.len(), 2);
    /// ```
    pub fn new(compression: f64, percentiles: Vec<f64>, reporter: R) -> Result<Self, Error> {
        let digest = TDigest::new(compression)?;
        Self::with_digest(digest, percentiles, reporter)
    }

    fn with_digest(digest: TDigest, percentiles: Vec<f64>, reporter: R) -> Result<Self, Error> {
        for &percentile in &percentiles {
            check_rank(percentile)?;
        }
        let mut state = PercentileState {
            digest,
            percentiles,
            reporter,
            memory_usage_bytes: 0,
        };
        if let Err(err) = state.account() {
            let released = -state.memory_usage_bytes;
            if let Err(rejected) = state.reporter.report_memory_usage(released) {
                debug!(
                    delta_bytes = released,
                    used_bytes = rejected.used_bytes,
                    limit_bytes = rejected.limit_bytes,
                    "reporter rejected release of percentile state"
                );
            }
            return Err(err);
        }
        Ok(state)
    }

    /// Returns the digest.
    pub fn digest(&self) -> &TDigest {
        &self.digest
    }

    /// Returns the requested percentiles in request order.
    pub fn percentiles(&self) -> &[f64] {
        &self.percentiles
    }

    /// Returns the reporter.
    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Returns the footprint last reported to the reporter.
    pub fn memory_usage_bytes(&self) -> i64 {
        self.memory_usage_bytes
    }

    /// Returns the bytes this state holds right now.
    pub fn estimated_size_in_bytes(&self) -> usize {
        mem::size_of::<Self>() - mem::size_of::<TDigest>()
            + self.digest.estimated_size_in_bytes()
            + self.percentiles.capacity() * PERCENTILE_SIZE_BYTES
    }

    /// Adds one value to the digest.
    pub fn add_value(&mut self, value: f64) -> Result<(), Error> {
        self.digest.add(value);
        self.account()
    }

    /// Adds one value with an explicit weight to the digest.
    pub fn add_weighted_value(&mut self, value: f64, weight: f64) -> Result<(), Error> {
        self.digest.add_weighted(value, weight)?;
        self.account()
    }

    /// Merges a partial digest into this state's digest.
    ///
    /// On `IncompatibleDigest` nothing changes.
    pub fn merge_with(&mut self, other: &TDigest) -> Result<(), Error> {
        let merged = self.digest.merge(other);
        self.account()?;
        merged
    }

    /// Replaces the digest wholesale.
    ///
    /// # Errors
    ///
    /// Returns `IncompatibleDigest` if the new digest has a different compression.
    pub fn set_digest(&mut self, digest: TDigest) -> Result<(), Error> {
        if digest.compression() != self.digest.compression() {
            return Err(Error::new(
                ErrorKind::IncompatibleDigest,
                "replacement digest has a different compression",
            )
            .with_context("expected", self.digest.compression())
            .with_context("actual", digest.compression()));
        }
        self.digest = digest;
        self.account()
    }

    /// Computes every requested percentile with a single compaction pass.
    ///
    /// # Errors
    ///
    /// Returns `EmptyDigest` if no value was added.
    pub fn evaluate(&mut self) -> Result<Vec<f64>, Error> {
        let values = self.digest.quantiles(&self.percentiles);
        self.account()?;
        values
    }

    /// Consumes the state and returns its digest.
    ///
    /// Accounting is left to the caller, who owns the reporter's budget.
    pub fn into_digest(self) -> TDigest {
        self.digest
    }

    /// Serializes the state: the digest length as `u32`, the digest bytes, the percentile count
    /// as `u32`, then each percentile as `f64`, all little-endian.
    pub fn serialize(&mut self) -> Result<Vec<u8>, Error> {
        let digest = self.digest.serialize();
        self.account()?;

        let mut bytes = SketchBytes::with_capacity(
            4 + digest.len() + 4 + self.percentiles.len() * PERCENTILE_SIZE_BYTES,
        );
        bytes.write_u32_le(digest.len() as u32);
        bytes.write(&digest);
        bytes.write_u32_le(self.percentiles.len() as u32);
        for &percentile in &self.percentiles {
            bytes.write_f64_le(percentile);
        }
        Ok(bytes.into_bytes())
    }

    /// Deserializes a state written by [`serialize`](PercentileState::serialize) and reports its
    /// footprint to `reporter`.
    ///
    /// # Errors
    ///
    /// Returns `CorruptState` for malformed bytes and `MemoryLimitExceeded` if the reporter
    /// rejects the footprint.
    pub fn deserialize(bytes: &[u8], reporter: R) -> Result<Self, Error> {
        let mut cursor = SketchSlice::new(bytes);

        let digest_len = cursor
            .read_u32_le()
            .map_err(Error::insufficient_data("digest_len"))? as usize;
        let digest = cursor
            .read_slice(digest_len)
            .map_err(Error::insufficient_data("digest"))?;
        let digest = TDigest::deserialize(digest)?;

        let num_percentiles = cursor
            .read_u32_le()
            .map_err(Error::insufficient_data("num_percentiles"))? as usize;
        if num_percentiles.checked_mul(PERCENTILE_SIZE_BYTES) != Some(cursor.remaining()) {
            return Err(
                Error::corrupt("percentile count does not match buffer length")
                    .with_context("num_percentiles", num_percentiles)
                    .with_context("remaining", cursor.remaining()),
            );
        }
        let mut percentiles = Vec::with_capacity(num_percentiles);
        for index in 0..num_percentiles {
            let percentile = cursor
                .read_f64_le()
                .map_err(Error::insufficient_data("percentile"))?;
            if check_rank(percentile).is_err() {
                return Err(Error::corrupt("percentile outside [0.0, 1.0]")
                    .with_context("index", index)
                    .with_context("percentile", percentile));
            }
            percentiles.push(percentile);
        }

        Self::with_digest(digest, percentiles, reporter)
    }

    /// Reports the footprint change since the last report, if any.
    fn account(&mut self) -> Result<(), Error> {
        let current = self.estimated_size_in_bytes() as i64;
        let delta = current - self.memory_usage_bytes;
        if delta == 0 {
            return Ok(());
        }
        self.memory_usage_bytes = current;
        self.reporter.report_memory_usage(delta).map_err(|err| {
            Error::new(ErrorKind::MemoryLimitExceeded, "percentile state outgrew its budget")
                .with_context("used_bytes", err.used_bytes)
                .with_context("limit_bytes", err.limit_bytes)
                .set_source(err)
        })
    }
}
