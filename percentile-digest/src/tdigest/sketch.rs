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

use std::cmp::Ordering;
use std::mem;

use tracing::debug;
use tracing::trace;

use crate::error::Error;
use crate::tdigest::DEFAULT_COMPRESSION;

const BUFFER_MULTIPLIER: usize = 4;
const MAX_CENTROIDS_CAPACITY: usize = 1 << 20;

/// T-Digest sketch for estimating quantiles and ranks.
///
/// See the [module documentation](super) for more details.
#[derive(Debug, Clone, PartialEq)]
pub struct TDigest {
    pub(super) compression: f64,

    pub(super) reverse_merge: bool,
    pub(super) min: f64,
    pub(super) max: f64,

    pub(super) centroids: Vec<Centroid>,
    pub(super) centroids_weight: f64,
    centroids_capacity: usize,
    buffer: Vec<Centroid>,
    buffered_weight: f64,
}

impl Default for TDigest {
    fn default() -> Self {
        TDigest::make(DEFAULT_COMPRESSION)
    }
}

impl TDigest {
    /// Creates an empty digest with the given compression.
    ///
    /// Larger compression keeps more, finer centroids and answers more accurately.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument) if
    /// compression is not a finite positive number.
    ///
    /// # Examples
    ///
    /// ```
    /// # use percentile_digest::tdigest::TDigest;
    /// let digest = TDigest::new(100.0).unwrap();
    /// assert_eq!(digest.compression(), 100.0);
    /// assert!(TDigest::new(0.0).is_err());
    /// ```
    pub fn new(compression: f64) -> Result<Self, Error> {
        check_compression(compression)?;
        Ok(Self::make(compression))
    }

    pub(super) fn make(compression: f64) -> Self {
        let fudge = if compression < 30. { 30 } else { 10 };
        let centroids_capacity = ((2. * compression).ceil() as usize)
            .saturating_add(fudge)
            .min(MAX_CENTROIDS_CAPACITY);

        TDigest {
            compression,
            reverse_merge: false,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            centroids: Vec::new(),
            centroids_weight: 0.,
            centroids_capacity,
            buffer: Vec::new(),
            buffered_weight: 0.,
        }
    }

    /// Returns the compression this digest was created with.
    pub fn compression(&self) -> f64 {
        self.compression
    }

    /// Adds one value with weight 1 (`NaN` and infinite values are ignored).
    pub fn add(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.push_buffered(Centroid {
            mean: value,
            weight: 1.,
        });
    }

    /// Adds one value standing for `weight` identical observations (`NaN` and infinite values are
    /// ignored).
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if weight is not finite or is less than 1.
    pub fn add_weighted(&mut self, value: f64, weight: f64) -> Result<(), Error> {
        if !(weight.is_finite() && weight >= 1.) {
            return Err(Error::invalid_argument("weight must be finite and at least 1")
                .with_context("weight", weight));
        }
        if value.is_finite() {
            self.push_buffered(Centroid {
                mean: value,
                weight,
            });
        }
        Ok(())
    }

    /// Returns true if the digest has not seen any data.
    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty() && self.buffer.is_empty()
    }

    /// Returns the exact minimum value seen by the digest.
    pub fn min_value(&self) -> Option<f64> {
        if self.is_empty() {
            None
        } else {
            Some(self.min)
        }
    }

    /// Returns the exact maximum value seen by the digest.
    pub fn max_value(&self) -> Option<f64> {
        if self.is_empty() {
            None
        } else {
            Some(self.max)
        }
    }

    /// Returns total weight, buffered values included.
    pub fn total_weight(&self) -> f64 {
        self.centroids_weight + self.buffered_weight
    }

    /// Returns the number of centroids plus the number of buffered values.
    pub fn num_retained(&self) -> usize {
        self.centroids.len() + self.buffer.len()
    }

    /// Returns the number of bytes this digest currently holds, allocated capacity included.
    pub fn estimated_size_in_bytes(&self) -> usize {
        mem::size_of::<Self>()
            + (self.centroids.capacity() + self.buffer.capacity()) * mem::size_of::<Centroid>()
    }

    /// Merges another digest into this one.
    ///
    /// # Errors
    ///
    /// Returns `IncompatibleDigest` if the two digests were created with different compression;
    /// this digest is left untouched in that case.
    pub fn merge(&mut self, other: &TDigest) -> Result<(), Error> {
        if self.compression != other.compression {
            return Err(Error::incompatible_compression(
                self.compression,
                other.compression,
            ));
        }
        if other.is_empty() {
            return Ok(());
        }
        if self.is_empty() {
            self.centroids.clone_from(&other.centroids);
            self.centroids_weight = other.centroids_weight;
            self.buffer.clone_from(&other.buffer);
            self.buffered_weight = other.buffered_weight;
            self.reverse_merge = other.reverse_merge;
            self.min = other.min;
            self.max = other.max;
            return Ok(());
        }

        let mut points = Vec::with_capacity(
            self.buffer.len() + other.buffer.len() + other.centroids.len() + self.centroids.len(),
        );
        points.append(&mut self.buffer);
        points.extend_from_slice(&other.buffer);
        points.extend_from_slice(&other.centroids);
        let weight = mem::take(&mut self.buffered_weight)
            + other.buffered_weight
            + other.centroids_weight;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);

        self.merge_points(points, weight);
        debug!(
            centroids = self.centroids.len(),
            total_weight = self.centroids_weight,
            "merged digest"
        );
        Ok(())
    }

    /// Compute approximate quantile value corresponding to the given normalized rank.
    ///
    /// Rank 0 answers the exact minimum and rank 1 the exact maximum.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if rank is not in [0.0, 1.0], and `EmptyDigest` if the digest
    /// has not seen any data.
    pub fn quantile(&mut self, rank: f64) -> Result<f64, Error> {
        check_rank(rank)?;
        if self.is_empty() {
            return Err(Error::empty_digest());
        }
        self.compact();
        Ok(self.compacted_quantile(rank))
    }

    /// Computes several quantiles with a single compaction pass.
    ///
    /// Every rank is validated before anything else happens.
    ///
    /// # Examples
    ///
    /// ```
    /// # use percentile_digest::tdigest::TDigest;
    /// let mut digest = TDigest::default();
    /// for i in 1..=100 {
    ///     digest.add(i as f64);
    /// }
    /// let values = digest.quantiles(&[0.0, 0.5, 1.0]).unwrap();
    /// assert_eq!(values[0], 1.0);
    /// assert_eq!(values[2], 100.0);
    /// ```
    pub fn quantiles(&mut self, ranks: &[f64]) -> Result<Vec<f64>, Error> {
        for &rank in ranks {
            check_rank(rank)?;
        }
        if self.is_empty() {
            return Err(Error::empty_digest());
        }
        self.compact();
        Ok(ranks
            .iter()
            .map(|&rank| self.compacted_quantile(rank))
            .collect())
    }

    /// Compute approximate normalized rank of the given value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if value is `NaN`, and `EmptyDigest` if the digest has not seen
    /// any data.
    pub fn rank(&mut self, value: f64) -> Result<f64, Error> {
        if value.is_nan() {
            return Err(Error::invalid_argument("value must not be NaN"));
        }
        if self.is_empty() {
            return Err(Error::empty_digest());
        }
        if value < self.min {
            return Ok(0.);
        }
        if value > self.max {
            return Ok(1.);
        }
        self.compact();
        if self.centroids.len() == 1 {
            return Ok(0.5);
        }

        let centroids_weight = self.centroids_weight;
        let num_centroids = self.centroids.len();

        // left tail
        let first = self.centroids[0];
        if value < first.mean {
            if first.mean - self.min > 0. {
                if value == self.min {
                    return Ok(0.5 / centroids_weight);
                }
                return Ok((1.
                    + (value - self.min) / (first.mean - self.min) * (first.weight / 2. - 1.))
                    / centroids_weight);
            }
            return Ok(0.);
        }

        // right tail
        let last = self.centroids[num_centroids - 1];
        if value > last.mean {
            if self.max - last.mean > 0. {
                if value == self.max {
                    return Ok(1. - 0.5 / centroids_weight);
                }
                return Ok(1.
                    - (1. + (self.max - value) / (self.max - last.mean) * (last.weight / 2. - 1.))
                        / centroids_weight);
            }
            return Ok(1.);
        }

        // first.mean <= value <= last.mean, so both bounds stay in range
        let mut lower = self.centroids.partition_point(|c| c.mean < value);
        let mut upper = self.centroids.partition_point(|c| c.mean <= value);
        if value < self.centroids[lower].mean {
            lower -= 1;
        }
        if upper == num_centroids || self.centroids[upper - 1].mean >= value {
            upper -= 1;
        }

        let lower_c = self.centroids[lower];
        let upper_c = self.centroids[upper];
        let weight_below: f64 = self.centroids[..lower]
            .iter()
            .map(|c| c.weight)
            .sum::<f64>()
            + lower_c.weight / 2.;
        let weight_delta: f64 = self.centroids[lower..upper]
            .iter()
            .map(|c| c.weight)
            .sum::<f64>()
            - lower_c.weight / 2.
            + upper_c.weight / 2.;

        if upper_c.mean - lower_c.mean > 0. {
            return Ok((weight_below
                + weight_delta * (value - lower_c.mean) / (upper_c.mean - lower_c.mean))
                / centroids_weight);
        }
        Ok((weight_below + weight_delta / 2.) / centroids_weight)
    }

    /// Folds buffered values into the centroid list.
    ///
    /// Queries and serialization compact on their own; call this before [`centroids`] to see
    /// every value that was added.
    ///
    /// [`centroids`]: TDigest::centroids
    pub fn compact(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let mut points = Vec::with_capacity(self.buffer.len() + self.centroids.len());
        points.append(&mut self.buffer);
        let weight = mem::take(&mut self.buffered_weight);
        self.merge_points(points, weight);
    }

    fn push_buffered(&mut self, point: Centroid) {
        if self.buffer.len() >= self.centroids_capacity.saturating_mul(BUFFER_MULTIPLIER) {
            self.compact();
        }
        self.buffer.push(point);
        self.buffered_weight += point.weight;
        self.min = self.min.min(point.mean);
        self.max = self.max.max(point.mean);
    }

    /// Answers a quantile; buffer must be empty and the digest non-empty.
    fn compacted_quantile(&self, rank: f64) -> f64 {
        if rank == 0. {
            return self.min;
        }
        if rank == 1. {
            return self.max;
        }
        if self.centroids.len() == 1 {
            return self.centroids[0].mean;
        }

        // at least 2 centroids
        let centroids_weight = self.centroids_weight;
        let num_centroids = self.centroids.len();
        let weight = rank * centroids_weight;
        if weight < 1. {
            return self.min;
        }
        if weight > centroids_weight - 1. {
            return self.max;
        }
        let first = self.centroids[0];
        if first.weight > 1. && weight < first.weight / 2. {
            return self.min
                + (weight - 1.) / (first.weight / 2. - 1.) * (first.mean - self.min);
        }
        let last = self.centroids[num_centroids - 1];
        if last.weight > 1. && centroids_weight - weight < last.weight / 2. {
            return self.max
                + (centroids_weight - weight - 1.) / (last.weight / 2. - 1.)
                    * (last.mean - self.max);
        }

        // interpolate between extremes
        let mut weight_so_far = first.weight / 2.;
        for pair in self.centroids.windows(2) {
            let (left, right) = (pair[0], pair[1]);
            let dw = (left.weight + right.weight) / 2.;
            if weight_so_far + dw > weight {
                // the target weight is between left and right
                let mut left_weight = 0.;
                if left.weight == 1. {
                    if weight - weight_so_far < 0.5 {
                        return left.mean;
                    }
                    left_weight = 0.5;
                }
                let mut right_weight = 0.;
                if right.weight == 1. {
                    if weight_so_far + dw - weight <= 0.5 {
                        return right.mean;
                    }
                    right_weight = 0.5;
                }
                let w1 = weight - weight_so_far - left_weight;
                let w2 = weight_so_far + dw - weight - right_weight;
                return weighted_average(left.mean, w2, right.mean, w1);
            }
            weight_so_far += dw;
        }

        // between the last centroid's mean and max
        let half = last.weight / 2.;
        let w1 = (weight - (centroids_weight - half)).clamp(0., half);
        weighted_average(last.mean, half - w1, self.max, w1)
    }

    /// Sorts `points` together with the current centroids and sweeps them into new centroids.
    ///
    /// `weight` is the total weight of `points`.
    fn merge_points(&mut self, mut points: Vec<Centroid>, weight: f64) {
        points.append(&mut self.centroids);
        // stable: equal means keep insertion order
        points.sort_by(centroid_cmp);
        if self.reverse_merge {
            points.reverse();
        }
        self.centroids_weight += weight;

        let Some(&first) = points.first() else {
            return;
        };
        let len = points.len();
        let centroids_weight = self.centroids_weight;
        let normalizer = scale_function::normalizer(2. * self.compression, centroids_weight);

        let mut current = first;
        let mut weight_so_far = 0.;
        for (index, c) in points.into_iter().enumerate().skip(1) {
            let proposed_weight = current.weight + c.weight;
            let add_this = if c.mean == current.mean {
                true
            } else if index != 1 && index != len - 1 {
                let q0 = weight_so_far / centroids_weight;
                let q2 = (weight_so_far + proposed_weight) / centroids_weight;
                proposed_weight
                    <= centroids_weight
                        * scale_function::max(q0, normalizer)
                            .min(scale_function::max(q2, normalizer))
            } else {
                false
            };
            if add_this {
                // merge into existing centroid
                current.add(c);
            } else {
                // copy to a new centroid
                weight_so_far += current.weight;
                self.centroids.push(current);
                current = c;
            }
        }
        self.centroids.push(current);

        if self.reverse_merge {
            self.centroids.reverse();
        }
        let num_centroids = self.centroids.len();
        self.min = self.min.min(self.centroids[0].mean);
        self.max = self.max.max(self.centroids[num_centroids - 1].mean);
        self.reverse_merge = !self.reverse_merge;
        trace!(
            centroids = num_centroids,
            total_weight = centroids_weight,
            "compacted digest"
        );
    }
}

pub(super) fn check_compression(compression: f64) -> Result<(), Error> {
    if compression.is_finite() && compression > 0. {
        Ok(())
    } else {
        Err(Error::invalid_argument("compression must be finite and positive")
            .with_context("compression", compression))
    }
}

pub(crate) fn check_rank(rank: f64) -> Result<(), Error> {
    if (0.0..=1.0).contains(&rank) {
        Ok(())
    } else {
        Err(Error::invalid_argument("rank must be in [0.0, 1.0]").with_context("rank", rank))
    }
}

// means are finite: `add` skips non-finite values and `deserialize` rejects them
fn centroid_cmp(a: &Centroid, b: &Centroid) -> Ordering {
    a.mean.total_cmp(&b.mean)
}

/// A cluster of values: their mean and how many of them were folded in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Centroid {
    pub(crate) mean: f64,
    pub(crate) weight: f64,
}

impl Centroid {
    fn add(&mut self, other: Centroid) {
        let total_weight = self.weight + other.weight;
        let delta = other.mean - self.mean;
        if delta.is_finite() {
            self.mean += other.weight * delta / total_weight;
        } else {
            // the gap between means overflows
            self.mean = self.mean * (self.weight / total_weight)
                + other.mean * (other.weight / total_weight);
        }
        self.weight = total_weight;
    }
}

/// Generates cluster sizes proportional to `q*(1-q)`.
///
/// The use of a normalizing function results in a strictly bounded number of clusters no matter
/// how many samples.
///
/// Corresponds to K_2 in the reference implementation
mod scale_function {
    pub(super) fn max(q: f64, normalizer: f64) -> f64 {
        q * (1. - q) / normalizer
    }

    pub(super) fn normalizer(compression: f64, n: f64) -> f64 {
        compression / z(compression, n)
    }

    pub(super) fn z(compression: f64, n: f64) -> f64 {
        4. * (n / compression).ln() + 24.
    }
}

/// Average of `x1` and `x2` weighted by `w1` and `w2`.
fn weighted_average(x1: f64, w1: f64, x2: f64, w2: f64) -> f64 {
    let total = w1 + w2;
    let average = (x1 * w1 + x2 * w2) / total;
    if average.is_finite() {
        average
    } else {
        // the weighted sum overflows
        x1 * (w1 / total) + x2 * (w2 / total)
    }
}
