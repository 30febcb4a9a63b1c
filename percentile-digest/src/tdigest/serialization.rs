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

//! Binary layout of a digest, all fields little-endian:
//!
//! ```text
//! 0      compression   f64
//! 8      min           f64
//! 16     max           f64
//! 24     count         u32
//! 28     count x (mean f64, weight f64), ascending by mean
//! ```

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::error::Error;
use crate::tdigest::TDigest;
use crate::tdigest::sketch::Centroid;
use crate::tdigest::sketch::check_compression;

/// Size of the fixed header in bytes.
pub const HEADER_SIZE_BYTES: usize = 28;
/// Size of one serialized centroid in bytes.
pub const CENTROID_SIZE_BYTES: usize = 16;

impl TDigest {
    /// Returns the size [`serialize`](TDigest::serialize) would produce right now.
    pub fn serialized_size(&mut self) -> usize {
        self.compact();
        HEADER_SIZE_BYTES + CENTROID_SIZE_BYTES * self.centroids.len()
    }

    /// Serializes this digest to bytes, compacting buffered values first.
    pub fn serialize(&mut self) -> Vec<u8> {
        let size = self.serialized_size();
        let mut bytes = SketchBytes::with_capacity(size);
        bytes.write_f64_le(self.compression);
        bytes.write_f64_le(self.min);
        bytes.write_f64_le(self.max);
        bytes.write_u32_le(self.centroids.len() as u32);
        for centroid in &self.centroids {
            bytes.write_f64_le(centroid.mean);
            bytes.write_f64_le(centroid.weight);
        }
        bytes.into_bytes()
    }

    /// Deserializes a digest from bytes.
    ///
    /// # Errors
    ///
    /// Returns `CorruptState` if the bytes are truncated, carry trailing data, or describe a
    /// digest that could not have been produced by [`serialize`](TDigest::serialize).
    pub fn deserialize(bytes: &[u8]) -> Result<TDigest, Error> {
        let mut cursor = SketchSlice::new(bytes);

        let compression = cursor
            .read_f64_le()
            .map_err(Error::insufficient_data("compression"))?;
        let min = cursor.read_f64_le().map_err(Error::insufficient_data("min"))?;
        let max = cursor.read_f64_le().map_err(Error::insufficient_data("max"))?;
        let num_centroids = cursor
            .read_u32_le()
            .map_err(Error::insufficient_data("num_centroids"))? as usize;

        let expected = num_centroids
            .checked_mul(CENTROID_SIZE_BYTES)
            .and_then(|n| n.checked_add(HEADER_SIZE_BYTES));
        if expected != Some(bytes.len()) {
            return Err(Error::corrupt("centroid count does not match buffer length")
                .with_context("num_centroids", num_centroids)
                .with_context("len", bytes.len()));
        }
        check_compression(compression).map_err(|_| {
            Error::corrupt("compression must be finite and positive")
                .with_context("compression", compression)
        })?;
        if num_centroids == 0 {
            if min != f64::INFINITY || max != f64::NEG_INFINITY {
                return Err(Error::corrupt("empty digest must have min +inf and max -inf")
                    .with_context("min", min)
                    .with_context("max", max));
            }
        } else if !(min.is_finite() && max.is_finite() && min <= max) {
            return Err(Error::corrupt("min and max must be finite with min <= max")
                .with_context("min", min)
                .with_context("max", max));
        }

        let mut centroids = Vec::with_capacity(num_centroids);
        let mut centroids_weight = 0.;
        for index in 0..num_centroids {
            let mean = cursor.read_f64_le().map_err(Error::insufficient_data("mean"))?;
            let weight = cursor
                .read_f64_le()
                .map_err(Error::insufficient_data("weight"))?;
            if !mean.is_finite() {
                return Err(Error::corrupt("centroid mean is not finite")
                    .with_context("index", index)
                    .with_context("mean", mean));
            }
            if !(weight.is_finite() && weight >= 1.) {
                return Err(Error::corrupt("centroid weight must be finite and at least 1")
                    .with_context("index", index)
                    .with_context("weight", weight));
            }
            if centroids
                .last()
                .is_some_and(|prev: &Centroid| prev.mean > mean)
            {
                return Err(Error::corrupt("centroids are not sorted by mean")
                    .with_context("index", index));
            }
            if mean < min || mean > max {
                return Err(Error::corrupt("centroid mean outside [min, max]")
                    .with_context("index", index)
                    .with_context("mean", mean));
            }
            centroids_weight += weight;
            centroids.push(Centroid { mean, weight });
        }

        let mut digest = TDigest::make(compression);
        digest.min = min;
        digest.max = max;
        digest.centroids = centroids;
        digest.centroids_weight = centroids_weight;
        Ok(digest)
    }
}
