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

use crate::tdigest::TDigest;
use crate::tdigest::sketch::Centroid;

impl TDigest {
    /// Iterates over `(mean, weight)` of the compacted centroids in ascending mean order.
    ///
    /// Values still sitting in the buffer are not visited; call [`compact`](TDigest::compact)
    /// first to include them.
    pub fn centroids(&self) -> impl ExactSizeIterator<Item = (f64, f64)> + '_ {
        self.centroids.iter().map(|c| (c.mean, c.weight))
    }
}

impl IntoIterator for TDigest {
    type Item = (f64, f64);
    type IntoIter = TDigestIntoIter;

    fn into_iter(mut self) -> Self::IntoIter {
        self.compact();
        TDigestIntoIter {
            centroids: std::mem::take(&mut self.centroids),
            index: 0,
        }
    }
}

/// Iterator over the centroids of a TDigest, yielding `(mean, weight)`.
pub struct TDigestIntoIter {
    centroids: Vec<Centroid>,
    index: usize,
}

impl Iterator for TDigestIntoIter {
    type Item = (f64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.index < self.centroids.len() {
            let centroid = self.centroids[self.index];
            self.index += 1;
            Some((centroid.mean, centroid.weight))
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.centroids.len() - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for TDigestIntoIter {}
