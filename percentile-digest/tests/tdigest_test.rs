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

use googletest::assert_that;
use googletest::prelude::contains_substring;
use googletest::prelude::near;
use percentile_digest::error::ErrorKind;
use percentile_digest::tdigest::DEFAULT_COMPRESSION;
use percentile_digest::tdigest::TDigest;

/// Deterministic pseudo-random values in [0, 1).
fn lcg_values(n: usize, mut seed: u64) -> Vec<f64> {
    (0..n)
        .map(|_| {
            seed = seed
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (seed >> 11) as f64 / (1u64 << 53) as f64
        })
        .collect()
}

#[test]
fn test_invalid_compression() {
    for compression in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        let err = TDigest::new(compression).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
    assert_eq!(TDigest::default().compression(), DEFAULT_COMPRESSION);
}

#[test]
fn test_empty() {
    let mut tdigest = TDigest::new(10.0).unwrap();
    assert!(tdigest.is_empty());
    assert_eq!(tdigest.compression(), 10.0);
    assert_eq!(tdigest.total_weight(), 0.0);
    assert_eq!(tdigest.min_value(), None);
    assert_eq!(tdigest.max_value(), None);
    assert_eq!(tdigest.rank(0.0).unwrap_err().kind(), ErrorKind::EmptyDigest);
    assert_eq!(
        tdigest.quantile(0.5).unwrap_err().kind(),
        ErrorKind::EmptyDigest
    );
    assert_eq!(
        tdigest.quantiles(&[0.1, 0.9]).unwrap_err().kind(),
        ErrorKind::EmptyDigest
    );
}

#[test]
fn test_invalid_rank() {
    let mut tdigest = TDigest::new(100.0).unwrap();
    tdigest.add(1.0);
    for rank in [1.5, -0.1, f64::NAN] {
        let err = tdigest.quantile(rank).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_that!(err.message(), contains_substring("rank must be in [0.0, 1.0]"));
    }
    assert_eq!(
        tdigest.quantiles(&[0.5, 2.0]).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
    assert_eq!(
        tdigest.rank(f64::NAN).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
}

#[test]
fn test_invalid_rank_checked_before_emptiness() {
    let mut tdigest = TDigest::default();
    assert_eq!(
        tdigest.quantile(1.5).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
}

#[test]
fn test_nan_is_ignored() {
    let mut tdigest = TDigest::default();
    tdigest.add(f64::NAN);
    assert!(tdigest.is_empty());
    tdigest.add_weighted(f64::NAN, 2.0).unwrap();
    assert!(tdigest.is_empty());
}

#[test]
fn test_infinities_are_ignored() {
    let mut tdigest = TDigest::default();
    tdigest.add(f64::INFINITY);
    tdigest.add(f64::INFINITY);
    tdigest.add(f64::NEG_INFINITY);
    tdigest.add_weighted(f64::INFINITY, 3.0).unwrap();
    assert!(tdigest.is_empty());

    tdigest.add(1.0);
    tdigest.add(f64::INFINITY);
    tdigest.add(2.0);
    tdigest.compact();
    assert_eq!(tdigest.total_weight(), 2.0);
    assert_eq!(tdigest.min_value(), Some(1.0));
    assert_eq!(tdigest.max_value(), Some(2.0));
    assert_eq!(
        tdigest.centroids().collect::<Vec<_>>(),
        vec![(1.0, 1.0), (2.0, 1.0)]
    );
    let median = tdigest.quantile(0.5).unwrap();
    assert!(median.is_finite());
    assert_eq!(tdigest.rank(f64::INFINITY).unwrap(), 1.0);
}

#[test]
fn test_extreme_finite_duplicates_stay_finite() {
    let mut tdigest = TDigest::default();
    for _ in 0..10 {
        tdigest.add(f64::MAX);
        tdigest.add(f64::MIN);
    }
    tdigest.compact();
    tdigest.add(0.0);
    tdigest.compact();
    assert!(tdigest.centroids().all(|(mean, _)| mean.is_finite()));
    assert_eq!(tdigest.quantile(0.0).unwrap(), f64::MIN);
    assert_eq!(tdigest.quantile(1.0).unwrap(), f64::MAX);
    assert_eq!(tdigest.total_weight(), 21.0);
    let quantiles = tdigest.quantiles(&[0.1, 0.25, 0.5, 0.75, 0.9]).unwrap();
    assert!(quantiles.iter().all(|q| q.is_finite()));
}

#[test]
fn test_one_value() {
    let mut tdigest = TDigest::new(100.0).unwrap();
    tdigest.add(1.0);
    assert_eq!(tdigest.compression(), 100.0);
    assert_eq!(tdigest.total_weight(), 1.0);
    assert_eq!(tdigest.min_value(), Some(1.0));
    assert_eq!(tdigest.max_value(), Some(1.0));
    assert_eq!(tdigest.rank(0.99).unwrap(), 0.0);
    assert_eq!(tdigest.rank(1.0).unwrap(), 0.5);
    assert_eq!(tdigest.rank(1.01).unwrap(), 1.0);
    assert_eq!(tdigest.quantile(0.0).unwrap(), 1.0);
    assert_eq!(tdigest.quantile(0.5).unwrap(), 1.0);
    assert_eq!(tdigest.quantile(1.0).unwrap(), 1.0);
}

#[test]
fn test_many_values() {
    let n = 10_000;
    let mut tdigest = TDigest::new(100.0).unwrap();
    for i in 0..n {
        tdigest.add(i as f64);
    }
    let n = n as f64;
    assert!(!tdigest.is_empty());
    assert_eq!(tdigest.total_weight(), n);
    assert_eq!(tdigest.min_value(), Some(0.0));
    assert_eq!(tdigest.max_value(), Some(n - 1.0));
    assert_eq!(tdigest.rank(0.0).unwrap(), 0.5 / n);
    assert_that!(tdigest.rank(n / 4.0).unwrap(), near(0.25, 0.01));
    assert_that!(tdigest.rank(n / 2.0).unwrap(), near(0.5, 0.01));
    assert_that!(tdigest.rank(n * 3.0 / 4.0).unwrap(), near(0.75, 0.01));
    assert_eq!(tdigest.rank(n).unwrap(), 1.0);
    assert_eq!(tdigest.quantile(0.0).unwrap(), 0.0);
    assert_that!(tdigest.quantile(0.5).unwrap(), near(n / 2.0, n * 0.01));
    assert_that!(tdigest.quantile(0.9).unwrap(), near(n * 0.9, n * 0.01));
    assert_that!(tdigest.quantile(0.95).unwrap(), near(n * 0.95, n * 0.01));
    assert_eq!(tdigest.quantile(1.0).unwrap(), n - 1.0);
    assert!(tdigest.num_retained() < 1000);
}

#[test]
fn test_sequential_thousand() {
    let mut tdigest = TDigest::new(100.0).unwrap();
    for i in 1..=1000 {
        tdigest.add(i as f64);
    }
    assert_that!(tdigest.quantile(0.5).unwrap(), near(500.0, 5.0));
    assert_eq!(tdigest.quantile(0.0).unwrap(), 1.0);
    assert_eq!(tdigest.quantile(1.0).unwrap(), 1000.0);
}

#[test]
fn test_batch_quantiles_match_single_queries() {
    let mut tdigest = TDigest::new(50.0).unwrap();
    for value in lcg_values(5000, 7) {
        tdigest.add(value);
    }
    let ranks = [0.0, 0.01, 0.25, 0.5, 0.75, 0.99, 1.0];
    let batch = tdigest.quantiles(&ranks).unwrap();
    assert_eq!(batch.len(), ranks.len());
    for (rank, value) in ranks.iter().zip(batch) {
        assert_eq!(tdigest.quantile(*rank).unwrap(), value);
    }
    assert_eq!(tdigest.quantiles(&[]).unwrap(), Vec::<f64>::new());
}

#[test]
fn test_extremes_are_exact() {
    for seed in [1, 2, 3] {
        let values = lcg_values(3000, seed);
        let mut tdigest = TDigest::new(20.0).unwrap();
        for value in &values {
            tdigest.add(value * 1000.0 - 500.0);
        }
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min) * 1000.0 - 500.0;
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max) * 1000.0 - 500.0;
        assert_eq!(tdigest.quantile(0.0).unwrap(), min);
        assert_eq!(tdigest.quantile(1.0).unwrap(), max);
    }
}

#[test]
fn test_quantiles_stay_within_min_max() {
    let mut tdigest = TDigest::new(30.0).unwrap();
    for value in lcg_values(20_000, 42) {
        tdigest.add(value * value);
    }
    let min = tdigest.min_value().unwrap();
    let max = tdigest.max_value().unwrap();
    for i in 1..1000 {
        let q = tdigest.quantile(i as f64 / 1000.0).unwrap();
        assert!(q >= min && q <= max, "quantile {q} outside [{min}, {max}]");
    }
}

#[test]
fn test_quantiles_are_monotonic() {
    let mut tdigest = TDigest::new(100.0).unwrap();
    for value in lcg_values(10_000, 11) {
        tdigest.add(value);
    }
    let mut previous = f64::NEG_INFINITY;
    for i in 0..=200 {
        let q = tdigest.quantile(i as f64 / 200.0).unwrap();
        assert!(q >= previous, "quantile decreased at step {i}");
        previous = q;
    }
}

#[test]
fn test_duplicates_collapse_into_one_centroid() {
    let mut tdigest = TDigest::new(100.0).unwrap();
    for _ in 0..5000 {
        tdigest.add(7.0);
    }
    tdigest.compact();
    assert_eq!(tdigest.centroids().collect::<Vec<_>>(), vec![(7.0, 5000.0)]);
    assert_eq!(tdigest.num_retained(), 1);
    assert_eq!(tdigest.quantile(0.3).unwrap(), 7.0);
}

#[test]
fn test_compact_keeps_means_sorted_and_weight() {
    let mut tdigest = TDigest::new(25.0).unwrap();
    for value in lcg_values(4000, 5) {
        tdigest.add(value);
        tdigest.add(value);
    }
    tdigest.compact();
    let centroids: Vec<(f64, f64)> = tdigest.centroids().collect();
    assert!(centroids.windows(2).all(|pair| pair[0].0 <= pair[1].0));
    let weight: f64 = centroids.iter().map(|(_, w)| w).sum();
    assert_eq!(weight, 8000.0);
    assert_eq!(tdigest.total_weight(), 8000.0);
}

#[test]
fn test_smaller_compression_keeps_fewer_centroids() {
    let values = lcg_values(20_000, 3);
    let mut coarse = TDigest::new(20.0).unwrap();
    let mut fine = TDigest::new(200.0).unwrap();
    for &value in &values {
        coarse.add(value);
        fine.add(value);
    }
    coarse.compact();
    fine.compact();
    assert!(coarse.num_retained() < fine.num_retained());
}

#[test]
fn test_weighted_values() {
    let mut tdigest = TDigest::new(100.0).unwrap();
    tdigest.add_weighted(1.0, 3.0).unwrap();
    tdigest.add_weighted(2.0, 1.0).unwrap();
    assert_eq!(tdigest.total_weight(), 4.0);

    for weight in [0.5, 0.0, -1.0, f64::NAN, f64::INFINITY] {
        let err = tdigest.add_weighted(5.0, weight).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
    assert_eq!(tdigest.total_weight(), 4.0);
    assert_eq!(tdigest.max_value(), Some(2.0));
    assert_eq!(tdigest.rank(1.0).unwrap(), 0.375);
}

#[test]
fn test_rank_two_values() {
    let mut tdigest = TDigest::new(100.0).unwrap();
    tdigest.add(1.0);
    tdigest.add(2.0);
    assert_eq!(tdigest.rank(0.99).unwrap(), 0.0);
    assert_eq!(tdigest.rank(1.0).unwrap(), 0.25);
    assert_eq!(tdigest.rank(1.25).unwrap(), 0.375);
    assert_eq!(tdigest.rank(1.5).unwrap(), 0.5);
    assert_eq!(tdigest.rank(1.75).unwrap(), 0.625);
    assert_eq!(tdigest.rank(2.0).unwrap(), 0.75);
    assert_eq!(tdigest.rank(2.01).unwrap(), 1.0);
}

#[test]
fn test_rank_repeated_values() {
    let mut tdigest = TDigest::new(100.0).unwrap();
    tdigest.add(1.0);
    tdigest.add(1.0);
    tdigest.add(1.0);
    tdigest.add(1.0);
    assert_eq!(tdigest.rank(0.99).unwrap(), 0.0);
    assert_eq!(tdigest.rank(1.0).unwrap(), 0.5);
    assert_eq!(tdigest.rank(1.01).unwrap(), 1.0);
}

#[test]
fn test_repeated_blocks() {
    let mut tdigest = TDigest::new(100.0).unwrap();
    tdigest.add(1.0);
    tdigest.add(2.0);
    tdigest.add(2.0);
    tdigest.add(3.0);
    assert_eq!(tdigest.rank(0.99).unwrap(), 0.0);
    assert_eq!(tdigest.rank(1.0).unwrap(), 0.125);
    assert_eq!(tdigest.rank(2.0).unwrap(), 0.5);
    assert_eq!(tdigest.rank(3.0).unwrap(), 0.875);
    assert_eq!(tdigest.rank(3.01).unwrap(), 1.0);
}

#[test]
fn test_into_iter_includes_buffered_values() {
    let mut tdigest = TDigest::new(100.0).unwrap();
    tdigest.add(3.0);
    tdigest.add(1.0);
    tdigest.add(2.0);
    let centroids: Vec<(f64, f64)> = tdigest.into_iter().collect();
    assert_eq!(centroids, vec![(1.0, 1.0), (2.0, 1.0), (3.0, 1.0)]);
}

#[test]
fn test_estimated_size_grows_with_data() {
    let mut tdigest = TDigest::new(100.0).unwrap();
    let empty = tdigest.estimated_size_in_bytes();
    for i in 0..100 {
        tdigest.add(i as f64);
    }
    assert!(tdigest.estimated_size_in_bytes() >= empty + 100 * 16);
}
