/**
 * UserKNN
 * Copyright (C) 2018 Sebastian Schelter
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

use std::collections::BinaryHeap;
use std::time::Instant;

use tracing::info;

use crate::config::SimilarityMetric;
use crate::error::{RecoError, Result};
use crate::matrix::RatingMatrix;
use crate::types::{Neighbor, NeighborSet, SparseRow};
use crate::utils;

/// Brute-force nearest neighbor index over the rows of a rating matrix. Unrated cells count as
/// zero in the row vectors, which is an approximation and not an imputation of missing values.
pub struct SimilarityIndex<'m> {
    matrix: &'m RatingMatrix,
    norms: Vec<f64>,
    metric: SimilarityMetric,
}

pub fn norm(row: &SparseRow) -> f64 {
    row.values().map(|value| value * value).sum::<f64>().sqrt()
}

fn dot(row_a: &SparseRow, row_b: &SparseRow) -> f64 {
    let (shorter, longer) = if row_a.len() <= row_b.len() { (row_a, row_b) } else { (row_b, row_a) };

    shorter.iter()
        .filter_map(|(item, value)| longer.get(item).map(|other_value| value * other_value))
        .sum()
}

/// Cosine similarity of two rows with precomputed norms, 0 if either row has no ratings.
pub fn cosine_similarity(row_a: &SparseRow, norm_a: f64, row_b: &SparseRow, norm_b: f64) -> f64 {
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot(row_a, row_b) / (norm_a * norm_b)
    }
}

/// 1 - cosine similarity, clamped at zero against rounding on identical rows.
pub fn cosine_distance(row_a: &SparseRow, norm_a: f64, row_b: &SparseRow, norm_b: f64) -> f64 {
    (1.0 - cosine_similarity(row_a, norm_a, row_b, norm_b)).max(0.0)
}

impl<'m> SimilarityIndex<'m> {

    pub fn fit(matrix: &'m RatingMatrix, metric: SimilarityMetric) -> Result<Self> {

        if matrix.num_users() == 0 {
            return Err(RecoError::EmptyMatrix);
        }

        let fit_start = Instant::now();

        let norms: Vec<f64> = (0..matrix.num_users())
            .map(|row| norm(matrix.row_at(row)))
            .collect();

        info!(users = matrix.num_users(), duration_ms = utils::to_millis(fit_start.elapsed()),
            "fitted similarity index");

        Ok(SimilarityIndex { matrix, norms, metric })
    }

    pub fn matrix(&self) -> &'m RatingMatrix {
        self.matrix
    }

    /// The k users closest to `user`, never including `user` itself.
    pub fn query(&self, user: u32, k: usize) -> Result<NeighborSet> {
        let row = self.matrix.row(user).ok_or(RecoError::UnknownUser(user))?;
        Ok(self.nearest(row, norm(row), k, Some(user)))
    }

    /// The k users of the matrix closest to a rating profile which is not a row of the matrix.
    pub fn query_profile(&self, profile: &SparseRow, k: usize) -> NeighborSet {
        self.nearest(profile, norm(profile), k, None)
    }

    pub fn distance(&self, user_a: u32, user_b: u32) -> Result<f64> {
        let row_a = self.matrix.row(user_a).ok_or(RecoError::UnknownUser(user_a))?;
        let row_b = self.matrix.row(user_b).ok_or(RecoError::UnknownUser(user_b))?;
        Ok(self.measure(row_a, norm(row_a), row_b, norm(row_b)))
    }

    fn measure(&self, row_a: &SparseRow, norm_a: f64, row_b: &SparseRow, norm_b: f64) -> f64 {
        match self.metric {
            SimilarityMetric::Cosine => cosine_distance(row_a, norm_a, row_b, norm_b),
        }
    }

    /// Scans all rows keeping the k + 1 closest candidates, then drops the excluded user and
    /// keeps the k closest that remain. The query row itself is at distance zero and would
    /// otherwise take one of the k slots.
    fn nearest(&self, row: &SparseRow, row_norm: f64, k: usize, exclude: Option<u32>) -> NeighborSet {

        if k == 0 {
            return Vec::new();
        }

        let num_candidates = k.saturating_add(1);
        let mut candidates: BinaryHeap<Neighbor> =
            BinaryHeap::with_capacity(num_candidates.min(self.matrix.num_users()));

        for other_row in 0..self.matrix.num_users() {

            let candidate = Neighbor {
                user: self.matrix.user_at(other_row),
                distance: self.measure(row, row_norm, self.matrix.row_at(other_row), self.norms[other_row]),
            };

            if candidates.len() < num_candidates {
                candidates.push(candidate);
            } else if let Some(mut top) = candidates.peek_mut() {
                if candidate < *top {
                    *top = candidate;
                }
            }
        }

        candidates.into_sorted_vec()
            .into_iter()
            .filter(|neighbor| Some(neighbor.user) != exclude)
            .take(k)
            .collect()
    }
}


#[cfg(test)]
mod tests {

    use crate::config::{DuplicateResolution, SimilarityMetric};
    use crate::error::RecoError;
    use crate::matrix::{self, RatingMatrix};
    use crate::similarity::{self, SimilarityIndex};
    use crate::store::RatingStore;
    use crate::types::{self, Rating, RatingDomain};

    fn matrix_of(ratings: Vec<Rating>) -> RatingMatrix {
        let store = RatingStore::ingest(ratings, RatingDomain::default(), DuplicateResolution::LastWins)
            .unwrap();
        matrix::build(&store)
    }

    fn scenario_a() -> RatingMatrix {
        matrix_of(vec![
            Rating::new(1, 10, 5.0),
            Rating::new(1, 20, 3.0),
            Rating::new(2, 10, 5.0),
            Rating::new(2, 30, 4.0),
            Rating::new(3, 20, 1.0),
        ])
    }

    fn larger_matrix() -> RatingMatrix {
        let mut ratings = Vec::new();
        for user in 1..=12 {
            for item in 1..=8 {
                if (user * 7 + item * 3) % 4 != 0 {
                    let value = 0.5 + ((user * item) % 10) as f64 * 0.5;
                    ratings.push(Rating::new(user, item, value));
                }
            }
        }
        matrix_of(ratings)
    }

    #[test]
    fn nearest_neighbor_of_scenario_a() {
        let matrix = scenario_a();
        let index = SimilarityIndex::fit(&matrix, SimilarityMetric::Cosine).unwrap();

        let neighbors = index.query(3, 1).unwrap();

        // User 3 only shares item 20 with user 1, user 2 is orthogonal to user 3
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].user, 1);
        assert!((index.distance(3, 2).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn query_never_returns_query_user() {
        let matrix = larger_matrix();
        let index = SimilarityIndex::fit(&matrix, SimilarityMetric::Cosine).unwrap();
        let num_users = matrix.num_users();

        for user in matrix.users() {
            for k in 1..num_users {
                let neighbors = index.query(*user, k).unwrap();

                assert_eq!(neighbors.len(), k.min(num_users - 1));
                assert!(neighbors.iter().all(|neighbor| neighbor.user != *user));
                for pair in neighbors.windows(2) {
                    assert!(pair[0].distance <= pair[1].distance);
                }
            }

            // Asking for more neighbors than there are users
            assert_eq!(index.query(*user, num_users + 5).unwrap().len(), num_users - 1);
        }
    }

    #[test]
    fn huge_k_returns_all_other_users() {
        let matrix = scenario_a();
        let index = SimilarityIndex::fit(&matrix, SimilarityMetric::Cosine).unwrap();

        let neighbors = index.query(1, usize::MAX / 64).unwrap();
        assert_eq!(neighbors.iter().map(|neighbor| neighbor.user).collect::<Vec<_>>(), vec![2, 3]);

        assert_eq!(index.query(1, usize::MAX).unwrap().len(), 2);
        assert_eq!(index.query_profile(matrix.row(3).unwrap(), usize::MAX).len(), 3);
    }

    #[test]
    fn identical_users_do_not_shrink_neighborhood() {
        let matrix = matrix_of(vec![
            Rating::new(1, 10, 4.0),
            Rating::new(2, 10, 4.0),
            Rating::new(3, 10, 4.0),
            Rating::new(4, 20, 4.0),
        ]);
        let index = SimilarityIndex::fit(&matrix, SimilarityMetric::Cosine).unwrap();

        let neighbors = index.query(2, 2).unwrap();

        // Three users at distance zero, ties resolved by user id, the query user dropped
        assert_eq!(neighbors.iter().map(|neighbor| neighbor.user).collect::<Vec<_>>(), vec![1, 3]);
        assert!(neighbors.iter().all(|neighbor| neighbor.distance == 0.0));
    }

    #[test]
    fn zero_vectors_have_zero_similarity() {
        let empty = types::new_sparse_row(0);
        let mut row = types::new_sparse_row(1);
        row.insert(10, 4.0);

        let similarity = similarity::cosine_similarity(&empty, 0.0, &row, similarity::norm(&row));
        assert_eq!(similarity, 0.0);
        assert_eq!(similarity::cosine_distance(&empty, 0.0, &empty, 0.0), 1.0);

        let matrix = scenario_a();
        let index = SimilarityIndex::fit(&matrix, SimilarityMetric::Cosine).unwrap();
        let neighbors = index.query_profile(&empty, 3);

        assert_eq!(neighbors.len(), 3);
        assert!(neighbors.iter().all(|neighbor| neighbor.distance == 1.0));
    }

    #[test]
    fn unknown_user_and_empty_matrix() {
        let matrix = scenario_a();
        let index = SimilarityIndex::fit(&matrix, SimilarityMetric::Cosine).unwrap();

        match index.query(42, 2) {
            Err(RecoError::UnknownUser(42)) => {},
            other => panic!("unexpected result {:?}", other),
        }

        let empty = matrix_of(Vec::new());
        assert!(match SimilarityIndex::fit(&empty, SimilarityMetric::Cosine) {
            Err(RecoError::EmptyMatrix) => true,
            _ => false,
        });
    }
}
