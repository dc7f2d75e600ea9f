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

use tracing::trace;

use crate::matrix::RatingMatrix;
use crate::similarity::SimilarityIndex;
use crate::types::{Neighbor, Prediction};

/// Added to every distance before inverting it, bounds the weight of a neighbor at distance 0.
pub const EPSILON: f64 = 1e-6;

pub fn weight(distance: f64) -> f64 {
    1.0 / (distance + EPSILON)
}

/// Estimates the rating of `user` for `item` from the ratings of its `k` nearest neighbors.
/// Returns `None` if the user or item is unknown to the fitted matrix, or if fewer than
/// `min_support` neighbors rated the item.
pub fn predict(
    user: u32,
    item: u32,
    k: usize,
    min_support: usize,
    index: &SimilarityIndex,
) -> Option<Prediction> {

    let matrix = index.matrix();

    if !matrix.contains_item(item) {
        trace!(user, item, "item unknown to the rating matrix");
        return None;
    }

    match index.query(user, k) {
        Ok(neighbors) => predict_with_neighbors(user, item, &neighbors, min_support, matrix),
        Err(failure) => {
            trace!(user, item, %failure, "no prediction");
            None
        },
    }
}

/// Weighted average over the neighbors who rated `item`, with weights `1 / (distance + EPSILON)`.
/// Neighbors with an unrated cell contribute nothing. A prediction always has a support of at
/// least one, regardless of `min_support`.
pub fn predict_with_neighbors(
    user: u32,
    item: u32,
    neighbors: &[Neighbor],
    min_support: usize,
    matrix: &RatingMatrix,
) -> Option<Prediction> {

    let mut weighted_sum = 0.0;
    let mut sum_of_weights = 0.0;
    let mut support: usize = 0;

    for neighbor in neighbors {
        if neighbor.user == user {
            continue;
        }

        if let Some(value) = matrix.cell(neighbor.user, item).value() {
            let neighbor_weight = weight(neighbor.distance);
            weighted_sum += neighbor_weight * value;
            sum_of_weights += neighbor_weight;
            support += 1;
        }
    }

    if support == 0 || support < min_support {
        return None;
    }

    Some(Prediction { user, item, value: weighted_sum / sum_of_weights, support })
}


#[cfg(test)]
mod tests {

    use crate::config::{DuplicateResolution, SimilarityMetric};
    use crate::matrix::{self, RatingMatrix};
    use crate::predict::{self, EPSILON};
    use crate::similarity::SimilarityIndex;
    use crate::store::RatingStore;
    use crate::types::{Neighbor, Rating, RatingDomain};

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

    #[test]
    fn scenario_a_prediction() {
        let matrix = scenario_a();
        let index = SimilarityIndex::fit(&matrix, SimilarityMetric::Cosine).unwrap();

        let prediction = predict::predict(3, 10, 1, 1, &index).unwrap();

        assert_eq!(prediction.value, 5.0);
        assert_eq!(prediction.support, 1);
    }

    #[test]
    fn unrated_neighbors_are_ignored() {
        let matrix = scenario_a();

        let neighbors = vec![
            Neighbor { user: 1, distance: 0.2 },
            Neighbor { user: 2, distance: 0.4 },
        ];

        // User 1 did not rate item 30, so only user 2 counts
        let prediction = predict::predict_with_neighbors(3, 30, &neighbors, 1, &matrix).unwrap();
        assert_eq!(prediction.value, 4.0);
        assert_eq!(prediction.support, 1);

        assert!(predict::predict_with_neighbors(3, 30, &neighbors, 2, &matrix).is_none());
    }

    #[test]
    fn weighted_by_inverse_distance() {
        let matrix = matrix_of(vec![
            Rating::new(1, 10, 2.0),
            Rating::new(2, 10, 4.0),
            Rating::new(3, 20, 3.0),
        ]);

        let neighbors = vec![
            Neighbor { user: 1, distance: 0.0 },
            Neighbor { user: 2, distance: 0.0 },
        ];

        // Both at distance zero, neither dominates
        let prediction = predict::predict_with_neighbors(3, 10, &neighbors, 1, &matrix).unwrap();
        assert!((prediction.value - 3.0).abs() < 1e-12);

        let neighbors = vec![
            Neighbor { user: 1, distance: 0.25 },
            Neighbor { user: 2, distance: 0.75 },
        ];

        let weight_a = 1.0 / (0.25 + EPSILON);
        let weight_b = 1.0 / (0.75 + EPSILON);
        let expected = (2.0 * weight_a + 4.0 * weight_b) / (weight_a + weight_b);

        let prediction = predict::predict_with_neighbors(3, 10, &neighbors, 1, &matrix).unwrap();
        assert!((prediction.value - expected).abs() < 1e-12);
        assert_eq!(prediction.support, 2);
    }

    #[test]
    fn no_support_is_undefined() {
        let matrix = scenario_a();
        let index = SimilarityIndex::fit(&matrix, SimilarityMetric::Cosine).unwrap();

        // Nobody but user 2 rated item 30, and user 2 is not among the neighbors of user 2
        assert!(predict::predict(2, 30, 2, 0, &index).is_none());
        // Unknown user and unknown item
        assert!(predict::predict(99, 10, 2, 1, &index).is_none());
        assert!(predict::predict(1, 99, 2, 1, &index).is_none());
    }

    #[test]
    fn support_never_below_min_support() {
        let matrix = scenario_a();
        let index = SimilarityIndex::fit(&matrix, SimilarityMetric::Cosine).unwrap();

        for user in matrix.users() {
            for item in matrix.items() {
                for min_support in 0..3 {
                    if let Some(prediction) = predict::predict(*user, *item, 2, min_support, &index) {
                        assert!(prediction.support >= min_support);
                        assert!(prediction.support > 0);
                    }
                }
            }
        }
    }
}
