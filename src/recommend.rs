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
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use scoped_pool::Pool;
use tracing::info;

use crate::matrix::RatingMatrix;
use crate::predict;
use crate::similarity::SimilarityIndex;
use crate::types::{self, Neighbor, ScoredItem, SparseRow};
use crate::utils;

/// Ranked recommendations for a single user, best first.
#[derive(Clone, Debug, PartialEq)]
pub struct UserRecommendations {
    pub user: u32,
    pub items: Vec<ScoredItem>,
}

/// Top-n items for a user of the fitted matrix, restricted to items the user has not rated and
/// ordered by descending predicted rating, ties by ascending item id. Empty for unknown users.
pub fn recommend(
    user: u32,
    n: usize,
    k: usize,
    min_support: usize,
    index: &SimilarityIndex,
) -> Vec<ScoredItem> {

    let matrix = index.matrix();

    let rated = match matrix.row(user) {
        Some(row) => row,
        None => return Vec::new(),
    };

    match index.query(user, k) {
        Ok(neighbors) => recommend_with_neighbors(user, rated, &neighbors, n, min_support, matrix),
        Err(_) => Vec::new(),
    }
}

/// Top-n items for a user with the ratings `rated` and an already computed neighborhood.
///
/// Only items rated by at least one neighbor are scored, any other unrated item has no support
/// and therefore no prediction. Predictions that are not positive are dropped. A user without
/// ratings gets no recommendations.
pub fn recommend_with_neighbors(
    user: u32,
    rated: &SparseRow,
    neighbors: &[Neighbor],
    n: usize,
    min_support: usize,
    matrix: &RatingMatrix,
) -> Vec<ScoredItem> {

    if rated.is_empty() || n == 0 {
        return Vec::new();
    }

    let mut candidate_items = types::new_id_set(10);

    for neighbor in neighbors.iter().filter(|neighbor| neighbor.user != user) {
        if let Some(row) = matrix.row(neighbor.user) {
            for item in row.keys() {
                if !rated.contains_key(item) {
                    candidate_items.insert(*item);
                }
            }
        }
    }

    let mut heap = BinaryHeap::with_capacity(n.min(candidate_items.len()));

    for item in candidate_items.iter() {

        let prediction = match predict::predict_with_neighbors(user, *item, neighbors, min_support, matrix) {
            Some(prediction) if prediction.value > 0.0 => prediction,
            _ => continue,
        };

        let scored_item = ScoredItem { item: *item, score: prediction.value };

        if heap.len() < n {
            heap.push(scored_item);
        } else if let Some(mut top) = heap.peek_mut() {
            if scored_item < *top {
                *top = scored_item;
            }
        }
    }

    heap.into_sorted_vec()
}

/// Computes recommendations for all given users in parallel. The fitted index is only read,
/// each task writes nothing but its own result slot. Results come back in the order of `users`.
pub fn recommend_all(
    users: &[u32],
    n: usize,
    k: usize,
    min_support: usize,
    index: &SimilarityIndex,
    pool_size: usize,
) -> Vec<UserRecommendations> {

    let pool = Pool::new(pool_size.max(1));
    let batch_start = Instant::now();

    let slots: Vec<Mutex<Vec<ScoredItem>>> = users.iter().map(|_| Mutex::new(Vec::new())).collect();

    pool.scoped(|scope| {
        for (user, slot) in users.iter().zip(slots.iter()) {
            scope.execute(move || {
                let items = recommend(*user, n, k, min_support, index);
                if let Ok(mut recommended) = slot.lock() {
                    *recommended = items;
                }
            });
        }
    });

    pool.shutdown();

    let recommendations: Vec<UserRecommendations> = users.iter()
        .zip(slots.into_iter())
        .map(|(user, slot)| UserRecommendations {
            user: *user,
            items: slot.into_inner().unwrap_or_else(PoisonError::into_inner),
        })
        .collect();

    info!(
        users = users.len(),
        with_recommendations = recommendations.iter().filter(|user| !user.items.is_empty()).count(),
        duration_ms = utils::to_millis(batch_start.elapsed()),
        "computed recommendations"
    );

    recommendations
}


#[cfg(test)]
mod tests {

    use crate::config::{DuplicateResolution, SimilarityMetric};
    use crate::matrix::{self, RatingMatrix};
    use crate::recommend;
    use crate::similarity::SimilarityIndex;
    use crate::store::RatingStore;
    use crate::types::{self, Neighbor, Rating, RatingDomain};

    fn matrix_of(ratings: Vec<Rating>) -> RatingMatrix {
        let store = RatingStore::ingest(ratings, RatingDomain::default(), DuplicateResolution::LastWins)
            .unwrap();
        matrix::build(&store)
    }

    fn catalog() -> RatingMatrix {
        let mut ratings = Vec::new();
        for user in 1..=10_u32 {
            for item in 1..=15_u32 {
                if (user + item) % 3 != 0 && (user * item) % 4 != 1 {
                    ratings.push(Rating::new(user, item, 0.5 + ((user + 2 * item) % 10) as f64 * 0.5));
                }
            }
        }
        matrix_of(ratings)
    }

    #[test]
    fn recommends_only_unrated_items_in_order() {
        let matrix = catalog();
        let index = SimilarityIndex::fit(&matrix, SimilarityMetric::Cosine).unwrap();

        for user in matrix.users() {
            for n in 1..6 {
                let recommended = recommend::recommend(*user, n, 4, 1, &index);

                assert!(recommended.len() <= n);
                for scored_item in recommended.iter() {
                    assert!(!matrix.cell(*user, scored_item.item).is_rated());
                    assert!(scored_item.score > 0.0);
                }
                for pair in recommended.windows(2) {
                    assert!(pair[0].score > pair[1].score ||
                        (pair[0].score == pair[1].score && pair[0].item < pair[1].item));
                }
            }
        }
    }

    #[test]
    fn ties_broken_by_item_id() {
        let matrix = matrix_of(vec![
            Rating::new(1, 10, 4.0),
            Rating::new(2, 10, 4.0),
            Rating::new(2, 30, 3.0),
            Rating::new(2, 20, 3.0),
            Rating::new(2, 40, 5.0),
        ]);
        let index = SimilarityIndex::fit(&matrix, SimilarityMetric::Cosine).unwrap();

        let recommended = recommend::recommend(1, 3, 1, 1, &index);

        assert_eq!(recommended.iter().map(|scored| scored.item).collect::<Vec<_>>(), vec![40, 20, 30]);
        assert_eq!(recommended[0].score, 5.0);
    }

    #[test]
    fn huge_n_and_k_are_bounded_by_the_catalog() {
        let matrix = catalog();
        let index = SimilarityIndex::fit(&matrix, SimilarityMetric::Cosine).unwrap();

        let recommended = recommend::recommend(1, usize::MAX / 64, usize::MAX, 1, &index);

        assert!(!recommended.is_empty());
        assert!(recommended.len() <= matrix.unrated_items(1).len());
    }

    #[test]
    fn user_without_ratings_gets_nothing() {
        let matrix = catalog();
        let index = SimilarityIndex::fit(&matrix, SimilarityMetric::Cosine).unwrap();

        let empty_profile = types::new_sparse_row(0);
        let neighbors = index.query_profile(&empty_profile, 5);

        assert!(neighbors.iter().all(|neighbor| neighbor.distance == 1.0));
        assert!(recommend::recommend_with_neighbors(
            1000, &empty_profile, &neighbors, 10, 1, &matrix).is_empty());

        assert!(recommend::recommend(1000, 10, 5, 1, &index).is_empty());
    }

    #[test]
    fn min_support_filters_candidates() {
        let matrix = matrix_of(vec![
            Rating::new(1, 10, 4.0),
            Rating::new(2, 10, 4.0),
            Rating::new(2, 20, 3.0),
            Rating::new(3, 10, 4.0),
            Rating::new(3, 20, 2.0),
            Rating::new(3, 30, 5.0),
        ]);

        let neighbors = vec![
            Neighbor { user: 2, distance: 0.1 },
            Neighbor { user: 3, distance: 0.2 },
        ];

        let rated = matrix.row(1).unwrap();
        let recommended = recommend::recommend_with_neighbors(1, rated, &neighbors, 10, 2, &matrix);

        // Item 30 is only backed by one neighbor
        assert_eq!(recommended.len(), 1);
        assert_eq!(recommended[0].item, 20);
    }

    #[test]
    fn parallel_batch_matches_single_user_calls() {
        let matrix = catalog();
        let index = SimilarityIndex::fit(&matrix, SimilarityMetric::Cosine).unwrap();

        let mut users = matrix.users().to_vec();
        users.push(4242);

        let batch = recommend::recommend_all(&users, 5, 4, 1, &index, 3);

        assert_eq!(batch.len(), users.len());
        for recommendations in batch.iter() {
            assert_eq!(recommendations.items, recommend::recommend(recommendations.user, 5, 4, 1, &index));
        }
        assert!(batch.last().unwrap().items.is_empty());
    }
}
