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

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use fnv::FnvHashMap;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use scoped_pool::Pool;
use tracing::{info, warn};

use crate::config::{Config, DuplicateResolution, EvaluationProtocol};
use crate::error::Result;
use crate::matrix;
use crate::predict;
use crate::recommend;
use crate::similarity::SimilarityIndex;
use crate::store::RatingStore;
use crate::types::{self, Rating, SparseRow};
use crate::utils;

/// Accuracy and ranking quality of a run, computed on test data the model never saw.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub protocol: EvaluationProtocol,
    pub rmse: f64,
    pub mae: f64,
    pub precision_at_k: f64,
    pub recall_at_k: f64,
    /// Cutoff of the ranking metrics
    pub k: usize,
    /// Number of test ratings with a defined prediction
    pub scored: usize,
    pub test_size: usize,
    /// Number of users averaged over for Precision@K and Recall@K
    pub evaluated_users: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccuracyResult {
    pub rmse: f64,
    pub mae: f64,
    pub scored: usize,
}

#[derive(Default)]
struct ErrorAccumulator {
    squared_errors: f64,
    absolute_errors: f64,
    count: usize,
}

impl ErrorAccumulator {

    fn add(&mut self, actual: f64, predicted: f64) {
        let error = actual - predicted;
        self.squared_errors += error * error;
        self.absolute_errors += error.abs();
        self.count += 1;
    }

    /// Both errors are 0 if nothing was scored.
    fn result(&self) -> AccuracyResult {
        if self.count == 0 {
            return AccuracyResult { rmse: 0.0, mae: 0.0, scored: 0 };
        }

        AccuracyResult {
            rmse: (self.squared_errors / self.count as f64).sqrt(),
            mae: self.absolute_errors / self.count as f64,
            scored: self.count,
        }
    }
}

/// A user whose held back ratings are predicted from its profile.
#[derive(Clone, Debug, PartialEq)]
pub struct HeldOutUser {
    pub user: u32,
    pub profile: Vec<Rating>,
    pub held_back: Vec<Rating>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UserSplit {
    pub train: Vec<Rating>,
    pub held_out: Vec<HeldOutUser>,
}

/// Outcome for a single test user
#[derive(Default)]
struct UserOutcome {
    errors: Vec<(f64, f64)>,
    precision: f64,
    recall: f64,
}

/// Splits ratings into train and test sets. The first `round(test_fraction * |ratings|)` ratings
/// of a seeded shuffle form the test set, train ratings keep their original order.
pub fn split_ratings(ratings: &[Rating], test_fraction: f64, rng: &mut StdRng) -> (Vec<Rating>, Vec<Rating>) {

    let mut positions: Vec<usize> = (0..ratings.len()).collect();
    positions.shuffle(rng);

    let num_test = ((ratings.len() as f64 * test_fraction).round() as usize).min(ratings.len());

    let mut is_test = vec![false; ratings.len()];
    let test: Vec<Rating> = positions[..num_test].iter()
        .map(|position| {
            is_test[*position] = true;
            ratings[*position]
        })
        .collect();

    let train: Vec<Rating> = ratings.iter()
        .zip(is_test.iter())
        .filter(|(_, is_test)| !**is_test)
        .map(|(rating, _)| *rating)
        .collect();

    (train, test)
}

/// The rating-level split of a store, including the optional sampling of the test set. The
/// same configuration always yields the same split.
pub fn rating_split(store: &RatingStore, config: &Config) -> (Vec<Rating>, Vec<Rating>) {

    let mut rng = StdRng::seed_from_u64(config.random_seed);
    let (train, mut test) = split_ratings(store.ratings(), config.test_fraction, &mut rng);

    if let Some(max_test_samples) = config.max_test_samples {
        if test.len() > max_test_samples {
            test.shuffle(&mut rng);
            test.truncate(max_test_samples);
        }
    }

    (train, test)
}

/// Size of the profile kept from `num_ratings` ratings of a held out user. A user with at least
/// two ratings keeps at least one for the profile and holds back at least one.
fn profile_size(num_ratings: usize, test_fraction: f64) -> usize {
    if num_ratings < 2 {
        0
    } else {
        let size = ((1.0 - test_fraction) * num_ratings as f64).round() as usize;
        size.max(1).min(num_ratings - 1)
    }
}

/// The user-level split of a store. `floor(test_fraction * |users|)` users are held out and none
/// of their ratings end up in the train set. Their ratings are divided into a profile, used to
/// find neighbors, and held back ratings, used to judge the predictions.
pub fn user_split(store: &RatingStore, config: &Config) -> UserSplit {

    let mut rng = StdRng::seed_from_u64(config.random_seed);

    let mut users: Vec<u32> = store.unique_users().into_iter().collect();
    users.shuffle(&mut rng);

    let num_test_users = (users.len() as f64 * config.test_fraction).floor() as usize;
    let held_out_users: BTreeSet<u32> = users[..num_test_users].iter().cloned().collect();

    let train: Vec<Rating> = store.ratings().iter()
        .filter(|rating| !held_out_users.contains(&rating.user))
        .cloned()
        .collect();

    let held_out = held_out_users.iter()
        .map(|user| {
            let mut ratings: Vec<Rating> = store.ratings_by_user(*user).cloned().collect();
            ratings.sort_by_key(|rating| rating.item);
            ratings.shuffle(&mut rng);

            let held_back = ratings.split_off(profile_size(ratings.len(), config.test_fraction));

            HeldOutUser { user: *user, profile: ratings, held_back }
        })
        .collect();

    UserSplit { train, held_out }
}

/// Runs the configured evaluation protocol. The matrix and index used for predictions are
/// built from train data only.
pub fn evaluate(store: &RatingStore, config: &Config) -> Result<EvaluationResult> {
    config.validate()?;

    match config.evaluation_protocol {
        EvaluationProtocol::RatingHoldout => rating_holdout(store, config),
        EvaluationProtocol::UserHoldout => user_holdout(store, config),
    }
}

fn rating_holdout(store: &RatingStore, config: &Config) -> Result<EvaluationResult> {

    let (train, test) = rating_split(store, config);

    info!(train = train.len(), test = test.len(), "rating-level holdout split");

    let mut test_ratings_of_user: BTreeMap<u32, Vec<Rating>> = BTreeMap::new();
    for rating in test.iter() {
        test_ratings_of_user.entry(rating.user).or_insert_with(Vec::new).push(*rating);
    }

    let train_store = RatingStore::ingest(train, store.domain(), DuplicateResolution::LastWins)?;
    let train_matrix = matrix::build(&train_store);

    let tasks: Vec<HeldOutUser> = test_ratings_of_user.into_iter()
        .map(|(user, held_back)| {
            let profile: Vec<Rating> = train_store.ratings_by_user(user).cloned().collect();
            HeldOutUser { user, profile, held_back }
        })
        .collect();

    score(EvaluationProtocol::RatingHoldout, &tasks, &train_matrix, config)
}

fn user_holdout(store: &RatingStore, config: &Config) -> Result<EvaluationResult> {

    let UserSplit { train, held_out } = user_split(store, config);

    info!(train = train.len(), held_out_users = held_out.len(), "user-level holdout split");

    let train_store = RatingStore::ingest(train, store.domain(), DuplicateResolution::LastWins)?;
    let train_matrix = matrix::build(&train_store);

    let tasks: Vec<HeldOutUser> = held_out.into_iter()
        .filter(|user| !user.held_back.is_empty())
        .collect();

    score(EvaluationProtocol::UserHoldout, &tasks, &train_matrix, config)
}

/// Scores all test users in parallel and aggregates in the order of `tasks`, which keeps the
/// floating point sums identical between runs.
fn score(
    protocol: EvaluationProtocol,
    tasks: &[HeldOutUser],
    train_matrix: &matrix::RatingMatrix,
    config: &Config,
) -> Result<EvaluationResult> {

    let index = SimilarityIndex::fit(train_matrix, config.similarity_metric)?;
    let index = &index;

    let scoring_start = Instant::now();
    let pool = Pool::new(config.pool_size());

    let slots: Vec<Mutex<UserOutcome>> = tasks.iter().map(|_| Mutex::new(UserOutcome::default())).collect();

    pool.scoped(|scope| {
        for (task, slot) in tasks.iter().zip(slots.iter()) {
            scope.execute(move || {
                let outcome = score_user(task, index, config);
                if let Ok(mut user_outcome) = slot.lock() {
                    *user_outcome = outcome;
                }
            });
        }
    });

    pool.shutdown();

    let outcomes: Vec<UserOutcome> = slots.into_iter()
        .map(|slot| slot.into_inner().unwrap_or_else(PoisonError::into_inner))
        .collect();

    let mut accumulator = ErrorAccumulator::default();
    for (actual, predicted) in outcomes.iter().flat_map(|outcome| outcome.errors.iter()) {
        accumulator.add(*actual, *predicted);
    }
    let accuracy = accumulator.result();

    let test_size: usize = tasks.iter().map(|task| task.held_back.len()).sum();

    if accuracy.scored == 0 {
        warn!(test_size, "no test rating could be predicted");
    }

    let result = EvaluationResult {
        protocol,
        rmse: accuracy.rmse,
        mae: accuracy.mae,
        precision_at_k: utils::mean(outcomes.iter().map(|outcome| outcome.precision)),
        recall_at_k: utils::mean(outcomes.iter().map(|outcome| outcome.recall)),
        k: config.n,
        scored: accuracy.scored,
        test_size,
        evaluated_users: outcomes.len(),
    };

    info!(
        rmse = result.rmse,
        mae = result.mae,
        precision_at_k = result.precision_at_k,
        recall_at_k = result.recall_at_k,
        scored = result.scored,
        test_size = result.test_size,
        users = result.evaluated_users,
        duration_ms = utils::to_millis(scoring_start.elapsed()),
        "evaluated"
    );

    Ok(result)
}

/// Predicts the held back ratings of a single user with one neighborhood query, and compares
/// its top-n list against the held back ratings above the relevance threshold.
fn score_user(task: &HeldOutUser, index: &SimilarityIndex, config: &Config) -> UserOutcome {

    let matrix = index.matrix();

    let mut profile: SparseRow = types::new_sparse_row(task.profile.len());
    for rating in task.profile.iter() {
        profile.insert(rating.item, rating.value);
    }

    let neighbors = if profile.is_empty() {
        Vec::new()
    } else if matrix.contains_user(task.user) {
        index.query(task.user, config.k).unwrap_or_default()
    } else {
        index.query_profile(&profile, config.k)
    };

    let errors: Vec<(f64, f64)> = task.held_back.iter()
        .filter_map(|rating| {
            predict::predict_with_neighbors(task.user, rating.item, &neighbors, config.min_support, matrix)
                .map(|prediction| (rating.value, prediction.value))
        })
        .collect();

    let recommended = recommend::recommend_with_neighbors(
        task.user, &profile, &neighbors, config.n, config.min_support, matrix);

    let relevant: BTreeSet<u32> = task.held_back.iter()
        .filter(|rating| rating.value >= config.relevance_threshold)
        .map(|rating| rating.item)
        .collect();

    let recommended: Vec<u32> = recommended.iter().map(|scored_item| scored_item.item).collect();
    let (precision, recall) = precision_and_recall(&recommended, &relevant);

    UserOutcome { errors, precision, recall }
}

/// Precision and recall of a recommended list against the relevant items. Precision is 0 for an
/// empty list, recall is 0 without relevant items.
fn precision_and_recall(recommended: &[u32], relevant: &BTreeSet<u32>) -> (f64, f64) {

    let hits = recommended.iter().filter(|item| relevant.contains(item)).count();

    let precision = if recommended.is_empty() { 0.0 } else { hits as f64 / recommended.len() as f64 };
    let recall = if relevant.is_empty() { 0.0 } else { hits as f64 / relevant.len() as f64 };

    (precision, recall)
}

/// Predicts every test rating of the rating-level split with the mean train rating of its item.
pub fn popularity_baseline(store: &RatingStore, config: &Config) -> Result<AccuracyResult> {
    config.validate()?;

    let (train, test) = rating_split(store, config);

    let mut sums_of_item: FnvHashMap<u32, (f64, usize)> = FnvHashMap::default();
    for rating in train.iter() {
        let (sum, count) = sums_of_item.entry(rating.item).or_insert((0.0, 0));
        *sum += rating.value;
        *count += 1;
    }

    let mut accumulator = ErrorAccumulator::default();
    for rating in test.iter() {
        if let Some((sum, count)) = sums_of_item.get(&rating.item) {
            accumulator.add(rating.value, *sum / *count as f64);
        }
    }

    let result = accumulator.result();
    info!(rmse = result.rmse, mae = result.mae, scored = result.scored, "evaluated popularity baseline");

    Ok(result)
}
