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

extern crate csv;
extern crate fnv;
extern crate num_cpus;
extern crate rand;
extern crate scoped_pool;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
extern crate thiserror;
extern crate tracing;

use tracing::info;

pub mod config;
pub mod error;
pub mod evaluate;
pub mod io;
pub mod matrix;
pub mod predict;
pub mod recommend;
pub mod similarity;
pub mod store;
pub mod types;
pub mod utils;


pub use config::Config;
pub use error::{RecoError, Result};
pub use recommend::UserRecommendations;
pub use similarity::SimilarityIndex;
pub use store::RatingStore;

/// Ingests raw ratings with the domain and duplicate policy of `config`.
pub fn ingest<I>(ratings: I, config: &Config) -> Result<RatingStore>
    where I: IntoIterator<Item=types::Rating> {

    RatingStore::ingest(ratings, config.rating_domain, config.duplicate_resolution)
}

/// Builds the rating matrix of all ratings in the store, fits the similarity index on it and
/// computes the top-n recommendations of every user on a pool of `config.num_threads` workers.
pub fn recommendations(store: &RatingStore, config: &Config) -> Result<Vec<UserRecommendations>> {
    config.validate()?;

    let matrix = matrix::build(store);
    let index = SimilarityIndex::fit(&matrix, config.similarity_metric)?;

    info!(k = config.k, n = config.n, min_support = config.min_support, threads = config.pool_size(),
        "computing recommendations");

    Ok(recommend::recommend_all(
        matrix.users(),
        config.n,
        config.k,
        config.min_support,
        &index,
        config.pool_size(),
    ))
}
