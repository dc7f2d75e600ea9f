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

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

use crate::error::{RecoError, Result};
use crate::types::RatingDomain;

/// How repeated ratings for the same (user, item) pair are merged. Order refers to the order of
/// ingestion, timestamps are never consulted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateResolution {
    LastWins,
    FirstWins,
    Average,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimilarityMetric {
    Cosine,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvaluationProtocol {
    /// Random split of individual ratings.
    RatingHoldout,
    /// Random split of whole users.
    UserHoldout,
}

impl FromStr for DuplicateResolution {
    type Err = RecoError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "last-wins" => Ok(DuplicateResolution::LastWins),
            "first-wins" => Ok(DuplicateResolution::FirstWins),
            "average" => Ok(DuplicateResolution::Average),
            _ => Err(RecoError::InvalidConfig(format!("unknown duplicate resolution '{}'", name))),
        }
    }
}

impl FromStr for SimilarityMetric {
    type Err = RecoError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "cosine" => Ok(SimilarityMetric::Cosine),
            _ => Err(RecoError::InvalidConfig(format!("unknown similarity metric '{}'", name))),
        }
    }
}

impl FromStr for EvaluationProtocol {
    type Err = RecoError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "rating-holdout" => Ok(EvaluationProtocol::RatingHoldout),
            "user-holdout" => Ok(EvaluationProtocol::UserHoldout),
            _ => Err(RecoError::InvalidConfig(format!("unknown evaluation protocol '{}'", name))),
        }
    }
}

/// Parameters of a training and evaluation run. Every field has a default, so a JSON config
/// file only needs to list what it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Neighborhood size
    pub k: usize,
    /// Minimum number of neighbors who rated an item before a prediction is trusted
    pub min_support: usize,
    /// Length of the top-n lists, also the cutoff for Precision@K and Recall@K
    pub n: usize,
    pub similarity_metric: SimilarityMetric,
    pub relevance_threshold: f64,
    pub test_fraction: f64,
    pub random_seed: u64,
    pub evaluation_protocol: EvaluationProtocol,
    pub duplicate_resolution: DuplicateResolution,
    pub rating_domain: RatingDomain,
    /// Upper bound on the number of test ratings to score, sampled with `random_seed`
    pub max_test_samples: Option<usize>,
    pub num_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            k: 40,
            min_support: 3,
            n: 10,
            similarity_metric: SimilarityMetric::Cosine,
            relevance_threshold: 3.5,
            test_fraction: 0.25,
            random_seed: 42,
            evaluation_protocol: EvaluationProtocol::RatingHoldout,
            duplicate_resolution: DuplicateResolution::LastWins,
            rating_domain: RatingDomain::default(),
            max_test_samples: None,
            num_threads: num_cpus::get(),
        }
    }
}

impl Config {

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: Config = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(RecoError::InvalidConfig("k must be positive".to_string()));
        }
        if self.n == 0 {
            return Err(RecoError::InvalidConfig("n must be positive".to_string()));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(RecoError::InvalidConfig(
                format!("test fraction {} is not within (0, 1)", self.test_fraction)));
        }
        if !(self.rating_domain.min <= self.rating_domain.max) {
            return Err(RecoError::InvalidConfig(format!(
                "rating domain [{}, {}] is empty", self.rating_domain.min, self.rating_domain.max)));
        }
        if self.max_test_samples == Some(0) {
            return Err(RecoError::InvalidConfig("max test samples must be positive".to_string()));
        }
        Ok(())
    }

    /// Size of the worker pool, never zero.
    pub fn pool_size(&self) -> usize {
        self.num_threads.max(1)
    }
}
