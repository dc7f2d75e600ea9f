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

use std::collections::BTreeSet;

use fnv::FnvHashMap;
use tracing::debug;

use crate::config::DuplicateResolution;
use crate::error::{RecoError, Result};
use crate::types::{Rating, RatingDomain};

/// Deduplicated, validated ratings. Read-only once ingested.
#[derive(Clone, Debug)]
pub struct RatingStore {
    ratings: Vec<Rating>,
    ratings_of_user: FnvHashMap<u32, Vec<usize>>,
    domain: RatingDomain,
    num_items: usize,
    num_ingested: u64,
}

impl RatingStore {

    /// Validates and deduplicates the given ratings. A (user, item) pair keeps the position of
    /// its first occurrence, its value is chosen by `resolution`. Fails on the first rating whose
    /// value lies outside of `domain`.
    pub fn ingest<I>(ratings: I, domain: RatingDomain, resolution: DuplicateResolution) -> Result<Self>
        where I: IntoIterator<Item=Rating> {

        let mut deduplicated: Vec<Rating> = Vec::new();
        let mut position_of_pair: FnvHashMap<(u32, u32), usize> = FnvHashMap::default();
        // Running sums and counts, only used for averaging
        let mut sums: Vec<(f64, u32)> = Vec::new();
        let mut num_ingested: u64 = 0;

        for rating in ratings {

            if !domain.contains(rating.value) {
                return Err(RecoError::MalformedInput {
                    user: rating.user,
                    item: rating.item,
                    value: rating.value,
                    min: domain.min,
                    max: domain.max,
                });
            }

            num_ingested += 1;

            match position_of_pair.get(&(rating.user, rating.item)) {
                None => {
                    position_of_pair.insert((rating.user, rating.item), deduplicated.len());
                    deduplicated.push(rating);
                    sums.push((rating.value, 1));
                },
                Some(&position) => {
                    match resolution {
                        DuplicateResolution::LastWins => deduplicated[position] = rating,
                        DuplicateResolution::FirstWins => {},
                        DuplicateResolution::Average => {
                            let (sum, count) = &mut sums[position];
                            *sum += rating.value;
                            *count += 1;
                            deduplicated[position].value = *sum / *count as f64;
                            deduplicated[position].timestamp = rating.timestamp;
                        },
                    }
                },
            }
        }

        let mut ratings_of_user: FnvHashMap<u32, Vec<usize>> = FnvHashMap::default();
        let mut items = crate::types::new_id_set(100);

        for (position, rating) in deduplicated.iter().enumerate() {
            ratings_of_user.entry(rating.user).or_insert_with(Vec::new).push(position);
            items.insert(rating.item);
        }

        debug!(
            ingested = num_ingested,
            kept = deduplicated.len(),
            users = ratings_of_user.len(),
            items = items.len(),
            "ingested ratings"
        );

        Ok(RatingStore {
            ratings: deduplicated,
            ratings_of_user,
            domain,
            num_items: items.len(),
            num_ingested,
        })
    }

    /// All deduplicated ratings in order of first ingestion.
    pub fn ratings(&self) -> &[Rating] {
        &self.ratings
    }

    pub fn ratings_by_user<'a>(&'a self, user: u32) -> impl Iterator<Item=&'a Rating> + 'a {
        self.ratings_of_user
            .get(&user)
            .into_iter()
            .flat_map(move |positions| positions.iter().map(move |position| &self.ratings[*position]))
    }

    pub fn unique_users(&self) -> BTreeSet<u32> {
        self.ratings_of_user.keys().cloned().collect()
    }

    pub fn unique_items(&self) -> BTreeSet<u32> {
        self.ratings.iter().map(|rating| rating.item).collect()
    }

    pub fn domain(&self) -> RatingDomain {
        self.domain
    }

    pub fn num_ratings(&self) -> usize {
        self.ratings.len()
    }

    /// Number of ratings seen before deduplication.
    pub fn num_ingested(&self) -> u64 {
        self.num_ingested
    }

    pub fn num_users(&self) -> usize {
        self.ratings_of_user.len()
    }

    pub fn num_items(&self) -> usize {
        self.num_items
    }
}
