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

use std::cmp::Ordering;

use fnv::{FnvHashMap, FnvHashSet};

/// A user's ratings keyed by item id. Absent keys are unrated.
pub type SparseRow = FnvHashMap<u32, f64>;

pub type IdSet = FnvHashSet<u32>;

/// Neighbors of a user, closest first, never containing the user itself.
pub type NeighborSet = Vec<Neighbor>;

pub fn new_sparse_row(capacity: usize) -> SparseRow {
    FnvHashMap::with_capacity_and_hasher(capacity, Default::default())
}

pub fn new_id_set(capacity: usize) -> IdSet {
    FnvHashSet::with_capacity_and_hasher(capacity, Default::default())
}

/// A single observed rating, as ingested.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rating {
    pub user: u32,
    pub item: u32,
    pub value: f64,
    pub timestamp: Option<i64>,
}

impl Rating {
    pub fn new(user: u32, item: u32, value: f64) -> Self {
        Rating { user, item, value, timestamp: None }
    }

    pub fn with_timestamp(user: u32, item: u32, value: f64, timestamp: i64) -> Self {
        Rating { user, item, value, timestamp: Some(timestamp) }
    }
}

/// Content of a single matrix cell. `Unrated` is a marker of its own and never a number, so
/// "no observation" cannot be confused with any value of the rating scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Cell {
    Rated(f64),
    Unrated,
}

impl Cell {
    pub fn value(self) -> Option<f64> {
        match self {
            Cell::Rated(value) => Some(value),
            Cell::Unrated => None,
        }
    }

    pub fn is_rated(self) -> bool {
        self != Cell::Unrated
    }
}

/// Closed interval of valid rating values.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RatingDomain {
    pub min: f64,
    pub max: f64,
}

impl RatingDomain {
    pub fn new(min: f64, max: f64) -> Self {
        RatingDomain { min, max }
    }

    /// NaN is never contained.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

impl Default for RatingDomain {
    fn default() -> Self {
        RatingDomain { min: 0.5, max: 5.0 }
    }
}

/// A neighboring user and its cosine distance to the query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
    pub user: u32,
    pub distance: f64,
}

/// Greater means farther away, equal distances are ordered by user id. This lets a max-heap
/// hold the current worst candidate at its top.
impl Eq for Neighbor {}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.distance.partial_cmp(&other.distance) {
            Some(Ordering::Equal) | None => self.user.cmp(&other.user),
            Some(ordering) => ordering,
        }
    }
}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Estimated rating of a user for an item, backed by `support` neighbors who rated the item.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Prediction {
    pub user: u32,
    pub item: u32,
    pub value: f64,
    pub support: usize,
}

/// Result type used to find the top-n items per user via a binary heap
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct ScoredItem {
    pub item: u32,
    pub score: f64,
}

/// Ordering for our max-heap, note that we must use a special implementation here as there is no
/// total order on floating point numbers. Higher scores compare as smaller, equal scores put the
/// lower item id first.
fn cmp_reverse(scored_item_a: &ScoredItem, scored_item_b: &ScoredItem) -> Ordering {
    match scored_item_a.score.partial_cmp(&scored_item_b.score) {
        Some(Ordering::Less) => Ordering::Greater,
        Some(Ordering::Greater) => Ordering::Less,
        Some(Ordering::Equal) | None => scored_item_a.item.cmp(&scored_item_b.item),
    }
}

impl Eq for ScoredItem {}

impl Ord for ScoredItem {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_reverse(self, other)
    }
}

impl PartialOrd for ScoredItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(cmp_reverse(self, other))
    }
}


#[cfg(test)]
mod tests {

    use std::collections::BinaryHeap;
    use crate::types::{Cell, Neighbor, RatingDomain, ScoredItem};

    #[test]
    fn scored_item_ordering_reversed() {
        let item_a = ScoredItem { item: 1, score: 0.5 };
        let item_b = ScoredItem { item: 2, score: 1.5 };
        let item_c = ScoredItem { item: 3, score: 0.3 };

        assert!(item_a > item_b);
        assert!(item_a < item_c);
        assert!(item_b < item_c);
    }

    #[test]
    fn scored_item_ties_prefer_lower_item() {
        let item_a = ScoredItem { item: 7, score: 2.0 };
        let item_b = ScoredItem { item: 3, score: 2.0 };

        assert!(item_b < item_a);
    }

    #[test]
    fn neighbor_heap_keeps_closest() {
        const K: usize = 2;

        let candidates = [
            Neighbor { user: 4, distance: 0.4 },
            Neighbor { user: 1, distance: 0.1 },
            Neighbor { user: 9, distance: 0.1 },
            Neighbor { user: 2, distance: 0.9 },
        ];

        let mut heap = BinaryHeap::with_capacity(K);

        for neighbor in candidates.iter() {
            if heap.len() < K {
                heap.push(*neighbor);
            } else {
                let mut top = heap.peek_mut().unwrap();
                if *neighbor < *top {
                    *top = *neighbor;
                }
            }
        }

        let closest = heap.into_sorted_vec();

        assert_eq!(closest.len(), 2);
        assert_eq!(closest[0].user, 1);
        assert_eq!(closest[1].user, 9);
    }

    #[test]
    fn unrated_is_not_zero() {
        assert_ne!(Cell::Unrated, Cell::Rated(0.0));
        assert_eq!(Cell::Unrated.value(), None);
        assert_eq!(Cell::Rated(0.5).value(), Some(0.5));
    }

    #[test]
    fn domain_bounds_are_inclusive() {
        let domain = RatingDomain::default();

        assert!(domain.contains(0.5));
        assert!(domain.contains(5.0));
        assert!(!domain.contains(0.0));
        assert!(!domain.contains(5.5));
        assert!(!domain.contains(f64::NAN));
    }
}
