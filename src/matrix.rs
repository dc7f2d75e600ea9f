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

use fnv::FnvHashMap;
use tracing::info;

use crate::store::RatingStore;
use crate::types::{self, Cell, IdSet, SparseRow};

/// User x item rating matrix. Rows are stored sparsely, every (user, item) pair without an
/// entry reads as `Cell::Unrated`. Users and items are kept in ascending id order.
#[derive(Clone, Debug)]
pub struct RatingMatrix {
    users: Vec<u32>,
    items: Vec<u32>,
    row_of_user: FnvHashMap<u32, usize>,
    item_ids: IdSet,
    rows: Vec<SparseRow>,
}

/// Derives the rating matrix of a store snapshot. The result only depends on the set of
/// ratings in the store, never on their order.
pub fn build(store: &RatingStore) -> RatingMatrix {

    let users: Vec<u32> = store.unique_users().into_iter().collect();
    let items: Vec<u32> = store.unique_items().into_iter().collect();

    let row_of_user: FnvHashMap<u32, usize> = users.iter()
        .enumerate()
        .map(|(row, user)| (*user, row))
        .collect();

    let mut item_ids = types::new_id_set(items.len());
    item_ids.extend(items.iter().cloned());

    let mut rows: Vec<SparseRow> = vec![types::new_sparse_row(0); users.len()];

    for rating in store.ratings() {
        let row = row_of_user[&rating.user];
        rows[row].insert(rating.item, rating.value);
    }

    info!(users = users.len(), items = items.len(), ratings = store.num_ratings(),
        "built rating matrix");

    RatingMatrix { users, items, row_of_user, item_ids, rows }
}

impl RatingMatrix {

    pub fn num_users(&self) -> usize {
        self.users.len()
    }

    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    pub fn users(&self) -> &[u32] {
        &self.users
    }

    pub fn items(&self) -> &[u32] {
        &self.items
    }

    pub fn contains_user(&self, user: u32) -> bool {
        self.row_of_user.contains_key(&user)
    }

    pub fn contains_item(&self, item: u32) -> bool {
        self.item_ids.contains(&item)
    }

    pub fn cell(&self, user: u32, item: u32) -> Cell {
        self.row(user)
            .and_then(|row| row.get(&item))
            .map_or(Cell::Unrated, |value| Cell::Rated(*value))
    }

    pub fn row(&self, user: u32) -> Option<&SparseRow> {
        self.row_of_user.get(&user).map(|row| &self.rows[*row])
    }

    pub(crate) fn row_at(&self, row: usize) -> &SparseRow {
        &self.rows[row]
    }

    pub(crate) fn user_at(&self, row: usize) -> u32 {
        self.users[row]
    }

    /// Items the user has not rated, ascending. Empty for users unknown to the matrix.
    pub fn unrated_items(&self, user: u32) -> Vec<u32> {
        match self.row(user) {
            Some(row) => self.items.iter().filter(|item| !row.contains_key(*item)).cloned().collect(),
            None => Vec::new(),
        }
    }
}
