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

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecoError>;

#[derive(Debug, Error)]
pub enum RecoError {
    #[error("rating {value} of user {user} for item {item} lies outside of [{min}, {max}]")]
    MalformedInput { user: u32, item: u32, value: f64, min: f64, max: f64 },

    #[error("user {0} is not part of the fitted rating matrix")]
    UnknownUser(u32),

    #[error("cannot fit a similarity index on a rating matrix without users")]
    EmptyMatrix,

    #[error("none of the candidate input sources exists: {0:?}")]
    NoInputSource(Vec<PathBuf>),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
