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

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::io::stdout;
use std::path::{Path, PathBuf};

use fnv::FnvHashMap;
use tracing::{debug, info};

use crate::error::{RecoError, Result};
use crate::evaluate::{AccuracyResult, EvaluationResult};
use crate::recommend::UserRecommendations;
use crate::types::Rating;

/// Maps internal item ids to the ids of an external catalog.
pub type ItemLinks = FnvHashMap<u32, u64>;

/// Picks the first existing path from an ordered list of candidates, before anything is parsed.
pub fn resolve_source<P: AsRef<Path>>(candidates: &[P]) -> Result<PathBuf> {
    candidates.iter()
        .map(|candidate| candidate.as_ref())
        .find(|candidate| candidate.is_file())
        .map(|candidate| {
            debug!(source = %candidate.display(), "resolved input source");
            candidate.to_path_buf()
        })
        .ok_or_else(|| RecoError::NoInputSource(
            candidates.iter().map(|candidate| candidate.as_ref().to_path_buf()).collect()))
}

/// Reads a CSV input file. We expect a header line and comma separated fields.
pub fn csv_reader<P: AsRef<Path>>(file: P) -> Result<csv::Reader<File>> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(b',')
        .trim(csv::Trim::All)
        .from_path(file)?;

    Ok(reader)
}

#[derive(Deserialize)]
struct RatingRecord {
    #[serde(rename = "userId")]
    user: u32,
    #[serde(rename = "movieId", alias = "itemId")]
    item: u32,
    rating: f64,
    #[serde(default)]
    timestamp: Option<i64>,
}

#[derive(Deserialize)]
struct LinkRecord {
    #[serde(rename = "movieId", alias = "itemId")]
    item: u32,
    #[serde(rename = "tmdbId", alias = "externalId", default)]
    external_id: Option<i64>,
}

/// Ratings with the columns `userId,movieId,rating,timestamp`, in file order. The timestamp
/// column may be missing or empty.
pub fn ratings_from_csv<R: io::Read>(reader: &mut csv::Reader<R>) -> Result<Vec<Rating>> {
    let mut ratings = Vec::new();

    for record in reader.deserialize() {
        let record: RatingRecord = record?;
        ratings.push(Rating {
            user: record.user,
            item: record.item,
            value: record.rating,
            timestamp: record.timestamp,
        });
    }

    Ok(ratings)
}

pub fn read_ratings<P: AsRef<Path>>(file: P) -> Result<Vec<Rating>> {
    let ratings = ratings_from_csv(&mut csv_reader(&file)?)?;
    info!(file = %file.as_ref().display(), ratings = ratings.len(), "read ratings");
    Ok(ratings)
}

/// Links with the columns `movieId,imdbId,tmdbId`. Rows with an empty or negative external id
/// are left out, their items stay unresolved.
pub fn links_from_csv<R: io::Read>(reader: &mut csv::Reader<R>) -> Result<ItemLinks> {
    let mut links = ItemLinks::default();

    for record in reader.deserialize() {
        let record: LinkRecord = record?;
        if let Some(external_id) = record.external_id {
            if external_id >= 0 {
                links.insert(record.item, external_id as u64);
            }
        }
    }

    Ok(links)
}

pub fn read_links<P: AsRef<Path>>(file: P) -> Result<ItemLinks> {
    let links = links_from_csv(&mut csv_reader(&file)?)?;
    info!(file = %file.as_ref().display(), links = links.len(), "read item links");
    Ok(links)
}

/// Struct used for JSON serialization of recommendations. Field names will be used in JSON.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExportedItem {
    #[serde(rename = "itemId")]
    pub item: u32,
    #[serde(rename = "externalId")]
    pub external_id: u64,
    pub score: f64,
}

pub type ExportedRecommendations = BTreeMap<u32, Vec<ExportedItem>>;

/// Attaches external ids to the recommended items. Items without an external id are dropped,
/// users left without items are omitted.
pub fn export(recommendations: &[UserRecommendations], links: &ItemLinks) -> ExportedRecommendations {
    recommendations.iter()
        .map(|recommended| {
            let items: Vec<ExportedItem> = recommended.items.iter()
                .filter_map(|scored_item| {
                    links.get(&scored_item.item).map(|external_id| ExportedItem {
                        item: scored_item.item,
                        external_id: *external_id,
                        score: scored_item.score,
                    })
                })
                .collect();

            (recommended.user, items)
        })
        .filter(|(_, items)| !items.is_empty())
        .collect()
}

fn output(path: Option<&Path>) -> io::Result<Box<dyn Write>> {
    let out: Box<dyn Write> = match path {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        _ => Box::new(stdout()),
    };

    Ok(out)
}

/// Output the recommendations as a JSON object keyed by user id. If a `path` is supplied, we
/// write to a file at the specified path, otherwise, we output to stdout.
pub fn write_recommendations(
    recommendations: &[UserRecommendations],
    links: &ItemLinks,
    path: Option<&Path>,
) -> Result<()> {

    let exported = export(recommendations, links);

    let mut out = output(path)?;
    serde_json::to_writer_pretty(&mut out, &exported)?;
    writeln!(out)?;
    out.flush()?;

    info!(users = exported.len(), "wrote recommendations");

    Ok(())
}

/// Parses a document written by `write_recommendations`.
pub fn read_recommendations<R: io::Read>(reader: R) -> Result<ExportedRecommendations> {
    Ok(serde_json::from_reader(reader)?)
}

#[derive(Serialize)]
struct EvaluationReport<'a> {
    knn: &'a EvaluationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    popularity_baseline: Option<&'a AccuracyResult>,
}

pub fn write_evaluation(
    result: &EvaluationResult,
    baseline: Option<&AccuracyResult>,
    path: Option<&Path>,
) -> Result<()> {

    let mut out = output(path)?;
    serde_json::to_writer_pretty(&mut out, &EvaluationReport { knn: result, popularity_baseline: baseline })?;
    writeln!(out)?;
    out.flush()?;

    Ok(())
}
