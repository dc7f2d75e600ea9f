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

extern crate getopts;
extern crate tracing;
extern crate tracing_subscriber;
extern crate userknn;

use std::env;
use std::error::Error;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;

use getopts::{Matches, Options};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use userknn::config::Config;
use userknn::{evaluate, io};

fn main() {

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optmulti("r", "ratings", "Candidate ratings file (optional, repeatable, defaults to \
        ratings.csv). The first existing file is used. The input must be a CSV file with the \
        header userId,movieId,rating,timestamp.", "PATH");
    opts.optmulti("l", "links", "Candidate links file (optional, repeatable, defaults to \
        links.csv), mapping movieId to the external tmdbId.", "PATH");
    opts.optopt("o", "outputfile", "Output file name (optional, output will be written to stdout \
        by default).", "PATH");
    opts.optopt("c", "config", "JSON configuration file (optional), options given on the \
        command line take precedence.", "PATH");
    opts.optopt("e", "evaluate", "Evaluate instead of recommending, with the protocol \
        rating-holdout or user-holdout.", "PROTOCOL");
    opts.optflag("b", "baseline", "Also evaluate the popularity baseline (rating-holdout only).");
    opts.optopt("k", "neighbors", "Neighborhood size (optional, defaults to 40).", "NUMBER");
    opts.optopt("n", "num-recommendations", "Number of recommendations to compute per user \
        (optional, defaults to 10).", "NUMBER");
    opts.optopt("", "min-support", "Minimum number of neighbors who rated an item (optional, \
        defaults to 3).", "NUMBER");
    opts.optopt("", "seed", "Random seed of the train/test split (optional, defaults to 42).",
        "NUMBER");
    opts.optopt("", "test-fraction", "Fraction of ratings or users to hold out (optional, \
        defaults to 0.25).", "FRACTION");
    opts.optopt("", "threshold", "Minimum rating of a relevant item (optional, defaults to 3.5).",
        "RATING");
    opts.optopt("", "duplicates", "Resolution of repeated ratings: last-wins, first-wins or \
        average (optional, defaults to last-wins).", "POLICY");
    opts.optopt("", "max-test-samples", "Maximum number of test ratings to score (optional).",
        "NUMBER");
    opts.optopt("", "threads", "Number of worker threads (optional, defaults to the number of \
        CPUs).", "NUMBER");
    opts.optflag("h", "help", "Print this help menu");

    let matches = match opts.parse(&args[1..]) {
        Ok(matches) => matches,
        Err(failure) => {
            let hint = failure.to_string();
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    if matches.opt_present("h") {
        return print_usage_and_exit(&program, opts, None);
    }

    let config = match configure(&matches) {
        Ok(config) => config,
        Err(hint) => return print_usage_and_exit(&program, opts, Some(&hint)),
    };

    let ratings_candidates = candidates(&matches, "r", "ratings.csv");
    let links_candidates = candidates(&matches, "l", "links.csv");
    let output_path = matches.opt_str("o").map(PathBuf::from);

    let outcome = if matches.opt_present("e") {
        run_evaluation(&ratings_candidates, &config, matches.opt_present("b"), output_path.as_deref())
    } else {
        run_recommendations(&ratings_candidates, &links_candidates, &config, output_path.as_deref())
    };

    if let Err(failure) = outcome {
        error!(%failure, "run failed");
        process::exit(1);
    }
}

fn print_usage_and_exit(
    program: &str,
    opts: Options,
    hint: Option<&str>
) {

    if let Some(hint) = hint {
        eprintln!("\n{}\n", hint);
    }

    let brief = format!("Usage: {} [options]", program);
    eprint!("{}", opts.usage(&brief));

    if hint.is_some() {
        process::exit(2);
    }
}

fn candidates(matches: &Matches, name: &str, default: &str) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = matches.opt_strs(name).into_iter().map(PathBuf::from).collect();
    if paths.is_empty() {
        paths.push(PathBuf::from(default));
    }
    paths
}

fn override_with<T>(matches: &Matches, name: &str, target: &mut T) -> Result<(), String>
    where T: FromStr, T::Err: Display {

    let value = matches.opt_get::<T>(name)
        .map_err(|failure| format!("Problem with option '{}': {}", name, failure))?;

    if let Some(value) = value {
        *target = value;
    }

    Ok(())
}

fn configure(matches: &Matches) -> Result<Config, String> {

    let mut config = match matches.opt_str("c") {
        Some(path) => Config::from_json_file(&path)
            .map_err(|failure| format!("Problem with config file '{}': {}", path, failure))?,
        None => Config::default(),
    };

    override_with(matches, "e", &mut config.evaluation_protocol)?;
    override_with(matches, "k", &mut config.k)?;
    override_with(matches, "n", &mut config.n)?;
    override_with(matches, "min-support", &mut config.min_support)?;
    override_with(matches, "seed", &mut config.random_seed)?;
    override_with(matches, "test-fraction", &mut config.test_fraction)?;
    override_with(matches, "threshold", &mut config.relevance_threshold)?;
    override_with(matches, "duplicates", &mut config.duplicate_resolution)?;
    override_with(matches, "threads", &mut config.num_threads)?;

    let mut max_test_samples: usize = 0;
    override_with(matches, "max-test-samples", &mut max_test_samples)?;
    if max_test_samples > 0 {
        config.max_test_samples = Some(max_test_samples);
    }

    config.validate().map_err(|failure| failure.to_string())?;

    Ok(config)
}

fn run_recommendations(
    ratings_candidates: &[PathBuf],
    links_candidates: &[PathBuf],
    config: &Config,
    output_path: Option<&Path>,
) -> Result<(), Box<dyn Error>> {

    // Both sources are resolved before any parsing starts
    let ratings_path = io::resolve_source(ratings_candidates)?;
    let links_path = io::resolve_source(links_candidates)?;

    let store = userknn::ingest(io::read_ratings(&ratings_path)?, config)?;

    info!(
        ratings = store.num_ratings(),
        users = store.num_users(),
        items = store.num_items(),
        "loaded ratings"
    );

    let links = io::read_links(&links_path)?;
    let recommendations = userknn::recommendations(&store, config)?;

    io::write_recommendations(&recommendations, &links, output_path)?;

    Ok(())
}

fn run_evaluation(
    ratings_candidates: &[PathBuf],
    config: &Config,
    with_baseline: bool,
    output_path: Option<&Path>,
) -> Result<(), Box<dyn Error>> {

    let ratings_path = io::resolve_source(ratings_candidates)?;
    let store = userknn::ingest(io::read_ratings(&ratings_path)?, config)?;

    let result = evaluate::evaluate(&store, config)?;

    let baseline = if with_baseline {
        Some(evaluate::popularity_baseline(&store, config)?)
    } else {
        None
    };

    io::write_evaluation(&result, baseline.as_ref(), output_path)?;

    Ok(())
}
