// MovieLens 100K layout:
//
// u.data -> user id \t movie id \t rating \t timestamp   (ASCII, one Rating per record)
// u.item -> movie id | title | release date | ... | genre flags   (Latin-1)
//
// ids are normalized to u32 here and nowhere else

pub mod matrix;
mod source;

pub use source::DataSource;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;

pub type UserId = u32;
pub type MovieId = u32;

pub const MIN_RATING: f32 = 1.;
pub const MAX_RATING: f32 = 5.;

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct Rating {
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub rating: f32,
    pub timestamp: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Movie {
    pub movie_id: MovieId,
    pub title: String,
}

/// Ratings plus the title table, with the per-user indexes every recommender needs.
pub struct Dataset {
    ratings: Vec<Rating>,
    titles: HashMap<MovieId, String>,
    /// `rated[u]` = every movie user `u` has a rating for
    rated: HashMap<UserId, HashSet<MovieId>>,
    /// distinct user ids appearing in ratings, ascending
    users: Vec<UserId>,
    /// distinct movie ids appearing in ratings, ascending
    movies: Vec<MovieId>,
}

impl Dataset {
    pub fn new(ratings: Vec<Rating>, movies: Vec<Movie>) -> Self {
        let titles = movies
            .into_iter()
            .map(|m| (m.movie_id, m.title))
            .collect::<HashMap<_, _>>();

        let mut rated: HashMap<UserId, HashSet<MovieId>> = HashMap::new();
        let mut users = BTreeSet::new();
        let mut movie_ids = BTreeSet::new();
        for r in ratings.iter() {
            rated.entry(r.user_id).or_default().insert(r.movie_id);
            users.insert(r.user_id);
            movie_ids.insert(r.movie_id);
        }

        Self {
            ratings,
            titles,
            rated,
            users: users.into_iter().collect(),
            movies: movie_ids.into_iter().collect(),
        }
    }

    pub async fn load(source: &DataSource) -> Result<Self> {
        let start = Instant::now();
        let (ratings_text, movies_bytes) = source.fetch().await?;
        let ratings = parse_ratings(&ratings_text).context("parse ratings table")?;
        let movies = parse_movies(&movies_bytes).context("parse movies table")?;
        let dataset = Self::new(ratings, movies);
        info!(
            "load dataset from {} spends {}s: {} ratings, {} users, {} movies, {} titles",
            source,
            start.elapsed().as_secs_f64(),
            dataset.ratings.len(),
            dataset.users.len(),
            dataset.movies.len(),
            dataset.titles.len()
        );
        Ok(dataset)
    }

    pub fn ratings(&self) -> &[Rating] {
        &self.ratings
    }

    pub fn users(&self) -> &[UserId] {
        &self.users
    }

    pub fn max_user_id(&self) -> UserId {
        self.users.last().copied().unwrap_or(0)
    }

    pub fn has_rated(&self, user_id: UserId, movie_id: MovieId) -> bool {
        self.rated
            .get(&user_id)
            .map_or(false, |movies| movies.contains(&movie_id))
    }

    /// Title of `movie_id`, or the raw id when the movies table has no entry for it.
    pub fn title(&self, movie_id: MovieId) -> String {
        self.titles
            .get(&movie_id)
            .cloned()
            .unwrap_or_else(|| movie_id.to_string())
    }
}

fn table_reader(delimiter: u8, bytes: &[u8]) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(bytes)
}

fn line_of(position: Option<&csv::Position>) -> u64 {
    position.map_or(0, |p| p.line())
}

pub fn parse_ratings(text: &str) -> Result<Vec<Rating>> {
    let mut reader = table_reader(b'\t', text.as_bytes());
    let mut ratings = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = line_of(record.position());
        let rating = record
            .deserialize::<Rating>(None)
            .map_err(anyhow::Error::from)
            .and_then(check_bounds)
            .with_context(|| format!("line {}: {:?}", line, record.iter().collect::<Vec<_>>()))?;
        ratings.push(rating);
    }
    Ok(ratings)
}

fn check_bounds(rating: Rating) -> Result<Rating> {
    if !(MIN_RATING..=MAX_RATING).contains(&rating.rating) {
        return Err(anyhow!(
            "rating {} outside [{}, {}]",
            rating.rating,
            MIN_RATING,
            MAX_RATING
        ));
    }
    Ok(rating)
}

pub fn parse_movies(bytes: &[u8]) -> Result<Vec<Movie>> {
    let mut reader = table_reader(b'|', bytes);
    let mut movies = Vec::new();
    for record in reader.byte_records() {
        let record = record?;
        let line = line_of(record.position());
        let movie_id: MovieId = record
            .get(0)
            .and_then(|id| std::str::from_utf8(id).ok())
            .and_then(|id| id.trim().parse().ok())
            .ok_or_else(|| anyhow!("line {}: bad movie id", line))?;
        let title = record
            .get(1)
            .ok_or_else(|| anyhow!("line {}: missing title", line))?;
        movies.push(Movie {
            movie_id,
            title: decode_latin1(title),
        });
    }
    Ok(movies)
}

// Latin-1 maps every byte onto the code point of the same value
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Loads the dataset on first use and hands the same copy to every later caller.
pub struct DatasetCache {
    source: DataSource,
    cell: OnceCell<Arc<Dataset>>,
}

impl DatasetCache {
    pub fn new(source: DataSource) -> Self {
        Self {
            source,
            cell: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<Arc<Dataset>> {
        let dataset = self
            .cell
            .get_or_try_init(|| async {
                Dataset::load(&self.source).await.map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(dataset))
    }
}
