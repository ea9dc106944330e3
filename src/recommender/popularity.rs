use std::collections::HashMap;
use std::sync::Arc;

use super::{top_n, with_titles, Method, Recommendation, Recommender, Scored};
use crate::dataset::{Dataset, MovieId, UserId};
use crate::errors::RecommendError;

/// Ranks movies by their mean rating. Users are only used to filter out what
/// they have already seen, so an unseen user gets the full ranking.
pub struct Popularity {
    dataset: Arc<Dataset>,
    /// every rated movie, best mean first
    ranking: Vec<Scored>,
}

impl Popularity {
    pub fn new(dataset: Arc<Dataset>) -> Self {
        let ranking = top_n(average_ratings(&dataset), usize::MAX);
        debug!("popularity ranking over {} movies", ranking.len());
        Self { dataset, ranking }
    }
}

pub fn average_ratings(dataset: &Dataset) -> Vec<Scored> {
    let mut sums: HashMap<MovieId, (f32, usize)> = HashMap::new();
    for r in dataset.ratings() {
        let entry = sums.entry(r.movie_id).or_insert((0., 0));
        entry.0 += r.rating;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(movie_id, (sum, count))| Scored {
            movie_id,
            score: sum / count as f32,
        })
        .collect()
}

impl Recommender for Popularity {
    fn method(&self) -> Method {
        Method::Popularity
    }

    fn recommend(&self, user_id: UserId, n: usize) -> Result<Vec<Recommendation>, RecommendError> {
        let picked = self
            .ranking
            .iter()
            .filter(|s| !self.dataset.has_rated(user_id, s.movie_id))
            .take(n)
            .copied()
            .collect();
        Ok(with_titles(&self.dataset, picked))
    }
}
