use ndarray::prelude::*;
use std::sync::Arc;

use super::{top_n, with_titles, Method, Recommendation, Recommender, Scored};
use crate::dataset::{matrix::RatingMatrix, Dataset, UserId};
use crate::errors::RecommendError;

/// User-based collaborative filtering over a dense, zero-filled rating matrix.
pub struct Collaborative {
    dataset: Arc<Dataset>,
    matrix: RatingMatrix,
    /// user × movie, unrated = 0
    ratings: Array2<f32>,
    /// user × user cosine similarity
    similarity: Array2<f32>,
    neighbours: usize,
}

impl Collaborative {
    pub fn new(dataset: Arc<Dataset>, neighbours: usize) -> Self {
        let matrix = RatingMatrix::from_ratings(dataset.ratings());
        let ratings = matrix.to_dense();
        let similarity = cosine_similarity(&ratings);
        debug!(
            "collaborative similarity matrix: {:?}, neighbours: {}",
            similarity.dim(),
            neighbours
        );
        Self {
            dataset,
            matrix,
            ratings,
            similarity,
            neighbours,
        }
    }

    /// The `neighbours` rows most similar to `row`, excluding `row` itself.
    fn nearest(&self, row: usize) -> Vec<(usize, f32)> {
        let mut others = self
            .similarity
            .row(row)
            .iter()
            .enumerate()
            .filter(|&(other, _)| other != row)
            .map(|(other, &sim)| (other, sim))
            .collect::<Vec<_>>();
        others.sort_unstable_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        others.truncate(self.neighbours);
        others
    }
}

/// Pairwise cosine similarity between the rows of `m`. A zero row has
/// similarity 0 with every row, itself included.
pub fn cosine_similarity(m: &Array2<f32>) -> Array2<f32> {
    let norms = m.map_axis(Axis(1), |row| row.dot(&row).sqrt());
    let mut normalized = m.to_owned();
    for (mut row, &norm) in normalized.rows_mut().into_iter().zip(norms.iter()) {
        if norm > 0. {
            row /= norm;
        }
    }
    normalized.dot(&normalized.t())
}

impl Recommender for Collaborative {
    fn method(&self) -> Method {
        Method::Collaborative
    }

    fn recommend(&self, user_id: UserId, n: usize) -> Result<Vec<Recommendation>, RecommendError> {
        let row = match self.matrix.row_of(user_id) {
            Some(row) => row,
            None => return Ok(vec![]),
        };

        let nearest = self.nearest(row);
        let total = nearest.iter().map(|&(_, sim)| sim).sum::<f32>();
        if total == 0. || !total.is_finite() {
            return Err(RecommendError::DegenerateNeighbourhood(user_id));
        }

        let mut weighted = Array1::<f32>::zeros(self.ratings.ncols());
        for &(other, sim) in nearest.iter() {
            weighted.scaled_add(sim, &self.ratings.row(other));
        }
        weighted /= total;

        let own = self.ratings.row(row);
        let candidates = weighted
            .iter()
            .enumerate()
            .filter(|&(col, _)| own[col] <= 0.)
            .map(|(col, &score)| Scored {
                movie_id: self.matrix.movie_at(col),
                score,
            })
            .collect();

        Ok(with_titles(&self.dataset, top_n(candidates, n)))
    }
}
