use ndarray::Array2;
use std::collections::{hash_map::Entry, HashMap};

use super::{MovieId, Rating, UserId};

/// Revealed entries of the user × movie rating matrix, stored as a coordinate list.
///
/// Rows and columns are dense inner indexes handed out in first-seen order;
/// the raw ids are kept on both sides of the mapping.
#[derive(Debug, Default)]
pub struct RatingMatrix {
    data: Vec<(usize, usize, f32)>,
    user_to_row: HashMap<UserId, usize>,
    movie_to_col: HashMap<MovieId, usize>,
    row_to_user: Vec<UserId>,
    col_to_movie: Vec<MovieId>,
}

impl RatingMatrix {
    pub fn new_empty() -> Self {
        Self::default()
    }

    pub fn from_ratings<'a>(ratings: impl IntoIterator<Item = &'a Rating>) -> Self {
        let mut m = Self::new_empty();
        for r in ratings {
            let row = m.row_for(r.user_id);
            let col = m.col_for(r.movie_id);
            m.insert(row, col, r.rating);
        }
        m
    }

    fn row_for(&mut self, user_id: UserId) -> usize {
        match self.user_to_row.entry(user_id) {
            Entry::Occupied(o) => *o.get(),
            Entry::Vacant(v) => {
                let row = self.row_to_user.len();
                self.row_to_user.push(user_id);
                *v.insert(row)
            }
        }
    }

    fn col_for(&mut self, movie_id: MovieId) -> usize {
        match self.movie_to_col.entry(movie_id) {
            Entry::Occupied(o) => *o.get(),
            Entry::Vacant(v) => {
                let col = self.col_to_movie.len();
                self.col_to_movie.push(movie_id);
                *v.insert(col)
            }
        }
    }

    fn insert(&mut self, row: usize, col: usize, elem: f32) {
        self.data.push((row, col, elem));
    }

    pub fn n_rows(&self) -> usize {
        self.row_to_user.len()
    }

    pub fn n_cols(&self) -> usize {
        self.col_to_movie.len()
    }

    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    pub fn row_of(&self, user_id: UserId) -> Option<usize> {
        self.user_to_row.get(&user_id).copied()
    }

    pub fn col_of(&self, movie_id: MovieId) -> Option<usize> {
        self.movie_to_col.get(&movie_id).copied()
    }

    pub fn movie_at(&self, col: usize) -> MovieId {
        self.col_to_movie[col]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (usize, usize, f32)> {
        self.data.iter()
    }

    /// Mean of all revealed entries, 0 for an empty matrix.
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.;
        }
        self.data.iter().map(|&(_, _, e)| e).sum::<f32>() / self.data.len() as f32
    }

    /// Dense copy with unrevealed entries filled as 0.
    pub fn to_dense(&self) -> Array2<f32> {
        let mut dense = Array2::zeros((self.n_rows(), self.n_cols()));
        for &(row, col, elem) in self.data.iter() {
            dense[[row, col]] = elem;
        }
        dense
    }
}
