use anyhow::{anyhow, Result};
use ndarray::prelude::*;
use ndarray_rand::{
    rand::{rngs::StdRng, seq::SliceRandom, SeedableRng},
    rand_distr::Normal,
    RandomExt,
};
use std::sync::Arc;
use std::time::Instant;

use super::{top_n, with_titles, Method, Recommendation, Recommender, Scored};
use crate::dataset::{
    matrix::RatingMatrix, Dataset, MovieId, Rating, UserId, MAX_RATING, MIN_RATING,
};
use crate::errors::RecommendError;

#[derive(Clone, Debug, PartialEq)]
pub struct HyperParams {
    /// Number of latent factors per user and per movie
    pub n_factors: usize,
    /// Passes of SGD over the training ratings
    pub n_epochs: usize,
    pub learning_rate: f32,
    /// L2 penalty on biases and factors
    pub regularization: f32,
    /// Std dev of the normal distribution factors are drawn from
    pub init_std_dev: f32,
    /// Share of ratings held out from training
    pub test_size: f32,
    /// Fixes the split and the initial factors when set
    pub rng_seed: Option<u64>,
}

impl Default for HyperParams {
    fn default() -> Self {
        Self {
            n_factors: 100,
            n_epochs: 20,
            learning_rate: 0.005,
            regularization: 0.02,
            init_std_dev: 0.1,
            test_size: 0.25,
            rng_seed: None,
        }
    }
}

struct Weights {
    /// user factors, one row per training user
    p: Array2<f32>,
    /// movie factors, one row per training movie
    q: Array2<f32>,
    bu: Array1<f32>,
    bi: Array1<f32>,
}

impl Weights {
    fn new(
        n_rows: usize,
        n_cols: usize,
        n_factors: usize,
        std_dev: f32,
        rng: &mut StdRng,
    ) -> Result<Self> {
        let init = Normal::new(0., std_dev)
            .map_err(|e| anyhow!("invalid init std dev {}: {}", std_dev, e))?;
        Ok(Self {
            p: Array::random_using((n_rows, n_factors), init, rng),
            q: Array::random_using((n_cols, n_factors), init, rng),
            bu: Array::zeros(n_rows),
            bi: Array::zeros(n_cols),
        })
    }
}

/// Biased latent-factor model trained by SGD on a random share of the ratings.
pub struct Factorization {
    dataset: Arc<Dataset>,
    trainset: RatingMatrix,
    weights: Weights,
    /// global mean of the training ratings
    mu: f32,
}

impl Factorization {
    pub fn train(dataset: Arc<Dataset>, h: &HyperParams) -> Result<Self> {
        if !(0. ..1.).contains(&h.test_size) {
            return Err(anyhow!("test size {} outside [0, 1)", h.test_size));
        }

        let mut rng = match h.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let (train, test) = train_test_split(dataset.ratings(), h.test_size, &mut rng);
        let trainset = RatingMatrix::from_ratings(train.iter());
        let mu = trainset.mean();
        let weights = Weights::new(
            trainset.n_rows(),
            trainset.n_cols(),
            h.n_factors,
            h.init_std_dev,
            &mut rng,
        )?;
        info!(
            "factorization trainset: {} users, {} movies, {} ratings, {} held out",
            trainset.n_rows(),
            trainset.n_cols(),
            trainset.nnz(),
            test.len()
        );

        let mut model = Self {
            dataset,
            trainset,
            weights,
            mu,
        };
        model.fit(h);

        if !test.is_empty() {
            info!("factorization held-out rmse: {}", model.rmse(&test));
        }

        Ok(model)
    }

    fn fit(&mut self, h: &HyperParams) {
        let lr = h.learning_rate;
        let reg = h.regularization;

        for epoch in 0..h.n_epochs {
            let start_time = Instant::now();
            let mut loss = 0.;

            for &(u, i, r) in self.trainset.iter() {
                let w = &mut self.weights;
                let pu = w.p.row(u).to_owned();
                let qi = w.q.row(i).to_owned();
                let bu = w.bu[u];
                let bi = w.bi[i];

                let e = error(r, &pu.view(), &qi.view(), bu, bi, self.mu);
                loss += e.powi(2);

                w.bu[u] = bu + lr * (e - reg * bu);
                w.bi[i] = bi + lr * (e - reg * bi);

                let new_p = &pu + &(lr * ((e * &qi) - (reg * &pu)));
                let new_q = &qi + &(lr * ((e * &pu) - (reg * &qi)));
                w.p.row_mut(u).assign(&new_p);
                w.q.row_mut(i).assign(&new_q);
            }

            debug!(
                "epoch {}: loss {}, spends {}s",
                epoch,
                loss,
                start_time.elapsed().as_secs_f64()
            );
        }
    }

    /// Estimated rating, clipped to the rating scale. Unknown users or movies
    /// fall back to whatever biases are known.
    pub fn predict(&self, user_id: UserId, movie_id: MovieId) -> f32 {
        let row = self.trainset.row_of(user_id);
        let col = self.trainset.col_of(movie_id);
        let w = &self.weights;

        let est = match (row, col) {
            (Some(u), Some(i)) => pred(&w.p.row(u), &w.q.row(i), w.bu[u], w.bi[i], self.mu),
            (Some(u), None) => self.mu + w.bu[u],
            (None, Some(i)) => self.mu + w.bi[i],
            (None, None) => self.mu,
        };
        est.clamp(MIN_RATING, MAX_RATING)
    }

    fn rmse(&self, ratings: &[Rating]) -> f32 {
        let sq = ratings
            .iter()
            .map(|r| (r.rating - self.predict(r.user_id, r.movie_id)).powi(2))
            .sum::<f32>();
        (sq / ratings.len() as f32).sqrt()
    }
}

impl Recommender for Factorization {
    fn method(&self) -> Method {
        Method::Factorization
    }

    fn recommend(&self, user_id: UserId, n: usize) -> Result<Vec<Recommendation>, RecommendError> {
        if self.trainset.row_of(user_id).is_none() {
            return Err(RecommendError::UnknownUser(user_id));
        }

        let candidates = (0..self.trainset.n_cols())
            .map(|col| self.trainset.movie_at(col))
            .filter(|&movie_id| !self.dataset.has_rated(user_id, movie_id))
            .map(|movie_id| Scored {
                movie_id,
                score: self.predict(user_id, movie_id),
            })
            .collect();

        Ok(with_titles(&self.dataset, top_n(candidates, n)))
    }
}

/// Shuffle and hold out `test_size` of the ratings; returns (train, test).
pub fn train_test_split(
    ratings: &[Rating],
    test_size: f32,
    rng: &mut StdRng,
) -> (Vec<Rating>, Vec<Rating>) {
    let mut shuffled = ratings.to_vec();
    shuffled.shuffle(rng);
    let n_test = (ratings.len() as f32 * test_size).ceil() as usize;
    let train = shuffled.split_off(n_test.min(shuffled.len()));
    (train, shuffled)
}

fn pred(p: &ArrayView1<f32>, q: &ArrayView1<f32>, bu: f32, bi: f32, mu: f32) -> f32 {
    p.dot(q) + bu + bi + mu
}

fn error(r: f32, p: &ArrayView1<f32>, q: &ArrayView1<f32>, bu: f32, bi: f32, mu: f32) -> f32 {
    r - pred(p, q, bu, bi, mu)
}
