pub mod collaborative;
pub mod factorization;
pub mod popularity;

use crate::dataset::{Dataset, MovieId, UserId};
use crate::errors::RecommendError;
use crate::settings::Settings;
use anyhow::Result;
use std::cmp::Ordering;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use self::{
    collaborative::Collaborative, factorization::Factorization, popularity::Popularity,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Factorization,
    Popularity,
    Collaborative,
}

impl Method {
    pub const ALL: [Method; 3] = [
        Method::Factorization,
        Method::Popularity,
        Method::Collaborative,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Method::Factorization => "factorization",
            Method::Popularity => "popularity",
            Method::Collaborative => "collaborative",
        }
    }

    /// What the score column means for this method.
    pub fn label(&self) -> &'static str {
        match self {
            Method::Factorization => "Estimated Rating",
            Method::Popularity => "Average Rating",
            Method::Collaborative => "Predicted Rating",
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Method {
    type Err = RecommendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RecommendError::UnknownMethod(s.to_string()))
    }
}

pub trait Recommender: Send + Sync {
    fn method(&self) -> Method;

    /// Top `n` movies for `user_id`, best first, none of them already rated by the user.
    fn recommend(&self, user_id: UserId, n: usize) -> Result<Vec<Recommendation>, RecommendError>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Recommendation {
    pub movie_id: MovieId,
    pub title: String,
    pub score: f32,
}

impl Recommendation {
    pub fn line(&self, label: &str) -> String {
        format!("{} — {}: {:.2}", self.title, label, self.score)
    }
}

/// A movie with its score; orders by score, then prefers the lower movie id.
#[derive(Copy, Clone, Debug)]
pub struct Scored {
    pub movie_id: MovieId,
    pub score: f32,
}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.movie_id.cmp(&self.movie_id))
    }
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scored {}

/// Sort best first and keep `n`.
pub fn top_n(mut scored: Vec<Scored>, n: usize) -> Vec<Scored> {
    scored.sort_unstable_by(|a, b| b.cmp(a));
    scored.truncate(n);
    scored
}

pub fn with_titles(dataset: &Dataset, scored: Vec<Scored>) -> Vec<Recommendation> {
    scored
        .into_iter()
        .map(|s| Recommendation {
            movie_id: s.movie_id,
            title: dataset.title(s.movie_id),
            score: s.score,
        })
        .collect()
}

/// Build the artifact for `method`. Factorization training is CPU bound, call
/// this from a blocking context.
pub fn build(
    method: Method,
    dataset: Arc<Dataset>,
    settings: &Settings,
) -> Result<Arc<dyn Recommender>> {
    let start = Instant::now();
    let recommender: Arc<dyn Recommender> = match method {
        Method::Factorization => Arc::new(Factorization::train(dataset, &settings.hyper_params())?),
        Method::Popularity => Arc::new(Popularity::new(dataset)),
        Method::Collaborative => Arc::new(Collaborative::new(dataset, settings.neighbours)),
    };
    info!(
        "build {} recommender spends {}s",
        method,
        start.elapsed().as_secs_f64()
    );
    Ok(recommender)
}

/// The recommenders a server instance was started with.
#[derive(Clone)]
pub struct Engines {
    engines: Vec<Arc<dyn Recommender>>,
}

impl Engines {
    pub fn new(engines: Vec<Arc<dyn Recommender>>) -> Self {
        Self { engines }
    }

    pub fn get(&self, method: Method) -> Option<&Arc<dyn Recommender>> {
        self.engines.iter().find(|e| e.method() == method)
    }

    pub fn methods(&self) -> Vec<Method> {
        self.engines.iter().map(|e| e.method()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::fixture;

    #[test]
    fn top_n_sorts_descending_and_breaks_ties_by_id() {
        let scored = vec![
            Scored { movie_id: 3, score: 4. },
            Scored { movie_id: 1, score: 2. },
            Scored { movie_id: 2, score: 4. },
            Scored { movie_id: 4, score: 5. },
        ];
        let ids = top_n(scored, 3)
            .into_iter()
            .map(|s| s.movie_id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![4, 2, 3]);
    }

    #[test]
    fn top_n_of_empty_is_empty() {
        assert!(top_n(vec![], 10).is_empty());
    }

    #[test]
    fn renders_line_with_two_decimals() {
        let r = Recommendation {
            movie_id: 1,
            title: "Toy Story (1995)".to_string(),
            score: 4.256,
        };
        assert_eq!(
            r.line(Method::Factorization.label()),
            "Toy Story (1995) — Estimated Rating: 4.26"
        );
    }

    #[test]
    fn titles_fall_back_to_ids() {
        let dataset = fixture();
        let recs = with_titles(
            &dataset,
            vec![
                Scored { movie_id: 20, score: 3. },
                Scored { movie_id: 50, score: 3. },
            ],
        );
        assert_eq!(recs[0].title, "GoldenEye (1995)");
        assert_eq!(recs[1].title, "50");
    }

    #[test]
    fn parses_method_names() {
        assert_eq!("popularity".parse::<Method>(), Ok(Method::Popularity));
        assert_eq!(" Collaborative ".parse::<Method>(), Ok(Method::Collaborative));
        assert_eq!(
            "svd".parse::<Method>(),
            Err(RecommendError::UnknownMethod("svd".to_string()))
        );
    }

    #[test]
    fn engines_lookup_by_method() {
        let dataset = Arc::new(fixture());
        let engines = Engines::new(vec![Arc::new(Popularity::new(dataset))]);
        assert!(engines.get(Method::Popularity).is_some());
        assert!(engines.get(Method::Collaborative).is_none());
        assert_eq!(engines.methods(), vec![Method::Popularity]);
    }
}
