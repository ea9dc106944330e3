use std::path::PathBuf;
use std::str::FromStr;

use crate::dataset::DataSource;
use crate::recommender::{factorization::HyperParams, Method};

/// Runtime configuration, read from the environment (and `.env`).
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub port: u16,
    pub source: DataSource,
    pub methods: Vec<Method>,
    pub top_n: usize,
    pub neighbours: usize,
    pub n_factors: usize,
    pub n_epochs: usize,
    pub learning_rate: f32,
    pub regularization: f32,
    pub test_size: f32,
    pub rng_seed: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        let h = HyperParams::default();
        Self {
            port: 8080,
            source: DataSource::Local(PathBuf::from("./ml-100k")),
            methods: Method::ALL.to_vec(),
            top_n: 10,
            neighbours: 10,
            n_factors: h.n_factors,
            n_epochs: h.n_epochs,
            learning_rate: h.learning_rate,
            regularization: h.regularization,
            test_size: h.test_size,
            rng_seed: h.rng_seed,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `lookup` returns the raw value of a variable, `None` when unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();

        let source = match (lookup("RATINGS_URL"), lookup("MOVIES_URL")) {
            (Some(ratings_url), Some(movies_url)) => DataSource::Remote {
                ratings_url,
                movies_url,
            },
            _ => lookup("DATA_DIR")
                .map(|dir| DataSource::Local(PathBuf::from(dir)))
                .unwrap_or(d.source),
        };

        let methods = match lookup("RECOMMENDERS") {
            Some(raw) => parse_methods(&raw).unwrap_or_else(|| {
                warn!("RECOMMENDERS={:?} is invalid, building all recommenders", raw);
                d.methods.clone()
            }),
            None => d.methods.clone(),
        };

        Self {
            port: parse_or(&lookup, "PORT", d.port),
            source,
            methods,
            top_n: parse_or(&lookup, "TOP_N", d.top_n),
            neighbours: parse_or(&lookup, "NEIGHBOURS", d.neighbours),
            n_factors: parse_or(&lookup, "N_FACTORS", d.n_factors),
            n_epochs: parse_or(&lookup, "N_EPOCHS", d.n_epochs),
            learning_rate: parse_or(&lookup, "LEARNING_RATE", d.learning_rate),
            regularization: parse_or(&lookup, "REGULARIZATION", d.regularization),
            test_size: parse_or(&lookup, "TEST_SIZE", d.test_size),
            rng_seed: lookup("RNG_SEED").and_then(|raw| match raw.trim().parse() {
                Ok(seed) => Some(seed),
                Err(_) => {
                    warn!("RNG_SEED={:?} is not a number, training unseeded", raw);
                    None
                }
            }),
        }
    }

    pub fn hyper_params(&self) -> HyperParams {
        HyperParams {
            n_factors: self.n_factors,
            n_epochs: self.n_epochs,
            learning_rate: self.learning_rate,
            regularization: self.regularization,
            test_size: self.test_size,
            rng_seed: self.rng_seed,
            ..HyperParams::default()
        }
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Debug>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{}={:?} is invalid, using {:?}", key, raw, default);
            default
        }),
        None => default,
    }
}

/// Comma separated method names, duplicates dropped; `None` if any name is
/// unknown or the list is empty.
fn parse_methods(raw: &str) -> Option<Vec<Method>> {
    let mut methods = vec![];
    for name in raw.split(',').filter(|s| !s.trim().is_empty()) {
        let method = name.parse::<Method>().ok()?;
        if !methods.contains(&method) {
            methods.push(method);
        }
    }
    if methods.is_empty() {
        None
    } else {
        Some(methods)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let vars = vars
            .iter()
            .map(|&(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(settings(&[]), Settings::default());
        assert_eq!(settings(&[]).hyper_params(), HyperParams::default());
    }

    #[test]
    fn reads_values() {
        let s = settings(&[
            ("PORT", "9000"),
            ("DATA_DIR", "/data/ml-100k"),
            ("RECOMMENDERS", "popularity, collaborative"),
            ("TOP_N", "5"),
            ("N_EPOCHS", "3"),
            ("LEARNING_RATE", "0.01"),
            ("RNG_SEED", "42"),
        ]);
        assert_eq!(s.port, 9000);
        assert_eq!(s.source, DataSource::Local(PathBuf::from("/data/ml-100k")));
        assert_eq!(s.methods, vec![Method::Popularity, Method::Collaborative]);
        assert_eq!(s.top_n, 5);

        let h = s.hyper_params();
        assert_eq!(h.n_epochs, 3);
        assert_eq!(h.learning_rate, 0.01);
        assert_eq!(h.rng_seed, Some(42));
        assert_eq!(h.n_factors, 100);
    }

    #[test]
    fn remote_needs_both_urls() {
        let s = settings(&[("RATINGS_URL", "http://host/u.data")]);
        assert_eq!(s.source, Settings::default().source);

        let s = settings(&[
            ("RATINGS_URL", "http://host/u.data"),
            ("MOVIES_URL", "http://host/u.item"),
            ("DATA_DIR", "/ignored"),
        ]);
        assert_eq!(
            s.source,
            DataSource::Remote {
                ratings_url: "http://host/u.data".to_string(),
                movies_url: "http://host/u.item".to_string(),
            }
        );
    }

    #[test]
    fn invalid_values_fall_back() {
        let s = settings(&[
            ("PORT", "eighty"),
            ("RECOMMENDERS", "popularity,svd"),
            ("RNG_SEED", "x"),
        ]);
        assert_eq!(s.port, 8080);
        assert_eq!(s.methods, Method::ALL.to_vec());
        assert_eq!(s.rng_seed, None);
    }

    #[test]
    fn method_list_drops_duplicates() {
        assert_eq!(
            parse_methods("popularity,popularity,"),
            Some(vec![Method::Popularity])
        );
        assert_eq!(parse_methods(" , "), None);
    }
}
