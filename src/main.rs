mod dataset;
mod errors;
mod recommender;
mod settings;

use anyhow::{Context, Result};
use dataset::{DatasetCache, MovieId, UserId};
use dotenv::dotenv;
use env_logger::Builder;
use errors::RecommendError;
use lazy_static::lazy_static;
use log::LevelFilter;
use recommender::{Engines, Method, Recommendation};
use serde::{Deserialize, Serialize};
use settings::Settings;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use warp::{http::StatusCode, Filter, Rejection, Reply};

#[macro_use]
extern crate log;

lazy_static! {
    static ref SETTINGS: Settings = Settings::from_env();
}

const INDEX_HTML: &str = include_str!("../index.html");

#[derive(Deserialize, Debug)]
struct RecommendRequest {
    user_id: UserId,
    method: String,
    n: Option<usize>,
}

#[derive(Serialize, Debug)]
struct RecommendedMovie {
    movie_id: MovieId,
    title: String,
    score: f32,
    line: String,
}

#[derive(Serialize, Debug)]
struct RecommendResponse {
    user_id: UserId,
    method: String,
    label: Option<&'static str>,
    message: Option<String>,
    recommendations: Vec<RecommendedMovie>,
}

#[derive(Serialize, Debug)]
struct MethodInfo {
    name: &'static str,
    label: &'static str,
}

#[tokio::main]
async fn main() -> Result<()> {
    // read .env
    dotenv().ok();

    // init logger
    let log_level = std::env::var("RUST_LOG").unwrap_or_default();

    if log_level == "debug" {
        Builder::new()
            .filter(None, LevelFilter::Off)
            .filter(Some("movierec"), LevelFilter::Debug)
            .init();
    } else if log_level == "info" {
        Builder::new()
            .filter(None, LevelFilter::Off)
            .filter(Some("movierec"), LevelFilter::Info)
            .init();
    } else {
        env_logger::init();
    }

    let settings: &'static Settings = &SETTINGS;
    info!("settings: {:?}", settings);

    let cache = DatasetCache::new(settings.source.clone());
    let dataset = cache.get().await?;
    let max_user_id = dataset.max_user_id();
    info!(
        "dataset ready: {} users, max user id {}",
        dataset.users().len(),
        max_user_id
    );

    let mut engines = vec![];
    for &method in settings.methods.iter() {
        let dataset = Arc::clone(&dataset);
        let engine =
            tokio::task::spawn_blocking(move || recommender::build(method, dataset, settings))
                .await
                .with_context(|| format!("build {} recommender", method))??;
        engines.push(engine);
    }
    let engines = Arc::new(Engines::new(engines));
    info!("recommenders ready: {:?}", engines.methods());

    let routes = routes(engines, max_user_id, settings.top_n);

    info!("server running at port: {}", settings.port);
    warp::serve(routes).run(([0, 0, 0, 0], settings.port)).await;

    Ok(())
}

fn routes(
    engines: Arc<Engines>,
    max_user_id: UserId,
    top_n: usize,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let index_engines = Arc::clone(&engines);
    let index_route = warp::path::end()
        .and(warp::get())
        .and(warp::any().map(move || Arc::clone(&index_engines)))
        .and_then(move |engines: Arc<Engines>| index(engines, max_user_id));

    let methods_engines = Arc::clone(&engines);
    let methods_route = warp::path("methods")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::any().map(move || Arc::clone(&methods_engines)))
        .and_then(handle_methods);

    let recommend_route = warp::path("recommend")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<RecommendRequest>())
        .and(warp::any().map(move || Arc::clone(&engines)))
        .and_then(move |request: RecommendRequest, engines: Arc<Engines>| {
            handle_recommend(request, engines, top_n)
        });

    index_route.or(methods_route).or(recommend_route)
}

async fn index(engines: Arc<Engines>, max_user_id: UserId) -> Result<impl Reply, Infallible> {
    let options = engines
        .methods()
        .iter()
        .map(|m| format!("<option value=\"{}\">{}</option>", m.name(), m.label()))
        .collect::<String>();
    let page = INDEX_HTML
        .replace("{{max_user_id}}", &max_user_id.max(1).to_string())
        .replace("{{method_options}}", &options);
    Ok(warp::reply::html(page))
}

async fn handle_methods(engines: Arc<Engines>) -> Result<impl Reply, Infallible> {
    let methods = engines
        .methods()
        .into_iter()
        .map(|m| MethodInfo {
            name: m.name(),
            label: m.label(),
        })
        .collect::<Vec<_>>();
    Ok(warp::reply::json(&methods))
}

async fn handle_recommend(
    request: RecommendRequest,
    engines: Arc<Engines>,
    top_n: usize,
) -> Result<impl Reply, Infallible> {
    info!("get recommend request: {:?}", request);
    let start = Instant::now();
    let n = request.n.unwrap_or(top_n);

    let engine = match request
        .method
        .parse::<Method>()
        .ok()
        .and_then(|method| engines.get(method))
    {
        Some(engine) => engine,
        None => {
            let e = RecommendError::UnknownMethod(request.method.clone());
            warn!("handle recommend request failed: {}", e);
            let response = RecommendResponse {
                user_id: request.user_id,
                method: request.method,
                label: None,
                message: Some(e.to_string()),
                recommendations: vec![],
            };
            return Ok(warp::reply::with_status(
                warp::reply::json(&response),
                StatusCode::NOT_FOUND,
            ));
        }
    };

    let method = engine.method();
    let (recommendations, message) = match engine.recommend(request.user_id, n) {
        Ok(recommendations) => (recommendations, None),
        Err(e) => {
            warn!("recommend user: {} with {} failed: {}", request.user_id, method, e);
            (vec![], Some(e.to_string()))
        }
    };
    info!(
        "recommend user: {}, method: {} spends {}s, {} results",
        request.user_id,
        method,
        start.elapsed().as_secs_f64(),
        recommendations.len()
    );

    let response = RecommendResponse {
        user_id: request.user_id,
        method: method.name().to_string(),
        label: Some(method.label()),
        message,
        recommendations: recommendations
            .into_iter()
            .map(|r| recommended_movie(r, method))
            .collect(),
    };
    Ok(warp::reply::with_status(
        warp::reply::json(&response),
        StatusCode::OK,
    ))
}

fn recommended_movie(r: Recommendation, method: Method) -> RecommendedMovie {
    RecommendedMovie {
        line: r.line(method.label()),
        movie_id: r.movie_id,
        title: r.title,
        score: r.score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::fixture;
    use crate::recommender::{
        collaborative::Collaborative,
        factorization::{Factorization, HyperParams},
        popularity::Popularity,
        Recommender,
    };
    use serde_json::Value;

    fn test_routes() -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        let dataset = Arc::new(fixture());
        let h = HyperParams {
            n_factors: 4,
            n_epochs: 10,
            rng_seed: Some(7),
            test_size: 0.,
            ..HyperParams::default()
        };
        let engines: Vec<Arc<dyn Recommender>> = vec![
            Arc::new(Factorization::train(Arc::clone(&dataset), &h).unwrap()),
            Arc::new(Popularity::new(Arc::clone(&dataset))),
            Arc::new(Collaborative::new(Arc::clone(&dataset), 10)),
        ];
        routes(
            Arc::new(Engines::new(engines)),
            dataset.max_user_id(),
            10,
        )
    }

    async fn get_json(path: &str) -> (StatusCode, Value) {
        let res = warp::test::request()
            .method("GET")
            .path(path)
            .reply(&test_routes())
            .await;
        let body = serde_json::from_slice(res.body()).unwrap();
        (res.status(), body)
    }

    #[tokio::test]
    async fn index_page_has_bounded_input_and_methods() {
        let res = warp::test::request()
            .method("GET")
            .path("/")
            .reply(&test_routes())
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let page = String::from_utf8(res.body().to_vec()).unwrap();
        assert!(page.contains("max=\"4\""));
        assert!(page.contains("<option value=\"collaborative\">Predicted Rating</option>"));
        assert!(!page.contains("{{"));
    }

    #[tokio::test]
    async fn lists_methods() {
        let (status, body) = get_json("/methods").await;
        assert_eq!(status, StatusCode::OK);
        let names = body
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["name"].as_str().unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["factorization", "popularity", "collaborative"]);
    }

    #[tokio::test]
    async fn popularity_lines() {
        let (status, body) = get_json("/recommend?user_id=1&method=popularity").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["label"], "Average Rating");
        assert!(body["message"].is_null());
        let lines = body["recommendations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["line"].as_str().unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            lines,
            vec![
                "Get Shorty (1995) — Average Rating: 4.50",
                "50 — Average Rating: 3.00"
            ]
        );
    }

    #[tokio::test]
    async fn n_limits_results() {
        let (_, body) = get_json("/recommend?user_id=999&method=popularity&n=2").await;
        assert_eq!(body["recommendations"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn factorization_unknown_user_shows_message() {
        let (status, body) = get_json("/recommend?user_id=999&method=factorization").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "User ID 999 not found in the dataset");
        assert!(body["recommendations"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn collaborative_unknown_user_is_silently_empty() {
        let (status, body) = get_json("/recommend?user_id=999&method=collaborative").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].is_null());
        assert!(body["recommendations"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_method_is_not_found() {
        let (status, body) = get_json("/recommend?user_id=1&method=svd").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Unknown recommendation method: svd");
    }

    #[tokio::test]
    async fn bad_user_id_is_rejected() {
        let res = warp::test::request()
            .method("GET")
            .path("/recommend?user_id=abc&method=popularity")
            .reply(&test_routes())
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
