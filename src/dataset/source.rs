use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

pub const RATINGS_FILE: &str = "u.data";
pub const MOVIES_FILE: &str = "u.item";

#[derive(Clone, Debug, PartialEq)]
pub enum DataSource {
    /// An unpacked `ml-100k` directory
    Local(PathBuf),
    Remote {
        ratings_url: String,
        movies_url: String,
    },
}

impl Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSource::Local(dir) => write!(f, "LOCAL {{ dir: {} }}", dir.display()),
            DataSource::Remote {
                ratings_url,
                movies_url,
            } => write!(
                f,
                "REMOTE {{ ratings: {}, movies: {} }}",
                ratings_url, movies_url
            ),
        }
    }
}

impl DataSource {
    /// Raw ratings text and raw (Latin-1) movies bytes.
    pub async fn fetch(&self) -> Result<(String, Vec<u8>)> {
        match self {
            DataSource::Local(dir) => {
                let ratings_path = dir.join(RATINGS_FILE);
                let movies_path = dir.join(MOVIES_FILE);
                let ratings = fs::read_to_string(&ratings_path)
                    .await
                    .with_context(|| format!("read {}", ratings_path.display()))?;
                let movies = fs::read(&movies_path)
                    .await
                    .with_context(|| format!("read {}", movies_path.display()))?;
                Ok((ratings, movies))
            }
            DataSource::Remote {
                ratings_url,
                movies_url,
            } => {
                let client = Client::builder()
                    .timeout(Duration::from_secs(60))
                    .build()
                    .context("create HTTP client")?;
                let ratings = download(&client, ratings_url).await?;
                let movies = download(&client, movies_url).await?;
                let ratings = String::from_utf8(ratings)
                    .with_context(|| format!("ratings from {} are not UTF-8", ratings_url))?;
                Ok((ratings, movies))
            }
        }
    }
}

async fn download(client: &Client, url: &str) -> Result<Vec<u8>> {
    debug!("download {}", url);
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("request {}", url))?;
    if !response.status().is_success() {
        return Err(anyhow!("request {} failed: {}", url, response.status()));
    }
    let bytes = response
        .bytes()
        .await
        .with_context(|| format!("read body of {}", url))?;
    Ok(bytes.to_vec())
}
