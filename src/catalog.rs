use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::constants::constants;
use crate::movie::{GenreTag, Movie, MovieDetail, MovieId, extract_genres, extract_movies};

/// Typed failure of a catalog request.
#[derive(Debug, Error)]
pub enum CatalogError {
  #[error("invalid catalog URL: {0}")]
  Url(String),
  #[error("request failed: {status} {body}")]
  Status { status: StatusCode, body: String },
  #[error("network error: {0}")]
  Network(#[source] reqwest::Error),
  #[error("malformed response body: {0}")]
  Decode(#[source] reqwest::Error),
}

/// A single catalog resource. Page numbers start at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogRequest {
  Browse { page: u32 },
  Search { query: String, page: u32 },
  ByGenre { genre: String, page: u32 },
  Genres,
  Movie { id: MovieId },
}

impl CatalogRequest {
  pub fn page(&self) -> Option<u32> {
    match self {
      CatalogRequest::Browse { page } | CatalogRequest::Search { page, .. } | CatalogRequest::ByGenre { page, .. } => {
        Some(*page)
      }
      CatalogRequest::Genres | CatalogRequest::Movie { .. } => None,
    }
  }

  /// Resolve against the API base, percent-encoding every user-supplied component.
  pub fn url(&self, base: &Url) -> Result<Url, CatalogError> {
    let mut url = base.clone();
    {
      let mut segments = url.path_segments_mut().map_err(|_| CatalogError::Url(base.to_string()))?;
      segments.pop_if_empty();
      match self {
        CatalogRequest::Browse { .. } | CatalogRequest::Search { .. } => {
          segments.push("movies");
        }
        CatalogRequest::ByGenre { genre, .. } => {
          segments.extend(["genres", genre.as_str(), "movies"]);
        }
        CatalogRequest::Genres => {
          segments.push("genres");
        }
        CatalogRequest::Movie { id } => {
          segments.extend(["movies", id.to_string().as_str()]);
        }
      }
    }
    match self {
      CatalogRequest::Search { query, page } => {
        url.query_pairs_mut().append_pair("q", query).append_pair("page", &page.to_string());
      }
      CatalogRequest::Browse { page } | CatalogRequest::ByGenre { page, .. } => {
        url.query_pairs_mut().append_pair("page", &page.to_string());
      }
      CatalogRequest::Genres | CatalogRequest::Movie { .. } => {}
    }
    Ok(url)
  }
}

/// Thin GET-and-parse wrapper around the movie API.
///
/// Requests are cancelled by dropping or aborting the future that runs them;
/// callers that need ordering guarantees gate results on their own tokens.
#[derive(Debug, Clone)]
pub struct CatalogClient {
  http: Client,
  base: Url,
}

impl CatalogClient {
  pub fn new(base_url: &str) -> Result<Self, CatalogError> {
    let mut base = Url::parse(base_url).map_err(|_| CatalogError::Url(base_url.to_string()))?;
    if base.cannot_be_a_base() {
      return Err(CatalogError::Url(base_url.to_string()));
    }
    base.set_query(None);
    let http = Client::builder().timeout(constants().request_timeout()).build().map_err(CatalogError::Network)?;
    Ok(Self { http, base })
  }

  pub fn base(&self) -> &Url {
    &self.base
  }

  pub fn url_for(&self, request: &CatalogRequest) -> Result<Url, CatalogError> {
    request.url(&self.base)
  }

  /// GET a resource and parse it as JSON. Non-2xx statuses are failures.
  pub async fn get_json(&self, request: &CatalogRequest) -> Result<Value, CatalogError> {
    let url = self.url_for(request)?;
    debug!(url = %url, page = ?request.page(), "catalog: GET");
    let response = self.http.get(url).send().await.map_err(CatalogError::Network)?;
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(CatalogError::Status { status, body });
    }
    response.json::<Value>().await.map_err(CatalogError::Decode)
  }

  /// One page of movies; unrecognized shapes are an empty page.
  pub async fn fetch_page(&self, request: &CatalogRequest) -> Result<Vec<Movie>, CatalogError> {
    self.get_json(request).await.map(|v| extract_movies(&v))
  }

  pub async fn fetch_genres(&self) -> Result<Vec<GenreTag>, CatalogError> {
    self.get_json(&CatalogRequest::Genres).await.map(|v| extract_genres(&v))
  }

  pub async fn fetch_movie(&self, id: &MovieId) -> Result<MovieDetail, CatalogError> {
    let value = self.get_json(&CatalogRequest::Movie { id: id.clone() }).await?;
    Ok(MovieDetail::from_json(&value, id))
  }
}
