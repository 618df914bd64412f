use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::Value;
use std::fmt;

/// Identifier of a catalog movie. The API hands out numbers, but string ids
/// are accepted so favorites written by other clients still load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MovieId {
  Num(i64),
  Text(String),
}

impl MovieId {
  /// Read an id from a JSON value. `null`, `0` and `""` mean "no identifier".
  pub fn from_json(value: &Value) -> Option<Self> {
    match value {
      Value::Number(n) => n.as_i64().filter(|n| *n != 0).map(MovieId::Num),
      Value::String(s) => {
        let s = s.trim();
        if s.is_empty() {
          None
        } else if let Ok(n) = s.parse::<i64>() {
          (n != 0).then_some(MovieId::Num(n))
        } else {
          Some(MovieId::Text(s.to_string()))
        }
      }
      _ => None,
    }
  }
}

/// Stored ids go through [`MovieId::from_json`] so `"42"` and `42` match and
/// a missing id rejects the entry.
fn stored_movie_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<MovieId, D::Error> {
  let value = Value::deserialize(deserializer)?;
  MovieId::from_json(&value).ok_or_else(|| de::Error::custom(format!("unusable movie id: {}", value)))
}

impl fmt::Display for MovieId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      MovieId::Num(n) => write!(f, "{}", n),
      MovieId::Text(s) => f.write_str(s),
    }
  }
}

impl From<i64> for MovieId {
  fn from(n: i64) -> Self {
    MovieId::Num(n)
  }
}

/// A loosely typed scalar (year, country, rating) exactly as the API sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
  Int(i64),
  Float(f64),
  Text(String),
}

impl Scalar {
  fn from_json(value: &Value) -> Option<Self> {
    match value {
      Value::Number(n) => n.as_i64().map(Scalar::Int).or_else(|| n.as_f64().map(Scalar::Float)),
      Value::String(s) if !s.is_empty() => Some(Scalar::Text(s.clone())),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Scalar::Int(n) => Some(*n as f64),
      Scalar::Float(f) => Some(*f),
      Scalar::Text(s) => s.trim().parse().ok(),
    }
  }
}

impl fmt::Display for Scalar {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Scalar::Int(n) => write!(f, "{}", n),
      Scalar::Float(x) => write!(f, "{}", x),
      Scalar::Text(s) => f.write_str(s),
    }
  }
}

/// A genre attached to a movie: either `{ "name": "Drama" }` or a bare `"Drama"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenreRef {
  Named { name: String },
  Bare(String),
}

impl GenreRef {
  pub fn name(&self) -> &str {
    match self {
      GenreRef::Named { name } => name,
      GenreRef::Bare(name) => name,
    }
  }
}

/// A genre from the `/genres` listing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenreTag {
  pub name: String,
}

/// A movie as it appears in list responses.
#[derive(Debug, Clone, PartialEq)]
pub struct Movie {
  pub id: Option<MovieId>,
  pub title: String,
  pub poster: String,
  pub year: Option<Scalar>,
  pub country: Option<Scalar>,
  pub rating: Option<Scalar>,
  pub genres: Vec<GenreRef>,
}

/// First field among `keys` that is a non-empty string.
fn first_text(value: &Value, keys: &[&str]) -> Option<String> {
  keys.iter().filter_map(|k| value.get(*k)).find_map(|v| v.as_str().filter(|s| !s.is_empty()).map(str::to_string))
}

/// First field among `keys` that holds a usable scalar.
fn first_scalar(value: &Value, keys: &[&str]) -> Option<Scalar> {
  keys.iter().filter_map(|k| value.get(*k)).find_map(Scalar::from_json)
}

fn parse_genres(value: Option<&Value>) -> Vec<GenreRef> {
  let Some(Value::Array(items)) = value else { return Vec::new() };
  items
    .iter()
    .filter_map(|g| serde_json::from_value::<GenreRef>(g.clone()).ok())
    .filter(|g| !g.name().is_empty())
    .collect()
}

impl Movie {
  /// Build a movie from an arbitrary JSON object, applying the field
  /// fallbacks the catalog is known to need. Never fails.
  pub fn from_json(value: &Value) -> Self {
    Self {
      id: value.get("id").and_then(MovieId::from_json),
      title: first_text(value, &["title", "name"]).unwrap_or_else(|| "Untitled".to_string()),
      poster: first_text(value, &["poster", "image", "cover"]).unwrap_or_default(),
      year: first_scalar(value, &["year"]),
      country: first_scalar(value, &["country"]),
      rating: first_scalar(value, &["imdb_rating", "imdbRate", "rating"]),
      genres: parse_genres(value.get("genres")),
    }
  }
}

/// Normalize a paginated list response to a flat, ordered page of movies.
///
/// Accepts a bare array or an object carrying the array under `data`,
/// `movies` or `results` (checked in that order). Any other shape is an empty page.
pub fn extract_movies(resp: &Value) -> Vec<Movie> {
  let list = match resp {
    Value::Array(items) => Some(items),
    Value::Object(_) => ["data", "movies", "results"].iter().find_map(|k| resp.get(*k).and_then(Value::as_array)),
    _ => None,
  };
  list.map(|items| items.iter().filter(|v| v.is_object()).map(Movie::from_json).collect()).unwrap_or_default()
}

/// Parse the `/genres` listing. Only a bare array is meaningful.
pub fn extract_genres(resp: &Value) -> Vec<GenreTag> {
  let Value::Array(items) = resp else { return Vec::new() };
  items.iter().filter_map(|g| serde_json::from_value::<GenreTag>(g.clone()).ok()).collect()
}

/// One third-party score from the `ratings` field of a movie detail.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceRating {
  #[serde(rename = "Source")]
  pub source: String,
  #[serde(rename = "Value")]
  pub value: String,
}

/// `ratings` arrives as a JSON document embedded in a string. Anything
/// unparseable yields no ratings.
pub fn parse_ratings(raw: Option<&str>) -> Vec<SourceRating> {
  let Some(raw) = raw.filter(|s| !s.is_empty()) else { return Vec::new() };
  match serde_json::from_str::<Value>(raw) {
    Ok(Value::Array(items)) => {
      items.into_iter().filter_map(|r| serde_json::from_value::<SourceRating>(r).ok()).collect()
    }
    _ => Vec::new(),
  }
}

/// Full movie record from `GET movies/<id>`.
#[derive(Debug, Clone, PartialEq)]
pub struct MovieDetail {
  pub movie: Movie,
  pub plot: Option<String>,
  pub runtime: Option<Scalar>,
  pub rated: Option<Scalar>,
  pub director: Option<String>,
  pub writer: Option<String>,
  pub actors: Option<String>,
  pub language: Option<String>,
  pub awards: Option<String>,
  pub imdb_votes: Option<Scalar>,
  pub images: Vec<String>,
  pub ratings: Vec<SourceRating>,
}

impl MovieDetail {
  /// `route_id` is the id the detail was requested with; it wins over the
  /// body so favorites toggled from this view always carry the requested id.
  pub fn from_json(value: &Value, route_id: &MovieId) -> Self {
    let mut movie = Movie::from_json(value);
    movie.id = Some(route_id.clone());
    let images = value
      .get("images")
      .and_then(Value::as_array)
      .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
      .unwrap_or_default();
    Self {
      movie,
      plot: first_text(value, &["plot"]),
      runtime: first_scalar(value, &["runtime"]),
      rated: first_scalar(value, &["rated"]),
      director: first_text(value, &["director"]),
      writer: first_text(value, &["writer"]),
      actors: first_text(value, &["actors"]),
      language: first_text(value, &["language"]),
      awards: first_text(value, &["awards"]),
      imdb_votes: first_scalar(value, &["imdb_votes"]),
      images,
      ratings: parse_ratings(value.get("ratings").and_then(Value::as_str)),
    }
  }

  /// IMDB rating as a number, `0.0` when missing or unparseable.
  pub fn imdb_score(&self) -> f64 {
    self.movie.rating.as_ref().and_then(Scalar::as_f64).filter(|r| r.is_finite()).unwrap_or(0.0)
  }

  /// Poster URL, else the first still.
  pub fn artwork(&self) -> Option<&str> {
    Some(self.movie.poster.as_str()).filter(|p| !p.is_empty()).or_else(|| self.images.first().map(String::as_str))
  }

  pub fn rating_from(&self, source: &str) -> Option<&str> {
    self.ratings.iter().find(|r| r.source == source).map(|r| r.value.as_str())
  }
}

/// The reduced projection of a movie kept in the favorites collection.
///
/// Stored independently of [`Movie`] so persisted favorites stay readable if
/// the catalog's record shape drifts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteEntry {
  #[serde(deserialize_with = "stored_movie_id")]
  pub id: MovieId,
  pub title: String,
  #[serde(default)]
  pub poster: String,
  #[serde(default)]
  pub year: Option<Scalar>,
  #[serde(default)]
  pub country: Option<Scalar>,
  #[serde(default)]
  pub imdb_rating: Option<Scalar>,
  #[serde(default)]
  pub genres: Vec<GenreRef>,
}

impl FavoriteEntry {
  /// `None` when the movie has no identifier: such movies cannot be favorited.
  pub fn from_movie(movie: &Movie) -> Option<Self> {
    let id = movie.id.clone()?;
    Some(Self {
      id,
      title: movie.title.clone(),
      poster: movie.poster.clone(),
      year: movie.year.clone(),
      country: movie.country.clone(),
      imdb_rating: movie.rating.clone(),
      genres: movie.genres.clone(),
    })
  }

  /// Rebuild a list-row movie from the stored projection.
  pub fn to_movie(&self) -> Movie {
    Movie {
      id: Some(self.id.clone()),
      title: self.title.clone(),
      poster: self.poster.clone(),
      year: self.year.clone(),
      country: self.country.clone(),
      rating: self.imdb_rating.clone(),
      genres: self.genres.clone(),
    }
  }
}
