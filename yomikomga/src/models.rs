//! Structures de données renvoyées par l'API Komga

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

/// Page de résultats paginés (`/series`, `/series/{id}/books`)
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub content: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    pub id: String,
    pub metadata: SeriesMetadata,
    #[serde(default)]
    pub books_metadata: BooksMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeriesMetadata {
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BooksMetadata {
    #[serde(default)]
    pub authors: Vec<Author>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    #[serde(default)]
    pub series_id: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    pub media: Media,
    pub metadata: BookMetadata,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub pages_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookMetadata {
    pub title: String,
    pub number_sort: f64,
    #[serde(default)]
    pub release_date: Option<String>,
}

impl Book {
    /// Date de parution en millisecondes
    ///
    /// `releaseDate` en priorité, sinon la date d'ajout au serveur, sinon maintenant.
    pub fn date_millis(&self) -> i64 {
        self.metadata
            .release_date
            .as_deref()
            .and_then(parse_date)
            .or_else(|| self.created.as_deref().and_then(parse_date))
            .unwrap_or_else(|| Utc::now().timestamp_millis())
    }
}

fn parse_date(s: &str) -> Option<i64> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc().timestamp_millis());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}
