//! Formes d'URL reconnues par le mirror Komga
//!
//! Les URLs manipulées sont des chemins relatifs au serveur (`/series/<id>`,
//! `/books/<id>`) ou des URLs de l'interface web (`/book/<id>/read`).

use regex::Regex;
use std::sync::LazyLock;

static MANGA_PAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^/series/\w+|/book/\w+$").expect("valid regex"));

static CHAPTER_PAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^/books/\w+|/book/\w+/read$").expect("valid regex"));

static SERIES_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/series/(\w+)").expect("valid regex"));

static BOOK_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"books?").expect("valid regex"));

/// Retire les paramètres de requête et le fragment
pub fn strip_query(url: &str) -> &str {
    match url.find(['?', '#']) {
        Some(pos) => &url[..pos],
        None => url,
    }
}

pub fn is_manga_page(url: &str) -> bool {
    MANGA_PAGE.is_match(strip_query(url))
}

pub fn is_chapter_page(url: &str) -> bool {
    CHAPTER_PAGE.is_match(strip_query(url))
}

/// Identifiant de série présent dans l'URL, s'il y en a un
pub fn series_id(url: &str) -> Option<&str> {
    SERIES_ID
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Ramène une URL de lecture à la ressource API du livre (`/book/x/read` → `/books/x`)
pub fn to_api_book_path(url: &str) -> String {
    let without_read = url.replacen("/read", "", 1);
    BOOK_SEGMENT.replace(&without_read, "books").into_owned()
}

/// Retire le préfixe `protocol://host:port` d'une URL du serveur configuré
pub fn strip_server(url: &str, host: Option<&str>, port: Option<u16>) -> String {
    let mut url = url.to_string();
    if let (Some(host), Some(port)) = (host.filter(|h| !h.is_empty()), port) {
        url = url.replacen(host, "", 1);
        url = url.replacen(&format!(":{}", port), "", 1);
        url = url.replacen("https://", "", 1).replacen("http://", "", 1);
    }
    url
}
