//! Événements émis par les opérations des mirrors
//!
//! Chaque événement est enveloppé dans un [`Envelope`] qui porte l'identifiant
//! de la requête, le mirror émetteur et l'opération. Sérialisé en JSON,
//! l'événement est aplati dans l'enveloppe avec un champ `type` :
//!
//! ```json
//! {"request_id":7,"mirror":"komga","operation":"chapter","type":"page","index":0,"src":"/files/ab.png","lastpage":false}
//! ```

use crate::descriptor::MirrorInfo;
use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opérations exposées par un mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Search,
    Manga,
    Chapter,
    Recommend,
    MangaFromChapterUrl,
}

impl Operation {
    /// Opérations qui émettent plusieurs événements terminés par `done`
    pub fn is_streamed(&self) -> bool {
        matches!(
            self,
            Operation::Search | Operation::Chapter | Operation::Recommend
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Search => "search",
            Operation::Manga => "manga",
            Operation::Chapter => "chapter",
            Operation::Recommend => "recommend",
            Operation::MangaFromChapterUrl => "manga_from_chapter_url",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dernier chapitre paru d'une série
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastRelease {
    pub chapter: f64,
    pub name: String,
}

/// Résultat de recherche ou de recommandation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// `mirror/lang/path`
    pub id: String,
    pub mirrorinfo: MirrorInfo,
    pub name: String,
    pub url: String,
    pub covers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synopsis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_release: Option<LastRelease>,
    pub lang: String,
}

/// Chapitre d'une série
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    /// `mangaId@chapterPath`
    pub id: String,
    pub name: String,
    pub number: f64,
    pub url: String,
    /// Date de parution en millisecondes depuis l'epoch
    pub date: i64,
    pub read: bool,
}

/// Fiche détaillée d'une série
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MangaDetail {
    pub id: String,
    pub url: String,
    pub lang: String,
    pub name: String,
    pub synopsis: Option<String>,
    pub covers: Vec<String>,
    pub authors: Vec<String>,
    pub tags: Vec<String>,
    /// Triés par numéro décroissant
    pub chapters: Vec<Chapter>,
    pub mirror: String,
}

/// Série propriétaire d'un chapitre
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MangaLocation {
    pub url: String,
    pub lang: String,
    pub mirror: String,
}

/// Contenu d'un événement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Search(SearchResult),
    Recommend(SearchResult),
    Manga(MangaDetail),
    /// Page téléchargée ; `src` est un handle `/files/...` ou une URL `data:`
    Page {
        index: usize,
        src: String,
        lastpage: bool,
    },
    /// Échec du téléchargement d'une page, le flux continue
    PageError {
        index: usize,
        lastpage: bool,
        error: ErrorKind,
    },
    /// Résultat de `manga_from_chapter_url` ; `None` si l'URL n'est pas reconnue
    MangaUrl { found: Option<MangaLocation> },
    Error {
        error: ErrorKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trace: Option<String>,
    },
    Done,
}

impl Event {
    pub fn is_done(&self) -> bool {
        matches!(self, Event::Done)
    }
}

/// Événement adressé à une requête cliente
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub request_id: u64,
    pub mirror: String,
    pub operation: Operation,
    #[serde(flatten)]
    pub event: Event,
}
