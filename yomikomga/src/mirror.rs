//! Mirror Komga
//!
//! Komga est un serveur de bibliothèque auto-hébergé : une série correspond à
//! un manga, un livre à un chapitre. Toutes les requêtes passent par la file à
//! débit limité du mirror et sont authentifiées en basique.

use crate::api::{build_client, Image, KomgaApi};
use crate::error::{KomgaError, Result};
use crate::models::{Book, Page, Series};
use crate::options::KomgaOptions;
use crate::urls::{
    is_chapter_page, is_manga_page, series_id, strip_query, strip_server, to_api_book_path,
};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};
use yomicache::{FileServer, extension_for, filename_from_url};
use yomisource::{
    Chapter, ChapterRequest, ErrorKind, Event, LastRelease, MangaDetail, MangaLocation, Mirror,
    MirrorDescriptor, MirrorError, MirrorMeta, MirrorOptions, OperationContext,
    RateLimitedQueue, SearchResult, lang_or_default, merge_settings, qualified_id,
};

/// Nom du mirror, préfixe de tous ses identifiants
pub const NAME: &str = "komga";

/// Espacement par défaut entre deux appels au serveur
pub const WAIT_TIME: Duration = Duration::from_millis(200);

/// Nombre maximal de séries ou de livres demandés en une fois
const PAGE_SIZE: &str = "2000";

const SORT_BY_NUMBER_DESC: &str = "metadata.numberSort,desc";

pub struct Komga {
    descriptor: MirrorDescriptor,
    options: RwLock<KomgaOptions>,
    queue: RateLimitedQueue,
    client: Client,
    files: Option<Arc<FileServer>>,
}

impl Komga {
    /// Crée le mirror
    ///
    /// Sans serveur de fichiers, les images sont toujours renvoyées en URL `data:`.
    pub fn new(options: KomgaOptions, files: Option<Arc<FileServer>>) -> Result<Self> {
        Ok(Self {
            descriptor: MirrorDescriptor {
                name: NAME.to_string(),
                display_name: "Komga".to_string(),
                langs: vec!["en".to_string(), "fr".to_string()],
                wait_time: WAIT_TIME,
                meta: MirrorMeta {
                    speed: 1.0,
                    quality: 1.0,
                    popularity: 1.0,
                },
            },
            options: RwLock::new(options),
            queue: RateLimitedQueue::new(WAIT_TIME),
            client: build_client()?,
            files,
        })
    }

    /// Change l'espacement entre deux appels
    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.descriptor.wait_time = wait_time;
        self.queue = RateLimitedQueue::new(wait_time);
        self
    }

    /// Copie des réglages courants
    pub fn komga_options(&self) -> KomgaOptions {
        self.options.read().unwrap().clone()
    }

    fn api(&self, options: &KomgaOptions) -> Result<KomgaApi> {
        let credentials = options.credentials()?;
        Ok(KomgaApi::new(self.client.clone(), credentials))
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        api: &KomgaApi,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        self.queue.enqueue(|| api.get(path, params)).await
    }

    /// Télécharge une image et la rend accessible au client
    async fn download_image(&self, api: &KomgaApi, path: &str, options: &KomgaOptions) -> Result<String> {
        let image = self.queue.enqueue(|| api.image(path)).await?;
        Ok(self.publish(image, options.cache).await)
    }

    /// Handle du cache de fichiers, ou URL `data:` si le cache est désactivé
    ///
    /// Un échec d'écriture n'interrompt pas le flux : il est journalisé et le
    /// handle est renvoyé quand même.
    async fn publish(&self, image: Image, cache: bool) -> String {
        match &self.files {
            Some(files) if cache => {
                let filename = filename_from_url(&image.url, extension_for(&image.content_type));
                match files.try_serve(&image.bytes, &filename, None).await {
                    Ok(handle) => handle,
                    Err(e) => {
                        let err = MirrorError::from(KomgaError::from(e));
                        warn!(mirror = NAME, filename = %filename, kind = %err.kind(), error = %err, "Cannot cache image");
                        FileServer::handle_for(&filename)
                    }
                }
            }
            _ => format!(
                "data:{};base64,{}",
                image.content_type,
                STANDARD.encode(&image.bytes)
            ),
        }
    }

    async fn covers(&self, api: &KomgaApi, series_id: &str, options: &KomgaOptions) -> Vec<String> {
        let path = format!("/series/{}/thumbnail", series_id);
        match self.download_image(api, &path, options).await {
            Ok(src) => vec![src],
            Err(e) => {
                debug!(mirror = NAME, series = %series_id, error = %e, "No cover");
                Vec::new()
            }
        }
    }

    async fn last_release(&self, api: &KomgaApi, series_id: &str) -> Option<LastRelease> {
        let path = format!("/series/{}/books", series_id);
        match self
            .fetch::<Page<Book>>(api, &path, &[("sort", SORT_BY_NUMBER_DESC)])
            .await
        {
            Ok(books) => books.content.first().map(|book| LastRelease {
                chapter: book.metadata.number_sort,
                name: book.metadata.title.clone(),
            }),
            Err(e) => {
                warn!(mirror = NAME, series = %series_id, error = %e, "Cannot fetch last release");
                None
            }
        }
    }

    fn series_result(
        &self,
        series: &Series,
        covers: Vec<String>,
        last_release: Option<LastRelease>,
        with_synopsis: bool,
    ) -> SearchResult {
        let lang = lang_or_default(series.metadata.language.as_deref());
        let url = format!("/series/{}", series.id);
        SearchResult {
            id: qualified_id(NAME, &lang, &url),
            mirrorinfo: self.descriptor.info(),
            name: series.metadata.title.clone(),
            url,
            covers,
            synopsis: if with_synopsis {
                series.metadata.summary.clone()
            } else {
                None
            },
            last_release,
            lang,
        }
    }

    async fn search_series(&self, query: &str, ctx: &OperationContext) -> Result<()> {
        let options = self.komga_options();
        let api = self.api(&options)?;

        let listing: Page<Series> = self.fetch(&api, "/series", &[("search", query)]).await?;
        for series in &listing.content {
            if ctx.is_cancelled() {
                info!(mirror = NAME, "search canceled");
                break;
            }
            let covers = self.covers(&api, &series.id, &options).await;
            let last_release = self.last_release(&api, &series.id).await;
            ctx.emit(Event::Search(self.series_result(series, covers, last_release, true)));
        }
        Ok(())
    }

    async fn recommend_series(&self, ctx: &OperationContext) -> Result<()> {
        let options = self.komga_options();
        let api = self.api(&options)?;

        let listing: Page<Series> = self.fetch(&api, "/series", &[("size", PAGE_SIZE)]).await?;
        for series in &listing.content {
            if ctx.is_cancelled() {
                info!(mirror = NAME, "fetching recommendations canceled");
                break;
            }
            let covers = self.covers(&api, &series.id, &options).await;
            ctx.emit(Event::Recommend(self.series_result(series, covers, None, false)));
        }
        Ok(())
    }

    /// `None` si l'annulation a été observée
    async fn manga_detail(&self, url: &str, ctx: &OperationContext) -> Result<Option<MangaDetail>> {
        let url = strip_query(url);
        if !is_manga_page(url) {
            return Err(KomgaError::InvalidLink {
                expected: "manga",
                url: url.to_string(),
            });
        }
        let options = self.komga_options();
        let api = self.api(&options)?;

        let series: Series = self.fetch(&api, url, &[]).await?;
        if ctx.is_cancelled() {
            return Ok(None);
        }

        let lang = lang_or_default(series.metadata.language.as_deref());
        let link = format!("/series/{}", series.id);
        let manga_id = qualified_id(NAME, &lang, &link);
        let covers = self.covers(&api, &series.id, &options).await;

        let books: Page<Book> = self
            .fetch(
                &api,
                &format!("{}/books", link),
                &[("size", PAGE_SIZE), ("sort", SORT_BY_NUMBER_DESC)],
            )
            .await?;
        if ctx.is_cancelled() {
            return Ok(None);
        }

        let mut chapters: Vec<Chapter> = books
            .content
            .iter()
            .map(|book| {
                let chapter_link = format!("/books/{}", book.id);
                Chapter {
                    id: format!("{}@{}", manga_id, chapter_link),
                    name: book.metadata.title.clone(),
                    number: book.metadata.number_sort,
                    url: chapter_link,
                    date: book.date_millis(),
                    read: false,
                }
            })
            .collect();
        // tri stable : les ex aequo gardent l'ordre du serveur
        chapters.sort_by(|a, b| b.number.total_cmp(&a.number));

        let authors = series
            .books_metadata
            .authors
            .iter()
            .map(|a| a.name.clone())
            .collect();
        let tags = series
            .books_metadata
            .tags
            .iter()
            .chain(series.metadata.genres.iter())
            .cloned()
            .collect();

        Ok(Some(MangaDetail {
            id: manga_id,
            url: url.to_string(),
            lang,
            name: series.metadata.title.clone(),
            synopsis: series.metadata.summary.clone(),
            covers,
            authors,
            tags,
            chapters,
            mirror: NAME.to_string(),
        }))
    }

    async fn chapter_pages(
        &self,
        url: &str,
        request: &ChapterRequest,
        ctx: &OperationContext,
    ) -> Result<()> {
        let url = strip_query(url);
        if !is_chapter_page(url) {
            return Err(KomgaError::InvalidLink {
                expected: "chapter",
                url: url.to_string(),
            });
        }
        let options = self.komga_options();
        let api = self.api(&options)?;

        let book: Book = self.fetch(&api, &to_api_book_path(url), &[]).await?;
        let pages_count = book.media.pages_count;
        if let Some(progress) = &request.progress {
            progress(pages_count);
        }

        for index in 0..pages_count {
            if ctx.is_cancelled() {
                info!(mirror = NAME, "fetching chapter canceled");
                break;
            }
            if request.retry_index.is_some_and(|retry| retry != index) {
                continue;
            }

            let lastpage = index + 1 == pages_count;
            // Komga numérote les pages à partir de 1
            let path = format!("/books/{}/pages/{}", book.id, index + 1);
            match self.download_image(&api, &path, &options).await {
                Ok(src) => ctx.emit(Event::Page {
                    index,
                    src,
                    lastpage,
                }),
                Err(e) => {
                    warn!(mirror = NAME, book = %book.id, index, error = %e, "Cannot fetch page");
                    ctx.emit(Event::PageError {
                        index,
                        lastpage,
                        error: ErrorKind::FetchError,
                    });
                }
            }
        }
        Ok(())
    }

    async fn resolve_manga_url(&self, url: &str, lang: Option<&str>) -> Result<Option<MangaLocation>> {
        let options = self.komga_options();
        let url = strip_server(strip_query(url), options.host.as_deref(), options.port);
        let lang = match lang {
            Some(l) if !l.is_empty() => l.to_string(),
            _ => self.descriptor.default_lang().to_string(),
        };

        if !is_manga_page(&url) && !is_chapter_page(&url) {
            return Ok(None);
        }
        let api = self.api(&options)?;

        let path = to_api_book_path(&url);
        let series = match series_id(&path) {
            Some(id) => id.to_string(),
            None => {
                let book: Book = self.fetch(&api, &path, &[]).await?;
                book.series_id
                    .ok_or_else(|| KomgaError::NotFound(format!("series of {}", path)))?
            }
        };

        Ok(Some(MangaLocation {
            url: format!("/series/{}", series),
            lang,
            mirror: NAME.to_string(),
        }))
    }
}

#[async_trait]
impl Mirror for Komga {
    fn descriptor(&self) -> &MirrorDescriptor {
        &self.descriptor
    }

    fn options(&self) -> MirrorOptions {
        let options = self.options.read().unwrap();
        MirrorOptions {
            enabled: options.enabled,
            cache: options.cache,
        }
    }

    fn settings(&self) -> Value {
        serde_json::to_value(self.komga_options()).unwrap_or(Value::Null)
    }

    fn change_settings(&self, patch: &Map<String, Value>) -> yomisource::Result<()> {
        let mut options = self.options.write().unwrap();
        *options = merge_settings(&*options, patch)?;
        Ok(())
    }

    fn is_manga_page(&self, url: &str) -> bool {
        let res = is_manga_page(url);
        if !res {
            debug!(mirror = NAME, url = %url, "not a manga page");
        }
        res
    }

    fn is_chapter_page(&self, url: &str) -> bool {
        let res = is_chapter_page(url);
        if !res {
            debug!(mirror = NAME, url = %url, "not a chapter page");
        }
        res
    }

    async fn search(&self, query: &str, ctx: &OperationContext) {
        if let Err(e) = self.search_series(query, ctx).await {
            warn!(mirror = NAME, error = %e, "error while searching mangas");
            ctx.fail(&MirrorError::from(e));
        }
        ctx.done();
    }

    async fn manga(&self, url: &str, _lang: &str, ctx: &OperationContext) {
        match self.manga_detail(url, ctx).await {
            Ok(Some(detail)) => ctx.emit(Event::Manga(detail)),
            Ok(None) => info!(mirror = NAME, "fetching manga canceled"),
            Err(e) => {
                warn!(mirror = NAME, url = %url, error = %e, "error while fetching manga");
                ctx.fail(&MirrorError::from(e));
            }
        }
    }

    async fn chapter(&self, url: &str, _lang: &str, request: ChapterRequest, ctx: &OperationContext) {
        if let Err(e) = self.chapter_pages(url, &request, ctx).await {
            warn!(mirror = NAME, url = %url, error = %e, "error while fetching chapter");
            ctx.fail(&MirrorError::from(e));
        }
        ctx.done();
    }

    async fn recommend(&self, ctx: &OperationContext) {
        if let Err(e) = self.recommend_series(ctx).await {
            warn!(mirror = NAME, error = %e, "error while recommending mangas");
            ctx.fail(&MirrorError::from(e));
        }
        ctx.done();
    }

    async fn manga_from_chapter_url(&self, url: &str, lang: Option<&str>, ctx: &OperationContext) {
        let found = match self.resolve_manga_url(url, lang).await {
            Ok(found) => found,
            Err(e) => {
                warn!(mirror = NAME, url = %url, error = %e, "error while fetching manga from chapter url");
                None
            }
        };
        ctx.emit(Event::MangaUrl { found });
    }
}
