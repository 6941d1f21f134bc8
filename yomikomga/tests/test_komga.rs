use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use yomicache::FileServer;
use yomikomga::{Komga, KomgaOptions};
use yomisource::{
    CancellationToken, ChapterRequest, ErrorKind, Event, Mirror, OperationContext, Request, run,
};

// base64("admin:secret")
const BASIC_AUTH: &str = "Basic YWRtaW46c2VjcmV0";
const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";
const JPEG: &[u8] = b"\xff\xd8\xfffake";

struct Fixture {
    server: ServerGuard,
    komga: Arc<Komga>,
    files: Arc<FileServer>,
    _dir: TempDir,
}

async fn fixture() -> Fixture {
    let server = Server::new_async().await;
    let host_with_port = server.host_with_port();
    let (host, port) = host_with_port.rsplit_once(':').unwrap();

    let options = KomgaOptions {
        login: Some("admin".into()),
        password: Some("secret".into()),
        host: Some(host.to_string()),
        port: Some(port.parse().unwrap()),
        ..KomgaOptions::default()
    };

    let dir = TempDir::new().unwrap();
    let files = Arc::new(FileServer::new(Some(dir.path()), "files").unwrap());
    let komga = Komga::new(options, Some(files.clone()))
        .unwrap()
        .with_wait_time(Duration::ZERO);

    Fixture {
        server,
        komga: Arc::new(komga),
        files,
        _dir: dir,
    }
}

async fn collect(komga: Arc<Komga>, request: Request, token: Option<CancellationToken>) -> Vec<Event> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let ctx = OperationContext::new(1, "komga", request.operation(), tx, token);
    run(komga, request, &ctx).await;
    drop(ctx);

    let mut events = Vec::new();
    while let Some(envelope) = rx.recv().await {
        assert_eq!(envelope.mirror, "komga");
        assert_eq!(envelope.request_id, 1);
        events.push(envelope.event);
    }
    events
}

fn book(id: &str, number: f64, title: &str, pages: usize) -> serde_json::Value {
    json!({
        "id": id,
        "seriesId": "S1",
        "created": "2021-03-04T10:00:00Z",
        "media": { "pagesCount": pages },
        "metadata": { "title": title, "numberSort": number, "releaseDate": null },
    })
}

#[tokio::test]
async fn test_search_emits_one_result_per_series() {
    let mut f = fixture().await;

    let listing = f
        .server
        .mock("GET", "/api/v1/series")
        .match_query(Matcher::UrlEncoded("search".into(), "berserk".into()))
        .match_header("authorization", BASIC_AUTH)
        .with_header("content-type", "application/json")
        .with_body(
            json!({ "content": [
                { "id": "S1", "metadata": { "title": "Berserk", "summary": "Guts", "language": "en" } },
                { "id": "S2", "metadata": { "title": "Berserk Prototype", "language": "" } },
            ]})
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    f.server
        .mock("GET", "/api/v1/series/S1/thumbnail")
        .match_query(Matcher::Any)
        .with_header("content-type", "image/png")
        .with_body(PNG)
        .create_async()
        .await;
    f.server
        .mock("GET", "/api/v1/series/S2/thumbnail")
        .match_query(Matcher::Any)
        .with_status(404)
        .create_async()
        .await;
    f.server
        .mock("GET", "/api/v1/series/S1/books")
        .match_query(Matcher::UrlEncoded(
            "sort".into(),
            "metadata.numberSort,desc".into(),
        ))
        .with_body(json!({ "content": [book("B2", 2.0, "Vol. 2", 5), book("B1", 1.0, "Vol. 1", 5)] }).to_string())
        .create_async()
        .await;
    f.server
        .mock("GET", "/api/v1/series/S2/books")
        .match_query(Matcher::Any)
        .with_body(json!({ "content": [] }).to_string())
        .create_async()
        .await;

    let events = collect(
        f.komga.clone(),
        Request::Search {
            query: "berserk".into(),
        },
        Some(CancellationToken::new()),
    )
    .await;
    listing.assert_async().await;

    assert_eq!(events.len(), 3);
    let Event::Search(first) = &events[0] else {
        panic!("expected a search result, got {:?}", events[0]);
    };
    assert_eq!(first.id, "komga/en/series/S1");
    assert_eq!(first.url, "/series/S1");
    assert_eq!(first.synopsis.as_deref(), Some("Guts"));
    assert_eq!(first.mirrorinfo.name, "komga");
    let release = first.last_release.as_ref().unwrap();
    assert_eq!(release.chapter, 2.0);
    assert_eq!(release.name, "Vol. 2");
    assert_eq!(first.covers.len(), 1);
    assert!(first.covers[0].starts_with("/files/"));
    assert!(first.covers[0].ends_with(".png"));
    assert_eq!(f.files.get(&first.covers[0]).await.as_deref(), Some(PNG));

    let Event::Search(second) = &events[1] else {
        panic!("expected a search result, got {:?}", events[1]);
    };
    assert_eq!(second.id, "komga/xx/series/S2");
    assert_eq!(second.lang, "xx");
    assert!(second.covers.is_empty());
    assert!(second.last_release.is_none());

    assert_eq!(events[2], Event::Done);
}

#[tokio::test]
async fn test_missing_credentials_are_reported_without_network() {
    let komga = Arc::new(
        Komga::new(KomgaOptions::default(), None)
            .unwrap()
            .with_wait_time(Duration::ZERO),
    );

    let events = collect(komga.clone(), Request::Recommend, None).await;
    assert_eq!(events.len(), 2);
    assert!(matches!(
        events[0],
        Event::Error {
            error: ErrorKind::CredentialsError,
            ..
        }
    ));
    assert_eq!(events[1], Event::Done);

    let empty_login = json!({ "login": "", "password": "x", "host": "h", "port": 1 });
    komga.change_settings(empty_login.as_object().unwrap()).unwrap();
    let events = collect(
        komga,
        Request::Search {
            query: "x".into(),
        },
        None,
    )
    .await;
    assert!(matches!(
        events[0],
        Event::Error {
            error: ErrorKind::CredentialsError,
            ..
        }
    ));
}

#[tokio::test]
async fn test_cancelled_search_stops_between_items() {
    let mut f = fixture().await;
    f.server
        .mock("GET", "/api/v1/series")
        .match_query(Matcher::Any)
        .with_body(json!({ "content": [{ "id": "S1", "metadata": { "title": "Berserk" } }] }).to_string())
        .expect(1)
        .create_async()
        .await;
    let thumbnail = f
        .server
        .mock("GET", "/api/v1/series/S1/thumbnail")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let token = CancellationToken::new();
    token.cancel();
    let events = collect(
        f.komga.clone(),
        Request::Search {
            query: "berserk".into(),
        },
        Some(token),
    )
    .await;

    assert_eq!(events, vec![Event::Done]);
    thumbnail.assert_async().await;
}

#[tokio::test]
async fn test_manga_rejects_invalid_link_without_network() {
    let mut f = fixture().await;
    let any = f
        .server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let events = collect(
        f.komga.clone(),
        Request::Manga {
            url: "/not/a/series/path".into(),
            lang: "en".into(),
        },
        None,
    )
    .await;

    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        Event::Error {
            error: ErrorKind::InvalidLinkError,
            ..
        }
    ));
    any.assert_async().await;
}

#[tokio::test]
async fn test_manga_sorts_chapters_descending_and_stable() {
    let mut f = fixture().await;
    f.server
        .mock("GET", "/api/v1/series/S1")
        .match_query(Matcher::Any)
        .with_body(
            json!({
                "id": "S1",
                "metadata": { "title": "Berserk", "summary": "Guts", "language": "en", "genres": ["seinen"] },
                "booksMetadata": { "authors": [{ "name": "Kentaro Miura", "role": "writer" }], "tags": ["dark"] },
            })
            .to_string(),
        )
        .create_async()
        .await;
    f.server
        .mock("GET", "/api/v1/series/S1/thumbnail")
        .match_query(Matcher::Any)
        .with_header("content-type", "image/jpeg")
        .with_body(JPEG)
        .create_async()
        .await;
    let mut released = book("B1", 1.0, "Vol. 1", 3);
    released["metadata"]["releaseDate"] = json!("2020-01-01");
    f.server
        .mock("GET", "/api/v1/series/S1/books")
        .match_query(Matcher::UrlEncoded("size".into(), "2000".into()))
        .with_body(
            json!({ "content": [
                released,
                book("B3", 3.0, "Vol. 3", 3),
                book("B2a", 2.0, "Vol. 2a", 3),
                book("B2b", 2.0, "Vol. 2b", 3),
            ]})
            .to_string(),
        )
        .create_async()
        .await;

    let events = collect(
        f.komga.clone(),
        Request::Manga {
            url: "/series/S1?tab=books".into(),
            lang: "en".into(),
        },
        None,
    )
    .await;

    assert_eq!(events.len(), 1);
    let Event::Manga(detail) = &events[0] else {
        panic!("expected a manga detail, got {:?}", events[0]);
    };
    assert_eq!(detail.id, "komga/en/series/S1");
    assert_eq!(detail.url, "/series/S1");
    assert_eq!(detail.authors, vec!["Kentaro Miura"]);
    assert_eq!(detail.tags, vec!["dark", "seinen"]);
    assert_eq!(detail.covers.len(), 1);

    let ids: Vec<_> = detail.chapters.iter().map(|c| c.url.as_str()).collect();
    assert_eq!(ids, vec!["/books/B3", "/books/B2a", "/books/B2b", "/books/B1"]);
    assert_eq!(detail.chapters[0].id, "komga/en/series/S1@/books/B3");
    assert_eq!(detail.chapters[3].date, 1_577_836_800_000);
    assert_eq!(detail.chapters[0].date, 1_614_852_000_000);
}

#[tokio::test]
async fn test_chapter_retry_downloads_a_single_page() {
    let mut f = fixture().await;
    f.server
        .mock("GET", "/api/v1/books/B1")
        .match_query(Matcher::Any)
        .with_body(book("B1", 1.0, "Vol. 1", 10).to_string())
        .create_async()
        .await;
    let page = f
        .server
        .mock("GET", "/api/v1/books/B1/pages/4")
        .match_query(Matcher::Any)
        .with_header("content-type", "image/jpeg")
        .with_body(JPEG)
        .expect(1)
        .create_async()
        .await;

    let events = collect(
        f.komga.clone(),
        Request::Chapter {
            url: "/books/B1".into(),
            lang: "en".into(),
            request: ChapterRequest::retry(3),
        },
        Some(CancellationToken::new()),
    )
    .await;

    assert_eq!(events.len(), 2);
    let Event::Page {
        index,
        src,
        lastpage,
    } = &events[0]
    else {
        panic!("expected a page, got {:?}", events[0]);
    };
    assert_eq!(*index, 3);
    assert!(!lastpage);
    assert_eq!(f.files.get(src).await.as_deref(), Some(JPEG));
    assert_eq!(events[1], Event::Done);
    page.assert_async().await;
}

#[tokio::test]
async fn test_chapter_streams_pages_in_order_with_page_errors() {
    let mut f = fixture().await;
    f.server
        .mock("GET", "/api/v1/books/B1")
        .match_query(Matcher::Any)
        .with_body(book("B1", 1.0, "Vol. 1", 3).to_string())
        .create_async()
        .await;
    for n in 1..=2 {
        f.server
            .mock("GET", format!("/api/v1/books/B1/pages/{}", n).as_str())
            .match_query(Matcher::Any)
            .with_header("content-type", "image/png")
            .with_body(format!("page {}", n))
            .create_async()
            .await;
    }
    f.server
        .mock("GET", "/api/v1/books/B1/pages/3")
        .match_query(Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    let expected = Arc::new(Mutex::new(None));
    let seen = expected.clone();
    let request = ChapterRequest::default().with_progress(move |n| {
        *seen.lock().unwrap() = Some(n);
    });

    let events = collect(
        f.komga.clone(),
        Request::Chapter {
            url: "/book/B1/read".into(),
            lang: "en".into(),
            request,
        },
        None,
    )
    .await;

    assert_eq!(*expected.lock().unwrap(), Some(3));
    assert_eq!(events.len(), 4);
    assert!(matches!(events[0], Event::Page { index: 0, lastpage: false, .. }));
    assert!(matches!(events[1], Event::Page { index: 1, lastpage: false, .. }));
    assert_eq!(
        events[2],
        Event::PageError {
            index: 2,
            lastpage: true,
            error: ErrorKind::FetchError,
        }
    );
    assert_eq!(events[3], Event::Done);
}

#[tokio::test]
async fn test_chapter_cancelled_before_first_page() {
    let mut f = fixture().await;
    f.server
        .mock("GET", "/api/v1/books/B1")
        .match_query(Matcher::Any)
        .with_body(book("B1", 1.0, "Vol. 1", 5).to_string())
        .create_async()
        .await;
    let pages = f
        .server
        .mock("GET", Matcher::Regex(r"^/api/v1/books/B1/pages/\d+".into()))
        .expect(0)
        .create_async()
        .await;

    let token = CancellationToken::new();
    let trigger = token.clone();
    let request = ChapterRequest::default().with_progress(move |_| trigger.cancel());

    let events = collect(
        f.komga.clone(),
        Request::Chapter {
            url: "/books/B1".into(),
            lang: "en".into(),
            request,
        },
        Some(token),
    )
    .await;

    assert_eq!(events, vec![Event::Done]);
    pages.assert_async().await;
}

#[tokio::test]
async fn test_chapter_rejects_invalid_link() {
    let f = fixture().await;
    let events = collect(
        f.komga.clone(),
        Request::Chapter {
            url: "/series/S1".into(),
            lang: "en".into(),
            request: ChapterRequest::default(),
        },
        None,
    )
    .await;

    assert_eq!(events.len(), 2);
    assert!(matches!(
        events[0],
        Event::Error {
            error: ErrorKind::InvalidLinkError,
            ..
        }
    ));
    assert_eq!(events[1], Event::Done);
}

#[tokio::test]
async fn test_images_are_inlined_when_cache_is_off() {
    let mut f = fixture().await;
    f.server
        .mock("GET", "/api/v1/books/B1")
        .match_query(Matcher::Any)
        .with_body(book("B1", 1.0, "Vol. 1", 1).to_string())
        .create_async()
        .await;
    f.server
        .mock("GET", "/api/v1/books/B1/pages/1")
        .match_query(Matcher::Any)
        .with_header("content-type", "image/jpeg")
        .with_body(JPEG)
        .create_async()
        .await;

    let patch = json!({ "cache": false });
    f.komga.change_settings(patch.as_object().unwrap()).unwrap();
    assert!(!f.komga.options().cache);
    assert_eq!(f.komga.settings()["login"], "admin");

    let events = collect(
        f.komga.clone(),
        Request::Chapter {
            url: "/books/B1".into(),
            lang: "en".into(),
            request: ChapterRequest::default(),
        },
        None,
    )
    .await;

    let Event::Page { src, lastpage, .. } = &events[0] else {
        panic!("expected a page, got {:?}", events[0]);
    };
    assert!(src.starts_with("data:image/jpeg;base64,"));
    assert!(lastpage);
}

#[tokio::test]
async fn test_manga_from_chapter_url() {
    let mut f = fixture().await;
    let lookup = f
        .server
        .mock("GET", "/api/v1/books/B1")
        .match_query(Matcher::Any)
        .with_body(book("B1", 1.0, "Vol. 1", 3).to_string())
        .expect(1)
        .create_async()
        .await;

    let full_url = format!("{}/book/B1/read?incognito=true", f.server.url());
    let events = collect(
        f.komga.clone(),
        Request::MangaFromChapterUrl {
            url: full_url,
            lang: None,
        },
        None,
    )
    .await;
    lookup.assert_async().await;

    let Event::MangaUrl { found: Some(location) } = &events[0] else {
        panic!("expected a manga url, got {:?}", events[0]);
    };
    assert_eq!(location.url, "/series/S1");
    assert_eq!(location.lang, "en");
    assert_eq!(location.mirror, "komga");

    // l'id de série est dans l'URL : pas d'appel
    let events = collect(
        f.komga.clone(),
        Request::MangaFromChapterUrl {
            url: "/series/S9".into(),
            lang: Some("fr".into()),
        },
        None,
    )
    .await;
    let Event::MangaUrl { found: Some(location) } = &events[0] else {
        panic!("expected a manga url, got {:?}", events[0]);
    };
    assert_eq!(location.url, "/series/S9");
    assert_eq!(location.lang, "fr");

    let events = collect(
        f.komga.clone(),
        Request::MangaFromChapterUrl {
            url: "/somewhere/else".into(),
            lang: None,
        },
        None,
    )
    .await;
    assert_eq!(events, vec![Event::MangaUrl { found: None }]);
}

#[tokio::test]
async fn test_recommend_lists_series_without_details() {
    let mut f = fixture().await;
    let listing = f
        .server
        .mock("GET", "/api/v1/series")
        .match_query(Matcher::UrlEncoded("size".into(), "2000".into()))
        .with_body(
            json!({ "content": [
                { "id": "S1", "metadata": { "title": "Berserk", "summary": "Guts", "language": "en" } },
            ]})
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    f.server
        .mock("GET", "/api/v1/series/S1/thumbnail")
        .match_query(Matcher::Any)
        .with_header("content-type", "image/jpeg")
        .with_body(JPEG)
        .create_async()
        .await;
    let books = f
        .server
        .mock("GET", "/api/v1/series/S1/books")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let events = collect(f.komga.clone(), Request::Recommend, None).await;
    listing.assert_async().await;
    books.assert_async().await;

    assert_eq!(events.len(), 2);
    let Event::Recommend(result) = &events[0] else {
        panic!("expected a recommendation, got {:?}", events[0]);
    };
    assert_eq!(result.id, "komga/en/series/S1");
    assert!(result.synopsis.is_none());
    assert!(result.last_release.is_none());
    assert!(result.covers[0].ends_with(".jpg"));
    assert_eq!(events[1], Event::Done);
}

#[tokio::test]
async fn test_page_handle_is_returned_when_cache_write_fails() {
    let mut f = fixture().await;
    f.server
        .mock("GET", "/api/v1/books/B1")
        .match_query(Matcher::Any)
        .with_body(book("B1", 1.0, "Vol. 1", 1).to_string())
        .create_async()
        .await;
    f.server
        .mock("GET", "/api/v1/books/B1/pages/1")
        .match_query(Matcher::Any)
        .with_header("content-type", "image/jpeg")
        .with_body(JPEG)
        .create_async()
        .await;

    // le répertoire servi disparaît : l'écriture échoue
    std::fs::remove_dir_all(f.files.folder()).unwrap();

    let events = collect(
        f.komga.clone(),
        Request::Chapter {
            url: "/books/B1".into(),
            lang: "en".into(),
            request: ChapterRequest::default(),
        },
        None,
    )
    .await;

    assert_eq!(events.len(), 2);
    let Event::Page { index, src, lastpage } = &events[0] else {
        panic!("expected a page, got {:?}", events[0]);
    };
    assert_eq!(*index, 0);
    assert!(*lastpage);
    assert!(src.starts_with("/files/"));
    assert!(src.ends_with(".jpg"));
    assert!(f.files.get(src).await.is_none());
    assert_eq!(events[1], Event::Done);
}

#[tokio::test]
async fn test_cancelled_manga_emits_nothing() {
    let mut f = fixture().await;
    f.server
        .mock("GET", "/api/v1/series/S1")
        .match_query(Matcher::Any)
        .with_body(json!({ "id": "S1", "metadata": { "title": "Berserk" } }).to_string())
        .expect(1)
        .create_async()
        .await;
    let books = f
        .server
        .mock("GET", "/api/v1/series/S1/books")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let token = CancellationToken::new();
    token.cancel();
    let events = collect(
        f.komga.clone(),
        Request::Manga {
            url: "/series/S1".into(),
            lang: "en".into(),
        },
        Some(token),
    )
    .await;

    assert!(events.is_empty());
    books.assert_async().await;
}
