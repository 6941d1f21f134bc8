//! # yomisource
//!
//! Common traits and types for Yomi mirrors.
//!
//! A mirror is an adapter translating the uniform operations (search, manga
//! detail, chapter pages, recommendations, reverse lookup) into calls against
//! one external API.
//!
//! ## Features
//!
//! - **Mirror contract**: the [`Mirror`] trait and the protected runner [`run`].
//! - **Rate limiting**: [`RateLimitedQueue`], one per mirror, FIFO with spacing.
//! - **Streaming results**: typed [`Event`]s wrapped in [`Envelope`]s on an mpsc channel.
//! - **Cooperative cancellation**: [`OperationContext`] carries an optional
//!   `CancellationToken` (absent in headless mode).
//! - **Registry**: [`MirrorRegistry`] maps names to `Arc<dyn Mirror>`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use yomisource::{run, Operation, OperationContext, Request};
//!
//! let (tx, mut rx) = mpsc::unbounded_channel();
//! let ctx = OperationContext::new(1, mirror.name(), Operation::Search, tx, None);
//! run(mirror.clone(), Request::Search { query: "berserk".into() }, &ctx).await;
//!
//! while let Ok(envelope) = rx.try_recv() {
//!     println!("{:?}", envelope.event);
//! }
//! ```

pub mod context;
pub mod descriptor;
pub mod error;
pub mod event;
pub mod mirror;
pub mod queue;
pub mod registry;

pub use context::{OperationContext, ResultSink};
pub use descriptor::{
    lang_or_default, merge_settings, qualified_id, MirrorDescriptor, MirrorInfo, MirrorMeta,
    MirrorOptions, DEFAULT_LANG,
};
pub use error::{ErrorKind, MirrorError, Result};
pub use event::{
    Chapter, Envelope, Event, LastRelease, MangaDetail, MangaLocation, Operation, SearchResult,
};
pub use mirror::{run, ChapterRequest, Mirror, ProgressCallback, Request};
pub use queue::RateLimitedQueue;
pub use registry::MirrorRegistry;

/// Re-exported so that adapters and schedulers share the same token type
pub use tokio_util::sync::CancellationToken;
