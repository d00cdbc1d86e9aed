pub mod ytdlp;

use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::ResolutionError;

pub use ytdlp::YtDlpResolver;

/// Common trait for anything that turns a user query into a playable track.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resolves a URL or free-text search into a single track.
    async fn resolve(&self, query: &str) -> Result<Track, ResolutionError>;
}

/// A resolved, playable song.
///
/// Immutable once built by a resolver; whoever holds it (a queue or the
/// now-playing slot) owns a clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    stream_uri: String,
    title: String,
    duration: Duration,
    thumbnail: Option<String>,
    source_page: String,
}

impl Track {
    pub fn new(stream_uri: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            stream_uri: stream_uri.into(),
            title: title.into(),
            duration: Duration::ZERO,
            thumbnail: None,
            source_page: String::new(),
        }
    }

    // Getters
    pub fn stream_uri(&self) -> &str {
        &self.stream_uri
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    /// Zero when the resolver could not tell.
    pub fn duration(&self) -> Duration {
        self.duration
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }
    pub fn source_page(&self) -> &str {
        &self.source_page
    }

    // Builders
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn with_source_page(mut self, url: impl Into<String>) -> Self {
        self.source_page = url.into();
        self
    }
}

/// Whether a query is a direct media URL rather than a search expression.
pub fn is_url(query: &str) -> bool {
    let query = query.trim();
    (query.starts_with("http://") || query.starts_with("https://"))
        && url::Url::parse(query).is_ok()
}

/// Runs an inner resolver on a fixed number of concurrent slots.
///
/// Every resolution in the process goes through the same semaphore, so the
/// external service never sees more than `workers` extractions at once no
/// matter how many guilds are requesting songs.
pub struct BoundedResolver<R> {
    inner: R,
    permits: Arc<Semaphore>,
    workers: usize,
}

impl<R: TrackResolver> BoundedResolver<R> {
    pub fn new(inner: R, workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            inner,
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    /// Slots not currently held by a running resolution.
    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

#[async_trait]
impl<R: TrackResolver> TrackResolver for BoundedResolver<R> {
    async fn resolve(&self, query: &str) -> Result<Track, ResolutionError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ResolutionError::Upstream("resolver pool is shut down".into()))?;

        debug!(
            "🔧 Resolver slot acquired ({} of {} idle)",
            self.permits.available_permits(),
            self.workers
        );
        self.inner.resolve(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn url_detection() {
        assert!(is_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_url("http://example.com/song.mp3"));
        assert!(is_url("  https://youtu.be/dQw4w9WgXcQ "));
        assert!(!is_url("never gonna give you up"));
        assert!(!is_url("youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(!is_url("https://"));
    }

    #[test]
    fn track_defaults() {
        let track = Track::new("https://cdn.example/a.webm", "A");
        assert_eq!(track.duration(), Duration::ZERO);
        assert_eq!(track.thumbnail(), None);
        assert_eq!(track.source_page(), "");
    }

    /// Records how many resolutions overlap.
    struct SlowResolver {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl TrackResolver for SlowResolver {
        async fn resolve(&self, query: &str) -> Result<Track, ResolutionError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(Track::new(format!("https://cdn.example/{query}"), query))
        }
    }

    #[tokio::test]
    async fn pool_caps_concurrent_resolutions() {
        let pool = Arc::new(BoundedResolver::new(
            SlowResolver {
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            },
            2,
        ));

        let tasks: Vec<_> = (0..6)
            .map(|i| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.resolve(&format!("song-{i}")).await })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            assert!(result.unwrap().is_ok());
        }

        assert_eq!(pool.inner.peak.load(Ordering::SeqCst), 2);
        assert_eq!(pool.idle_workers(), 2);
    }

    #[tokio::test]
    async fn pool_passes_errors_through() {
        let mut inner = MockTrackResolver::new();
        inner
            .expect_resolve()
            .returning(|q| Err(ResolutionError::NotFound(q.to_string())));

        let pool = BoundedResolver::new(inner, 2);
        assert_eq!(
            pool.resolve("nothing").await,
            Err(ResolutionError::NotFound("nothing".into()))
        );
        assert_eq!(pool.idle_workers(), 2);
    }
}
