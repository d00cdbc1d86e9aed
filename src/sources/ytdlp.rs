use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};
use tracing::{debug, info, warn};

use super::{is_url, Track, TrackResolver};
use crate::{config::Config, error::ResolutionError};

const UNKNOWN_TITLE: &str = "Unknown track";

/// Resolver backed by the yt-dlp command line tool.
///
/// Only metadata and a direct stream URL are extracted; the actual audio is
/// pulled later by the voice driver.
pub struct YtDlpResolver {
    binary: String,
    cookies: Option<PathBuf>,
    socket_timeout: Duration,
    retries: u32,
    timeout: Duration,
}

/// Subset of yt-dlp's `--dump-single-json` output we care about.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    url: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    entries: Option<Vec<YtDlpInfo>>,
}

impl YtDlpResolver {
    pub fn new(config: &Config) -> Self {
        let cookies = config.existing_cookies();
        match &cookies {
            Some(path) => info!("🍪 Cookies found at: {}", path.display()),
            None => debug!("🍪 No cookie file configured, resolving anonymously"),
        }

        Self {
            binary: config.ytdlp_binary.clone(),
            cookies,
            socket_timeout: config.resolver_socket_timeout,
            retries: config.resolver_retries,
            timeout: config.resolver_timeout,
        }
    }

    /// Free text becomes a "first search result" expression.
    fn target(query: &str) -> String {
        let query = query.trim();
        if is_url(query) {
            query.to_string()
        } else {
            format!("ytsearch:{}", query)
        }
    }

    fn args(&self, target: &str) -> Vec<String> {
        let mut args: Vec<String> = [
            "--format",
            "worstaudio",
            "--no-playlist",
            "--dump-single-json",
            "--skip-download",
            "--quiet",
            "--no-warnings",
            "--no-check-certificate",
            "--geo-bypass",
            "--source-address",
            "0.0.0.0",
            "--cache-dir",
            "/tmp",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        args.push("--socket-timeout".into());
        args.push(self.socket_timeout.as_secs().max(1).to_string());
        args.push("--retries".into());
        args.push(self.retries.to_string());

        if let Some(cookies) = &self.cookies {
            args.push("--cookies".into());
            args.push(cookies.display().to_string());
        }

        args.push(target.to_string());
        args
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<Track, ResolutionError> {
        let started = std::time::Instant::now();
        let target = Self::target(query);
        info!("🔍 Resolving: {}", target);

        let mut command = Command::new(&self.binary);
        command.args(self.args(&target)).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                warn!("⏰ yt-dlp timed out after {:?} for: {}", self.timeout, target);
                ResolutionError::Upstream(format!("timed out after {:?}", self.timeout))
            })?
            .map_err(|e| ResolutionError::Upstream(format!("could not run yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("❌ yt-dlp failed: {}", stderr.trim());
            return Err(ResolutionError::Upstream(stderr.trim().to_string()));
        }

        let track = parse_output(query, &output.stdout)?;

        debug!(
            "⚡ Resolved '{}' in {:.2}ms",
            track.title(),
            started.elapsed().as_secs_f64() * 1000.0
        );
        Ok(track)
    }
}

/// Turns yt-dlp's JSON dump into a track.
fn parse_output(query: &str, stdout: &[u8]) -> Result<Track, ResolutionError> {
    let info: YtDlpInfo = serde_json::from_slice(stdout)
        .map_err(|e| ResolutionError::Malformed(format!("invalid yt-dlp JSON: {}", e)))?;

    track_from_info(query, info)
}

fn track_from_info(query: &str, info: YtDlpInfo) -> Result<Track, ResolutionError> {
    // Search results come back as a playlist of entries
    let info = match info.entries {
        Some(entries) => entries
            .into_iter()
            .next()
            .ok_or_else(|| ResolutionError::NotFound(query.to_string()))?,
        None => info,
    };

    let stream_uri = info
        .url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| ResolutionError::Malformed("missing stream url".into()))?;

    let mut track = Track::new(stream_uri, info.title.unwrap_or_else(|| UNKNOWN_TITLE.into()))
        .with_source_page(info.webpage_url.unwrap_or_default());

    if let Some(secs) = info.duration.filter(|d| d.is_finite() && *d > 0.0) {
        track = track.with_duration(Duration::from_secs_f64(secs));
    }

    if let Some(thumbnail) = info.thumbnail {
        track = track.with_thumbnail(thumbnail);
    }

    Ok(track)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn search_queries_get_prefixed() {
        assert_eq!(YtDlpResolver::target("  shape of you "), "ytsearch:shape of you");
        assert_eq!(
            YtDlpResolver::target("https://youtu.be/dQw4w9WgXcQ"),
            "https://youtu.be/dQw4w9WgXcQ"
        );
    }

    #[test]
    fn args_include_cookies_and_limits() {
        let resolver = YtDlpResolver {
            binary: "yt-dlp".into(),
            cookies: Some(PathBuf::from("/data/cookies.txt")),
            socket_timeout: Duration::from_secs(3),
            retries: 1,
            timeout: Duration::from_secs(30),
        };

        let args = resolver.args("ytsearch:sugar");
        let joined = args.join(" ");
        assert!(joined.contains("--format worstaudio"));
        assert!(joined.contains("--socket-timeout 3"));
        assert!(joined.contains("--retries 1"));
        assert!(joined.contains("--cookies /data/cookies.txt"));
        assert_eq!(args.last().map(String::as_str), Some("ytsearch:sugar"));
    }

    #[test]
    fn first_search_entry_wins() {
        let json = br#"{
            "entries": [
                {"url": "https://cdn.example/1.webm", "title": "Sugar", "duration": 235.0,
                 "thumbnail": "https://i.example/1.jpg", "webpage_url": "https://youtube.com/watch?v=1"},
                {"url": "https://cdn.example/2.webm", "title": "Sugar (Live)"}
            ]
        }"#;

        let track = parse_output("sugar", json).unwrap();
        assert_eq!(track.title(), "Sugar");
        assert_eq!(track.stream_uri(), "https://cdn.example/1.webm");
        assert_eq!(track.duration(), Duration::from_secs(235));
        assert_eq!(track.thumbnail(), Some("https://i.example/1.jpg"));
        assert_eq!(track.source_page(), "https://youtube.com/watch?v=1");
    }

    #[test]
    fn empty_search_is_not_found() {
        let err = parse_output("zzzz", br#"{"entries": []}"#).unwrap_err();
        assert_eq!(err, ResolutionError::NotFound("zzzz".into()));
    }

    #[test]
    fn missing_stream_url_is_malformed() {
        let err = parse_output("x", br#"{"title": "No url"}"#).unwrap_err();
        assert!(matches!(err, ResolutionError::Malformed(_)));

        let err = parse_output("x", b"not json").unwrap_err();
        assert!(matches!(err, ResolutionError::Malformed(_)));
    }

    #[test]
    fn missing_metadata_gets_defaults() {
        let track = parse_output("x", br#"{"url": "https://cdn.example/a.m4a"}"#).unwrap();
        assert_eq!(track.title(), UNKNOWN_TITLE);
        assert_eq!(track.duration(), Duration::ZERO);
        assert_eq!(track.source_page(), "");
    }

    #[tokio::test]
    async fn missing_binary_is_upstream_error() {
        let mut config = Config::default();
        config.ytdlp_binary = "/nonexistent/yt-dlp-binary".into();

        let err = YtDlpResolver::new(&config).resolve("anything").await.unwrap_err();
        assert!(matches!(err, ResolutionError::Upstream(_)));
    }
}
