use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Guild-scoped command registration

    // Resolver
    pub ytdlp_binary: String,
    pub cookies_path: Option<PathBuf>,
    pub resolver_workers: usize,
    pub resolver_socket_timeout: Duration,
    pub resolver_retries: u32,
    pub resolver_timeout: Duration,

    // Playback
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub settle_delay: Duration,
    pub lock_timeout: Duration,

    // Progress display
    pub progress_interval: Duration,
    pub progress_bar_width: usize,
    pub progress_max_updates: Option<u32>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// [`Config::load`] passes the process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let duration = |key: &str, fallback: Duration| -> Result<Duration> {
            match var(key) {
                Some(raw) => humantime::parse_duration(raw.trim())
                    .with_context(|| format!("{key} is not a valid duration: {raw}")),
                None => Ok(fallback),
            }
        };

        let config = Self {
            // Discord
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            guild_id: match var("GUILD_ID") {
                Some(raw) => Some(raw.trim().parse().context("GUILD_ID must be a number")?),
                None => None,
            },

            // Resolver
            ytdlp_binary: var("YTDLP_BINARY").unwrap_or(defaults.ytdlp_binary),
            cookies_path: var("COOKIES_PATH").map(PathBuf::from),
            resolver_workers: match var("RESOLVER_WORKERS") {
                Some(raw) => raw.trim().parse()?,
                None => defaults.resolver_workers,
            },
            resolver_socket_timeout: duration(
                "RESOLVER_SOCKET_TIMEOUT",
                defaults.resolver_socket_timeout,
            )?,
            resolver_retries: match var("RESOLVER_RETRIES") {
                Some(raw) => raw.trim().parse()?,
                None => defaults.resolver_retries,
            },
            resolver_timeout: duration("RESOLVER_TIMEOUT", defaults.resolver_timeout)?,

            // Playback
            default_volume: match var("DEFAULT_VOLUME") {
                Some(raw) => raw.trim().parse()?,
                None => defaults.default_volume,
            },
            max_queue_size: match var("MAX_QUEUE_SIZE") {
                Some(raw) => raw.trim().parse()?,
                None => defaults.max_queue_size,
            },
            settle_delay: duration("SETTLE_DELAY", defaults.settle_delay)?,
            lock_timeout: duration("LOCK_TIMEOUT", defaults.lock_timeout)?,

            // Progress display
            progress_interval: duration("PROGRESS_INTERVAL", defaults.progress_interval)?,
            progress_bar_width: match var("PROGRESS_BAR_WIDTH") {
                Some(raw) => raw.trim().parse()?,
                None => defaults.progress_bar_width,
            },
            progress_max_updates: match var("PROGRESS_MAX_UPDATES") {
                Some(raw) => Some(raw.trim().parse()?),
                None => None,
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - At least one resolver worker
    /// - Queue size and progress bar width must be > 0
    /// - Progress interval and lock timeout must be non-zero
    pub fn validate(&self) -> Result<()> {
        if self.default_volume < 0.0 || self.default_volume > 2.0 {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.resolver_workers == 0 {
            anyhow::bail!("Resolver worker count must be greater than 0");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.progress_bar_width == 0 {
            anyhow::bail!("Progress bar width must be greater than 0");
        }

        if self.progress_interval.is_zero() {
            anyhow::bail!("Progress interval must be greater than 0");
        }

        if self.lock_timeout.is_zero() {
            anyhow::bail!("Lock timeout must be greater than 0");
        }

        Ok(())
    }

    /// Cookie file to hand to yt-dlp, only if it actually exists.
    pub fn existing_cookies(&self) -> Option<PathBuf> {
        self.cookies_path.clone().filter(|path| path.is_file())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the bot token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: commands {}\n  \
            Resolver: {} workers, {} timeout, {} retries, cookies={}\n  \
            Playback: {}% vol, {} queue, {} settle, {} lock timeout\n  \
            Progress: every {}, {} cells, ceiling={}",
            self.guild_id
                .map_or("global".to_string(), |id| format!("guild {}", id)),
            self.resolver_workers,
            humantime::format_duration(self.resolver_timeout),
            self.resolver_retries,
            self.existing_cookies().is_some(),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            humantime::format_duration(self.settle_delay),
            humantime::format_duration(self.lock_timeout),
            humantime::format_duration(self.progress_interval),
            self.progress_bar_width,
            self.progress_max_updates
                .map_or("none".to_string(), |n| n.to_string()),
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            guild_id: None,

            // Resolver defaults
            ytdlp_binary: "yt-dlp".to_string(),
            cookies_path: None,
            resolver_workers: 2,
            resolver_socket_timeout: Duration::from_secs(3),
            resolver_retries: 1,
            resolver_timeout: Duration::from_secs(30),

            // Playback defaults
            default_volume: 0.5,
            max_queue_size: 1000,
            settle_delay: Duration::from_millis(500),
            lock_timeout: Duration::from_secs(30),

            // Progress defaults
            progress_interval: Duration::from_secs(5),
            progress_bar_width: 15,
            progress_max_updates: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn token_is_required() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("DISCORD_TOKEN"));
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[("DISCORD_TOKEN", "abc")])).unwrap();

        assert_eq!(config.resolver_workers, 2);
        assert_eq!(config.settle_delay, Duration::from_millis(500));
        assert_eq!(config.progress_interval, Duration::from_secs(5));
        assert_eq!(config.progress_bar_width, 15);
        assert_eq!(config.progress_max_updates, None);
        assert_eq!(config.guild_id, None);
    }

    #[test]
    fn durations_use_humantime() {
        let config = Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "abc"),
            ("SETTLE_DELAY", "250ms"),
            ("LOCK_TIMEOUT", "1m"),
            ("PROGRESS_MAX_UPDATES", "20"),
            ("GUILD_ID", "123456789"),
        ]))
        .unwrap();

        assert_eq!(config.settle_delay, Duration::from_millis(250));
        assert_eq!(config.lock_timeout, Duration::from_secs(60));
        assert_eq!(config.progress_max_updates, Some(20));
        assert_eq!(config.guild_id, Some(123456789));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "abc"),
            ("DEFAULT_VOLUME", "3.5"),
        ]))
        .is_err());

        assert!(Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "abc"),
            ("SETTLE_DELAY", "soon"),
        ]))
        .is_err());

        assert!(Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "abc"),
            ("RESOLVER_WORKERS", "0"),
        ]))
        .is_err());
    }

    #[test]
    fn cookies_only_used_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let cookies = dir.path().join("cookies.txt");

        let mut config = Config::default();
        config.cookies_path = Some(cookies.clone());
        assert_eq!(config.existing_cookies(), None);

        std::fs::write(&cookies, "# Netscape HTTP Cookie File\n").unwrap();
        assert_eq!(config.existing_cookies(), Some(cookies));
    }
}
