use serenity::model::id::GuildId;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{registry::GuildCell, state::ProgressHandle};
use crate::{
    config::Config,
    sources::Track,
    ui::{DisplayMessage, PlaybackDisplay},
};

const FILLED: char = '▓';
const EMPTY: char = '░';

#[derive(Debug, Clone)]
pub struct ProgressSettings {
    pub interval: Duration,
    pub bar_width: usize,
    /// `None` keeps updating until playback ends.
    pub max_updates: Option<u32>,
    pub lock_timeout: Duration,
}

impl From<&Config> for ProgressSettings {
    fn from(config: &Config) -> Self {
        Self {
            interval: config.progress_interval,
            bar_width: config.progress_bar_width,
            max_updates: config.progress_max_updates,
            lock_timeout: config.lock_timeout,
        }
    }
}

/// `MM:SS`; minutes keep counting past an hour.
pub fn format_clock(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Renders `▓▓▓▓░░░ 01:40/03:20`.
///
/// An unknown (zero) duration counts as no progress at all. Half cells
/// round to even, so 4.5 cells show as 4.
pub fn render_progress_bar(elapsed: Duration, total: Duration, width: usize) -> String {
    let ratio = if total.is_zero() {
        0.0
    } else {
        (elapsed.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0)
    };
    let filled = ((width as f64 * ratio).round_ties_even() as usize).min(width);

    let mut bar = String::with_capacity(width * 3 + 12);
    bar.extend(std::iter::repeat(FILLED).take(filled));
    bar.extend(std::iter::repeat(EMPTY).take(width - filled));

    format!("{} {}/{}", bar, format_clock(elapsed), format_clock(total))
}

/// What a progress loop is tracking.
pub struct ProgressJob {
    pub cell: GuildCell,
    pub message: DisplayMessage,
    pub token: u64,
    pub track: Track,
    pub started_at: Instant,
}

/// Spawns the loops that keep now-playing messages up to date.
#[derive(Clone)]
pub struct ProgressReporter {
    display: Arc<dyn PlaybackDisplay>,
    settings: ProgressSettings,
}

impl ProgressReporter {
    pub fn new(display: Arc<dyn PlaybackDisplay>, settings: ProgressSettings) -> Self {
        Self { display, settings }
    }

    /// Starts a loop for `job` and returns the handle that stops it.
    pub fn start(&self, job: ProgressJob) -> ProgressHandle {
        let cancel = CancellationToken::new();
        let handle = ProgressHandle::new(job.message, job.token, cancel.clone());

        let reporter = self.clone();
        tokio::spawn(async move { reporter.run(job, cancel).await });

        handle
    }

    async fn run(self, job: ProgressJob, cancel: CancellationToken) {
        let guild_id = job.cell.guild_id();
        let period = self.settings.interval;
        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut updates: u32 = 0;
        loop {
            ticker.tick().await;

            if let Some(max) = self.settings.max_updates {
                if updates >= max {
                    debug!("📊 Progress for guild {} reached {} updates", guild_id, max);
                    break;
                }
            }

            if !self.still_current(guild_id, &job, &cancel).await {
                break;
            }

            let progress = render_progress_bar(
                job.started_at.elapsed(),
                job.track.duration(),
                self.settings.bar_width,
            );
            if let Err(e) = self
                .display
                .update_progress(job.message, &job.track, &progress)
                .await
            {
                warn!("⚠️ Could not update progress in guild {}: {:?}", guild_id, e);
            }
            updates += 1;
        }

        debug!("📊 Progress loop for token {} ended after {} updates", job.token, updates);
    }

    /// Checked at the top of each tick; any failure ends the loop.
    async fn still_current(
        &self,
        guild_id: GuildId,
        job: &ProgressJob,
        cancel: &CancellationToken,
    ) -> bool {
        if cancel.is_cancelled() {
            return false;
        }

        let voice = {
            let guard = match job.cell.lock(self.settings.lock_timeout).await {
                Ok(guard) => guard,
                Err(e) => {
                    warn!("⚠️ Progress check skipped for guild {}: {}", guild_id, e);
                    return !cancel.is_cancelled();
                }
            };

            if guard.now_playing.as_ref().map(|n| n.token) != Some(job.token) {
                return false;
            }

            match guard.voice.clone() {
                Some(voice) => voice,
                None => return false,
            }
        };

        voice.is_connected().await && voice.is_playing().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn half_way_fills_eight_of_fifteen() {
        let bar = render_progress_bar(Duration::from_secs(100), Duration::from_secs(200), 15);
        assert_eq!(bar, "▓▓▓▓▓▓▓▓░░░░░░░ 01:40/03:20");
        assert_eq!(bar.chars().filter(|c| *c == FILLED).count(), 8);
        assert_eq!(bar.chars().filter(|c| *c == EMPTY).count(), 7);
    }

    #[test]
    fn half_cells_round_to_even() {
        let total = Duration::from_secs(200);
        let filled = |secs| {
            render_progress_bar(Duration::from_secs(secs), total, 15)
                .chars()
                .filter(|c| *c == FILLED)
                .count()
        };

        // 4.5 and 10.5 cells
        assert_eq!(filled(60), 4);
        assert_eq!(filled(140), 10);
        assert_eq!(
            render_progress_bar(Duration::from_secs(60), total, 15),
            "▓▓▓▓░░░░░░░░░░░ 01:00/03:20"
        );
    }

    #[test]
    fn start_of_track_is_empty() {
        let bar = render_progress_bar(Duration::ZERO, Duration::from_secs(200), 15);
        assert_eq!(bar, "░░░░░░░░░░░░░░░ 00:00/03:20");
    }

    #[test]
    fn unknown_duration_shows_no_progress() {
        let bar = render_progress_bar(Duration::from_secs(95), Duration::ZERO, 15);
        assert_eq!(bar.chars().filter(|c| *c == FILLED).count(), 0);
        assert!(bar.ends_with(" 01:35/00:00"));
    }

    #[test]
    fn overrun_is_clamped() {
        let bar = render_progress_bar(Duration::from_secs(250), Duration::from_secs(200), 10);
        assert_eq!(bar, "▓▓▓▓▓▓▓▓▓▓ 04:10/03:20");
    }

    #[test]
    fn clock_counts_minutes_past_the_hour() {
        assert_eq!(format_clock(Duration::from_secs(59)), "00:59");
        assert_eq!(format_clock(Duration::from_secs(3725)), "62:05");
    }
}
