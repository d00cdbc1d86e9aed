//! # Audio Module
//!
//! Per-guild playback: the queue, the state machine that walks it, and the
//! voice transport underneath.
//!
//! ## Architecture
//!
//! ### [`sequencer`] - Playback Sequencer
//! - Accepts play, skip, clear and queue requests from the command layer
//! - Guarantees at most one streaming track per guild
//! - Runs one worker task per guild that reacts to end-of-track events
//!
//! ### [`registry`] - Guild Registry
//! - One [`state::GuildPlaybackState`] per guild in a concurrent map
//! - Scoped [`registry::GuildGuard`] with a bounded wait
//!
//! ### [`queue`] - Queue Store
//! - Strict FIFO, capped at `MAX_QUEUE_SIZE`
//!
//! ### [`progress`] - Progress Reporter
//! - Edits the now-playing message every `PROGRESS_INTERVAL`
//!
//! ### [`voice`] - Voice Transport
//! - Songbird implementation of [`output::VoiceOutput`]
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use guild_jukebox::{
//!     audio::sequencer::{PlaybackSequencer, SequencerSettings},
//!     config::Config,
//!     sources::{BoundedResolver, YtDlpResolver},
//! };
//! # use std::sync::Arc;
//! # use serenity::all::{ChannelId, GuildId};
//! # async fn example(display: Arc<dyn guild_jukebox::ui::PlaybackDisplay>) -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let resolver = BoundedResolver::new(YtDlpResolver::new(&config), config.resolver_workers);
//! let sequencer = PlaybackSequencer::new(
//!     SequencerSettings::from(&config),
//!     Arc::new(resolver),
//!     display,
//! );
//!
//! let outcome = sequencer
//!     .request_play(GuildId::new(1), ChannelId::new(2), "never gonna give you up")
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod output;
pub mod progress;
pub mod queue;
pub mod registry;
pub mod sequencer;
pub mod state;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;

pub use output::{EndReason, TrackEndSignal, VoiceOutput};
pub use sequencer::{PlayOutcome, PlaybackSequencer, QueueSnapshot, SequencerSettings};
pub use state::PlaybackPhase;
