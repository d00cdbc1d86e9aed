//! Discord voice-channel jukebox.
//!
//! Song requests are resolved through yt-dlp, queued per guild and streamed
//! one at a time through songbird, with a live progress bar in the text
//! channel.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod ui;
