use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
    time::Duration,
};
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tracing::{trace, warn};

use super::{sequencer::SequencerEvent, state::GuildPlaybackState};
use crate::error::StateConflict;

/// Shared handle to one guild's state.
///
/// The state can only be reached through [`GuildCell::lock`], which hands
/// out a [`GuildGuard`].
#[derive(Clone)]
pub struct GuildCell {
    guild_id: GuildId,
    state: Arc<Mutex<GuildPlaybackState>>,
}

impl GuildCell {
    pub fn new(guild_id: GuildId, state: GuildPlaybackState) -> Self {
        Self {
            guild_id,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Waits at most `timeout` for exclusive access to the guild.
    pub async fn lock(&self, timeout: Duration) -> Result<GuildGuard, StateConflict> {
        match tokio::time::timeout(timeout, self.state.clone().lock_owned()).await {
            Ok(inner) => {
                trace!("🔒 Guild {} acquired", self.guild_id);
                Ok(GuildGuard {
                    guild_id: self.guild_id,
                    inner,
                })
            }
            Err(_) => {
                warn!(
                    "⏳ Gave up waiting {:?} for guild {} state",
                    timeout, self.guild_id
                );
                Err(StateConflict::GuildBusy(timeout))
            }
        }
    }
}

/// Exclusive access to a guild's playback state.
///
/// Released when dropped, on every exit path: normal return, `?`, or a
/// panic unwinding through the holder.
pub struct GuildGuard {
    guild_id: GuildId,
    inner: OwnedMutexGuard<GuildPlaybackState>,
}

impl GuildGuard {
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }
}

impl Deref for GuildGuard {
    type Target = GuildPlaybackState;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for GuildGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl Drop for GuildGuard {
    fn drop(&mut self) {
        trace!("🔓 Guild {} released", self.guild_id);
    }
}

/// A guild's state plus the inbox of its sequencer worker.
#[derive(Clone)]
pub struct GuildSlot {
    pub cell: GuildCell,
    pub events: mpsc::UnboundedSender<SequencerEvent>,
}

/// All known guilds, keyed by id.
///
/// Entries are created lazily on first use and removed when the bot leaves
/// the guild's voice channel. Guilds never wait on each other.
#[derive(Default)]
pub struct GuildRegistry {
    slots: DashMap<GuildId, GuildSlot>,
}

impl GuildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<GuildSlot> {
        self.slots.get(&guild_id).map(|slot| slot.clone())
    }

    /// Returns the guild's slot, building it with `create` on first use.
    pub fn get_or_create<F>(&self, guild_id: GuildId, create: F) -> GuildSlot
    where
        F: FnOnce() -> GuildSlot,
    {
        self.slots.entry(guild_id).or_insert_with(create).clone()
    }

    pub fn remove(&self, guild_id: GuildId) -> Option<GuildSlot> {
        self.slots.remove(&guild_id).map(|(_, slot)| slot)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::Track;

    fn cell() -> GuildCell {
        GuildCell::new(GuildId::new(1), GuildPlaybackState::new(10))
    }

    fn slot(cell: GuildCell) -> GuildSlot {
        let (events, _rx) = mpsc::unbounded_channel();
        GuildSlot { cell, events }
    }

    #[tokio::test]
    async fn guard_excludes_other_holders() {
        let cell = cell();
        let guard = cell.lock(Duration::from_secs(1)).await.unwrap();

        let busy = cell.lock(Duration::from_millis(20)).await;
        assert_eq!(busy.err(), Some(StateConflict::GuildBusy(Duration::from_millis(20))));

        drop(guard);
        assert!(cell.lock(Duration::from_millis(20)).await.is_ok());
    }

    #[tokio::test]
    async fn guard_is_released_when_holder_panics() {
        let cell = cell();

        let holder = cell.clone();
        let result = tokio::spawn(async move {
            let mut guard = holder.lock(Duration::from_secs(1)).await.unwrap();
            guard
                .queue
                .enqueue(Track::new("https://cdn.example/a", "A"))
                .unwrap();
            panic!("fault inside critical section");
        })
        .await;
        assert!(result.is_err());

        let guard = cell.lock(Duration::from_millis(50)).await.unwrap();
        assert_eq!(guard.queue.len(), 1);
    }

    #[tokio::test]
    async fn guard_is_released_on_early_error_return() {
        async fn fails(cell: &GuildCell) -> Result<(), StateConflict> {
            let guard = cell.lock(Duration::from_secs(1)).await?;
            if guard.now_playing.is_none() {
                return Err(StateConflict::NothingPlaying);
            }
            Ok(())
        }

        let cell = cell();
        assert_eq!(fails(&cell).await, Err(StateConflict::NothingPlaying));
        assert!(cell.lock(Duration::from_millis(20)).await.is_ok());
    }

    #[tokio::test]
    async fn guilds_do_not_block_each_other() {
        let registry = GuildRegistry::new();
        let one = registry.get_or_create(GuildId::new(1), || slot(cell()));
        let two = registry.get_or_create(GuildId::new(2), || {
            slot(GuildCell::new(GuildId::new(2), GuildPlaybackState::new(10)))
        });

        let _held = one.cell.lock(Duration::from_secs(1)).await.unwrap();
        assert!(two.cell.lock(Duration::from_millis(20)).await.is_ok());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn slots_are_created_once() {
        let registry = GuildRegistry::new();
        let first = registry.get_or_create(GuildId::new(1), || slot(cell()));
        let second = registry.get_or_create(GuildId::new(1), || panic!("created twice"));

        assert!(Arc::ptr_eq(&first.cell.state, &second.cell.state));
        assert!(registry.remove(GuildId::new(1)).is_some());
        assert!(registry.get(GuildId::new(1)).is_none());
    }
}
