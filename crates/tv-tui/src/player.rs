//! Player collaborator.  The controller is its only caller.

use async_trait::async_trait;

/// Unsolicited player state changes, posted back onto the controller loop.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Buffering,
    Ready,
    Error(String),
}

#[async_trait]
pub trait Player: Send {
    async fn load(&mut self, uri: &str) -> anyhow::Result<()>;
    async fn play(&mut self) -> anyhow::Result<()>;
    async fn pause(&mut self) -> anyhow::Result<()>;
    /// Stop playback and free the underlying resource.  Safe to call twice.
    async fn release(&mut self);
}

/// Player used when no video backend could be started.
#[derive(Debug, Default)]
pub struct NullPlayer;

#[async_trait]
impl Player for NullPlayer {
    async fn load(&mut self, uri: &str) -> anyhow::Result<()> {
        anyhow::bail!("no player backend available for {}", uri)
    }

    async fn play(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn pause(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn release(&mut self) {}
}
