//! The per-virtual-host player set. The middleware consults it on every
//! rewritten packet, so lookups must be cheap and never block the pipe for
//! long.

use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::conn::ConnId;

/// One logged-in player as seen from both sides of the bridge: the identity
/// the backend assigned (offline mode) and the identity Mojang vouched for.
#[derive(Clone, Debug, Default)]
pub struct Player {
    pub username: String,
    /// The Mojang-issued UUID, known once session authentication succeeds.
    pub uuid: Option<Uuid>,
    /// The UUID the offline-mode backend derived from the username, read
    /// from its `LoginSuccess`.
    pub offline_uuid: Option<Uuid>,
    /// Base64 textures blob from the game profile.
    pub skin: Option<String>,
    pub skin_signature: Option<String>,
}

impl Player {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }
}

/// Concurrent map of the players currently bridged through one virtual
/// host, keyed by connection identity.
#[derive(Default)]
pub struct Players {
    inner: RwLock<HashMap<ConnId, Player>>,
}

impl Players {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, id: ConnId, player: Player) {
        self.inner.write().insert(id, player);
    }

    pub fn get(&self, id: ConnId) -> Option<Player> {
        self.inner.read().get(&id).cloned()
    }

    pub fn remove(&self, id: ConnId) -> Option<Player> {
        self.inner.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Finds the player whose backend identity matches `offline_uuid`.
    pub fn by_offline_uuid(&self, offline_uuid: Uuid) -> Option<Player> {
        self.inner
            .read()
            .values()
            .find(|p| p.offline_uuid == Some(offline_uuid))
            .cloned()
    }
}
